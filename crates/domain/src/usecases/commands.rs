//! Subscription commands sent by users as text messages

use std::sync::Arc;
use std::time::Duration;

use crate::{
    model::{ChannelRef, UserId},
    ports::{Clock, StoreError, SubscriptionStore},
};

/// A parsed user command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Add(String),
    Remove(String),
    List,
    /// Anything unrecognised, including plain text
    Help,
}

impl Command {
    /// Parse message text; `/cmd@botname` is accepted as `/cmd`
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let (head, rest) = text
            .split_once(char::is_whitespace)
            .map(|(head, rest)| (head, rest.trim()))
            .unwrap_or((text, ""));
        let name = head.split('@').next().unwrap_or(head);

        match name {
            "/start" => Command::Start,
            "/add" => Command::Add(rest.to_string()),
            "/remove" => Command::Remove(rest.to_string()),
            "/list" => Command::List,
            _ => Command::Help,
        }
    }
}

/// Handles subscription commands and produces the reply text
pub struct CommandHandler<St, Cl>
where
    St: SubscriptionStore + ?Sized,
    Cl: Clock + ?Sized,
{
    store: Arc<St>,
    clock: Arc<Cl>,
    poll_interval: Duration,
}

impl<St, Cl> CommandHandler<St, Cl>
where
    St: SubscriptionStore + ?Sized,
    Cl: Clock + ?Sized,
{
    pub fn new(store: Arc<St>, clock: Arc<Cl>) -> Self {
        Self {
            store,
            clock,
            poll_interval: Duration::from_secs(300),
        }
    }

    /// Interval mentioned in the welcome text
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run one command; store failures become a generic apology
    ///
    /// Every command counts as contact, so the user is registered first.
    pub async fn handle(&self, user: UserId, text: &str) -> String {
        let command = Command::parse(text);
        tracing::debug!(user = %user, command = ?command, "Handling command");

        let registered = self.store.register_user(user, self.clock.now()).await;
        if let Err(ref e) = registered {
            tracing::error!(user = %user, error = %e, "Failed to register user");
        }

        match command {
            Command::Start => match registered {
                Ok(()) => self.help_text(),
                Err(_) => "⚠️ Произошла ошибка. Попробуйте позже.".to_string(),
            },
            Command::Add(arg) => self.add(user, &arg).await,
            Command::Remove(arg) => self.remove(user, &arg).await,
            Command::List => self.list(user).await,
            Command::Help => self.help_text(),
        }
    }

    async fn add(&self, user: UserId, arg: &str) -> String {
        let Ok(channel) = ChannelRef::find_in(arg) else {
            return "❌ Неверный формат. Пример: /add https://t.me/example".to_string();
        };

        match self.store.add_subscription(user, &channel).await {
            Ok(()) => {
                tracing::info!(user = %user, channel = %channel, "Subscription added");
                format!("✅ Канал {channel} добавлен!")
            }
            Err(StoreError::DuplicateSubscription(_)) => "⚠️ Канал уже в списке".to_string(),
            Err(StoreError::QuotaExceeded { max }) => {
                format!("🚫 Лимит: не более {max} каналов")
            }
            Err(e) => {
                tracing::error!(user = %user, channel = %channel, error = %e, "Failed to add subscription");
                "⚠️ Ошибка при добавлении канала".to_string()
            }
        }
    }

    async fn remove(&self, user: UserId, arg: &str) -> String {
        let Ok(channel) = ChannelRef::find_in(arg) else {
            return "❌ Неверный формат. Пример: /remove https://t.me/example".to_string();
        };

        match self.store.remove_subscription(user, &channel).await {
            Ok(true) => {
                tracing::info!(user = %user, channel = %channel, "Subscription removed");
                format!("🗑 Канал {channel} удален")
            }
            Ok(false) => "ℹ️ Канал не найден".to_string(),
            Err(e) => {
                tracing::error!(user = %user, channel = %channel, error = %e, "Failed to remove subscription");
                "⚠️ Ошибка при удалении канала".to_string()
            }
        }
    }

    async fn list(&self, user: UserId) -> String {
        match self.store.list_subscriptions(user).await {
            Ok(channels) if channels.is_empty() => "📭 Нет добавленных каналов".to_string(),
            Ok(channels) => {
                let lines: Vec<String> = channels.iter().map(|c| format!("• {c}")).collect();
                format!("📋 Ваши каналы:\n\n{}", lines.join("\n"))
            }
            Err(e) => {
                tracing::error!(user = %user, error = %e, "Failed to list subscriptions");
                "⚠️ Ошибка при получении списка".to_string()
            }
        }
    }

    fn help_text(&self) -> String {
        let minutes = (self.poll_interval.as_secs() / 60).max(1);
        format!(
            "📰 Привет! Я парсер новостей.\n\n\
             Добавь каналы командой:\n\
             /add https://t.me/example\n\n\
             Управление каналами:\n\
             /list - список каналов\n\
             /remove - удалить канал\n\n\
             Бот проверяет новые посты каждые {minutes} мин."
        )
    }
}
