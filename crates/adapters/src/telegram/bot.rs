//! Telegram Bot API adapter: outgoing messages and long-polled updates

use async_trait::async_trait;
use news_digest_domain::{
    ActionButton, ActionContext, DeliveryError, DeliveryTransport, EventSource, InboundEvent,
    MessageRef, UserId,
};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Maximum message length accepted by `sendMessage`
const MAX_MESSAGE_CHARS: usize = 4096;

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

/// Thin Bot API client shared by the transport and the update listener
#[derive(Clone)]
pub struct TelegramBotApi {
    client: Client,
    token: SecretString,
    base_url: String,
}

impl TelegramBotApi {
    pub fn new(token: SecretString, request_timeout: Duration) -> Result<Self, DeliveryError> {
        Self::with_base_url(token, DEFAULT_API_BASE_URL.to_string(), request_timeout)
    }

    pub fn with_base_url(
        token: SecretString,
        base_url: String,
        request_timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DeliveryError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.base_url,
            self.token.expose_secret(),
            method
        )
    }

    /// Call a Bot API method and unwrap its `result`
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T, DeliveryError> {
        let mut request = self.client.post(self.method_url(method)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| {
            // reqwest errors can carry the URL, which embeds the token
            DeliveryError::Network(e.without_url().to_string())
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DeliveryError::RateLimited);
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| DeliveryError::Api(format!("{} returned {}: {}", method, status, e)))?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(DeliveryError::Api(format!(
                "{} failed: {}",
                method,
                description.unwrap_or_else(|| status.to_string())
            ))),
        }
    }

    /// Bot username, used as a connectivity check
    pub async fn get_me(&self) -> Result<String, DeliveryError> {
        let me: BotUser = self.call("getMe", &json!({}), None).await?;
        Ok(me.username.unwrap_or_else(|| me.id.to_string()))
    }
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct BotUser {
    id: i64,
    username: Option<String>,
}

#[derive(Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    text: Option<String>,
}

#[derive(Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Deserialize)]
struct CallbackQuery {
    id: String,
    from: BotUser,
    message: Option<Message>,
    data: Option<String>,
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Delivery transport over the Bot API
pub struct TelegramBotTransport {
    api: TelegramBotApi,
}

impl TelegramBotTransport {
    pub fn new(api: TelegramBotApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl DeliveryTransport for TelegramBotTransport {
    async fn send_interactive(
        &self,
        user: UserId,
        text: &str,
        actions: &[ActionButton],
    ) -> Result<MessageRef, DeliveryError> {
        // One button per row
        let keyboard: Vec<_> = actions
            .iter()
            .map(|button| {
                vec![json!({
                    "text": button.label,
                    "callback_data": button.action.data(),
                })]
            })
            .collect();

        let body = json!({
            "chat_id": user.0,
            "text": truncate_chars(text, MAX_MESSAGE_CHARS),
            "reply_markup": { "inline_keyboard": keyboard },
        });

        let message: Message = self.api.call("sendMessage", &body, None).await?;

        Ok(MessageRef {
            user: UserId(message.chat.id),
            message_id: message.message_id,
        })
    }

    async fn retract(&self, message: &MessageRef) -> Result<(), DeliveryError> {
        let body = json!({
            "chat_id": message.user.0,
            "message_id": message.message_id,
        });
        let _: bool = self.api.call("deleteMessage", &body, None).await?;
        Ok(())
    }

    async fn acknowledge(&self, context: &ActionContext, text: &str) -> Result<(), DeliveryError> {
        let body = json!({
            "callback_query_id": context.callback_id,
            "text": text,
        });
        let _: bool = self.api.call("answerCallbackQuery", &body, None).await?;
        Ok(())
    }

    async fn reply(&self, user: UserId, text: &str) -> Result<(), DeliveryError> {
        let body = json!({
            "chat_id": user.0,
            "text": truncate_chars(text, MAX_MESSAGE_CHARS),
        });
        let _: Message = self.api.call("sendMessage", &body, None).await?;
        Ok(())
    }
}

/// Event source over `getUpdates` long polling
pub struct TelegramUpdates {
    api: TelegramBotApi,
    offset: AtomicI64,
    long_poll_timeout: Duration,
}

impl TelegramUpdates {
    pub fn new(api: TelegramBotApi, long_poll_timeout: Duration) -> Self {
        Self {
            api,
            offset: AtomicI64::new(0),
            long_poll_timeout,
        }
    }

    fn into_event(update: Update) -> Option<InboundEvent> {
        if let Some(query) = update.callback_query {
            let data = query.data?;
            let message = query.message.map(|m| MessageRef {
                user: UserId(m.chat.id),
                message_id: m.message_id,
            });
            let user = message.map(|m| m.user).unwrap_or(UserId(query.from.id));
            return Some(InboundEvent::Action {
                context: ActionContext {
                    user,
                    message,
                    callback_id: query.id,
                },
                data,
            });
        }

        let message = update.message?;
        Some(InboundEvent::Command {
            user: UserId(message.chat.id),
            text: message.text?,
        })
    }
}

#[async_trait]
impl EventSource for TelegramUpdates {
    async fn next_events(&self) -> Result<Vec<InboundEvent>, DeliveryError> {
        let body = json!({
            "offset": self.offset.load(Ordering::SeqCst),
            "timeout": self.long_poll_timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });

        // The HTTP timeout must outlive the server-side long poll
        let http_timeout = self.long_poll_timeout + Duration::from_secs(10);
        let updates: Vec<Update> = self
            .api
            .call("getUpdates", &body, Some(http_timeout))
            .await?;

        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.offset.store(last + 1, Ordering::SeqCst);
        }

        let events: Vec<_> = updates.into_iter().filter_map(Self::into_event).collect();
        tracing::debug!(count = events.len(), "Received updates");
        Ok(events)
    }
}
