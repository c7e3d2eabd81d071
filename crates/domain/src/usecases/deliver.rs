//! Delivery use case - renders normalized items and handles accept/skip actions

use std::sync::Arc;

use crate::{
    model::{
        ActionButton, ActionContext, DeliveryAction, DeliveryRequest, NormalizedItem, UserId,
    },
    ports::{DeliveryError, DeliveryTransport},
};

/// Configuration for delivered messages
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// First line of every delivered message
    pub header: String,
    /// Line framing the normalized text
    pub separator: String,
    /// Prefix for the source channel title
    pub source_label: String,
    /// Button label for the accept action
    pub accept_label: String,
    /// Button label for the skip action
    pub skip_label: String,
    /// Notice shown when the user accepts an item
    pub accept_ack: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            header: "📰 [Обработанная новость]".to_string(),
            separator: "➖➖➖".to_string(),
            source_label: "Источник:".to_string(),
            accept_label: "✅ Опубликовать".to_string(),
            skip_label: "❌ Пропустить".to_string(),
            accept_ack: "Текст готов к использованию".to_string(),
        }
    }
}

/// What happened in response to a user action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Acknowledged,
    Retracted,
    Ignored,
}

/// Sends normalized items to users and resolves their actions
///
/// Deliveries are fire-and-forget: no state is kept between `deliver` and
/// `on_action`, everything needed arrives with the action context.
pub struct DeliveryController<T: DeliveryTransport + ?Sized> {
    transport: Arc<T>,
    config: DeliveryConfig,
}

impl<T: DeliveryTransport + ?Sized> DeliveryController<T> {
    pub fn new(transport: Arc<T>, config: DeliveryConfig) -> Self {
        Self { transport, config }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Message body for a normalized item
    pub fn render(&self, item: &NormalizedItem, source_title: &str) -> String {
        format!(
            "{header}\n{sep}\n{text}\n{sep}\n{label} {title}",
            header = self.config.header,
            sep = self.config.separator,
            text = item.text,
            label = self.config.source_label,
            title = source_title,
        )
    }

    /// Buttons attached to every delivery, accept first
    pub fn actions(&self) -> Vec<ActionButton> {
        DeliveryAction::ALL
            .iter()
            .map(|&action| ActionButton {
                label: match action {
                    DeliveryAction::Accept => self.config.accept_label.clone(),
                    DeliveryAction::Skip => self.config.skip_label.clone(),
                },
                action,
            })
            .collect()
    }

    /// Send one item to one user
    pub async fn deliver(
        &self,
        user: UserId,
        item: &NormalizedItem,
        source_title: &str,
    ) -> Result<DeliveryRequest, DeliveryError> {
        let text = self.render(item, source_title);
        let actions = self.actions();

        let message = self
            .transport
            .send_interactive(user, &text, &actions)
            .await?;

        tracing::debug!(
            user = %user,
            message_id = message.message_id,
            source = %source_title,
            "Delivered item"
        );

        Ok(DeliveryRequest {
            recipient: user,
            text,
            source_title: source_title.to_string(),
            message,
            actions,
        })
    }

    /// Resolve a button press; unknown payloads are logged and ignored
    pub async fn on_action(
        &self,
        context: &ActionContext,
        data: &str,
    ) -> Result<ActionOutcome, DeliveryError> {
        match DeliveryAction::parse(data) {
            Some(DeliveryAction::Accept) => {
                self.transport
                    .acknowledge(context, &self.config.accept_ack)
                    .await?;
                tracing::info!(user = %context.user, "Item accepted");
                Ok(ActionOutcome::Acknowledged)
            }
            Some(DeliveryAction::Skip) => {
                let Some(message) = context.message else {
                    tracing::warn!(user = %context.user, "Skip action without message reference");
                    return Ok(ActionOutcome::Ignored);
                };
                self.transport.retract(&message).await?;
                tracing::info!(
                    user = %context.user,
                    message_id = message.message_id,
                    "Item skipped"
                );
                Ok(ActionOutcome::Retracted)
            }
            None => {
                tracing::warn!(user = %context.user, data = %data, "Ignoring unknown action");
                Ok(ActionOutcome::Ignored)
            }
        }
    }
}
