//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{
    ActionButton, ActionContext, ChannelHandle, ChannelRef, InboundEvent, MessageRef, PostId,
    RawPost, SubscriptionRow, UserId,
};

/// Default cap on concurrent subscriptions per user
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 10;

/// Error type for subscription store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Already subscribed to {0}")]
    DuplicateSubscription(ChannelRef),
    #[error("Subscription limit reached (max {max})")]
    QuotaExceeded { max: usize },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Cursor regression: current {current}, requested {requested}")]
    CursorRegression { current: PostId, requested: PostId },
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Whether the store itself is unavailable (as opposed to a per-row condition)
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Database(_))
    }
}

/// Port for the durable user → channel subscription mapping
///
/// Implementations must make `add_subscription` (duplicate check, cap check,
/// insert) and `advance_cursor` (monotonic check, update) atomic.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Record first contact with a user; no-op if already known
    async fn register_user(&self, user: UserId, at: OffsetDateTime) -> Result<(), StoreError>;

    /// Subscribe a user to a channel
    async fn add_subscription(&self, user: UserId, channel: &ChannelRef)
    -> Result<(), StoreError>;

    /// Unsubscribe; returns whether a subscription existed
    async fn remove_subscription(
        &self,
        user: UserId,
        channel: &ChannelRef,
    ) -> Result<bool, StoreError>;

    /// A user's channels in insertion order
    async fn list_subscriptions(&self, user: UserId) -> Result<Vec<ChannelRef>, StoreError>;

    /// Move a channel's cursor forward; lower values are rejected
    async fn advance_cursor(&self, channel: &ChannelRef, cursor: PostId)
    -> Result<(), StoreError>;

    /// Every subscription with its cursor, read at the start of a cycle
    async fn snapshot_all_subscriptions(&self) -> Result<Vec<SubscriptionRow>, StoreError>;
}

/// Error type for source gateway operations
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Channel not found: {0}")]
    NotFound(String),
    #[error("Rate limited, retry after: {0:?}")]
    RateLimited(Option<std::time::Duration>),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("API error: {0}")]
    Api(String),
}

/// Port for reading posts from external channels
#[async_trait]
pub trait SourceGateway: Send + Sync {
    /// Resolve a reference to a live handle; called once per channel per cycle
    async fn resolve_channel(&self, channel: &ChannelRef) -> Result<ChannelHandle, SourceError>;

    /// Posts with id greater than `cursor`, ascending, at most `limit`
    async fn fetch_since(
        &self,
        handle: &ChannelHandle,
        cursor: PostId,
        limit: usize,
    ) -> Result<Vec<RawPost>, SourceError>;

    /// Release any session held by the gateway
    async fn close(&self) {}
}

/// Error type for delivery transport operations
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Network error: {0}")]
    Network(String),
}

/// Port for talking to users
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    /// Send a message carrying interactive buttons
    async fn send_interactive(
        &self,
        user: UserId,
        text: &str,
        actions: &[ActionButton],
    ) -> Result<MessageRef, DeliveryError>;

    /// Remove a previously sent message from the user's view
    async fn retract(&self, message: &MessageRef) -> Result<(), DeliveryError>;

    /// Answer an interactive action with a short notice
    async fn acknowledge(&self, context: &ActionContext, text: &str) -> Result<(), DeliveryError>;

    /// Send a plain text message
    async fn reply(&self, user: UserId, text: &str) -> Result<(), DeliveryError>;

    /// Release any session held by the transport
    async fn close(&self) {}
}

/// Port for receiving user events (commands and button presses)
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Wait for the next batch of events; an empty batch is a normal timeout
    async fn next_events(&self) -> Result<Vec<InboundEvent>, DeliveryError>;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
