//! Telegram adapters

mod bot;
mod preview;

pub use bot::{DEFAULT_API_BASE_URL, TelegramBotApi, TelegramBotTransport, TelegramUpdates};
pub use preview::{DEFAULT_PREVIEW_BASE_URL, TelegramPreviewSource};

use async_trait::async_trait;
use news_digest_domain::{
    ActionButton, ActionContext, ChannelHandle, ChannelRef, DeliveryError, DeliveryTransport,
    MessageRef, PostId, RawPost, SourceError, SourceGateway, UserId,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// Stub source gateway serving scripted posts
#[derive(Default)]
pub struct StubSourceGateway {
    channels: HashMap<String, (String, Vec<RawPost>)>,
}

impl StubSourceGateway {
    /// Create an empty stub; every channel resolves as not found
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a channel with its title and posts
    pub fn with_channel(mut self, name: &str, title: &str, posts: Vec<RawPost>) -> Self {
        self.channels
            .insert(name.to_string(), (title.to_string(), posts));
        self
    }
}

#[async_trait]
impl SourceGateway for StubSourceGateway {
    async fn resolve_channel(&self, channel: &ChannelRef) -> Result<ChannelHandle, SourceError> {
        let (title, _) = self
            .channels
            .get(channel.name())
            .ok_or_else(|| SourceError::NotFound(channel.name().to_string()))?;

        Ok(ChannelHandle {
            reference: channel.clone(),
            title: title.clone(),
        })
    }

    async fn fetch_since(
        &self,
        handle: &ChannelHandle,
        cursor: PostId,
        limit: usize,
    ) -> Result<Vec<RawPost>, SourceError> {
        let Some((_, posts)) = self.channels.get(handle.reference.name()) else {
            return Err(SourceError::NotFound(handle.reference.name().to_string()));
        };

        let mut posts: Vec<RawPost> = posts
            .iter()
            .filter(|post| post.id > cursor)
            .cloned()
            .collect();
        posts.sort_by_key(|post| post.id);
        posts.truncate(limit);
        Ok(posts)
    }
}

/// A message recorded by [`StubTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message: MessageRef,
    pub text: String,
    pub actions: Vec<ActionButton>,
}

/// Stub transport that records everything it is asked to do
#[derive(Default)]
pub struct StubTransport {
    sent: Mutex<Vec<SentMessage>>,
    retracted: Mutex<Vec<MessageRef>>,
    acknowledged: Mutex<Vec<(String, String)>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message sent so far, replies included
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn retracted(&self) -> Vec<MessageRef> {
        self.retracted.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// `(callback_id, text)` pairs
    pub fn acknowledged(&self) -> Vec<(String, String)> {
        self.acknowledged
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    fn record(
        &self,
        user: UserId,
        text: &str,
        actions: &[ActionButton],
    ) -> Result<MessageRef, DeliveryError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|e| DeliveryError::Api(e.to_string()))?;
        let message = MessageRef {
            user,
            message_id: sent.len() as i64 + 1,
        };
        sent.push(SentMessage {
            message,
            text: text.to_string(),
            actions: actions.to_vec(),
        });
        Ok(message)
    }
}

#[async_trait]
impl DeliveryTransport for StubTransport {
    async fn send_interactive(
        &self,
        user: UserId,
        text: &str,
        actions: &[ActionButton],
    ) -> Result<MessageRef, DeliveryError> {
        self.record(user, text, actions)
    }

    async fn retract(&self, message: &MessageRef) -> Result<(), DeliveryError> {
        self.retracted
            .lock()
            .map_err(|e| DeliveryError::Api(e.to_string()))?
            .push(*message);
        Ok(())
    }

    async fn acknowledge(&self, context: &ActionContext, text: &str) -> Result<(), DeliveryError> {
        self.acknowledged
            .lock()
            .map_err(|e| DeliveryError::Api(e.to_string()))?
            .push((context.callback_id.clone(), text.to_string()));
        Ok(())
    }

    async fn reply(&self, user: UserId, text: &str) -> Result<(), DeliveryError> {
        self.record(user, text, &[]).map(|_| ())
    }
}
