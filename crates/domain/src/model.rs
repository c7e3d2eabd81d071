//! Domain models and value objects

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Opaque user identity (a Telegram chat id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External post identifier, strictly increasing per channel
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PostId(pub i64);

impl PostId {
    /// Cursor of a channel that has never been polled
    pub const ZERO: PostId = PostId(0);
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static CHANNEL_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?t\.me/(?:s/)?([A-Za-z0-9_]{1,64})/?$").expect("valid regex")
});

static CHANNEL_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@([A-Za-z0-9_]{1,64})$").expect("valid regex"));

static EMBEDDED_CHANNEL_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:https?://)?t\.me/(?:s/)?([A-Za-z0-9_]{1,64})\b").expect("valid regex")
});

/// Reference to an external channel, canonicalised to `https://t.me/<name>`
///
/// Telegram usernames are case-insensitive, so the name is stored lowercase.
///
/// Only the shape is validated here; whether the channel exists is decided
/// at poll time by the source gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelRef {
    name: String,
}

impl ChannelRef {
    /// Parse a standalone reference (`https://t.me/name`, `t.me/name` or `@name`)
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let captures = CHANNEL_URL
            .captures(trimmed)
            .or_else(|| CHANNEL_MENTION.captures(trimmed))
            .ok_or_else(|| ValidationError::MalformedChannelRef(trimmed.to_string()))?;

        Ok(Self {
            name: captures[1].to_ascii_lowercase(),
        })
    }

    /// Find the first channel URL embedded in free text (e.g. command arguments)
    pub fn find_in(text: &str) -> Result<Self, ValidationError> {
        EMBEDDED_CHANNEL_URL
            .captures(text)
            .map(|captures| Self {
                name: captures[1].to_ascii_lowercase(),
            })
            .ok_or_else(|| ValidationError::MalformedChannelRef(text.trim().to_string()))
    }

    /// Channel username without the URL prefix
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical URL form
    pub fn url(&self) -> String {
        format!("https://t.me/{}", self.name)
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "https://t.me/{}", self.name)
    }
}

impl TryFrom<String> for ChannelRef {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChannelRef> for String {
    fn from(value: ChannelRef) -> Self {
        value.url()
    }
}

/// Rejected user input; surfaced to the caller, never retried
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Malformed channel reference: {0:?}")]
    MalformedChannelRef(String),
}

/// One row of the subscription table as seen by the polling engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRow {
    pub channel: ChannelRef,
    pub user: UserId,
    pub cursor: PostId,
}

/// A channel resolved to a live source handle for the current cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub reference: ChannelRef,
    /// Display title of the channel
    pub title: String,
}

/// A post fetched from a channel; never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPost {
    pub id: PostId,
    /// Text payload; media-only posts have none
    pub text: Option<String>,
    pub channel_title: String,
}

/// Normalized post text; empty means "nothing worth delivering"
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub text: String,
}

impl NormalizedItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// The two actions attached to every delivered item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryAction {
    Accept,
    Skip,
}

impl DeliveryAction {
    pub const ALL: [DeliveryAction; 2] = [DeliveryAction::Accept, DeliveryAction::Skip];

    /// Payload carried by the interactive button
    pub fn data(self) -> &'static str {
        match self {
            DeliveryAction::Accept => "publish",
            DeliveryAction::Skip => "skip",
        }
    }

    /// Parse a button payload; unknown payloads yield `None`
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "publish" => Some(DeliveryAction::Accept),
            "skip" => Some(DeliveryAction::Skip),
            _ => None,
        }
    }
}

/// An interactive button as handed to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
    pub label: String,
    pub action: DeliveryAction,
}

/// Reference to a message sent to a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub user: UserId,
    pub message_id: i64,
}

/// A normalized item sent to one user, awaiting accept/skip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
    pub recipient: UserId,
    pub text: String,
    pub source_title: String,
    pub message: MessageRef,
    pub actions: Vec<ActionButton>,
}

/// Context an interactive action arrives with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
    pub user: UserId,
    /// The message the pressed button belongs to, when the transport knows it
    pub message: Option<MessageRef>,
    /// Transport-specific id used to acknowledge the action
    pub callback_id: String,
}

/// An event received from users through the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A text message (commands start with `/`)
    Command { user: UserId, text: String },
    /// A button press on a delivered item
    Action { context: ActionContext, data: String },
}

/// Result of processing one channel within a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelResult {
    /// Batch scanned and cursor moved forward
    Advanced {
        from: PostId,
        to: PostId,
        delivered: usize,
        dropped: usize,
        failed_deliveries: usize,
    },
    /// Gateway returned nothing newer than the cursor
    NoNewPosts,
    /// Channel skipped this cycle; cursor untouched
    Failed { error: String },
}

/// Per-channel outcome within a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOutcome {
    pub channel: ChannelRef,
    pub result: ChannelResult,
}

/// Summary of one polling cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub channels: Vec<ChannelOutcome>,
    /// Set when shutdown was requested before every channel was visited
    pub interrupted: bool,
}

impl CycleReport {
    /// Total delivery requests successfully sent this cycle
    pub fn delivered(&self) -> usize {
        self.channels
            .iter()
            .map(|outcome| match outcome.result {
                ChannelResult::Advanced { delivered, .. } => delivered,
                _ => 0,
            })
            .sum()
    }

    pub fn failed_channels(&self) -> usize {
        self.channels
            .iter()
            .filter(|outcome| matches!(outcome.result, ChannelResult::Failed { .. }))
            .count()
    }

    /// Outcome for a given channel, if it was visited
    pub fn outcome(&self, channel: &ChannelRef) -> Option<&ChannelResult> {
        self.channels
            .iter()
            .find(|outcome| &outcome.channel == channel)
            .map(|outcome| &outcome.result)
    }
}
