//! Outbox transport for dry runs: deliveries are appended to a JSONL file
//! instead of being sent to users.

use async_trait::async_trait;
use news_digest_domain::{
    ActionButton, ActionContext, DeliveryError, DeliveryTransport, MessageRef, UserId,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use time::OffsetDateTime;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct OutboxWriter {
    path: PathBuf,
    file: Arc<Mutex<tokio::fs::File>>,
}

impl OutboxWriter {
    pub async fn new(path: PathBuf) -> Result<Self, OutboxError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, entry: &OutboxEntry<'_>) -> Result<(), OutboxError> {
        let line = serde_json::to_string(entry)?;
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum OutboxEntry<'a> {
    Delivery {
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
        user: UserId,
        message_id: i64,
        text: &'a str,
        actions: Vec<&'a str>,
    },
    Reply {
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
        user: UserId,
        text: &'a str,
    },
    Retract {
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
        user: UserId,
        message_id: i64,
    },
    Acknowledge {
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
        user: UserId,
        callback_id: &'a str,
        text: &'a str,
    },
}

/// Delivery transport writing to an outbox file
#[derive(Debug)]
pub struct OutboxTransport {
    writer: OutboxWriter,
    next_message_id: AtomicI64,
}

impl OutboxTransport {
    pub fn new(writer: OutboxWriter) -> Self {
        Self {
            writer,
            next_message_id: AtomicI64::new(1),
        }
    }

    pub fn path(&self) -> &Path {
        self.writer.path()
    }

    async fn write(&self, entry: OutboxEntry<'_>) -> Result<(), DeliveryError> {
        self.writer
            .append(&entry)
            .await
            .map_err(|error| DeliveryError::Api(format!("Outbox write failed: {}", error)))
    }
}

#[async_trait]
impl DeliveryTransport for OutboxTransport {
    async fn send_interactive(
        &self,
        user: UserId,
        text: &str,
        actions: &[ActionButton],
    ) -> Result<MessageRef, DeliveryError> {
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);

        self.write(OutboxEntry::Delivery {
            at: OffsetDateTime::now_utc(),
            user,
            message_id,
            text,
            actions: actions.iter().map(|a| a.action.data()).collect(),
        })
        .await?;

        Ok(MessageRef { user, message_id })
    }

    async fn retract(&self, message: &MessageRef) -> Result<(), DeliveryError> {
        self.write(OutboxEntry::Retract {
            at: OffsetDateTime::now_utc(),
            user: message.user,
            message_id: message.message_id,
        })
        .await
    }

    async fn acknowledge(&self, context: &ActionContext, text: &str) -> Result<(), DeliveryError> {
        self.write(OutboxEntry::Acknowledge {
            at: OffsetDateTime::now_utc(),
            user: context.user,
            callback_id: &context.callback_id,
            text,
        })
        .await
    }

    async fn reply(&self, user: UserId, text: &str) -> Result<(), DeliveryError> {
        self.write(OutboxEntry::Reply {
            at: OffsetDateTime::now_utc(),
            user,
            text,
        })
        .await
    }

    async fn close(&self) {
        let mut file = self.writer.file.lock().await;
        if let Err(e) = file.sync_all().await {
            tracing::warn!(path = %self.writer.path.display(), error = %e, "Failed to sync outbox");
        }
    }
}
