//! Poll loop use case - walks subscriptions, normalizes new posts, delivers them

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

use crate::{
    model::{
        ChannelOutcome, ChannelRef, ChannelResult, CycleReport, PostId, RawPost, SubscriptionRow,
        UserId,
    },
    normalize::Normalizer,
    ports::{DeliveryTransport, SourceError, SourceGateway, StoreError, SubscriptionStore},
    usecases::deliver::DeliveryController,
};

/// Configuration for the poll loop
#[derive(Debug, Clone)]
pub struct PollEngineConfig {
    /// Pause between successful cycles
    pub poll_interval: Duration,
    /// Pause after a cycle aborted by a store failure
    pub error_backoff: Duration,
    /// Maximum posts fetched per channel per cycle
    pub batch_limit: usize,
}

impl Default for PollEngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            error_backoff: Duration::from_secs(60),
            batch_limit: 5,
        }
    }
}

/// Errors that abort a whole cycle
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors confined to one channel
#[derive(Debug, thiserror::Error)]
enum ChannelError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// All subscribers of one channel as seen in a snapshot
#[derive(Debug, Clone)]
struct ChannelGroup {
    channel: ChannelRef,
    cursor: PostId,
    users: Vec<UserId>,
}

/// Polling engine
///
/// Single-flight by construction: one cycle visits every channel in turn,
/// then the loop sleeps. The store is the only state shared with the
/// command side.
pub struct PollEngine<St, G, T>
where
    St: SubscriptionStore + ?Sized,
    G: SourceGateway + ?Sized,
    T: DeliveryTransport + ?Sized,
{
    store: Arc<St>,
    gateway: Arc<G>,
    delivery: Arc<DeliveryController<T>>,
    normalizer: Arc<Normalizer>,
    config: PollEngineConfig,
}

impl<St, G, T> PollEngine<St, G, T>
where
    St: SubscriptionStore + ?Sized,
    G: SourceGateway + ?Sized,
    T: DeliveryTransport + ?Sized,
{
    pub fn new(
        store: Arc<St>,
        gateway: Arc<G>,
        delivery: Arc<DeliveryController<T>>,
        normalizer: Arc<Normalizer>,
        config: PollEngineConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            delivery,
            normalizer,
            config,
        }
    }

    pub fn config(&self) -> &PollEngineConfig {
        &self.config
    }

    /// Run one cycle over every subscribed channel
    pub async fn poll_once(&self) -> Result<CycleReport, PollError> {
        self.poll_cycle(None).await
    }

    /// Loop until shutdown is signalled (or its sender is dropped)
    ///
    /// A cycle in flight finishes the channel it is on before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.config.poll_interval.as_secs(),
            backoff_secs = self.config.error_backoff.as_secs(),
            batch_limit = self.config.batch_limit,
            "Poll loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.poll_cycle(Some(&shutdown)).await {
                Ok(report) => {
                    tracing::info!(
                        channels = report.channels.len(),
                        delivered = report.delivered(),
                        failed_channels = report.failed_channels(),
                        "Poll cycle complete"
                    );
                    if report.interrupted {
                        break;
                    }
                    self.config.poll_interval
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        retry_in_secs = self.config.error_backoff.as_secs(),
                        "Poll cycle aborted"
                    );
                    self.config.error_backoff
                }
            };

            tokio::select! {
                _ = sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Poll loop stopped");
    }

    async fn poll_cycle(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<CycleReport, PollError> {
        let rows = self.store.snapshot_all_subscriptions().await?;
        let groups = group_by_channel(rows);

        tracing::debug!(channels = groups.len(), "Starting poll cycle");

        let mut report = CycleReport::default();

        for group in groups {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                tracing::info!("Shutdown requested, ending cycle early");
                report.interrupted = true;
                break;
            }

            let result = match self.poll_channel(&group).await {
                Ok(result) => result,
                Err(ChannelError::Store(e)) if e.is_unavailable() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(
                        channel = %group.channel,
                        cursor = %group.cursor,
                        error = %e,
                        "Skipping channel this cycle"
                    );
                    ChannelResult::Failed {
                        error: e.to_string(),
                    }
                }
            };

            report.channels.push(ChannelOutcome {
                channel: group.channel,
                result,
            });
        }

        Ok(report)
    }

    /// Fetch, normalize and deliver one channel's new posts, then advance its cursor
    async fn poll_channel(&self, group: &ChannelGroup) -> Result<ChannelResult, ChannelError> {
        let handle = self.gateway.resolve_channel(&group.channel).await?;

        let mut posts = self
            .gateway
            .fetch_since(&handle, group.cursor, self.config.batch_limit)
            .await?;

        if posts.is_empty() {
            tracing::debug!(channel = %group.channel, "No new posts");
            return Ok(ChannelResult::NoNewPosts);
        }

        posts.sort_by_key(|post| post.id);
        let Some(candidate) = posts.last().map(|post| post.id) else {
            return Ok(ChannelResult::NoNewPosts);
        };

        tracing::info!(
            channel = %group.channel,
            count = posts.len(),
            cursor = %group.cursor,
            candidate = %candidate,
            "Fetched posts"
        );

        let mut delivered = 0;
        let mut dropped = 0;
        let mut failed_deliveries = 0;

        for post in &posts {
            if post.id <= group.cursor {
                continue;
            }

            let Some(item) = self.normalize_post(post) else {
                dropped += 1;
                continue;
            };

            let title = if post.channel_title.is_empty() {
                handle.title.as_str()
            } else {
                post.channel_title.as_str()
            };

            let results = join_all(
                group
                    .users
                    .iter()
                    .map(|&user| self.delivery.deliver(user, &item, title)),
            )
            .await;

            for (user, result) in group.users.iter().zip(results) {
                match result {
                    Ok(_) => delivered += 1,
                    Err(e) => {
                        failed_deliveries += 1;
                        tracing::warn!(
                            channel = %group.channel,
                            post_id = %post.id,
                            user = %user,
                            error = %e,
                            "Delivery failed"
                        );
                    }
                }
            }
        }

        if candidate <= group.cursor {
            tracing::warn!(
                channel = %group.channel,
                cursor = %group.cursor,
                candidate = %candidate,
                "Gateway returned only already-seen posts"
            );
            return Ok(ChannelResult::NoNewPosts);
        }

        self.store.advance_cursor(&group.channel, candidate).await?;

        tracing::info!(
            channel = %group.channel,
            from = %group.cursor,
            to = %candidate,
            delivered,
            dropped,
            failed_deliveries,
            "Advanced cursor"
        );

        Ok(ChannelResult::Advanced {
            from: group.cursor,
            to: candidate,
            delivered,
            dropped,
            failed_deliveries,
        })
    }

    fn normalize_post(&self, post: &RawPost) -> Option<crate::model::NormalizedItem> {
        let text = post.text.as_deref()?;
        let item = self.normalizer.normalize(text);
        if item.is_empty() {
            tracing::debug!(post_id = %post.id, "Post has no deliverable content");
            None
        } else {
            Some(item)
        }
    }
}

/// Group snapshot rows by channel, keeping first-seen channel order
fn group_by_channel(rows: Vec<SubscriptionRow>) -> Vec<ChannelGroup> {
    let mut groups: Vec<ChannelGroup> = Vec::new();
    let mut index: HashMap<ChannelRef, usize> = HashMap::new();

    for row in rows {
        match index.get(&row.channel) {
            Some(&i) => {
                let group = &mut groups[i];
                group.cursor = group.cursor.max(row.cursor);
                if !group.users.contains(&row.user) {
                    group.users.push(row.user);
                }
            }
            None => {
                index.insert(row.channel.clone(), groups.len());
                groups.push(ChannelGroup {
                    channel: row.channel,
                    cursor: row.cursor,
                    users: vec![row.user],
                });
            }
        }
    }

    groups
}
