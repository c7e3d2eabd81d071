//! In-memory subscription store for testing and offline mode

use async_trait::async_trait;
use news_digest_domain::{
    ChannelRef, DEFAULT_MAX_SUBSCRIPTIONS, PostId, StoreError, SubscriptionRow,
    SubscriptionStore, UserId,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, OffsetDateTime>,
    /// Insertion-ordered rows
    subscriptions: Vec<SubscriptionRow>,
}

/// In-memory subscription store implementation
///
/// Each operation is a single critical section; the lock is never held
/// across an await point.
pub struct InMemorySubscriptionStore {
    inner: Mutex<Inner>,
    max_subscriptions: usize,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
        }
    }

    pub fn with_max_subscriptions(mut self, max: usize) -> Self {
        self.max_subscriptions = max;
        self
    }

    /// When a user first made contact, if ever
    pub fn user_registered_at(&self, user: UserId) -> Option<OffsetDateTime> {
        self.lock().ok()?.users.get(&user).copied()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl Default for InMemorySubscriptionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn register_user(&self, user: UserId, at: OffsetDateTime) -> Result<(), StoreError> {
        self.lock()?.users.entry(user).or_insert(at);
        Ok(())
    }

    async fn add_subscription(&self, user: UserId, channel: &ChannelRef) -> Result<(), StoreError> {
        let mut inner = self.lock()?;

        if inner
            .subscriptions
            .iter()
            .any(|row| row.user == user && &row.channel == channel)
        {
            return Err(StoreError::DuplicateSubscription(channel.clone()));
        }

        let held = inner
            .subscriptions
            .iter()
            .filter(|row| row.user == user)
            .count();
        if held >= self.max_subscriptions {
            return Err(StoreError::QuotaExceeded {
                max: self.max_subscriptions,
            });
        }

        let cursor = inner
            .subscriptions
            .iter()
            .filter(|row| &row.channel == channel)
            .map(|row| row.cursor)
            .max()
            .unwrap_or(PostId::ZERO);

        inner.subscriptions.push(SubscriptionRow {
            channel: channel.clone(),
            user,
            cursor,
        });
        Ok(())
    }

    async fn remove_subscription(
        &self,
        user: UserId,
        channel: &ChannelRef,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let before = inner.subscriptions.len();
        inner
            .subscriptions
            .retain(|row| !(row.user == user && &row.channel == channel));
        Ok(inner.subscriptions.len() != before)
    }

    async fn list_subscriptions(&self, user: UserId) -> Result<Vec<ChannelRef>, StoreError> {
        Ok(self
            .lock()?
            .subscriptions
            .iter()
            .filter(|row| row.user == user)
            .map(|row| row.channel.clone())
            .collect())
    }

    async fn advance_cursor(&self, channel: &ChannelRef, cursor: PostId) -> Result<(), StoreError> {
        let mut inner = self.lock()?;

        let current = inner
            .subscriptions
            .iter()
            .filter(|row| &row.channel == channel)
            .map(|row| row.cursor)
            .max()
            .ok_or_else(|| StoreError::NotFound(channel.url()))?;

        if cursor < current {
            return Err(StoreError::CursorRegression {
                current,
                requested: cursor,
            });
        }

        for row in inner
            .subscriptions
            .iter_mut()
            .filter(|row| &row.channel == channel)
        {
            row.cursor = cursor;
        }
        Ok(())
    }

    async fn snapshot_all_subscriptions(&self) -> Result<Vec<SubscriptionRow>, StoreError> {
        Ok(self.lock()?.subscriptions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn channel(name: &str) -> ChannelRef {
        ChannelRef::parse(&format!("@{name}")).unwrap()
    }

    #[tokio::test]
    async fn test_add_list_remove() {
        let store = InMemorySubscriptionStore::new();

        store.add_subscription(UserId(1), &channel("a")).await.unwrap();
        store.add_subscription(UserId(1), &channel("b")).await.unwrap();

        assert_eq!(
            store.list_subscriptions(UserId(1)).await.unwrap(),
            vec![channel("a"), channel("b")]
        );
        assert!(store.remove_subscription(UserId(1), &channel("a")).await.unwrap());
        assert!(!store.remove_subscription(UserId(1), &channel("a")).await.unwrap());
        assert!(store.list_subscriptions(UserId(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let store = InMemorySubscriptionStore::new();
        store.add_subscription(UserId(1), &channel("a")).await.unwrap();

        let err = store
            .add_subscription(UserId(1), &channel("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSubscription(_)));
    }

    #[tokio::test]
    async fn test_quota_under_concurrent_adds() {
        let store = Arc::new(InMemorySubscriptionStore::new());

        let handles: Vec<_> = (0..25)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .add_subscription(UserId(1), &channel(&format!("c{i}")))
                        .await
                })
            })
            .collect();

        let mut rejected = 0;
        for handle in handles {
            if let Err(StoreError::QuotaExceeded { max }) = handle.await.unwrap() {
                assert_eq!(max, 10);
                rejected += 1;
            }
        }

        assert_eq!(rejected, 15);
        assert_eq!(store.list_subscriptions(UserId(1)).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_cursor_monotonic_and_shared() {
        let store = InMemorySubscriptionStore::new();
        store.add_subscription(UserId(1), &channel("a")).await.unwrap();
        store.add_subscription(UserId(2), &channel("a")).await.unwrap();

        store.advance_cursor(&channel("a"), PostId(10)).await.unwrap();
        let err = store
            .advance_cursor(&channel("a"), PostId(9))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CursorRegression { .. }));

        let rows = store.snapshot_all_subscriptions().await.unwrap();
        assert!(rows.iter().all(|row| row.cursor == PostId(10)));

        store.add_subscription(UserId(3), &channel("a")).await.unwrap();
        let rows = store.snapshot_all_subscriptions().await.unwrap();
        assert_eq!(rows[2].cursor, PostId(10));
    }

    #[tokio::test]
    async fn test_advance_unknown_channel() {
        let store = InMemorySubscriptionStore::new();
        let err = store
            .advance_cursor(&channel("ghost"), PostId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_register_keeps_first_contact() {
        let store = InMemorySubscriptionStore::new();
        let first = OffsetDateTime::UNIX_EPOCH;
        let later = OffsetDateTime::now_utc();

        store.register_user(UserId(1), first).await.unwrap();
        store.register_user(UserId(1), later).await.unwrap();

        assert_eq!(store.user_registered_at(UserId(1)), Some(first));
        assert_eq!(store.user_registered_at(UserId(2)), None);
    }
}
