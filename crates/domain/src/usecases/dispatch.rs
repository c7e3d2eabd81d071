//! Inbound event dispatch - routes commands and button presses

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Duration, sleep};

use crate::{
    model::InboundEvent,
    ports::{Clock, DeliveryError, DeliveryTransport, EventSource, SubscriptionStore},
    usecases::{commands::CommandHandler, deliver::DeliveryController},
};

/// Routes events from an [`EventSource`] to the command handler or the
/// delivery controller. Runs beside the poll loop; the store is the only
/// state the two share.
pub struct Dispatcher<E, St, T, Cl>
where
    E: EventSource + ?Sized,
    St: SubscriptionStore + ?Sized,
    T: DeliveryTransport + ?Sized,
    Cl: Clock + ?Sized,
{
    events: Arc<E>,
    commands: CommandHandler<St, Cl>,
    delivery: Arc<DeliveryController<T>>,
    error_backoff: Duration,
}

impl<E, St, T, Cl> Dispatcher<E, St, T, Cl>
where
    E: EventSource + ?Sized,
    St: SubscriptionStore + ?Sized,
    T: DeliveryTransport + ?Sized,
    Cl: Clock + ?Sized,
{
    pub fn new(
        events: Arc<E>,
        commands: CommandHandler<St, Cl>,
        delivery: Arc<DeliveryController<T>>,
    ) -> Self {
        Self {
            events,
            commands,
            delivery,
            error_backoff: Duration::from_secs(5),
        }
    }

    /// Pause after the event source fails
    pub fn with_error_backoff(mut self, error_backoff: Duration) -> Self {
        self.error_backoff = error_backoff;
        self
    }

    /// Wait for one batch of events and handle it; returns the batch size
    pub async fn dispatch_once(&self) -> Result<usize, DeliveryError> {
        let events = self.events.next_events().await?;
        let count = events.len();
        for event in events {
            self.handle_event(event).await;
        }
        Ok(count)
    }

    /// Handle a single event; failures are logged, never propagated
    pub async fn handle_event(&self, event: InboundEvent) {
        match event {
            InboundEvent::Command { user, text } => {
                let reply = self.commands.handle(user, &text).await;
                if let Err(e) = self.delivery.transport().reply(user, &reply).await {
                    tracing::warn!(user = %user, error = %e, "Failed to send command reply");
                }
            }
            InboundEvent::Action { context, data } => {
                if let Err(e) = self.delivery.on_action(&context, &data).await {
                    tracing::warn!(
                        user = %context.user,
                        data = %data,
                        error = %e,
                        "Failed to handle action"
                    );
                }
            }
        }
    }

    /// Loop until shutdown is signalled (or its sender is dropped)
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Dispatcher started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let result = tokio::select! {
                result = self.dispatch_once() => result,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            match result {
                Ok(0) => {}
                Ok(count) => tracing::debug!(count, "Dispatched events"),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_in_secs = self.error_backoff.as_secs(),
                        "Event source failed"
                    );
                    tokio::select! {
                        _ = sleep(self.error_backoff) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        tracing::info!("Dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ActionButton, ActionContext, ChannelRef, MessageRef, PostId, SubscriptionRow, UserId,
    };
    use crate::ports::{StoreError, SystemClock};
    use crate::usecases::deliver::DeliveryConfig;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use time::OffsetDateTime;

    #[derive(Default)]
    struct ScriptedEvents {
        batches: Mutex<VecDeque<Result<Vec<InboundEvent>, DeliveryError>>>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl EventSource for ScriptedEvents {
        async fn next_events(&self) -> Result<Vec<InboundEvent>, DeliveryError> {
            *self.calls.lock().unwrap() += 1;
            let next = self.batches.lock().unwrap().pop_front();
            match next {
                Some(batch) => batch,
                // Behave like an idle long poll
                None => {
                    sleep(Duration::from_secs(30)).await;
                    Ok(vec![])
                }
            }
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        subscriptions: Mutex<Vec<(UserId, ChannelRef)>>,
    }

    #[async_trait]
    impl SubscriptionStore for MemoryStore {
        async fn register_user(&self, _user: UserId, _at: OffsetDateTime) -> Result<(), StoreError> {
            Ok(())
        }

        async fn add_subscription(
            &self,
            user: UserId,
            channel: &ChannelRef,
        ) -> Result<(), StoreError> {
            self.subscriptions
                .lock()
                .unwrap()
                .push((user, channel.clone()));
            Ok(())
        }

        async fn remove_subscription(
            &self,
            _user: UserId,
            _channel: &ChannelRef,
        ) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn list_subscriptions(&self, user: UserId) -> Result<Vec<ChannelRef>, StoreError> {
            Ok(self
                .subscriptions
                .lock()
                .unwrap()
                .iter()
                .filter(|(u, _)| *u == user)
                .map(|(_, c)| c.clone())
                .collect())
        }

        async fn advance_cursor(
            &self,
            _channel: &ChannelRef,
            _cursor: PostId,
        ) -> Result<(), StoreError> {
            Ok(())
        }

        async fn snapshot_all_subscriptions(&self) -> Result<Vec<SubscriptionRow>, StoreError> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        replies: Mutex<Vec<(UserId, String)>>,
        retracted: Mutex<Vec<MessageRef>>,
    }

    #[async_trait]
    impl DeliveryTransport for RecordingTransport {
        async fn send_interactive(
            &self,
            user: UserId,
            _text: &str,
            _actions: &[ActionButton],
        ) -> Result<MessageRef, DeliveryError> {
            Ok(MessageRef {
                user,
                message_id: 1,
            })
        }

        async fn retract(&self, message: &MessageRef) -> Result<(), DeliveryError> {
            self.retracted.lock().unwrap().push(*message);
            Ok(())
        }

        async fn acknowledge(
            &self,
            _context: &ActionContext,
            _text: &str,
        ) -> Result<(), DeliveryError> {
            Ok(())
        }

        async fn reply(&self, user: UserId, text: &str) -> Result<(), DeliveryError> {
            self.replies.lock().unwrap().push((user, text.to_string()));
            Ok(())
        }
    }

    fn dispatcher(
        events: &Arc<ScriptedEvents>,
        store: &Arc<MemoryStore>,
        transport: &Arc<RecordingTransport>,
    ) -> Dispatcher<ScriptedEvents, MemoryStore, RecordingTransport, SystemClock> {
        Dispatcher::new(
            Arc::clone(events),
            CommandHandler::new(Arc::clone(store), Arc::new(SystemClock)),
            Arc::new(DeliveryController::new(
                Arc::clone(transport),
                DeliveryConfig::default(),
            )),
        )
    }

    #[tokio::test]
    async fn test_dispatch_routes_commands_and_actions() {
        let message = MessageRef {
            user: UserId(5),
            message_id: 12,
        };
        let events = Arc::new(ScriptedEvents::default());
        events.batches.lock().unwrap().push_back(Ok(vec![
            InboundEvent::Command {
                user: UserId(5),
                text: "/add https://t.me/daily".to_string(),
            },
            InboundEvent::Action {
                context: ActionContext {
                    user: UserId(5),
                    message: Some(message),
                    callback_id: "cb".to_string(),
                },
                data: "skip".to_string(),
            },
        ]));
        let store = Arc::new(MemoryStore::default());
        let transport = Arc::new(RecordingTransport::default());

        let count = dispatcher(&events, &store, &transport)
            .dispatch_once()
            .await
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(store.subscriptions.lock().unwrap().len(), 1);
        let replies = transport.replies.lock().unwrap();
        assert_eq!(replies[0].0, UserId(5));
        assert!(replies[0].1.contains("добавлен"));
        assert_eq!(transport.retracted.lock().unwrap().as_slice(), &[message]);
    }

    #[tokio::test]
    async fn test_dispatch_once_surfaces_source_error() {
        let events = Arc::new(ScriptedEvents::default());
        events
            .batches
            .lock()
            .unwrap()
            .push_back(Err(DeliveryError::Network("timeout".to_string())));
        let store = Arc::new(MemoryStore::default());
        let transport = Arc::new(RecordingTransport::default());

        let result = dispatcher(&events, &store, &transport).dispatch_once().await;
        assert!(matches!(result, Err(DeliveryError::Network(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_after_error_and_stops_on_shutdown() {
        let events = Arc::new(ScriptedEvents::default());
        {
            let mut batches = events.batches.lock().unwrap();
            batches.push_back(Err(DeliveryError::Network("timeout".to_string())));
            batches.push_back(Ok(vec![InboundEvent::Command {
                user: UserId(9),
                text: "/list".to_string(),
            }]));
        }
        let store = Arc::new(MemoryStore::default());
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = dispatcher(&events, &store, &transport);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { dispatcher.run(rx).await });

        sleep(Duration::from_secs(10)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let replies = transport.replies.lock().unwrap();
        assert_eq!(replies.as_slice(), &[(UserId(9), "📭 Нет добавленных каналов".to_string())]);
        // error, retried batch, then an idle poll cut short by shutdown
        assert_eq!(*events.calls.lock().unwrap(), 3);
    }
}
