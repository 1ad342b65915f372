use crate::models::{EventEnvelope, EventType};
use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

/// Topic-per-event-type publish/subscribe transport, addressed abstractly.
/// The broker itself is an external collaborator; the in-memory
/// implementation stands in for it in-process.
#[async_trait::async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, envelope: EventEnvelope) -> Result<()>;
    fn subscribe(&self) -> broadcast::Receiver<EventEnvelope>;
}

pub struct InMemoryBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl InMemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

#[async_trait::async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, envelope: EventEnvelope) -> Result<()> {
        info!(event = ?envelope.event_type, aggregate = %envelope.aggregate_id, "publishing event");
        // send fails only when nobody is subscribed; fire-and-forget
        let _ = self.sender.send(envelope);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }
}

pub type EventHandler =
    Arc<dyn Fn(EventEnvelope) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Handler registrations keyed by event type, driven by a single dispatch
/// loop reading from the bus. Delivery is fire-and-forget: a failing
/// handler is logged and the loop moves on.
pub struct EventDispatcher {
    bus: Arc<dyn MessageBus>,
    handlers: RwLock<HashMap<EventType, Vec<EventHandler>>>,
}

impl EventDispatcher {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus, handlers: RwLock::new(HashMap::new()) }
    }

    pub async fn register<F>(&self, event_type: EventType, handler: F)
    where
        F: Fn(EventEnvelope) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().await;
        handlers.entry(event_type).or_default().push(Arc::new(handler));
    }

    /// Dispatch loop. Runs until the bus is dropped; handler failures are
    /// logged and do not stop the loop.
    pub async fn run(&self) {
        let mut receiver = self.bus.subscribe();
        loop {
            match receiver.recv().await {
                Ok(envelope) => self.dispatch(envelope).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event dispatcher lagged behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("message bus closed, stopping dispatcher");
                    break;
                }
            }
        }
    }

    pub async fn dispatch(&self, envelope: EventEnvelope) {
        let handlers = {
            let registered = self.handlers.read().await;
            registered.get(&envelope.event_type).cloned().unwrap_or_default()
        };

        for handler in handlers {
            if let Err(e) = handler(envelope.clone()).await {
                error!(event = ?envelope.event_type, "event handler failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn dispatch_invokes_only_matching_handlers() {
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new(16));
        let dispatcher = EventDispatcher::new(bus);

        let hits = Arc::new(AtomicUsize::new(0));
        let counted = hits.clone();
        dispatcher
            .register(EventType::ModelTrainingStarted, move |_| {
                let counted = counted.clone();
                Box::pin(async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .await;

        dispatcher
            .dispatch(EventEnvelope::new(
                EventType::ModelTrainingStarted,
                "job-1",
                serde_json::Value::Null,
            ))
            .await;
        dispatcher
            .dispatch(EventEnvelope::new(
                EventType::ModelTrainingFailed,
                "job-1",
                serde_json::Value::Null,
            ))
            .await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bus_delivers_to_subscribers() {
        let bus = InMemoryBus::new(16);
        let mut receiver = bus.subscribe();
        bus.publish(EventEnvelope::new(
            EventType::UserViewedProduct,
            "user-1",
            serde_json::json!({"product_id": "p1"}),
        ))
        .await
        .unwrap();

        let envelope = receiver.recv().await.unwrap();
        assert_eq!(envelope.aggregate_id, "user-1");
        assert_eq!(envelope.event_type, EventType::UserViewedProduct);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fire_and_forget() {
        let bus = InMemoryBus::new(16);
        let result = bus
            .publish(EventEnvelope::new(
                EventType::UserSearchedProducts,
                "user-1",
                serde_json::Value::Null,
            ))
            .await;
        assert!(result.is_ok());
    }
}
