//! Append-only domain event journal and an in-memory pub/sub bus.
//!
//! The journal is the only place domain events live once an aggregate
//! transition emits them; the bus fans them out to subscribed handlers on
//! the same task that published them, so handlers must not block.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chimera_types::SessionId;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// ─── DomainEvent ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainEventKind {
    Started,
    BuildCompleted,
    Completed,
    Failed,
}

/// An event emitted by a Deployment aggregate transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    Started {
        aggregate_id: SessionId,
        occurred_at: DateTime<Utc>,
    },
    BuildCompleted {
        aggregate_id: SessionId,
        occurred_at: DateTime<Utc>,
        fingerprint: String,
    },
    Completed {
        aggregate_id: SessionId,
        occurred_at: DateTime<Utc>,
    },
    Failed {
        aggregate_id: SessionId,
        occurred_at: DateTime<Utc>,
        reason: String,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> DomainEventKind {
        match self {
            Self::Started { .. } => DomainEventKind::Started,
            Self::BuildCompleted { .. } => DomainEventKind::BuildCompleted,
            Self::Completed { .. } => DomainEventKind::Completed,
            Self::Failed { .. } => DomainEventKind::Failed,
        }
    }

    pub fn aggregate_id(&self) -> &SessionId {
        match self {
            Self::Started { aggregate_id, .. }
            | Self::BuildCompleted { aggregate_id, .. }
            | Self::Completed { aggregate_id, .. }
            | Self::Failed { aggregate_id, .. } => aggregate_id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::Started { occurred_at, .. }
            | Self::BuildCompleted { occurred_at, .. }
            | Self::Completed { occurred_at, .. }
            | Self::Failed { occurred_at, .. } => *occurred_at,
        }
    }
}

// ─── EventJournal ─────────────────────────────────────────────────────────────

/// Append-only, totally ordered record of every domain event published.
#[derive(Default)]
pub struct EventJournal {
    events: RwLock<Vec<DomainEvent>>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, events: &[DomainEvent]) {
        self.events.write().extend_from_slice(events);
    }

    pub fn all(&self) -> Vec<DomainEvent> {
        self.events.read().clone()
    }

    /// Events with `occurred_at >= since`, in append order.
    pub fn slice_since(&self, since: DateTime<Utc>) -> Vec<DomainEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.occurred_at() >= since)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── EventBus ─────────────────────────────────────────────────────────────────

/// A subscriber to published domain events. Implementations must not block
/// the publishing task for long; offload slow work to a spawned task.
pub trait EventHandler: Send + Sync {
    fn handle<'a>(&'a self, event: &'a DomainEvent) -> BoxFuture<'a, ()>;
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, events: Vec<DomainEvent>);
    fn subscribe(&self, kind: DomainEventKind, handler: Arc<dyn EventHandler>);
}

/// In-memory bus backed by an [`EventJournal`]; every published event is
/// appended to the journal before handlers run.
pub struct InMemoryEventBus {
    journal: EventJournal,
    handlers: RwLock<HashMap<DomainEventKind, Vec<Arc<dyn EventHandler>>>>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self {
            journal: EventJournal::new(),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, events: Vec<DomainEvent>) {
        self.journal.append(&events);
        for event in &events {
            let handlers = {
                let guard = self.handlers.read();
                guard.get(&event.kind()).cloned().unwrap_or_default()
            };
            for handler in handlers {
                handler.handle(event).await;
            }
        }
    }

    fn subscribe(&self, kind: DomainEventKind, handler: Arc<dyn EventHandler>) {
        self.handlers.write().entry(kind).or_default().push(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session() -> SessionId {
        SessionId::parse("sess-1").unwrap()
    }

    #[tokio::test]
    async fn publish_appends_to_journal() {
        let bus = InMemoryEventBus::new();
        bus.publish(vec![DomainEvent::Started {
            aggregate_id: session(),
            occurred_at: Utc::now(),
        }])
        .await;
        assert_eq!(bus.journal().len(), 1);
    }

    struct CountingHandler(Arc<AtomicUsize>);

    impl EventHandler for CountingHandler {
        fn handle<'a>(&'a self, _event: &'a DomainEvent) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                self.0.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test]
    async fn subscribers_are_notified_only_for_their_kind() {
        let bus = InMemoryEventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(DomainEventKind::Completed, Arc::new(CountingHandler(count.clone())));

        bus.publish(vec![DomainEvent::Started {
            aggregate_id: session(),
            occurred_at: Utc::now(),
        }])
        .await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        bus.publish(vec![DomainEvent::Completed {
            aggregate_id: session(),
            occurred_at: Utc::now(),
        }])
        .await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn slice_since_filters_by_time() {
        let journal = EventJournal::new();
        let cutoff = Utc::now();
        journal.append(&[DomainEvent::Completed {
            aggregate_id: session(),
            occurred_at: cutoff + chrono::Duration::seconds(1),
        }]);
        assert_eq!(journal.slice_since(cutoff).len(), 1);
        assert_eq!(journal.slice_since(cutoff + chrono::Duration::seconds(10)).len(), 0);
    }
}
