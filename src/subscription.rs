//! Field-level change subscriptions.
//!
//! # Data Flow
//! ```text
//! subscribe(path)
//!     → current value queued first
//!     → registry keeps the sender
//!
//! successful install
//!     → notify_all(payload) → value at each subscriber's path
//!
//! close
//!     → complete_all() drops every sender (consumers see end-of-stream)
//! ```
//!
//! Subscriptions dropped by their consumer are pruned on an interval, so
//! the registry may briefly hold dead senders.

use dashmap::DashMap;
use futures_util::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::path::{limit_depth, FieldPath};

pub use tokio::sync::mpsc::error::TryRecvError;

/// Interval between sweeps for closed subscriptions.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(1);

/// Value delivered to a subscriber; `None` when the field is absent.
pub type Emission = Option<Value>;

struct Subscriber {
    path: FieldPath,
    depth: Option<usize>,
    tx: mpsc::UnboundedSender<Emission>,
}

impl Subscriber {
    fn value_in(&self, payload: &Value) -> Emission {
        let value = self.path.lookup(payload)?.clone();
        Some(match self.depth {
            Some(depth) => limit_depth(value, depth),
            None => value,
        })
    }
}

/// Active subscriptions keyed by id.
#[derive(Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    subscribers: DashMap<u64, Subscriber>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber whose first emission is `current`.
    pub fn subscribe(&self, path: FieldPath, depth: Option<usize>, current: Emission) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(current);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(
            id,
            Subscriber {
                path: path.clone(),
                depth,
                tx,
            },
        );
        metrics::record_subscriptions(self.subscribers.len());

        Subscription { path, rx }
    }

    /// Send every subscriber the value at its path in `payload`.
    pub fn notify_all(&self, payload: &Value) {
        for entry in self.subscribers.iter() {
            let subscriber = entry.value();
            let _ = subscriber.tx.send(subscriber.value_in(payload));
        }
    }

    /// End every subscription and empty the registry.
    pub fn complete_all(&self) -> usize {
        let completed = self.subscribers.len();
        self.subscribers.clear();
        metrics::record_subscriptions(0);
        completed
    }

    /// Drop subscribers whose consumer has gone away.
    pub fn prune(&self) -> usize {
        let before = self.subscribers.len();
        self.subscribers.retain(|_, subscriber| !subscriber.tx.is_closed());
        let after = self.subscribers.len();
        if after != before {
            metrics::record_subscriptions(after);
        }
        before - after
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// Sweep `registry` every `every` until it is dropped.
pub fn spawn_pruner(registry: Weak<SubscriptionRegistry>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(registry) = registry.upgrade() else {
                break;
            };
            let removed = registry.prune();
            if removed > 0 {
                tracing::debug!(removed, "Pruned closed subscriptions");
            }
        }
    })
}

/// Receiving end of a field subscription.
///
/// Yields the field's current value first, then a new value after every
/// successful payload replacement. Ends when the handle is closed.
pub struct Subscription {
    path: FieldPath,
    rx: mpsc::UnboundedReceiver<Emission>,
}

impl Subscription {
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    /// Wait for the next emission; `None` once the subscription completed.
    pub async fn recv(&mut self) -> Option<Emission> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Emission, TryRecvError> {
        self.rx.try_recv()
    }
}

impl Stream for Subscription {
    type Item = Emission;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use serde_json::json;

    #[test]
    fn test_first_emission_is_current_value() {
        let registry = SubscriptionRegistry::new();
        let mut sub = registry.subscribe(FieldPath::parse("a"), None, Some(json!(1)));
        assert_eq!(sub.try_recv().unwrap(), Some(json!(1)));
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_notify_all_delivers_per_path() {
        let registry = SubscriptionRegistry::new();
        let mut a = registry.subscribe(FieldPath::parse("a"), None, None);
        let mut nested = registry.subscribe(FieldPath::parse("n"), Some(0), None);
        let _ = a.try_recv();
        let _ = nested.try_recv();

        registry.notify_all(&json!({ "a": 5, "n": { "x": 1, "y": 2 } }));
        assert_eq!(a.try_recv().unwrap(), Some(json!(5)));
        assert_eq!(nested.try_recv().unwrap(), Some(json!(["x", "y"])));

        registry.notify_all(&json!({}));
        assert_eq!(a.try_recv().unwrap(), None);
    }

    #[test]
    fn test_complete_all_ends_streams() {
        let registry = SubscriptionRegistry::new();
        let mut sub = registry.subscribe(FieldPath::root(), None, Some(json!({})));
        assert_eq!(registry.complete_all(), 1);
        assert!(registry.is_empty());
        assert_eq!(sub.try_recv().unwrap(), Some(json!({})));
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[test]
    fn test_prune_removes_dropped() {
        let registry = SubscriptionRegistry::new();
        let kept = registry.subscribe(FieldPath::parse("a"), None, None);
        let dropped = registry.subscribe(FieldPath::parse("b"), None, None);
        drop(dropped);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.prune(), 1);
        assert_eq!(registry.len(), 1);
        drop(kept);
    }

    #[tokio::test]
    async fn test_stream_interface() {
        let registry = SubscriptionRegistry::new();
        let mut sub = registry.subscribe(FieldPath::parse("a"), None, Some(json!("x")));
        registry.notify_all(&json!({ "a": "y" }));
        registry.complete_all();

        let values: Vec<Emission> = (&mut sub).collect().await;
        assert_eq!(values, vec![Some(json!("x")), Some(json!("y"))]);
        assert_eq!(sub.path(), &FieldPath::parse("a"));
    }

    #[tokio::test]
    async fn test_pruner_sweeps_periodically() {
        let registry = std::sync::Arc::new(SubscriptionRegistry::new());
        drop(registry.subscribe(FieldPath::parse("gone"), None, None));
        let task = spawn_pruner(std::sync::Arc::downgrade(&registry), Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.is_empty());
        task.abort();
    }
}
