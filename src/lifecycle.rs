//! Lifecycle state and signals of a configuration handle.
//!
//! # State Transitions
//! ```text
//! Unread → Read: read() installs a valid payload
//! Read → Read: read() again (manual or watcher-triggered reload)
//! Read → Unread: close()
//! ```
//!
//! Operations other than `read()` fail with a sequencing error while unread.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::ConfigError;
use crate::watcher::ReloadWatcher;

const SIGNAL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unread,
    Read,
}

/// Signals emitted by a configuration handle.
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// The watcher re-read the file after an external change.
    Reloaded,
    /// The payload was written to disk.
    Written,
    /// A background write or reload failed.
    Error(Arc<ConfigError>),
    /// The reload watcher started.
    WatcherArmed,
    /// The handle was closed.
    Closed,
}

/// Broadcast channel for [`ConfigEvent`]s.
pub struct Signals {
    tx: broadcast::Sender<ConfigEvent>,
}

impl Signals {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; dropped silently when nobody listens.
    pub fn emit(&self, event: ConfigEvent) {
        let _ = self.tx.send(event);
    }

    #[cfg(test)]
    fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Signals {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable lifecycle state guarded by the handle's lock.
pub(crate) struct Lifecycle {
    pub(crate) phase: Phase,
    pub(crate) watcher: Option<ReloadWatcher>,
    pub(crate) pruner: Option<JoinHandle<()>>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Unread,
            watcher: None,
            pruner: None,
        }
    }

    pub(crate) fn ensure_read(&self, operation: &'static str) -> Result<(), ConfigError> {
        match self.phase {
            Phase::Read => Ok(()),
            Phase::Unread => Err(ConfigError::Sequencing(operation)),
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.watcher.is_some()
    }

    /// Move to `Unread`, stopping the pruner. The watcher is taken separately.
    pub(crate) fn reset(&mut self) {
        self.phase = Phase::Unread;
        if let Some(pruner) = self.pruner.take() {
            pruner.abort();
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        if let Some(pruner) = self.pruner.take() {
            pruner.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_read() {
        let mut lifecycle = Lifecycle::new();
        assert!(matches!(lifecycle.ensure_read("get a field"), Err(ConfigError::Sequencing("get a field"))));
        lifecycle.phase = Phase::Read;
        assert!(lifecycle.ensure_read("get a field").is_ok());
        assert!(!lifecycle.is_armed());
        lifecycle.reset();
        assert_eq!(lifecycle.phase, Phase::Unread);
    }

    #[test]
    fn test_signals_fan_out() {
        let signals = Signals::new();
        let mut a = signals.subscribe();
        let mut b = signals.subscribe();
        assert_eq!(signals.receiver_count(), 2);

        signals.emit(ConfigEvent::Written);
        assert!(matches!(a.try_recv(), Ok(ConfigEvent::Written)));
        assert!(matches!(b.try_recv(), Ok(ConfigEvent::Written)));

        drop(a);
        drop(b);
        signals.emit(ConfigEvent::Closed);
    }
}
