//! Configuration file watcher for hot reload.
//!
//! # States
//! ```text
//! disarmed → armed: ReloadWatcher::arm
//! armed → disarmed: disarm() or drop
//! ```
//!
//! File events for the configuration file are debounced: the reload runs
//! once no further event arrived for the whole delay window. The `active`
//! flag is checked right before reloading, so a task that was already past
//! its timer when the watcher was disarmed does nothing.

use futures_util::future::BoxFuture;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ConfigError;

/// Callback invoked after a debounced change.
pub type ReloadFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// A watcher that triggers reloads when the configuration file changes.
pub struct ReloadWatcher {
    active: Arc<AtomicBool>,
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ReloadWatcher {
    /// Start watching `path`, calling `on_change` after `delay` of quiet.
    ///
    /// The parent directory is watched so that editors replacing the file
    /// (write to temp + rename) are still observed.
    pub fn arm(path: &Path, delay: Duration, on_change: ReloadFn) -> Result<Self, ConfigError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        let file_name = path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| ConfigError::Argument(format!("{} has no file name", path.display())))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if touches(&event, &file_name) {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        let active = Arc::new(AtomicBool::new(true));
        let task = runtime.spawn(debounce(rx, delay, active.clone(), on_change));

        tracing::info!(path = %path.display(), delay_ms = delay.as_millis() as u64, "Config watcher started");
        Ok(Self {
            active,
            _watcher: watcher,
            task,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop watching. A pending debounce never fires after this returns.
    pub fn disarm(self) {
        drop(self);
    }
}

impl Drop for ReloadWatcher {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.task.abort();
        tracing::debug!("Config watcher stopped");
    }
}

fn touches(event: &Event, file_name: &OsString) -> bool {
    (event.kind.is_modify() || event.kind.is_create())
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

async fn debounce(
    mut rx: mpsc::UnboundedReceiver<()>,
    delay: Duration,
    active: Arc<AtomicBool>,
    on_change: ReloadFn,
) {
    while rx.recv().await.is_some() {
        loop {
            match tokio::time::timeout(delay, rx.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        if !active.load(Ordering::SeqCst) {
            return;
        }
        tracing::info!("Config file change detected, reloading...");
        on_change().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_callback() -> (ReloadFn, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let callback: ReloadFn = Arc::new(move || -> BoxFuture<'static, ()> {
            let seen = seen.clone();
            Box::pin(async move {
                seen.fetch_add(1, Ordering::SeqCst);
            })
        });
        (callback, count)
    }

    #[tokio::test]
    async fn test_debounce_collapses_bursts() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (callback, count) = counting_callback();
        let active = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(debounce(rx, Duration::from_millis(50), active, callback));

        for _ in 0..5 {
            tx.send(()).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        task.abort();
    }

    #[tokio::test]
    async fn test_inactive_flag_suppresses_reload() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (callback, count) = counting_callback();
        let active = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(debounce(rx, Duration::from_millis(50), active.clone(), callback));

        tx.send(()).unwrap();
        active.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(task.is_finished());
    }

    #[tokio::test]
    async fn test_armed_watcher_sees_file_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        std::fs::write(&path, "{}").unwrap();

        let (callback, count) = counting_callback();
        let watcher = ReloadWatcher::arm(&path, Duration::from_millis(50), callback).unwrap();
        assert!(watcher.is_active());

        std::fs::write(dir.path().join("other.json"), "{}").unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        std::fs::write(&path, "{\"a\": 1}").unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        while count.load(Ordering::SeqCst) == 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(count.load(Ordering::SeqCst) >= 1);
        watcher.disarm();
    }

    #[test]
    fn test_arm_requires_runtime() {
        let (callback, _) = counting_callback();
        let err = ReloadWatcher::arm(Path::new("/tmp/app.json"), Duration::from_millis(10), callback)
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::NoRuntime));
    }
}
