//! Shared utilities for integration tests.

use reactive_config::ConfigEvent;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast;

/// Write `contents` to `name` inside `dir` and return the full path.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Parse a JSON file from disk.
#[allow(dead_code)]
pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

/// Wait until an event matching `pred` arrives, or fail after `within`.
#[allow(dead_code)]
pub async fn wait_for<F>(events: &mut broadcast::Receiver<ConfigEvent>, within: Duration, pred: F) -> ConfigEvent
where
    F: Fn(&ConfigEvent) -> bool,
{
    tokio::time::timeout(within, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for config event")
}

/// Count events matching `pred` received within `window`.
#[allow(dead_code)]
pub async fn count_events<F>(events: &mut broadcast::Receiver<ConfigEvent>, window: Duration, pred: F) -> usize
where
    F: Fn(&ConfigEvent) -> bool,
{
    let mut count = 0;
    let deadline = tokio::time::Instant::now() + window;
    while let Ok(Ok(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        if pred(&event) {
            count += 1;
        }
    }
    count
}
