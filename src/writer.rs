//! Persisting the payload to disk.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::codec::{self, Format};
use crate::error::ConfigError;
use crate::observability::metrics;

/// Serializes payloads into the configuration file.
///
/// Also tracks whether a lazy write is already queued so bursts of
/// mutations collapse into one write.
pub struct DiskWriter {
    path: PathBuf,
    format: Format,
    lazy_pending: AtomicBool,
}

impl DiskWriter {
    pub fn new(path: &Path, format: Format) -> Self {
        Self {
            path: path.to_path_buf(),
            format,
            lazy_pending: AtomicBool::new(false),
        }
    }

    /// Overwrite the file with `payload`.
    pub async fn write(&self, payload: &Value) -> Result<(), ConfigError> {
        let text = codec::serialize(payload, self.format)?;
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| ConfigError::io(&self.path, e))?;

        metrics::record_write(self.format);
        tracing::debug!(path = %self.path.display(), format = %self.format, "Configuration written");
        Ok(())
    }

    /// Claim the lazy-write slot. Returns `true` if the caller must schedule
    /// the write, `false` if one is already queued.
    pub fn claim_lazy(&self) -> bool {
        !self.lazy_pending.swap(true, Ordering::AcqRel)
    }

    /// Release the slot once the queued write starts.
    pub fn release_lazy(&self) {
        self.lazy_pending.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_json_and_toml() {
        let dir = tempfile::tempdir().unwrap();
        let payload = json!({ "name": "svc", "server": { "port": 8080 } });

        let json_path = dir.path().join("app.json");
        DiskWriter::new(&json_path, Format::Json).write(&payload).await.unwrap();
        let text = std::fs::read_to_string(&json_path).unwrap();
        assert!(text.contains("\n    \"name\": \"svc\""));
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), payload);

        let toml_path = dir.path().join("app.toml");
        DiskWriter::new(&toml_path, Format::Toml).write(&payload).await.unwrap();
        let text = std::fs::read_to_string(&toml_path).unwrap();
        assert_eq!(toml::from_str::<Value>(&text).unwrap(), payload);
    }

    #[tokio::test]
    async fn test_write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("app.json");
        let err = DiskWriter::new(&path, Format::Json)
            .write(&json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_lazy_slot_collapses_claims() {
        let writer = DiskWriter::new(Path::new("/tmp/unused.json"), Format::Json);
        assert!(writer.claim_lazy());
        assert!(!writer.claim_lazy());
        assert!(!writer.claim_lazy());
        writer.release_lazy();
        assert!(writer.claim_lazy());
    }
}
