//! The reactive configuration handle.
//!
//! # Data Flow
//! ```text
//! read(default)
//!     → codec::parse (or default payload when the file is missing)
//!     → schema::resolve → Validator::compile
//!     → PayloadStore::install_with → SubscriptionRegistry::notify_all
//!     → write to disk if the file was missing/empty
//!     → arm the reload watcher (auto_reload)
//!
//! set(path, value) / set_payload(value)
//!     → PayloadStore::install → notify_all → lazy write (write_on_set)
//!
//! close()
//!     → disarm watcher → write → complete subscriptions → Unread
//! ```
//!
//! Validate-then-install always runs under the lifecycle lock without
//! awaiting, so reloads and in-process writes never interleave.

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

use crate::codec::{self, ConfigFile, Format};
use crate::error::ConfigError;
use crate::lifecycle::{ConfigEvent, Lifecycle, Phase, Signals};
use crate::observability::metrics;
use crate::options::ConfigOptions;
use crate::path::FieldPath;
use crate::schema::{self, Validator};
use crate::store::PayloadStore;
use crate::subscription::{self, Subscription, SubscriptionRegistry, PRUNE_INTERVAL};
use crate::watcher::{ReloadFn, ReloadWatcher};
use crate::writer::DiskWriter;

struct Inner {
    file: ConfigFile,
    options: ConfigOptions,
    store: PayloadStore,
    registry: Arc<SubscriptionRegistry>,
    writer: DiskWriter,
    lifecycle: Mutex<Lifecycle>,
    signals: Signals,
}

/// A configuration file loaded into memory, validated, observable and
/// optionally kept in sync with the disk.
///
/// Cloning is cheap; clones share the same state.
///
/// ```no_run
/// # async fn demo() -> Result<(), reactive_config::ConfigError> {
/// use reactive_config::{ConfigHandle, ConfigOptions};
/// use serde_json::json;
///
/// let config = ConfigHandle::new("./app.json", ConfigOptions {
///     create_on_no_entry: true,
///     auto_reload: true,
///     ..Default::default()
/// })?;
/// config.read(Some(json!({ "foo": "bar" }))).await?;
///
/// let mut foo = config.subscribe("foo", None)?;
/// while let Some(value) = foo.recv().await {
///     println!("foo = {value:?}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<Inner>,
}

impl ConfigHandle {
    /// Create an unread handle for the file at `path`.
    ///
    /// Fails when the extension is neither `.json` nor `.toml`, or when
    /// `options.default_schema` is not an object.
    pub fn new(path: impl AsRef<Path>, options: ConfigOptions) -> Result<Self, ConfigError> {
        options.check()?;
        let file = ConfigFile::resolve(path)?;
        let writer = DiskWriter::new(file.path(), file.format());

        Ok(Self {
            inner: Arc::new(Inner {
                file,
                options,
                store: PayloadStore::new(),
                registry: Arc::new(SubscriptionRegistry::new()),
                writer,
                lifecycle: Mutex::new(Lifecycle::new()),
                signals: Signals::new(),
            }),
        })
    }

    pub fn config_file(&self) -> &Path {
        self.inner.file.path()
    }

    pub fn schema_file(&self) -> &Path {
        self.inner.file.schema_path()
    }

    pub fn format(&self) -> Format {
        self.inner.file.format()
    }

    pub fn options(&self) -> &ConfigOptions {
        &self.inner.options
    }

    pub fn has_been_read(&self) -> bool {
        self.inner.lifecycle.lock().phase == Phase::Read
    }

    pub fn reload_armed(&self) -> bool {
        self.inner.lifecycle.lock().is_armed()
    }

    /// Receive lifecycle signals emitted from now on.
    pub fn events(&self) -> broadcast::Receiver<ConfigEvent> {
        self.inner.signals.subscribe()
    }

    /// Load, validate and install the file's content.
    ///
    /// When the file is missing and `create_on_no_entry` is set, the
    /// `default_payload` (or the currently held payload) is installed and
    /// written out. Calling `read` again re-reads the file.
    pub async fn read(&self, default_payload: Option<Value>) -> Result<(), ConfigError> {
        if default_payload.as_ref().is_some_and(|p| !p.is_object()) {
            return Err(ConfigError::Argument(
                "default payload must be a JSON object".to_string(),
            ));
        }

        let (candidate, materialize) = self.load_candidate(default_payload).await?;
        let (schema, source) =
            schema::resolve(self.schema_file(), self.inner.options.default_schema.as_ref()).await?;
        let validator = Validator::compile(&schema)?;
        tracing::debug!(schema = ?source, path = %self.schema_file().display(), "Schema resolved");

        self.commit(validator, candidate)?;
        tracing::info!(path = %self.config_file().display(), format = %self.format(), "Configuration loaded");

        if materialize {
            self.persist().await?;
        }
        self.setup_auto_reload()?;
        Ok(())
    }

    async fn load_candidate(&self, default_payload: Option<Value>) -> Result<(Value, bool), ConfigError> {
        let path = self.config_file();
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let parsed = codec::parse(&text, self.format())?;
                Ok((parsed.value, parsed.materialize))
            }
            Err(e) if e.kind() == ErrorKind::NotFound && self.inner.options.create_on_no_entry => {
                tracing::info!(path = %path.display(), "Configuration file missing, using default payload");
                let payload = match default_payload {
                    Some(payload) => payload,
                    None => Value::clone(&self.inner.store.snapshot()),
                };
                Ok((payload, true))
            }
            Err(e) => Err(ConfigError::io(path, e)),
        }
    }

    fn commit(&self, validator: Validator, candidate: Value) -> Result<(), ConfigError> {
        let mut lifecycle = self.inner.lifecycle.lock();
        let installed = self.inner.store.install_with(validator, &candidate)?;

        if lifecycle.phase == Phase::Unread {
            let registry = Arc::downgrade(&self.inner.registry);
            lifecycle.pruner = Some(subscription::spawn_pruner(registry, PRUNE_INTERVAL));
        }
        lifecycle.phase = Phase::Read;
        self.inner.registry.notify_all(&installed);
        Ok(())
    }

    /// Validate and install `candidate`, then notify subscribers.
    /// Caller holds the lifecycle lock.
    fn install_locked(&self, candidate: &Value) -> Result<(), ConfigError> {
        let installed = self.inner.store.install(candidate)?;
        self.inner.registry.notify_all(&installed);
        Ok(())
    }

    /// A deep copy of the value at `path` (`""` for the whole payload).
    ///
    /// With `depth`, objects nested deeper are replaced by their key lists.
    pub fn get(&self, path: impl Into<FieldPath>, depth: Option<usize>) -> Result<Option<Value>, ConfigError> {
        self.inner.lifecycle.lock().ensure_read("get a field")?;
        Ok(self.inner.store.get(&path.into(), depth))
    }

    /// A deep copy of the whole payload.
    pub fn payload(&self) -> Result<Value, ConfigError> {
        self.inner.lifecycle.lock().ensure_read("get the payload")?;
        Ok(Value::clone(&self.inner.store.snapshot()))
    }

    /// Replace the whole payload. It must pass the schema.
    pub fn set_payload(&self, payload: Value) -> Result<(), ConfigError> {
        let lifecycle = self.inner.lifecycle.lock();
        lifecycle.ensure_read("set the payload")?;
        self.install_locked(&payload)
    }

    /// Assign `value` at `path`. The resulting payload must pass the schema.
    ///
    /// With `write_on_set`, fails before touching the payload when no tokio
    /// runtime is available to schedule the write.
    pub fn set(&self, path: impl Into<FieldPath>, value: Value) -> Result<(), ConfigError> {
        let path = path.into();
        if self.inner.options.write_on_set {
            tokio::runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        }
        {
            let lifecycle = self.inner.lifecycle.lock();
            lifecycle.ensure_read("set a field")?;
            let next = self.inner.store.with_field(&path, value)?;
            self.install_locked(&next)?;
        }
        tracing::debug!(field = %path, "Field updated");

        if self.inner.options.write_on_set {
            self.write_lazy()?;
        }
        Ok(())
    }

    /// Observe the value at `path`: the current value first, then every
    /// value installed afterwards.
    pub fn subscribe(&self, path: impl Into<FieldPath>, depth: Option<usize>) -> Result<Subscription, ConfigError> {
        let path = path.into();
        let lifecycle = self.inner.lifecycle.lock();
        lifecycle.ensure_read("subscribe")?;
        let current = self.inner.store.get(&path, depth);
        Ok(self.inner.registry.subscribe(path, depth, current))
    }

    /// Write the payload to disk now.
    pub async fn write_now(&self) -> Result<(), ConfigError> {
        self.inner.lifecycle.lock().ensure_read("write")?;
        self.persist().await
    }

    /// Write the payload at the next scheduling opportunity.
    ///
    /// Calls made before that write starts share it. Failures are emitted
    /// as [`ConfigEvent::Error`].
    pub fn write_lazy(&self) -> Result<(), ConfigError> {
        self.inner.lifecycle.lock().ensure_read("write lazily")?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        if !self.inner.writer.claim_lazy() {
            return Ok(());
        }

        let weak = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            tokio::task::yield_now().await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let handle = ConfigHandle { inner };
            handle.inner.writer.release_lazy();
            if !handle.has_been_read() {
                tracing::debug!("Dropping lazy write scheduled before close");
                return;
            }
            if let Err(e) = handle.persist().await {
                tracing::warn!(error = %e, "Lazy write failed");
                handle.inner.signals.emit(ConfigEvent::Error(Arc::new(e)));
            }
        });
        Ok(())
    }

    async fn persist(&self) -> Result<(), ConfigError> {
        let snapshot = self.inner.store.snapshot();
        self.inner.writer.write(&snapshot).await?;
        self.inner.signals.emit(ConfigEvent::Written);
        Ok(())
    }

    /// Start the reload watcher if `auto_reload` is set.
    ///
    /// Returns `false` when auto-reload is disabled or already armed.
    pub fn setup_auto_reload(&self) -> Result<bool, ConfigError> {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            lifecycle.ensure_read("arm the reload watcher")?;
            if !self.inner.options.auto_reload || lifecycle.is_armed() {
                return Ok(false);
            }
            let watcher = ReloadWatcher::arm(
                self.config_file(),
                self.inner.options.reload_delay(),
                reload_callback(Arc::downgrade(&self.inner)),
            )?;
            lifecycle.watcher = Some(watcher);
        }

        self.inner.signals.emit(ConfigEvent::WatcherArmed);
        Ok(true)
    }

    async fn reload(&self) {
        if !self.has_been_read() {
            tracing::debug!("Ignoring file change on a closed configuration");
            return;
        }
        match self.read(None).await {
            Ok(()) => {
                metrics::record_reload("ok");
                self.inner.signals.emit(ConfigEvent::Reloaded);
            }
            Err(e) => {
                metrics::record_reload("error");
                tracing::error!(error = %e, "Failed to reload config. Keeping current configuration.");
                self.inner.signals.emit(ConfigEvent::Error(Arc::new(e)));
            }
        }
    }

    /// Stop watching, write the payload, complete every subscription and
    /// return to the unread state.
    pub async fn close(&self) -> Result<(), ConfigError> {
        let watcher = {
            let mut lifecycle = self.inner.lifecycle.lock();
            lifecycle.ensure_read("close")?;
            lifecycle.watcher.take()
        };
        if let Some(watcher) = watcher {
            watcher.disarm();
        }

        self.persist().await?;

        let completed = {
            let mut lifecycle = self.inner.lifecycle.lock();
            lifecycle.reset();
            self.inner.registry.complete_all()
        };

        tracing::info!(path = %self.config_file().display(), subscriptions = completed, "Configuration closed");
        self.inner.signals.emit(ConfigEvent::Closed);
        Ok(())
    }
}

fn reload_callback(inner: Weak<Inner>) -> ReloadFn {
    Arc::new(move || -> BoxFuture<'static, ()> {
        let inner = inner.clone();
        Box::pin(async move {
            if let Some(inner) = inner.upgrade() {
                ConfigHandle { inner }.reload().await;
            }
        })
    })
}
