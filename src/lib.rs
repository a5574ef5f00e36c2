//! Reactive configuration store.
//!
//! Loads a JSON or TOML file, validates it against a schema, hands out
//! copies and field subscriptions, persists mutations and optionally
//! reloads itself when the file changes on disk.
//!
//! # Architecture Overview
//!
//! ```text
//!   app.json / app.toml      app.schema.json
//!          │                        │
//!          ▼                        ▼
//!    ┌──────────┐           ┌──────────────┐
//!    │  codec   │           │    schema    │
//!    │ parse/ser│           │resolve/compile│
//!    └────┬─────┘           └──────┬───────┘
//!         │                        │
//!         ▼                        ▼
//!    ┌─────────────────────────────────────┐      ┌──────────────┐
//!    │           handle (lifecycle)         │─────▶│ subscription │──▶ consumers
//!    │   store: validate → install → notify │      │   registry   │
//!    └───────┬──────────────────▲──────────┘      └──────────────┘
//!            │                  │
//!            ▼                  │ debounced reload
//!      ┌──────────┐       ┌──────────┐
//!      │  writer  │──────▶│ watcher  │
//!      │ now/lazy │ file  │ (notify) │
//!      └──────────┘       └──────────┘
//! ```

pub mod codec;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod observability;
pub mod options;
pub mod path;
pub mod schema;
pub mod store;
pub mod subscription;
pub mod watcher;
pub mod writer;

pub use codec::Format;
pub use error::ConfigError;
pub use handle::ConfigHandle;
pub use lifecycle::ConfigEvent;
pub use options::ConfigOptions;
pub use path::FieldPath;
pub use schema::{ValidationError, ValidationErrors};
pub use subscription::{Emission, Subscription};
