//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! store / writer / watcher / handle produce:
//!     → tracing events (structured fields, `path = %...`)
//!     → metrics.rs (counters, gauges via the `metrics` facade)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, env-filtered)
//!     → whatever metrics recorder the embedding application installs
//! ```

pub mod logging;
pub mod metrics;
