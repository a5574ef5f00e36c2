//! Schema resolution and validation.
//!
//! # Data Flow
//! ```text
//! <name>.schema.json | default schema | permissive schema
//!     → resolver.rs (pick the first available document)
//!     → validator.rs (compile once per read/reload)
//!     → Validator::validate (defaults applied, all violations collected)
//! ```
//!
//! # Design Decisions
//! - A JSON-Schema-shaped subset; unknown keywords are ignored
//! - Compiled validators are replaced wholesale on reload, never patched
//! - Returns all validation errors, not just the first

pub mod resolver;
pub mod validator;

pub use resolver::{permissive_schema, resolve, SchemaSource};
pub use validator::{ValidationError, ValidationErrors, Validator};
