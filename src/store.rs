//! Validated payload storage.
//!
//! The live payload sits behind an `ArcSwap` so readers take a snapshot
//! without locking; installs are serialized by the owning handle.

use arc_swap::{ArcSwap, ArcSwapOption};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::ConfigError;
use crate::observability::metrics;
use crate::path::{limit_depth, FieldPath};
use crate::schema::Validator;

/// Holds the current payload and the validator that gates it.
pub struct PayloadStore {
    current: ArcSwap<Value>,
    validator: ArcSwapOption<Validator>,
}

impl PayloadStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Value::Object(Map::new())),
            validator: ArcSwapOption::empty(),
        }
    }

    /// Current payload. Callers must clone before mutating.
    pub fn snapshot(&self) -> Arc<Value> {
        self.current.load_full()
    }

    /// Validate `candidate` with the current validator and install it.
    pub fn install(&self, candidate: &Value) -> Result<Arc<Value>, ConfigError> {
        let validator = self
            .validator
            .load_full()
            .ok_or(ConfigError::Sequencing("install a payload"))?;
        let installed = Self::validated(&validator, candidate)?;
        self.current.store(installed.clone());
        Ok(installed)
    }

    /// Install `candidate` under a freshly compiled validator.
    ///
    /// The validator is only kept when the candidate passes it.
    pub fn install_with(&self, validator: Validator, candidate: &Value) -> Result<Arc<Value>, ConfigError> {
        let installed = Self::validated(&validator, candidate)?;
        self.validator.store(Some(Arc::new(validator)));
        self.current.store(installed.clone());
        Ok(installed)
    }

    fn validated(validator: &Validator, candidate: &Value) -> Result<Arc<Value>, ConfigError> {
        if !candidate.is_object() {
            return Err(ConfigError::Argument("payload must be a JSON object".to_string()));
        }

        let mut scratch = candidate.clone();
        if let Err(errors) = validator.validate(&mut scratch) {
            metrics::record_validation_failure();
            tracing::debug!(errors = errors.len(), "Payload rejected by schema");
            return Err(errors.into());
        }
        Ok(Arc::new(scratch))
    }

    /// Deep copy of the value at `path`, optionally depth-limited.
    pub fn get(&self, path: &FieldPath, depth: Option<usize>) -> Option<Value> {
        let snapshot = self.current.load();
        let value = path.lookup(&snapshot)?.clone();
        Some(match depth {
            Some(depth) => limit_depth(value, depth),
            None => value,
        })
    }

    /// The payload that would result from assigning `value` at `path`.
    pub fn with_field(&self, path: &FieldPath, value: Value) -> Result<Value, ConfigError> {
        let mut next = Value::clone(&self.snapshot());
        path.assign(&mut next, value)?;
        Ok(next)
    }
}

impl Default for PayloadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with(schema: Value) -> PayloadStore {
        let store = PayloadStore::new();
        store
            .install_with(Validator::compile(&schema).unwrap(), &json!({}))
            .unwrap();
        store
    }

    #[test]
    fn test_install_requires_validator() {
        let store = PayloadStore::new();
        let err = store.install(&json!({ "a": 1 })).unwrap_err();
        assert!(matches!(err, ConfigError::Sequencing(_)));
    }

    #[test]
    fn test_rejected_install_leaves_payload() {
        let store = store_with(json!({ "properties": { "port": { "type": "integer" } } }));
        store.install(&json!({ "port": 80 })).unwrap();

        let err = store.install(&json!({ "port": "eighty" })).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(*store.snapshot(), json!({ "port": 80 }));

        let err = store.install(&json!("not an object")).unwrap_err();
        assert!(matches!(err, ConfigError::Argument(_)));
        assert_eq!(*store.snapshot(), json!({ "port": 80 }));
    }

    #[test]
    fn test_install_with_keeps_old_validator_on_failure() {
        let store = store_with(json!({}));
        store.install(&json!({ "name": 1 })).unwrap();

        let strict = Validator::compile(&json!({ "required": ["other"] })).unwrap();
        assert!(store.install_with(strict, &json!({ "name": 2 })).is_err());

        // Old permissive validator still in force.
        store.install(&json!({ "name": 3 })).unwrap();
        assert_eq!(store.get(&FieldPath::parse("name"), None), Some(json!(3)));
    }

    #[test]
    fn test_get_returns_copies() {
        let store = store_with(json!({}));
        store.install(&json!({ "a": { "b": { "c": 1 } } })).unwrap();

        let mut copy = store.get(&FieldPath::parse("a"), None).unwrap();
        copy["b"]["c"] = json!(99);
        assert_eq!(store.get(&FieldPath::parse("a.b.c"), None), Some(json!(1)));

        assert_eq!(store.get(&FieldPath::parse("a"), Some(0)), Some(json!(["b"])));
        assert_eq!(store.get(&FieldPath::parse("missing"), None), None);
    }

    #[test]
    fn test_with_field_does_not_touch_store() {
        let store = store_with(json!({}));
        store.install(&json!({ "a": 1 })).unwrap();
        let next = store.with_field(&FieldPath::parse("b"), json!(2)).unwrap();
        assert_eq!(next, json!({ "a": 1, "b": 2 }));
        assert_eq!(*store.snapshot(), json!({ "a": 1 }));
    }
}
