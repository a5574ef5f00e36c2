//! Locating the schema document for a configuration file.

use serde_json::{json, Value};
use std::io::ErrorKind;
use std::path::Path;

use crate::error::ConfigError;

/// Where the resolved schema came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSource {
    File,
    Default,
    Permissive,
}

/// Schema accepting any object.
pub fn permissive_schema() -> Value {
    json!({
        "title": "CONFIG",
        "additionalProperties": true
    })
}

/// Read the schema file, falling back when (and only when) it is missing.
pub async fn resolve(
    schema_path: &Path,
    default_schema: Option<&Value>,
) -> Result<(Value, SchemaSource), ConfigError> {
    match tokio::fs::read_to_string(schema_path).await {
        Ok(text) => Ok((serde_json::from_str(&text)?, SchemaSource::File)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(match default_schema {
            Some(schema) => (schema.clone(), SchemaSource::Default),
            None => (permissive_schema(), SchemaSource::Permissive),
        }),
        Err(e) => Err(ConfigError::io(schema_path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.schema.json");
        std::fs::write(&path, r#"{ "required": ["name"] }"#).unwrap();

        let default = json!({ "type": "object" });
        let (schema, source) = resolve(&path, Some(&default)).await.unwrap();
        assert_eq!(source, SchemaSource::File);
        assert_eq!(schema, json!({ "required": ["name"] }));
    }

    #[tokio::test]
    async fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.schema.json");

        let default = json!({ "type": "object" });
        let (schema, source) = resolve(&path, Some(&default)).await.unwrap();
        assert_eq!(source, SchemaSource::Default);
        assert_eq!(schema, default);

        let (schema, source) = resolve(&path, None).await.unwrap();
        assert_eq!(source, SchemaSource::Permissive);
        assert_eq!(schema, permissive_schema());
    }

    #[tokio::test]
    async fn test_malformed_schema_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.schema.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = resolve(&path, None).await.unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[tokio::test]
    async fn test_other_io_errors_are_fatal() {
        // A directory in place of the schema file cannot be read as text.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dir.schema.json");
        std::fs::create_dir(&path).unwrap();

        let err = resolve(&path, None).await.unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(!err.is_not_found());
    }
}
