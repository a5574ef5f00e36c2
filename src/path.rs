//! Dotted field paths into a payload.
//!
//! `"server.tls.cert"` becomes the segments `["server", "tls", "cert"]`; the
//! empty string addresses the root. Numeric segments index into arrays.
//!
//! Reading an absent path yields `None`. Assigning requires every
//! intermediate segment to exist and be a container; only the leaf may be
//! created.

use serde_json::{Map, Value};
use std::fmt;

use crate::error::ConfigError;

/// An ordered sequence of path segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(path: &str) -> Self {
        if path.is_empty() {
            return Self::root();
        }
        Self {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Borrow the value at this path.
    pub fn lookup<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(root, |node, segment| child(node, segment))
    }

    /// Assign `value` at this path inside `root`.
    pub fn assign(&self, root: &mut Value, value: Value) -> Result<(), ConfigError> {
        let Some((leaf, parents)) = self.segments.split_last() else {
            *root = value;
            return Ok(());
        };

        let mut node = root;
        for (depth, segment) in parents.iter().enumerate() {
            node = child_mut(node, segment).ok_or_else(|| {
                ConfigError::Path(format!(
                    "\"{}\" does not exist or is not an object/array",
                    self.segments[..=depth].join(".")
                ))
            })?;
        }

        match node {
            Value::Object(map) => {
                map.insert(leaf.clone(), value);
                Ok(())
            }
            Value::Array(items) => {
                let index = leaf.parse::<usize>().ok().filter(|i| *i <= items.len()).ok_or_else(|| {
                    ConfigError::Path(format!("\"{self}\": \"{leaf}\" is not a valid array index"))
                })?;
                if index == items.len() {
                    items.push(value);
                } else {
                    items[index] = value;
                }
                Ok(())
            }
            _ => Err(ConfigError::Path(format!(
                "\"{self}\": parent of \"{leaf}\" is not an object/array"
            ))),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl From<String> for FieldPath {
    fn from(path: String) -> Self {
        Self::parse(&path)
    }
}

fn child<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn child_mut<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match node {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(move |i| items.get_mut(i)),
        _ => None,
    }
}

/// Summarise objects nested deeper than `depth` as their key lists.
///
/// Depth 0 on an object returns its keys; non-object values pass through.
pub fn limit_depth(value: Value, depth: usize) -> Value {
    match value {
        Value::Object(map) if depth == 0 => {
            Value::Array(map.into_iter().map(|(key, _)| Value::String(key)).collect())
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, nested)| (key, limit_depth(nested, depth - 1)))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_segments() {
        assert!(FieldPath::parse("").is_root());
        assert_eq!(FieldPath::parse("a.b.c").segments(), ["a", "b", "c"]);
        assert_eq!(FieldPath::parse("a.b").to_string(), "a.b");
    }

    #[test]
    fn test_lookup() {
        let doc = json!({ "a": { "b": [10, { "c": true }] } });
        assert_eq!(FieldPath::root().lookup(&doc), Some(&doc));
        assert_eq!(FieldPath::parse("a.b.0").lookup(&doc), Some(&json!(10)));
        assert_eq!(FieldPath::parse("a.b.1.c").lookup(&doc), Some(&json!(true)));
        assert_eq!(FieldPath::parse("a.x").lookup(&doc), None);
        assert_eq!(FieldPath::parse("a.b.9").lookup(&doc), None);
    }

    #[test]
    fn test_assign_creates_leaf_only() {
        let mut doc = json!({ "a": { "b": 1 } });
        FieldPath::parse("a.c").assign(&mut doc, json!("new")).unwrap();
        assert_eq!(doc, json!({ "a": { "b": 1, "c": "new" } }));

        let err = FieldPath::parse("x.y").assign(&mut doc, json!(1)).unwrap_err();
        assert!(matches!(err, ConfigError::Path(_)));

        let err = FieldPath::parse("a.b.z").assign(&mut doc, json!(1)).unwrap_err();
        assert!(matches!(err, ConfigError::Path(_)));
    }

    #[test]
    fn test_assign_array_index() {
        let mut doc = json!({ "list": [1, 2] });
        FieldPath::parse("list.0").assign(&mut doc, json!(9)).unwrap();
        FieldPath::parse("list.2").assign(&mut doc, json!(3)).unwrap();
        assert_eq!(doc, json!({ "list": [9, 2, 3] }));
        assert!(FieldPath::parse("list.7").assign(&mut doc, json!(0)).is_err());
    }

    #[test]
    fn test_assign_root_replaces() {
        let mut doc = json!({ "a": 1 });
        FieldPath::root().assign(&mut doc, json!({ "b": 2 })).unwrap();
        assert_eq!(doc, json!({ "b": 2 }));
    }

    #[test]
    fn test_limit_depth() {
        let doc = json!({ "a": { "b": { "c": 1 } }, "n": 5 });
        assert_eq!(limit_depth(doc.clone(), 0), json!(["a", "n"]));
        assert_eq!(limit_depth(doc.clone(), 1), json!({ "a": ["b"], "n": 5 }));
        assert_eq!(limit_depth(doc.clone(), 2), json!({ "a": { "b": ["c"] }, "n": 5 }));
        assert_eq!(limit_depth(json!(42), 0), json!(42));
    }
}
