//! File format detection, parsing and serialization.
//!
//! # Data Flow
//! ```text
//! constructor path
//!     → ConfigFile::resolve (extension probe, schema path derivation)
//!
//! file text
//!     → parse (JSON | TOML) → Parsed { value, materialize }
//!
//! payload
//!     → serialize (4-space JSON | TOML) → file text
//! ```
//!
//! TOML documents pass through `toml::Value`. Datetimes surface in the
//! payload as their RFC 3339 text and are written back as TOML datetimes
//! when the string is exactly the canonical form of one.

use serde::Serialize;
use serde_json::{Map, Value};
use toml::value::Datetime;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Extension appended to extensionless paths when no `.toml` sibling exists.
pub const DEFAULT_EXTENSION: &str = "json";

/// Suffix of the schema file derived from the configuration file name.
pub const SCHEMA_SUFFIX: &str = ".schema.json";

const JSON_INDENT: &[u8] = b"    ";

/// On-disk format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

impl Format {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "json" => Some(Format::Json),
            "toml" => Some(Format::Toml),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => write!(f, "json"),
            Format::Toml => write!(f, "toml"),
        }
    }
}

/// Resolved locations and format of a configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    path: PathBuf,
    schema_path: PathBuf,
    format: Format,
}

impl ConfigFile {
    /// Resolve a caller-supplied path into an absolute config path, its
    /// schema path and its format.
    pub fn resolve(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = absolute(path.as_ref())?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::Argument(format!("{} has no file name", path.display())))?
            .to_string();
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_string);
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let schema_path = dir.join(format!("{stem}{SCHEMA_SUFFIX}"));

        // Dotfiles are taken verbatim.
        if stem.starts_with('.') {
            let format = match ext.as_deref() {
                Some("toml") => Format::Toml,
                _ => Format::Json,
            };
            return Ok(Self { path, schema_path, format });
        }

        let (path, format) = match ext.as_deref() {
            None => {
                let toml_sibling = with_appended_extension(&path, "toml");
                if toml_sibling.exists() {
                    (toml_sibling, Format::Toml)
                } else {
                    (with_appended_extension(&path, DEFAULT_EXTENSION), Format::Json)
                }
            }
            Some(ext) => {
                let format = Format::from_extension(ext)
                    .ok_or_else(|| ConfigError::UnsupportedExtension(path.clone()))?;
                (path, format)
            }
        };

        Ok(Self { path, schema_path, format })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema_path(&self) -> &Path {
        &self.schema_path
    }

    pub fn format(&self) -> Format {
        self.format
    }
}

fn absolute(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| ConfigError::io(path, e))?;
    Ok(cwd.join(path))
}

fn with_appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}

/// Result of parsing a configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub value: Value,
    /// The file held no content and should be rewritten with `value`.
    pub materialize: bool,
}

/// Parse file text in the given format.
pub fn parse(text: &str, format: Format) -> Result<Parsed, ConfigError> {
    let (value, materialize) = match format {
        Format::Json if text.trim().is_empty() => (Value::Object(Default::default()), true),
        Format::Json => (serde_json::from_str(text)?, false),
        Format::Toml => {
            let table: toml::Table = toml::from_str(text)?;
            (Value::Object(table_to_json(table)?), false)
        }
    };

    if !value.is_object() {
        return Err(ConfigError::Argument(format!(
            "{format} document root must be an object"
        )));
    }

    Ok(Parsed { value, materialize })
}

/// Serialize a payload for writing to disk.
pub fn serialize(value: &Value, format: Format) -> Result<String, ConfigError> {
    match format {
        Format::Json => {
            let mut buf = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(JSON_INDENT);
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
            value.serialize(&mut ser)?;
            Ok(String::from_utf8_lossy(&buf).into_owned())
        }
        Format::Toml => {
            let Value::Object(map) = value else {
                return Err(ConfigError::Argument("TOML document root must be an object".to_string()));
            };
            Ok(toml::to_string(&json_to_table(map, "")?)?)
        }
    }
}

fn table_to_json(table: toml::Table) -> Result<Map<String, Value>, ConfigError> {
    table
        .into_iter()
        .map(|(key, value)| Ok((key, toml_to_json(value)?)))
        .collect()
}

fn toml_to_json(value: toml::Value) -> Result<Value, ConfigError> {
    Ok(match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| ConfigError::Argument(format!("TOML float {f} has no JSON representation")))?,
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => {
            Value::Array(items.into_iter().map(toml_to_json).collect::<Result<_, _>>()?)
        }
        toml::Value::Table(table) => Value::Object(table_to_json(table)?),
    })
}

fn json_to_table(map: &Map<String, Value>, at: &str) -> Result<toml::Table, ConfigError> {
    map.iter()
        .map(|(key, value)| Ok((key.clone(), json_to_toml(value, &child(at, key))?)))
        .collect()
}

fn json_to_toml(value: &Value, at: &str) -> Result<toml::Value, ConfigError> {
    Ok(match value {
        Value::Null => {
            return Err(ConfigError::Argument(format!("TOML cannot represent null (at \"{at}\")")));
        }
        Value::Bool(b) => toml::Value::Boolean(*b),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => toml::Value::Integer(i),
            (None, Some(f)) if n.is_f64() => toml::Value::Float(f),
            _ => {
                return Err(ConfigError::Argument(format!("integer {n} is out of TOML range (at \"{at}\")")));
            }
        },
        Value::String(s) => match canonical_datetime(s) {
            Some(dt) => toml::Value::Datetime(dt),
            None => toml::Value::String(s.clone()),
        },
        Value::Array(items) => toml::Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(index, item)| json_to_toml(item, &child(at, &index.to_string())))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => toml::Value::Table(json_to_table(map, at)?),
    })
}

/// The datetime `s` spells, if `s` is its canonical rendering.
fn canonical_datetime(s: &str) -> Option<Datetime> {
    let dt: Datetime = s.parse().ok()?;
    (dt.to_string() == s).then_some(dt)
}

fn child(at: &str, key: &str) -> String {
    if at.is_empty() {
        key.to_string()
    } else {
        format!("{at}.{key}")
    }
}
