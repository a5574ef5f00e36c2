//! Schema compilation and payload validation.
//!
//! # Responsibilities
//! - Compile a schema document into a reusable validator
//! - Inject declared `default` values into absent properties
//! - Collect every violation with the instance path it occurred at
//!
//! # Supported keywords
//! `type`, `enum`, `const`, `allOf`, `anyOf`, `oneOf`, `not`, `minimum`,
//! `maximum`, `exclusiveMinimum`, `exclusiveMaximum`, `multipleOf`,
//! `minLength`, `maxLength`, `pattern`, `items`, `minItems`, `maxItems`,
//! `uniqueItems`, `properties`, `patternProperties`, `additionalProperties`,
//! `required`, `minProperties`, `maxProperties`, `dependencies`,
//! `dependentRequired`, `dependentSchemas`, `default`.
//!
//! Annotations (`title`, `description`, `format`, `$schema`, ...) are
//! ignored. Any other keyword fails compilation.
//!
//! Defaults are injected through `properties` and `allOf` only. Branches of
//! `anyOf`, `oneOf` and `not` are evaluated on a copy.

use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;

use crate::error::ConfigError;

const KEYWORDS: &[&str] = &[
    "type",
    "enum",
    "const",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "minLength",
    "maxLength",
    "pattern",
    "items",
    "minItems",
    "maxItems",
    "uniqueItems",
    "properties",
    "patternProperties",
    "additionalProperties",
    "required",
    "minProperties",
    "maxProperties",
    "dependencies",
    "dependentRequired",
    "dependentSchemas",
    "default",
];

const ANNOTATIONS: &[&str] = &[
    "$schema",
    "$id",
    "$comment",
    "$defs",
    "definitions",
    "title",
    "description",
    "examples",
    "format",
    "readOnly",
    "writeOnly",
    "deprecated",
    "contentMediaType",
    "contentEncoding",
];

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Instance path segments; empty for the document root.
    pub path: Vec<String>,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "top-level: {}", self.message)
        } else {
            write!(f, "property \"{}\": {}", self.path.join("."), self.message)
        }
    }
}

/// All violations found in one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for err in &self.0 {
            writeln!(f, "{err}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonType {
    Null,
    Boolean,
    Object,
    Array,
    Number,
    Integer,
    String,
}

impl JsonType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "null" => JsonType::Null,
            "boolean" => JsonType::Boolean,
            "object" => JsonType::Object,
            "array" => JsonType::Array,
            "number" => JsonType::Number,
            "integer" => JsonType::Integer,
            "string" => JsonType::String,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::String => "string",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (JsonType::Null, Value::Null)
            | (JsonType::Boolean, Value::Bool(_))
            | (JsonType::Object, Value::Object(_))
            | (JsonType::Array, Value::Array(_))
            | (JsonType::Number, Value::Number(_))
            | (JsonType::String, Value::String(_)) => true,
            (JsonType::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
enum Additional {
    Allow,
    Deny,
    Schema(Box<Node>),
}

/// One compiled (sub)schema.
#[derive(Debug, Clone)]
struct Node {
    reject_all: bool,
    types: Option<Vec<JsonType>>,
    default: Option<Value>,
    enum_values: Option<Vec<Value>>,
    constant: Option<Value>,
    all_of: Vec<Node>,
    any_of: Vec<Node>,
    one_of: Vec<Node>,
    not: Option<Box<Node>>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    exclusive_minimum: Option<f64>,
    exclusive_maximum: Option<f64>,
    multiple_of: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
    min_items: Option<usize>,
    max_items: Option<usize>,
    unique_items: bool,
    items: Option<Box<Node>>,
    properties: Vec<(String, Node)>,
    pattern_properties: Vec<(Regex, Node)>,
    required: Vec<String>,
    min_properties: Option<usize>,
    max_properties: Option<usize>,
    dependent_required: Vec<(String, Vec<String>)>,
    dependent_schemas: Vec<(String, Node)>,
    additional: Additional,
}

impl Node {
    fn accept_all() -> Self {
        Self {
            reject_all: false,
            types: None,
            default: None,
            enum_values: None,
            constant: None,
            all_of: Vec::new(),
            any_of: Vec::new(),
            one_of: Vec::new(),
            not: None,
            minimum: None,
            maximum: None,
            exclusive_minimum: None,
            exclusive_maximum: None,
            multiple_of: None,
            min_length: None,
            max_length: None,
            pattern: None,
            min_items: None,
            max_items: None,
            unique_items: false,
            items: None,
            properties: Vec::new(),
            pattern_properties: Vec::new(),
            required: Vec::new(),
            min_properties: None,
            max_properties: None,
            dependent_required: Vec::new(),
            dependent_schemas: Vec::new(),
            additional: Additional::Allow,
        }
    }

    fn compile(schema: &Value, at: &str) -> Result<Self, ConfigError> {
        let keywords = match schema {
            Value::Bool(true) => return Ok(Self::accept_all()),
            Value::Bool(false) => {
                return Ok(Self {
                    reject_all: true,
                    ..Self::accept_all()
                })
            }
            Value::Object(map) => map,
            _ => return Err(schema_error(at, "a schema must be an object or a boolean")),
        };

        if let Some(unknown) = keywords
            .keys()
            .find(|k| !KEYWORDS.contains(&k.as_str()) && !ANNOTATIONS.contains(&k.as_str()))
        {
            return Err(schema_error(at, &format!("unsupported keyword \"{unknown}\"")));
        }

        let mut node = Self::accept_all();
        node.default = keywords.get("default").cloned();
        node.constant = keywords.get("const").cloned();

        if let Some(types) = keywords.get("type") {
            node.types = Some(compile_types(types, at)?);
        }
        if let Some(values) = keywords.get("enum") {
            let values = values
                .as_array()
                .ok_or_else(|| schema_error(at, "\"enum\" must be an array"))?;
            node.enum_values = Some(values.clone());
        }

        node.minimum = number_keyword(keywords, "minimum", at)?;
        node.maximum = number_keyword(keywords, "maximum", at)?;
        node.exclusive_minimum = number_keyword(keywords, "exclusiveMinimum", at)?;
        node.exclusive_maximum = number_keyword(keywords, "exclusiveMaximum", at)?;
        node.multiple_of = number_keyword(keywords, "multipleOf", at)?;
        if node.multiple_of.is_some_and(|m| m <= 0.0) {
            return Err(schema_error(at, "\"multipleOf\" must be greater than 0"));
        }
        node.min_length = count_keyword(keywords, "minLength", at)?;
        node.max_length = count_keyword(keywords, "maxLength", at)?;
        node.min_items = count_keyword(keywords, "minItems", at)?;
        node.max_items = count_keyword(keywords, "maxItems", at)?;
        node.min_properties = count_keyword(keywords, "minProperties", at)?;
        node.max_properties = count_keyword(keywords, "maxProperties", at)?;
        if let Some(unique) = keywords.get("uniqueItems") {
            node.unique_items = unique
                .as_bool()
                .ok_or_else(|| schema_error(at, "\"uniqueItems\" must be a boolean"))?;
        }

        node.all_of = schema_list(keywords, "allOf", at)?;
        node.any_of = schema_list(keywords, "anyOf", at)?;
        node.one_of = schema_list(keywords, "oneOf", at)?;
        if let Some(not) = keywords.get("not") {
            node.not = Some(Box::new(Self::compile(not, &format!("{at}/not"))?));
        }

        if let Some(pattern) = keywords.get("pattern") {
            let pattern = pattern
                .as_str()
                .ok_or_else(|| schema_error(at, "\"pattern\" must be a string"))?;
            node.pattern = Some(compile_regex(pattern, at)?);
        }

        if let Some(items) = keywords.get("items") {
            node.items = Some(Box::new(Self::compile(items, &format!("{at}/items"))?));
        }

        if let Some(properties) = keywords.get("properties") {
            let properties = properties
                .as_object()
                .ok_or_else(|| schema_error(at, "\"properties\" must be an object"))?;
            for (name, sub) in properties {
                let sub = Self::compile(sub, &format!("{at}/properties/{name}"))?;
                node.properties.push((name.clone(), sub));
            }
        }

        if let Some(patterns) = keywords.get("patternProperties") {
            let patterns = patterns
                .as_object()
                .ok_or_else(|| schema_error(at, "\"patternProperties\" must be an object"))?;
            for (pattern, sub) in patterns {
                let regex = compile_regex(pattern, at)?;
                let sub = Self::compile(sub, &format!("{at}/patternProperties/{pattern}"))?;
                node.pattern_properties.push((regex, sub));
            }
        }

        if let Some(required) = keywords.get("required") {
            node.required = string_list(required)
                .ok_or_else(|| schema_error(at, "\"required\" must be an array of strings"))?;
        }

        for keyword in ["dependencies", "dependentRequired", "dependentSchemas"] {
            let Some(dependencies) = keywords.get(keyword) else {
                continue;
            };
            let dependencies = dependencies
                .as_object()
                .ok_or_else(|| schema_error(at, &format!("\"{keyword}\" must be an object")))?;
            for (name, dependency) in dependencies {
                match (keyword, dependency) {
                    ("dependencies" | "dependentRequired", Value::Array(_)) => {
                        let names = string_list(dependency).ok_or_else(|| {
                            schema_error(at, &format!("\"{keyword}/{name}\" must be an array of strings"))
                        })?;
                        node.dependent_required.push((name.clone(), names));
                    }
                    ("dependencies" | "dependentSchemas", _) => {
                        let sub = Self::compile(dependency, &format!("{at}/{keyword}/{name}"))?;
                        node.dependent_schemas.push((name.clone(), sub));
                    }
                    _ => {
                        return Err(schema_error(
                            at,
                            &format!("\"{keyword}/{name}\" must be an array of strings"),
                        ))
                    }
                }
            }
        }

        node.additional = match keywords.get("additionalProperties") {
            None | Some(Value::Bool(true)) => Additional::Allow,
            Some(Value::Bool(false)) => Additional::Deny,
            Some(sub) => Additional::Schema(Box::new(Self::compile(
                sub,
                &format!("{at}/additionalProperties"),
            )?)),
        };

        Ok(node)
    }

    fn check(&self, value: &mut Value, path: &mut Vec<String>, errors: &mut Vec<ValidationError>) {
        if self.reject_all {
            report(errors, path, "boolean schema is false".to_string());
            return;
        }

        if let Some(types) = &self.types {
            if !types.iter().any(|t| t.matches(value)) {
                let names: Vec<_> = types.iter().map(|t| t.name()).collect();
                report(errors, path, format!("must be {}", names.join(" or ")));
                return;
            }
        }

        if let Some(allowed) = &self.enum_values {
            if !allowed.contains(value) {
                report(errors, path, "must be equal to one of the allowed values".to_string());
            }
        }
        if let Some(constant) = &self.constant {
            if constant != value {
                report(errors, path, "must be equal to constant".to_string());
            }
        }

        for sub in &self.all_of {
            sub.check(value, path, errors);
        }
        if !self.any_of.is_empty() && !self.any_of.iter().any(|sub| sub.accepts(value, path)) {
            report(errors, path, "must match a schema in anyOf".to_string());
        }
        if !self.one_of.is_empty() {
            let matched = self.one_of.iter().filter(|sub| sub.accepts(value, path)).count();
            if matched != 1 {
                report(errors, path, "must match exactly one schema in oneOf".to_string());
            }
        }
        if self.not.as_ref().is_some_and(|sub| sub.accepts(value, path)) {
            report(errors, path, "must NOT be valid".to_string());
        }

        match value {
            Value::Number(n) => {
                let Some(n) = n.as_f64() else { return };
                if let Some(min) = self.minimum.filter(|min| n < *min) {
                    report(errors, path, format!("must be >= {min}"));
                }
                if let Some(max) = self.maximum.filter(|max| n > *max) {
                    report(errors, path, format!("must be <= {max}"));
                }
                if let Some(min) = self.exclusive_minimum.filter(|min| n <= *min) {
                    report(errors, path, format!("must be > {min}"));
                }
                if let Some(max) = self.exclusive_maximum.filter(|max| n >= *max) {
                    report(errors, path, format!("must be < {max}"));
                }
                if let Some(m) = self.multiple_of.filter(|m| !is_multiple(n, *m)) {
                    report(errors, path, format!("must be multiple of {m}"));
                }
            }
            Value::String(s) => {
                let len = s.chars().count();
                if let Some(min) = self.min_length.filter(|min| len < *min) {
                    report(errors, path, format!("must NOT have fewer than {min} characters"));
                }
                if let Some(max) = self.max_length.filter(|max| len > *max) {
                    report(errors, path, format!("must NOT have more than {max} characters"));
                }
                if let Some(pattern) = self.pattern.as_ref().filter(|p| !p.is_match(s)) {
                    report(errors, path, format!("must match pattern \"{}\"", pattern.as_str()));
                }
            }
            Value::Array(items) => {
                if let Some(min) = self.min_items.filter(|min| items.len() < *min) {
                    report(errors, path, format!("must NOT have fewer than {min} items"));
                }
                if let Some(max) = self.max_items.filter(|max| items.len() > *max) {
                    report(errors, path, format!("must NOT have more than {max} items"));
                }
                if self.unique_items {
                    if let Some((i, j)) = first_duplicate(items) {
                        report(
                            errors,
                            path,
                            format!("must NOT have duplicate items (items ## {j} and {i} are identical)"),
                        );
                    }
                }
                if let Some(item_schema) = &self.items {
                    for (index, item) in items.iter_mut().enumerate() {
                        path.push(index.to_string());
                        item_schema.check(item, path, errors);
                        path.pop();
                    }
                }
            }
            Value::Object(map) => self.check_object(map, path, errors),
            _ => {}
        }
    }

    fn check_object(
        &self,
        map: &mut Map<String, Value>,
        path: &mut Vec<String>,
        errors: &mut Vec<ValidationError>,
    ) {
        for (name, sub) in &self.properties {
            if let (false, Some(default)) = (map.contains_key(name), &sub.default) {
                map.insert(name.clone(), default.clone());
            }
        }

        for name in &self.required {
            if !map.contains_key(name) {
                errors.push(ValidationError {
                    path: path.clone(),
                    message: format!("must have required property '{name}'"),
                });
            }
        }

        if let Some(min) = self.min_properties.filter(|min| map.len() < *min) {
            report(errors, path, format!("must NOT have fewer than {min} properties"));
        }
        if let Some(max) = self.max_properties.filter(|max| map.len() > *max) {
            report(errors, path, format!("must NOT have more than {max} properties"));
        }

        for (trigger, needed) in &self.dependent_required {
            if !map.contains_key(trigger) {
                continue;
            }
            for name in needed.iter().filter(|name| !map.contains_key(*name)) {
                report(
                    errors,
                    path,
                    format!("must have property {name} when property {trigger} is present"),
                );
            }
        }

        for (key, nested) in map.iter_mut() {
            let mut schemas: Vec<&Node> = self
                .properties
                .iter()
                .filter(|(name, _)| name == key)
                .map(|(_, sub)| sub)
                .collect();
            schemas.extend(
                self.pattern_properties
                    .iter()
                    .filter(|(regex, _)| regex.is_match(key))
                    .map(|(_, sub)| sub),
            );

            if schemas.is_empty() {
                match &self.additional {
                    Additional::Allow => continue,
                    Additional::Deny => {
                        report(errors, path, format!("must NOT have additional property '{key}'"));
                        continue;
                    }
                    Additional::Schema(sub) => schemas.push(sub.as_ref()),
                }
            }

            path.push(key.clone());
            for schema in schemas {
                schema.check(nested, path, errors);
            }
            path.pop();
        }

        if self.dependent_schemas.is_empty() {
            return;
        }
        let present: Vec<&Node> = self
            .dependent_schemas
            .iter()
            .filter(|(trigger, _)| map.contains_key(trigger))
            .map(|(_, sub)| sub)
            .collect();
        if present.is_empty() {
            return;
        }
        let mut object = Value::Object(std::mem::take(map));
        for sub in present {
            sub.check(&mut object, path, errors);
        }
        if let Value::Object(checked) = object {
            *map = checked;
        }
    }

    /// Whether `value` passes this schema, leaving `value` untouched.
    fn accepts(&self, value: &Value, path: &mut Vec<String>) -> bool {
        let mut scratch = value.clone();
        let mut errors = Vec::new();
        self.check(&mut scratch, path, &mut errors);
        errors.is_empty()
    }
}

fn is_multiple(n: f64, m: f64) -> bool {
    let quotient = n / m;
    (quotient - quotient.round()).abs() < 1e-9
}

fn first_duplicate(items: &[Value]) -> Option<(usize, usize)> {
    (0..items.len()).find_map(|j| (0..j).find(|&i| items[i] == items[j]).map(|i| (i, j)))
}

fn report(errors: &mut Vec<ValidationError>, path: &[String], message: String) {
    errors.push(ValidationError {
        path: path.to_vec(),
        message,
    });
}

fn schema_error(at: &str, message: &str) -> ConfigError {
    let at = if at.is_empty() { "/" } else { at };
    ConfigError::Schema(format!("at {at}: {message}"))
}

fn compile_regex(pattern: &str, at: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| schema_error(at, &format!("pattern \"{pattern}\" does not compile: {e}")))
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|n| n.as_str().map(str::to_string))
        .collect()
}

fn schema_list(keywords: &Map<String, Value>, key: &str, at: &str) -> Result<Vec<Node>, ConfigError> {
    let Some(list) = keywords.get(key) else {
        return Ok(Vec::new());
    };
    let list = list
        .as_array()
        .filter(|list| !list.is_empty())
        .ok_or_else(|| schema_error(at, &format!("\"{key}\" must be a non-empty array")))?;
    list.iter()
        .enumerate()
        .map(|(index, sub)| Node::compile(sub, &format!("{at}/{key}/{index}")))
        .collect()
}

fn compile_types(types: &Value, at: &str) -> Result<Vec<JsonType>, ConfigError> {
    let names: Vec<&Value> = match types {
        Value::String(_) => vec![types],
        Value::Array(list) => list.iter().collect(),
        _ => return Err(schema_error(at, "\"type\" must be a string or an array")),
    };
    names
        .into_iter()
        .map(|name| {
            name.as_str()
                .and_then(JsonType::parse)
                .ok_or_else(|| schema_error(at, &format!("unknown type {name}")))
        })
        .collect()
}

fn number_keyword(keywords: &Map<String, Value>, key: &str, at: &str) -> Result<Option<f64>, ConfigError> {
    keywords
        .get(key)
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| schema_error(at, &format!("\"{key}\" must be a number")))
        })
        .transpose()
}

fn count_keyword(keywords: &Map<String, Value>, key: &str, at: &str) -> Result<Option<usize>, ConfigError> {
    keywords
        .get(key)
        .map(|v| {
            v.as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| schema_error(at, &format!("\"{key}\" must be a non-negative integer")))
        })
        .transpose()
}

/// A compiled schema.
#[derive(Debug, Clone)]
pub struct Validator {
    root: Node,
}

impl Validator {
    pub fn compile(schema: &Value) -> Result<Self, ConfigError> {
        Ok(Self {
            root: Node::compile(schema, "")?,
        })
    }

    /// Validate `value` in place, filling in schema defaults.
    ///
    /// On failure `value` may hold injected defaults; callers validate a
    /// scratch copy.
    pub fn validate(&self, value: &mut Value) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();
        self.root.check(value, &mut Vec::new(), &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }
}
