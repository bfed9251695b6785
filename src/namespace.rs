//! Composite identifier namespacing
//!
//! Every identifier crossing the gateway boundary carries the source that
//! owns it as a prefix (`source.localId`). Drivers only ever see the local
//! part; the router strips prefixes on the way in and re-applies them on
//! the way out.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Separator between the source token and the local identifier
pub const SEPARATOR: char = '.';

/// Identifier fields touched when no narrower set is requested
pub const DEFAULT_ID_FIELDS: &[&str] = &["id", "cat_username"];

/// Identifier fields in holds, ILL requests and hold details
pub const HOLD_ID_FIELDS: &[&str] = &["id", "item_id", "cat_username"];

/// Only the record identifier
pub const RECORD_ID_FIELDS: &[&str] = &["id"];

/// Course reserve listings key records by `BIB_ID`
pub const RESERVE_ID_FIELDS: &[&str] = &["BIB_ID"];

/// Extract the source from a composite identifier.
///
/// Returns an empty string when the identifier is unscoped.
pub fn parse_source(id: &str) -> &str {
    match id.find(SEPARATOR) {
        Some(pos) if pos > 0 => &id[..pos],
        _ => "",
    }
}

/// Extract the local part of a composite identifier.
///
/// An identifier without a source is assumed to be local already and is
/// returned unchanged.
pub fn parse_local(id: &str) -> &str {
    match id.find(SEPARATOR) {
        Some(pos) if pos > 0 => &id[pos + 1..],
        _ => {
            tracing::debug!("Could not find local id in '{}'", id);
            id
        }
    }
}

/// Scope a local value to `source`
pub fn add_prefix(value: &str, source: &str) -> String {
    format!("{}{}{}", source, SEPARATOR, value)
}

/// Remove the `source` prefix from `value`.
///
/// A prefix belonging to any other source is left alone.
pub fn strip_prefix<'a>(value: &'a str, source: &str) -> &'a str {
    if source.is_empty() {
        return value;
    }
    value
        .strip_prefix(source)
        .and_then(|rest| rest.strip_prefix(SEPARATOR))
        .unwrap_or(value)
}

/// Composite identifier as received from callers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopedId(String);

impl ScopedId {
    /// Build a composite identifier from its parts
    pub fn new(source: &str, local: &str) -> Self {
        if source.is_empty() {
            Self(local.to_string())
        } else {
            Self(add_prefix(local, source))
        }
    }

    pub fn source(&self) -> &str {
        parse_source(&self.0)
    }

    pub fn local(&self) -> &str {
        parse_local(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ScopedId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ScopedId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ScopedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shapes whose identifier fields can be moved between the composite and
/// the backend-local namespace
pub trait Namespaced {
    /// Prefix every identifier field listed in `fields` with `source`
    fn add_prefixes(&mut self, source: &str, fields: &[&str]);

    /// Strip the `source` prefix from every identifier field listed in
    /// `fields`, leaving the sub-structures named in `ignore` untouched
    fn strip_prefixes(&mut self, source: &str, fields: &[&str], ignore: &[&str]);
}

impl Namespaced for Value {
    fn add_prefixes(&mut self, source: &str, fields: &[&str]) {
        if source.is_empty() {
            return;
        }
        match self {
            Value::Object(map) => add_map_prefixes(map, source, fields),
            Value::Array(items) => add_list_prefixes(items, source, fields),
            // A bare scalar is not a field, so there is nothing to match
            _ => {}
        }
    }

    fn strip_prefixes(&mut self, source: &str, fields: &[&str], ignore: &[&str]) {
        if source.is_empty() {
            return;
        }
        match self {
            Value::String(value) => strip_string(value, source),
            Value::Object(map) => strip_map_prefixes(map, source, fields, ignore),
            Value::Array(items) => strip_list_prefixes(items, source, fields),
            _ => {}
        }
    }
}

impl<T: Namespaced> Namespaced for Vec<T> {
    fn add_prefixes(&mut self, source: &str, fields: &[&str]) {
        for item in self.iter_mut() {
            item.add_prefixes(source, fields);
        }
    }

    fn strip_prefixes(&mut self, source: &str, fields: &[&str], ignore: &[&str]) {
        for item in self.iter_mut() {
            item.strip_prefixes(source, fields, ignore);
        }
    }
}

impl<T: Namespaced> Namespaced for Option<T> {
    fn add_prefixes(&mut self, source: &str, fields: &[&str]) {
        if let Some(inner) = self {
            inner.add_prefixes(source, fields);
        }
    }

    fn strip_prefixes(&mut self, source: &str, fields: &[&str], ignore: &[&str]) {
        if let Some(inner) = self {
            inner.strip_prefixes(source, fields, ignore);
        }
    }
}

/// Prefix a typed identifier field if `name` is in `fields`
pub fn add_field(name: &str, value: &mut String, source: &str, fields: &[&str]) {
    if !source.is_empty() && !value.is_empty() && fields.contains(&name) {
        *value = add_prefix(value, source);
    }
}

/// Strip a typed identifier field if `name` is in `fields`
pub fn strip_field(name: &str, value: &mut String, source: &str, fields: &[&str]) {
    if fields.contains(&name) {
        strip_string(value, source);
    }
}

/// Prefix matching keys of a loosely typed map, recursing into nested values
pub fn add_map_prefixes(map: &mut Map<String, Value>, source: &str, fields: &[&str]) {
    if source.is_empty() {
        return;
    }
    for (key, value) in map.iter_mut() {
        match value {
            Value::Null => {}
            Value::Object(nested) => add_map_prefixes(nested, source, fields),
            Value::Array(items) => add_list_prefixes(items, source, fields),
            Value::String(text) => {
                if is_field_match(key, fields) && !text.is_empty() {
                    *text = add_prefix(text, source);
                }
            }
            Value::Number(number) => {
                if is_field_match(key, fields) {
                    *value = Value::String(add_prefix(&number.to_string(), source));
                }
            }
            Value::Bool(_) => {}
        }
    }
}

/// Strip matching keys of a loosely typed map, recursing into nested values
/// except those named in `ignore`
pub fn strip_map_prefixes(
    map: &mut Map<String, Value>,
    source: &str,
    fields: &[&str],
    ignore: &[&str],
) {
    if source.is_empty() {
        return;
    }
    for (key, value) in map.iter_mut() {
        match value {
            Value::Object(nested) => {
                if !ignore.contains(&key.as_str()) {
                    strip_map_prefixes(nested, source, fields, &[]);
                }
            }
            Value::Array(items) => {
                if !ignore.contains(&key.as_str()) {
                    strip_list_prefixes(items, source, fields);
                }
            }
            Value::String(text) => {
                if is_field_match(key, fields) {
                    strip_string(text, source);
                }
            }
            _ => {}
        }
    }
}

// List elements are addressed by position, so only nested containers are
// visited; a scalar element never matches a field name.
fn add_list_prefixes(items: &mut [Value], source: &str, fields: &[&str]) {
    for item in items.iter_mut() {
        match item {
            Value::Object(nested) => add_map_prefixes(nested, source, fields),
            Value::Array(nested) => add_list_prefixes(nested, source, fields),
            _ => {}
        }
    }
}

fn strip_list_prefixes(items: &mut [Value], source: &str, fields: &[&str]) {
    for item in items.iter_mut() {
        match item {
            Value::Object(nested) => strip_map_prefixes(nested, source, fields, &[]),
            Value::Array(nested) => strip_list_prefixes(nested, source, fields),
            _ => {}
        }
    }
}

fn strip_string(value: &mut String, source: &str) {
    let stripped = strip_prefix(value, source);
    if stripped.len() != value.len() {
        *value = stripped.to_string();
    }
}

/// Numeric keys are positions, never field names
fn is_field_match(key: &str, fields: &[&str]) -> bool {
    let numeric = !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit());
    !numeric && fields.contains(&key)
}
