//! Value tree accessor.
//!
//! Minimal structural access to a JSON document: read, write and delete by
//! path, plus the order-preserving object helpers the operators are built on.
//! Object maps keep insertion order (`serde_json` with `preserve_order`), so
//! every helper here states where it places keys.

use crate::schema::JsonType;
use serde_json::{Map, Value};

/// A step in a document path. Array positions are decimal strings.
pub type PathStep = String;

/// A path into a document, outermost step first.
pub type Path = Vec<PathStep>;

/// Format a path as an RFC 6901 JSON Pointer. The root is the empty string.
pub fn pointer(path: &[String]) -> String {
    let mut out = String::new();
    for step in path {
        out.push('/');
        out.push_str(&step.replace('~', "~0").replace('/', "~1"));
    }
    out
}

/// Parse an RFC 6901 JSON Pointer into a path.
pub fn parse_pointer(pointer: &str) -> Path {
    if pointer.is_empty() {
        return Vec::new();
    }
    pointer
        .strip_prefix('/')
        .unwrap_or(pointer)
        .split('/')
        .map(|step| step.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// Human readable location: like [`pointer`], but the root renders as `/`.
pub(crate) fn describe(path: &[String]) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        pointer(path)
    }
}

/// Extend a path by one step.
pub(crate) fn child(path: &[String], step: impl Into<String>) -> Path {
    let mut out = Vec::with_capacity(path.len() + 1);
    out.extend_from_slice(path);
    out.push(step.into());
    out
}

/// Classify a runtime value.
pub fn json_type_of(value: &Value) -> JsonType {
    match value {
        Value::Null => JsonType::Null,
        Value::Bool(_) => JsonType::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => JsonType::Integer,
        Value::Number(_) => JsonType::Number,
        Value::String(_) => JsonType::String,
        Value::Array(_) => JsonType::Array,
        Value::Object(_) => JsonType::Object,
    }
}

/// Get a value by path.
pub fn get<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = value;
    for step in path {
        current = match current {
            Value::Object(map) => map.get(step)?,
            Value::Array(items) => items.get(step.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Get a mutable reference to a value by path.
pub fn get_mut<'a>(value: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    let mut current = value;
    for step in path {
        current = match current {
            Value::Object(map) => map.get_mut(step)?,
            Value::Array(items) => items.get_mut(step.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set the value at `path`, replacing an existing value in place or
/// appending a new object key. Array positions must exist, except the
/// position equal to the length (or `-`), which appends.
///
/// Returns `false` if the parent does not exist or cannot hold the step.
pub fn set(root: &mut Value, path: &[String], new: Value) -> bool {
    let Some((last, parent)) = path.split_last() else {
        *root = new;
        return true;
    };
    match get_mut(root, parent) {
        Some(Value::Object(map)) => {
            map.insert(last.clone(), new);
            true
        }
        Some(Value::Array(items)) => match array_position(last, items.len()) {
            Some(idx) if idx < items.len() => {
                items[idx] = new;
                true
            }
            Some(_) => {
                items.push(new);
                true
            }
            None => false,
        },
        _ => false,
    }
}

/// Insert `new` at `path`. Inside arrays the elements at and after the
/// position shift right; for objects this behaves like [`set`].
pub fn insert(root: &mut Value, path: &[String], new: Value) -> bool {
    let Some((last, parent)) = path.split_last() else {
        *root = new;
        return true;
    };
    match get_mut(root, parent) {
        Some(Value::Array(items)) => match array_position(last, items.len()) {
            Some(idx) => {
                items.insert(idx, new);
                true
            }
            None => false,
        },
        Some(Value::Object(map)) => {
            map.insert(last.clone(), new);
            true
        }
        _ => false,
    }
}

/// Delete the value at `path`, returning it. Object keys keep the relative
/// order of their siblings; array elements after it shift left.
pub fn delete(root: &mut Value, path: &[String]) -> Option<Value> {
    let (last, parent) = path.split_last()?;
    match get_mut(root, parent)? {
        Value::Object(map) => map.shift_remove(last),
        Value::Array(items) => {
            let idx = last.parse::<usize>().ok()?;
            (idx < items.len()).then(|| items.remove(idx))
        }
        _ => None,
    }
}

fn array_position(step: &str, len: usize) -> Option<usize> {
    if step == "-" {
        return Some(len);
    }
    step.parse::<usize>().ok().filter(|idx| *idx <= len)
}

/// Position of `key` within an object.
pub fn position_of(map: &Map<String, Value>, key: &str) -> Option<usize> {
    map.keys().position(|k| k == key)
}

/// Remove `key`, returning its value and former position.
pub fn take_field(map: &mut Map<String, Value>, key: &str) -> Option<(Value, usize)> {
    let idx = position_of(map, key)?;
    map.shift_remove(key).map(|value| (value, idx))
}

/// Insert `key` at `idx` (clamped to the object length).
pub fn put_field_at(map: &mut Map<String, Value>, idx: usize, key: impl Into<String>, value: Value) {
    let key = key.into();
    map.shift_remove(&key);
    let idx = idx.min(map.len());
    map.shift_insert(idx, key, value);
}

/// Append `key` at the end of the object.
pub fn put_field(map: &mut Map<String, Value>, key: impl Into<String>, value: Value) {
    map.insert(key.into(), value);
}

/// Rename `from` to `to`, keeping the key's position.
pub fn rename_field(map: &mut Map<String, Value>, from: &str, to: &str) -> bool {
    match take_field(map, from) {
        Some((value, idx)) => {
            put_field_at(map, idx, to, value);
            true
        }
        None => false,
    }
}
