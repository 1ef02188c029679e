//! Key paths - dotted-key access into nested JSON documents
//!
//! A key path is `segment(.segment)*`. Every segment addresses one level
//! of nesting inside a `serde_json::Value` object tree.
//!
//! ## Rules
//! - Splitting never yields an empty segment (`"a..b"`, `".a"` and `""` are rejected)
//! - `set`/`delete` replace any intermediate node that is not a plain
//!   object (arrays and `null` included) with `{}` before descending
//! - `set` overwrites the terminal segment, it never merges
//!
//! The numeric and array helpers at the bottom are shared by the cache and
//! by every backend so the type guards behave identically everywhere.

use serde_json::{Map, Number, Value};

use crate::error::{StoreError, StoreResult};

// ============================================================================
// Segment parsing
// ============================================================================

/// Split a dotted key into its segments
pub fn split_key(key: &str) -> StoreResult<Vec<&str>> {
    if key.is_empty() {
        return Err(StoreError::InvalidPath(key.to_string()));
    }
    let segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath(key.to_string()));
    }
    Ok(segments)
}

/// First segment of a key (the unit of storage for the cache and the
/// per-key backends)
pub fn top_level(key: &str) -> StoreResult<&str> {
    Ok(split_key(key)?[0])
}

/// Everything after the first segment, if any
pub fn remainder(key: &str) -> StoreResult<Option<&str>> {
    split_key(key)?;
    Ok(key.split_once('.').map(|(_, rest)| rest))
}

// ============================================================================
// Type tests
// ============================================================================

/// Plain object: not an array, not null, an object
pub fn is_plain_object(value: &Value) -> bool {
    value.is_object()
}

pub fn is_array(value: &Value) -> bool {
    value.is_array()
}

pub fn is_finite_number(value: &Value) -> bool {
    value.as_f64().is_some_and(f64::is_finite)
}

/// Short type name used in error messages
pub fn type_name(value: Option<&Value>) -> &'static str {
    match value {
        None | Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
}

// ============================================================================
// get / set / delete
// ============================================================================

/// Walk `key` inside `root`
///
/// Returns `None` for an invalid key or when any segment is missing or
/// passes through a non-object. Never fails.
pub fn get<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    let segments = split_key(key).ok()?;
    let mut current = root;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Like [`get`], normalising a missing value to `Value::Null`
pub fn get_cloned(root: &Value, key: &str) -> Value {
    get(root, key).cloned().unwrap_or(Value::Null)
}

/// Assign `value` at `key`, creating intermediate objects on demand
pub fn set(root: &mut Value, key: &str, value: Value) -> StoreResult<()> {
    let segments = split_key(key)?;
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| StoreError::InvalidPath(key.to_string()))?;
    let parent = descend_creating(root, parents, key)?;
    parent.insert((*last).to_string(), value);
    Ok(())
}

/// Remove the terminal segment of `key` from its parent
///
/// Intermediate nodes are created exactly as [`set`] creates them.
/// Returns whether a value was actually removed; deleting a missing path
/// is not an error.
pub fn delete(root: &mut Value, key: &str) -> StoreResult<bool> {
    let segments = split_key(key)?;
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| StoreError::InvalidPath(key.to_string()))?;
    let parent = descend_creating(root, parents, key)?;
    Ok(parent.remove(*last).is_some())
}

fn descend_creating<'a>(
    root: &'a mut Value,
    segments: &[&str],
    key: &str,
) -> StoreResult<&'a mut Map<String, Value>> {
    let mut current = ensure_object(root, key)?;
    for segment in segments {
        let child = current
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = ensure_object(child, key)?;
    }
    Ok(current)
}

fn ensure_object<'a>(value: &'a mut Value, key: &str) -> StoreResult<&'a mut Map<String, Value>> {
    if !is_plain_object(value) {
        *value = Value::Object(Map::new());
    }
    value
        .as_object_mut()
        .ok_or_else(|| StoreError::InvalidPath(key.to_string()))
}

/// Fold flat `(dotted key, value)` pairs into one nested document
///
/// Each key is applied with [`set`] semantics, so `"a.b" = 1` and
/// `"a.c" = 2` fold into `{"a": {"b": 1, "c": 2}}`. Keys that do not
/// parse are skipped.
pub fn fold<I, K>(entries: I) -> Value
where
    I: IntoIterator<Item = (K, Value)>,
    K: AsRef<str>,
{
    let mut root = Value::Object(Map::new());
    for (key, value) in entries {
        let _ = set(&mut root, key.as_ref(), value);
    }
    root
}

// ============================================================================
// Numeric and array mutations
// ============================================================================

/// Result of `current + delta`
///
/// A missing or `null` value counts as 0. Anything else that is not a
/// finite number fails with `InvalidTargetType`.
pub fn added(
    operation: &'static str,
    path: &str,
    current: Option<&Value>,
    delta: f64,
) -> StoreResult<Value> {
    let base = match current {
        None | Some(Value::Null) => 0.0,
        Some(v) if is_finite_number(v) => v.as_f64().unwrap_or_default(),
        Some(v) => {
            return Err(StoreError::InvalidTargetType {
                operation,
                path: path.to_string(),
                expected: "number",
                found: type_name(Some(v)),
            })
        }
    };
    if !delta.is_finite() {
        return Err(StoreError::InvalidTargetType {
            operation,
            path: path.to_string(),
            expected: "number",
            found: "non-finite number",
        });
    }
    number_value(base + delta).ok_or_else(|| StoreError::InvalidTargetType {
        operation,
        path: path.to_string(),
        expected: "finite result",
        found: "overflowing number",
    })
}

/// Build a JSON number, keeping integral results as integers
///
/// `None` for NaN and infinities, which JSON cannot hold.
pub fn number_value(n: f64) -> Option<Value> {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Some(Value::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number)
    }
}

/// Result of appending `value` to the array at `current`
///
/// A missing or `null` value starts a new array.
pub fn pushed(path: &str, current: Option<&Value>, value: Value) -> StoreResult<Value> {
    let mut items = match current {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => return Err(not_an_array("push", path, Some(other))),
    };
    items.push(value);
    Ok(Value::Array(items))
}

/// Result of replacing element `index` of the array at `current`
pub fn pulled(path: &str, current: Option<&Value>, index: usize, value: Value) -> StoreResult<Value> {
    let mut items = existing_array("pull", path, current)?;
    let len = items.len();
    let slot = items.get_mut(index).ok_or_else(|| StoreError::IndexOutOfBounds {
        operation: "pull",
        path: path.to_string(),
        index,
        len,
    })?;
    *slot = value;
    Ok(Value::Array(items))
}

/// Result of removing element `index` of the array at `current`
pub fn popped(path: &str, current: Option<&Value>, index: usize) -> StoreResult<Value> {
    let mut items = existing_array("pop", path, current)?;
    if index >= items.len() {
        return Err(StoreError::IndexOutOfBounds {
            operation: "pop",
            path: path.to_string(),
            index,
            len: items.len(),
        });
    }
    items.remove(index);
    Ok(Value::Array(items))
}

fn existing_array(operation: &'static str, path: &str, current: Option<&Value>) -> StoreResult<Vec<Value>> {
    match current {
        Some(Value::Array(items)) => Ok(items.clone()),
        other => Err(not_an_array(operation, path, other)),
    }
}

fn not_an_array(operation: &'static str, path: &str, found: Option<&Value>) -> StoreError {
    StoreError::InvalidTargetType {
        operation,
        path: path.to_string(),
        expected: "array",
        found: type_name(found),
    }
}
