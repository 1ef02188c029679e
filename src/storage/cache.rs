//! In-memory cache mirroring the backend document
//!
//! The cache is split by top-level key (one `CacheEntry` per guild id).
//! A write only rewrites the subtree under its own top-level key, never the
//! whole document. Reads walk that single subtree as well; the full
//! document is only materialised by [`CacheStore::get_cache_object`].

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::path;
use crate::error::StoreResult;

/// Subtree a single-path write can change, captured around that write
///
/// Writes create missing intermediate objects and replace intermediates
/// that are not objects, so the anchor is the first missing or non-object
/// node along the path, or the path itself when all its parents exist.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSnapshot {
    anchor: String,
    before: Option<Value>,
    after: Option<Value>,
}

impl PathSnapshot {
    pub fn anchor(&self) -> &str {
        &self.anchor
    }
}

/// Top-level key → nested subtree
#[derive(Default)]
pub struct CacheStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole cache with `document`, one entry per top-level key
    ///
    /// A non-object document empties the cache.
    pub fn load(&self, document: Value) -> usize {
        let mut entries = self.entries.write();
        entries.clear();
        if let Value::Object(map) = document {
            entries.extend(map);
        }
        entries.len()
    }

    /// Materialise the entire cache as one nested object
    pub fn get_cache_object(&self) -> Value {
        let entries = self.entries.read();
        let map: Map<String, Value> = entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Value::Object(map)
    }

    /// Value at `key`, `Value::Null` when missing or when the key is invalid
    pub fn get(&self, key: &str) -> Value {
        self.with_value(key, |value| value.cloned())
            .unwrap_or(Value::Null)
    }

    pub fn has(&self, key: &str) -> bool {
        self.with_value(key, |value| value.map(|v| !v.is_null()))
            .unwrap_or(false)
    }

    /// Run `f` against the value at `key` without cloning the subtree
    fn with_value<R>(&self, key: &str, f: impl FnOnce(Option<&Value>) -> Option<R>) -> Option<R> {
        path::split_key(key).ok()?;
        f(value_in(&self.entries.read(), key))
    }

    /// Assign `value` at `key` and return the value it replaced
    pub fn set(&self, key: &str, value: Value) -> StoreResult<Value> {
        self.update(key, |_| Ok(value)).map(|(previous, _)| previous)
    }

    /// Compute a new value from the current one and store it at `key`
    ///
    /// Returns `(previous, current)`. When `mutate` fails nothing is written.
    pub fn update(
        &self,
        key: &str,
        mutate: impl FnOnce(Option<&Value>) -> StoreResult<Value>,
    ) -> StoreResult<(Value, Value)> {
        let top = path::top_level(key)?;
        let rest = path::remainder(key)?;
        let mut entries = self.entries.write();

        match rest {
            None => {
                let previous = entries.get(top).cloned();
                let next = mutate(previous.as_ref())?;
                entries.insert(top.to_string(), next.clone());
                Ok((previous.unwrap_or(Value::Null), next))
            }
            Some(rest) => {
                let previous = entries
                    .get(top)
                    .and_then(|entry| path::get(entry, rest))
                    .cloned();
                let next = mutate(previous.as_ref())?;
                let entry = entries
                    .entry(top.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                path::set(entry, rest, next.clone())?;
                Ok((previous.unwrap_or(Value::Null), next))
            }
        }
    }

    /// Remove the value at `key`, returning what was removed
    ///
    /// Deleting a missing path is not an error.
    pub fn delete(&self, key: &str) -> StoreResult<Value> {
        let top = path::top_level(key)?;
        let rest = path::remainder(key)?;
        let mut entries = self.entries.write();

        match rest {
            None => Ok(entries.remove(top).unwrap_or(Value::Null)),
            Some(rest) => {
                let entry = entries
                    .entry(top.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                let previous = path::get_cloned(entry, rest);
                path::delete(entry, rest)?;
                Ok(previous)
            }
        }
    }

    pub fn clear(&self) -> bool {
        self.entries.write().clear();
        true
    }

    /// Number of top-level entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Capture the subtree a write to `key` would touch
    ///
    /// `None` for a key that does not parse.
    pub fn snapshot(&self, key: &str) -> Option<PathSnapshot> {
        let segments = path::split_key(key).ok()?;
        let entries = self.entries.read();

        let mut depth = 1;
        let mut node = entries.get(segments[0]);
        while depth < segments.len() {
            match node {
                Some(Value::Object(map)) => {
                    node = map.get(segments[depth]);
                    depth += 1;
                }
                _ => break,
            }
        }

        Some(PathSnapshot {
            anchor: segments[..depth].join("."),
            before: node.cloned(),
            after: None,
        })
    }

    /// Record what a successful cache write left under the anchor
    pub fn seal(&self, snapshot: &mut PathSnapshot) {
        snapshot.after = value_in(&self.entries.read(), &snapshot.anchor).cloned();
    }

    /// Undo the write captured by a sealed `snapshot`
    ///
    /// Only the anchor subtree is put back, and only while it still holds
    /// what the write left there. Returns false when another write changed
    /// it in the meantime; the caller must then reload from the backend.
    pub fn restore(&self, snapshot: &PathSnapshot) -> bool {
        let mut entries = self.entries.write();
        if value_in(&entries, &snapshot.anchor) != snapshot.after.as_ref() {
            return false;
        }
        put(&mut entries, &snapshot.anchor, snapshot.before.clone()).is_ok()
    }

    /// Overwrite one top-level entry with a value read from the backend
    pub fn replace_entry(&self, top: &str, value: Option<Value>) {
        let mut entries = self.entries.write();
        match value {
            Some(value) => {
                entries.insert(top.to_string(), value);
            }
            None => {
                entries.remove(top);
            }
        }
    }
}

/// Value at `key` inside the entry map; `None` when missing or invalid
fn value_in<'a>(entries: &'a HashMap<String, Value>, key: &str) -> Option<&'a Value> {
    let top = path::top_level(key).ok()?;
    let entry = entries.get(top)?;
    match path::remainder(key).ok()? {
        None => Some(entry),
        Some(rest) => path::get(entry, rest),
    }
}

/// Write `value` at `key`, or remove `key` when `value` is `None`
fn put(entries: &mut HashMap<String, Value>, key: &str, value: Option<Value>) -> StoreResult<()> {
    let top = path::top_level(key)?;
    match (path::remainder(key)?, value) {
        (None, Some(value)) => {
            entries.insert(top.to_string(), value);
        }
        (None, None) => {
            entries.remove(top);
        }
        (Some(rest), Some(value)) => {
            let entry = entries
                .entry(top.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            path::set(entry, rest, value)?;
        }
        (Some(rest), None) => {
            if let Some(entry) = entries.get_mut(top) {
                path::delete(entry, rest)?;
            }
        }
    }
    Ok(())
}
