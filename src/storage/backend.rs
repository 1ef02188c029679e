//! Backend contract - the only layer that performs real I/O
//!
//! Every storage medium implements the same operation set. The variant is
//! chosen once, when the store is opened, and is never branched on again.
//!
//! Implementors provide the primitives (`get`, `modify`, `delete`,
//! `clear_all`, `fetch_everything`); the compound operations are built on
//! `modify` so the numeric and array type guards are identical for every
//! medium.

use async_trait::async_trait;
use serde_json::Value;

use super::path;
use crate::error::StoreResult;

/// Read-modify-write step applied to the current value at a path
///
/// Receives `None` when the path does not exist. The returned value is
/// written back; an error aborts the write.
pub type Mutator = Box<dyn FnOnce(Option<&Value>) -> StoreResult<Value> + Send>;

/// Storage medium holding the durable copy of the document
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short medium name used in log lines
    fn name(&self) -> &'static str;

    /// Read the value at `path`
    async fn get(&self, path: &str) -> StoreResult<Option<Value>>;

    /// Read the value at `path`, apply `mutate`, write the result back
    ///
    /// Returns the value that was written.
    async fn modify(&self, path: &str, mutate: Mutator) -> StoreResult<Value>;

    /// Remove the value at `path`; missing paths are not an error
    async fn delete(&self, path: &str) -> StoreResult<bool>;

    /// Remove everything from the medium
    async fn clear_all(&self) -> StoreResult<bool>;

    /// The full logical document, nested
    async fn fetch_everything(&self) -> StoreResult<Value>;

    /// Overwrite the value at `path` (no merge)
    async fn set(&self, path: &str, value: Value) -> StoreResult<Value> {
        self.modify(path, Box::new(move |_: Option<&Value>| Ok(value))).await
    }

    async fn add(&self, path: &str, amount: f64) -> StoreResult<bool> {
        let key = path.to_string();
        self.modify(
            path,
            Box::new(move |current: Option<&Value>| path::added("add", &key, current, amount)),
        )
        .await
        .map(|_| true)
    }

    async fn subtract(&self, path: &str, amount: f64) -> StoreResult<bool> {
        let key = path.to_string();
        self.modify(
            path,
            Box::new(move |current: Option<&Value>| path::added("subtract", &key, current, -amount)),
        )
        .await
        .map(|_| true)
    }

    /// Append `value` to the array at `path`, creating it when absent
    async fn push(&self, path: &str, value: Value) -> StoreResult<bool> {
        let key = path.to_string();
        self.modify(
            path,
            Box::new(move |current: Option<&Value>| path::pushed(&key, current, value)),
        )
        .await
        .map(|_| true)
    }

    /// Replace element `index` of the array at `path`
    async fn pull(&self, path: &str, index: usize, value: Value) -> StoreResult<bool> {
        let key = path.to_string();
        self.modify(
            path,
            Box::new(move |current: Option<&Value>| path::pulled(&key, current, index, value)),
        )
        .await
        .map(|_| true)
    }

    /// Remove element `index` of the array at `path`
    async fn pop(&self, path: &str, index: usize) -> StoreResult<bool> {
        let key = path.to_string();
        self.modify(
            path,
            Box::new(move |current: Option<&Value>| path::popped(&key, current, index)),
        )
        .await
        .map(|_| true)
    }
}
