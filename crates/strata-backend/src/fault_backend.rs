//! A [`Backend`] wrapper that injects storage faults.
//!
//! `FaultBackend` wraps any `Arc<dyn Backend>` and fails chosen operations:
//! objects marked stuck survive bulk deletes as [`RemoveFailure`] entries,
//! and writes to chosen keys always fail their precondition, as if another
//! writer got there first.
//!
//! # Example
//!
//! ```ignore
//! let flaky = FaultBackend::new(inner)
//!     .stuck_key("1700000000/data/a.csv")  // survives remove_prefix
//!     .conflicting_put("MANIFEST.yaml");   // every put loses the race
//! ```

use std::sync::Arc;

use bytes::Bytes;

use crate::error::BackendError;
use crate::traits::{Backend, ObjectBody, ObjectStat, RemoveFailure, WriteCondition};

/// A [`Backend`] wrapper that fails chosen operations.
///
/// Useful for testing the paths that an instant, always-healthy in-memory
/// backend can never reach: partial bulk-delete failures and exhausted
/// write-conflict retries.
#[derive(Debug)]
pub struct FaultBackend {
    inner: Arc<dyn Backend>,
    stuck_keys: Vec<String>,
    conflicting_puts: Vec<String>,
}

impl FaultBackend {
    /// Wrap an existing backend with no faults (pass-through) by default.
    pub fn new(inner: Arc<dyn Backend>) -> Self {
        Self {
            inner,
            stuck_keys: Vec::new(),
            conflicting_puts: Vec::new(),
        }
    }

    /// Mark a key as undeletable: `remove_prefix` reports it as a
    /// [`RemoveFailure`] and leaves the object in place.
    pub fn stuck_key(mut self, key: impl Into<String>) -> Self {
        self.stuck_keys.push(key.into());
        self
    }

    /// Make every write to a key fail with
    /// [`BackendError::PreconditionFailed`], as if a concurrent writer
    /// always wins.
    pub fn conflicting_put(mut self, key: impl Into<String>) -> Self {
        self.conflicting_puts.push(key.into());
        self
    }
}

#[async_trait::async_trait]
impl Backend for FaultBackend {
    async fn ensure_root(&self, root: &str) -> Result<(), BackendError> {
        self.inner.ensure_root(root).await
    }

    async fn stat_object(&self, root: &str, key: &str) -> Result<Option<ObjectStat>, BackendError> {
        self.inner.stat_object(root, key).await
    }

    async fn get_object(&self, root: &str, key: &str) -> Result<ObjectBody, BackendError> {
        self.inner.get_object(root, key).await
    }

    async fn put_object(
        &self,
        root: &str,
        key: &str,
        data: Bytes,
        condition: WriteCondition,
    ) -> Result<(), BackendError> {
        if self.conflicting_puts.iter().any(|k| k == key) {
            return Err(BackendError::PreconditionFailed {
                key: key.to_string(),
            });
        }
        self.inner.put_object(root, key, data, condition).await
    }

    async fn list_prefix(
        &self,
        root: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectStat>, BackendError> {
        self.inner.list_prefix(root, prefix).await
    }

    async fn remove_prefix(
        &self,
        root: &str,
        prefix: &str,
    ) -> Result<Vec<RemoveFailure>, BackendError> {
        let mut failures = Vec::new();
        for stat in self.inner.list_prefix(root, prefix).await? {
            if self.stuck_keys.iter().any(|k| k == &stat.key) {
                failures.push(RemoveFailure {
                    key: stat.key,
                    message: "injected removal failure".to_string(),
                });
                continue;
            }
            // Each surviving key is removed through an exact-key prefix
            // sweep on the inner backend.
            failures.extend(self.inner.remove_prefix(root, &stat.key).await?);
        }
        Ok(failures)
    }
}
