//! Core trait and types for backend storage.

use bytes::Bytes;

use crate::error::BackendError;

/// Metadata for one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStat {
    /// Object key relative to the dataset root.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Opaque generation tag, when the store exposes one.
    pub etag: Option<String>,
}

/// A fetched object together with the generation tag it was read at.
#[derive(Debug, Clone)]
pub struct ObjectBody {
    /// The object's bytes.
    pub data: Bytes,
    /// Generation tag usable as a [`WriteCondition::IfMatch`] precondition.
    pub etag: Option<String>,
}

/// Precondition attached to a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCondition {
    /// Overwrite unconditionally.
    Any,
    /// Fail with [`BackendError::PreconditionFailed`] if the object exists.
    IfAbsent,
    /// Fail unless the stored generation tag matches.
    IfMatch(String),
}

/// One object that could not be removed during a bulk prefix delete.
#[derive(Debug, Clone)]
pub struct RemoveFailure {
    /// Key of the object that survived.
    pub key: String,
    /// Error detail for this object.
    pub message: String,
}

/// Capability interface over a remote blob store.
///
/// One implementation per target store; the versioning engine holds a thin
/// `Arc<dyn Backend>` handle selected at construction time. All mutating
/// operations are immediately visible to subsequent operations on the same
/// backend (no client-side caching).
#[async_trait::async_trait]
pub trait Backend: std::fmt::Debug + Send + Sync {
    /// Idempotently create the dataset's root container (bucket or directory).
    async fn ensure_root(&self, root: &str) -> Result<(), BackendError>;

    /// Stat an object. Absence is a normal outcome, not an error.
    async fn stat_object(&self, root: &str, key: &str) -> Result<Option<ObjectStat>, BackendError>;

    /// Fetch an object. A missing object is [`BackendError::NotFound`].
    async fn get_object(&self, root: &str, key: &str) -> Result<ObjectBody, BackendError>;

    /// Write an object, subject to the given precondition.
    async fn put_object(
        &self,
        root: &str,
        key: &str,
        data: Bytes,
        condition: WriteCondition,
    ) -> Result<(), BackendError>;

    /// Enumerate every object whose key starts with `prefix`.
    async fn list_prefix(&self, root: &str, prefix: &str)
        -> Result<Vec<ObjectStat>, BackendError>;

    /// Best-effort bulk delete of every object under `prefix`.
    ///
    /// Per-object failures are collected and returned rather than aborting
    /// the sweep. An empty prefix match is a silent no-op.
    async fn remove_prefix(
        &self,
        root: &str,
        prefix: &str,
    ) -> Result<Vec<RemoveFailure>, BackendError>;
}
