//! In-memory backend.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tracing::debug;

use crate::error::BackendError;
use crate::traits::{Backend, ObjectBody, ObjectStat, RemoveFailure, WriteCondition};

#[derive(Debug)]
struct StoredObject {
    data: Bytes,
    etag: String,
}

/// In-memory backend keyed by dataset root, backed by a `RwLock<HashMap>`.
///
/// Every write is assigned a fresh generation tag from a monotonic counter,
/// so `IfMatch` preconditions behave exactly like an object store's
/// generation check. Used for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    roots: RwLock<HashMap<String, HashMap<String, StoredObject>>>,
    next_generation: AtomicU64,
}

impl MemoryBackend {
    /// Create an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_etag(&self) -> String {
        self.next_generation.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

#[async_trait::async_trait]
impl Backend for MemoryBackend {
    async fn ensure_root(&self, root: &str) -> Result<(), BackendError> {
        let mut roots = self.roots.write().expect("lock poisoned");
        roots.entry(root.to_string()).or_default();
        Ok(())
    }

    async fn stat_object(&self, root: &str, key: &str) -> Result<Option<ObjectStat>, BackendError> {
        let roots = self.roots.read().expect("lock poisoned");
        Ok(roots.get(root).and_then(|objects| {
            objects.get(key).map(|obj| ObjectStat {
                key: key.to_string(),
                size: obj.data.len() as u64,
                etag: Some(obj.etag.clone()),
            })
        }))
    }

    async fn get_object(&self, root: &str, key: &str) -> Result<ObjectBody, BackendError> {
        let roots = self.roots.read().expect("lock poisoned");
        match roots.get(root).and_then(|objects| objects.get(key)) {
            Some(obj) => Ok(ObjectBody {
                data: obj.data.clone(),
                etag: Some(obj.etag.clone()),
            }),
            None => Err(BackendError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    async fn put_object(
        &self,
        root: &str,
        key: &str,
        data: Bytes,
        condition: WriteCondition,
    ) -> Result<(), BackendError> {
        let mut roots = self.roots.write().expect("lock poisoned");
        let objects = roots.entry(root.to_string()).or_default();

        let current = objects.get(key);
        match condition {
            WriteCondition::Any => {}
            WriteCondition::IfAbsent => {
                if current.is_some() {
                    return Err(BackendError::PreconditionFailed {
                        key: key.to_string(),
                    });
                }
            }
            WriteCondition::IfMatch(expected) => {
                if current.map(|obj| obj.etag.as_str()) != Some(expected.as_str()) {
                    return Err(BackendError::PreconditionFailed {
                        key: key.to_string(),
                    });
                }
            }
        }

        debug!(root, key, size = data.len(), "storing object in memory");
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                etag: self.fresh_etag(),
            },
        );
        Ok(())
    }

    async fn list_prefix(
        &self,
        root: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectStat>, BackendError> {
        let roots = self.roots.read().expect("lock poisoned");
        let mut stats: Vec<ObjectStat> = roots
            .get(root)
            .into_iter()
            .flat_map(|objects| objects.iter())
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectStat {
                key: key.clone(),
                size: obj.data.len() as u64,
                etag: Some(obj.etag.clone()),
            })
            .collect();
        stats.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(stats)
    }

    async fn remove_prefix(
        &self,
        root: &str,
        prefix: &str,
    ) -> Result<Vec<RemoveFailure>, BackendError> {
        let mut roots = self.roots.write().expect("lock poisoned");
        if let Some(objects) = roots.get_mut(root) {
            objects.retain(|key, _| !key.starts_with(prefix));
        }
        Ok(Vec::new())
    }
}
