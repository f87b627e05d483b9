//! Hierarchical filesystem backend.
//!
//! Stores each object as a regular file under `{base_dir}/{root}/{key}`,
//! with the key's `/` segments mapped to directories. Writes are atomic:
//! data is written to a temporary file first, then renamed into place.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::BackendError;
use crate::traits::{Backend, ObjectBody, ObjectStat, RemoveFailure, WriteCondition};

/// Filesystem-backed store rooted at a base directory.
///
/// Generation tags are content fingerprints (blake3 of the object's bytes),
/// recomputed on read and compared on conditional writes. The compare and
/// the rename are two separate filesystem operations, so `IfMatch` guards
/// against lost updates between processes but is not a hard lock.
#[derive(Debug)]
pub struct FsBackend {
    base_dir: PathBuf,
}

impl FsBackend {
    /// Create a filesystem backend rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, BackendError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn root_dir(&self, root: &str) -> PathBuf {
        self.base_dir.join(root)
    }

    /// Map an object key onto a path under the dataset root, rejecting
    /// traversal segments.
    fn object_path(&self, root: &str, key: &str) -> Result<PathBuf, BackendError> {
        let mut path = self.root_dir(root);
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            if segment == ".." {
                return Err(BackendError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("object key escapes dataset root: {key}"),
                )));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

fn content_etag(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[async_trait::async_trait]
impl Backend for FsBackend {
    async fn ensure_root(&self, root: &str) -> Result<(), BackendError> {
        let dir = self.root_dir(root);
        tokio::fs::create_dir_all(&dir).await?;
        debug!(root, path = %dir.display(), "ensured dataset root directory");
        Ok(())
    }

    async fn stat_object(&self, root: &str, key: &str) -> Result<Option<ObjectStat>, BackendError> {
        let path = self.object_path(root, key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(ObjectStat {
                key: key.to_string(),
                size: meta.len(),
                etag: None,
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::Io(e)),
        }
    }

    async fn get_object(&self, root: &str, key: &str) -> Result<ObjectBody, BackendError> {
        let path = self.object_path(root, key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => {
                let etag = content_etag(&data);
                Ok(ObjectBody {
                    data: Bytes::from(data),
                    etag: Some(etag),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BackendError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(BackendError::Io(e)),
        }
    }

    async fn put_object(
        &self,
        root: &str,
        key: &str,
        data: Bytes,
        condition: WriteCondition,
    ) -> Result<(), BackendError> {
        let path = self.object_path(root, key)?;

        match condition {
            WriteCondition::Any => {}
            WriteCondition::IfAbsent => {
                if tokio::fs::try_exists(&path).await? {
                    return Err(BackendError::PreconditionFailed {
                        key: key.to_string(),
                    });
                }
            }
            WriteCondition::IfMatch(expected) => match tokio::fs::read(&path).await {
                Ok(current) if content_etag(&current) == expected => {}
                Ok(_) | Err(_) => {
                    return Err(BackendError::PreconditionFailed {
                        key: key.to_string(),
                    });
                }
            },
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic write: temp file in the same directory, then rename, so a
        // crash never leaves a half-written object behind. The suffix is
        // appended to the whole file name; replacing the extension would
        // let the temp path alias a sibling object's path.
        let mut tmp_name = path.as_os_str().to_os_string();
        tmp_name.push(".strata-tmp");
        let tmp_path = PathBuf::from(tmp_name);
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!(root, key, size = data.len(), "stored object");
        Ok(())
    }

    async fn list_prefix(
        &self,
        root: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectStat>, BackendError> {
        let root_dir = self.root_dir(root);
        if !root_dir.exists() {
            return Ok(Vec::new());
        }

        let prefix = prefix.to_string();
        let stats = tokio::task::spawn_blocking(move || -> Result<Vec<ObjectStat>, BackendError> {
            let mut stats = Vec::new();
            for entry in walkdir::WalkDir::new(&root_dir).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    let msg = e.to_string();
                    BackendError::Io(e.into_io_error().unwrap_or_else(|| std::io::Error::other(msg)))
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(&root_dir)
                    .expect("walked entries live under the walk root");
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if !key.starts_with(&prefix) {
                    continue;
                }
                stats.push(ObjectStat {
                    key,
                    size: entry.metadata().map(|m| m.len()).unwrap_or(0),
                    etag: None,
                });
            }
            Ok(stats)
        })
        .await
        .map_err(|e| BackendError::Io(std::io::Error::other(e)))??;

        Ok(stats)
    }

    async fn remove_prefix(
        &self,
        root: &str,
        prefix: &str,
    ) -> Result<Vec<RemoveFailure>, BackendError> {
        let mut failures = Vec::new();
        let root_dir = self.root_dir(root);

        for stat in self.list_prefix(root, prefix).await? {
            let path = self.object_path(root, &stat.key)?;
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(root, key = %stat.key, error = %e, "failed to remove object");
                    failures.push(RemoveFailure {
                        key: stat.key,
                        message: e.to_string(),
                    });
                    continue;
                }
            }
            // Prune now-empty ancestor directories up to the dataset root.
            let mut dir = path.parent().map(Path::to_path_buf);
            while let Some(d) = dir {
                if d == root_dir || tokio::fs::remove_dir(&d).await.is_err() {
                    break;
                }
                dir = d.parent().map(Path::to_path_buf);
            }
        }

        Ok(failures)
    }
}
