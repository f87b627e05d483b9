//! The versioning engine command set.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use strata_backend::{Backend, BackendError, WriteCondition};
use strata_types::{Manifest, VersionMetadata};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::hash::hash_tree;
use crate::path::versioned_key;

/// How many times a manifest compare-and-swap is retried before giving up.
const MAX_CAS_ATTEMPTS: u32 = 5;
/// Base delay between compare-and-swap retries, scaled by attempt number.
const CAS_RETRY_BASE: Duration = Duration::from_millis(50);

/// Result of an `init` command.
#[derive(Debug)]
pub enum InitOutcome {
    /// No local manifest was supplied: a default one was generated and
    /// uploaded. The caller may persist a local copy for editing.
    Created {
        /// The generated manifest.
        manifest: Manifest,
    },
    /// The supplied local manifest was validated and uploaded.
    Uploaded {
        /// Name of the uploaded dataset.
        name: String,
    },
}

/// Result of an `add` or `overwrite` command.
#[derive(Debug)]
pub struct AddReport {
    /// Version the files were uploaded under.
    pub version: String,
    /// Basename of the added path, used as the metadata key.
    pub basename: String,
    /// Content hash computed over the added tree.
    pub hash: String,
    /// Number of regular files uploaded.
    pub files_uploaded: usize,
}

/// One-shot versioning commands over a dataset root in a backend.
///
/// The engine holds no state between commands beyond the backend handle and
/// the configured manifest object name. Mutating commands persist the
/// manifest through a compare-and-swap loop: fetch with generation tag,
/// mutate, write back under an `IfMatch` precondition, retry on conflict.
pub struct VersioningEngine {
    backend: Arc<dyn Backend>,
    manifest_filename: String,
}

impl VersioningEngine {
    /// Create an engine bound to a backend.
    pub fn new(backend: Arc<dyn Backend>, manifest_filename: impl Into<String>) -> Self {
        Self {
            backend,
            manifest_filename: manifest_filename.into(),
        }
    }

    /// The manifest object key within each dataset root.
    pub fn manifest_filename(&self) -> &str {
        &self.manifest_filename
    }

    /// Initialize a dataset root with its first manifest.
    ///
    /// Fails if a manifest already exists at the root. With a local manifest
    /// the file is parsed and validated before upload; without one, a
    /// default dataset manifest with a generated name and no versions is
    /// uploaded.
    pub async fn init(
        &self,
        dataset: &str,
        local_manifest: Option<&Path>,
    ) -> Result<InitOutcome, EngineError> {
        self.backend.ensure_root(dataset).await?;

        if self
            .backend
            .stat_object(dataset, &self.manifest_filename)
            .await?
            .is_some()
        {
            return Err(EngineError::ManifestAlreadyExists {
                dataset: dataset.to_string(),
            });
        }

        let (manifest, outcome) = match local_manifest {
            Some(path) => {
                info!(path = %path.display(), "loading local manifest");
                let data = tokio::fs::read(path).await?;
                let manifest = Manifest::parse(&data)?;
                manifest.validate()?;
                let name = manifest.name.clone();
                (manifest, InitOutcome::Uploaded { name })
            }
            None => {
                let manifest = Manifest::new_dataset(format!("dataset-{}", now_secs()));
                (
                    manifest.clone(),
                    InitOutcome::Created { manifest },
                )
            }
        };

        let yaml = manifest.to_yaml()?;
        self.backend
            .put_object(
                dataset,
                &self.manifest_filename,
                Bytes::from(yaml),
                WriteCondition::IfAbsent,
            )
            .await
            .map_err(|e| match e {
                // A manifest appeared between the stat and the write.
                BackendError::PreconditionFailed { .. } => EngineError::ManifestAlreadyExists {
                    dataset: dataset.to_string(),
                },
                other => EngineError::Backend(other),
            })?;

        info!(dataset, name = %manifest.name, "initialized dataset");
        Ok(outcome)
    }

    /// Mint a new version identifier and record it in the manifest.
    ///
    /// The identifier is the current unix time in seconds, bumped forward
    /// past the current maximum when it would collide or sort below it, so
    /// minted identifiers are strictly increasing. No files are uploaded.
    pub async fn new_version(&self, dataset: &str) -> Result<String, EngineError> {
        let mut minted = String::new();
        self.update_manifest(dataset, |manifest| {
            minted = manifest.mint_version(now_secs());
            manifest
                .versions
                .insert(minted.clone(), VersionMetadata::new());
            Ok(())
        })
        .await?;

        info!(dataset, version = %minted, "created new version");
        Ok(minted)
    }

    /// Upload a local file or directory tree under the latest version.
    ///
    /// Every regular file is stored under the version prefix with its path
    /// relative to the parent of `local_path`, so the top-level folder name
    /// is retained inside the version. One content hash over the whole tree
    /// is merged into the version's metadata under the path's basename;
    /// entries for other basenames are preserved.
    pub async fn add(&self, dataset: &str, local_path: &Path) -> Result<AddReport, EngineError> {
        let (manifest, _) = self.fetch_manifest(dataset).await?;
        let version = manifest
            .latest_version()
            .ok_or_else(|| EngineError::NoVersions {
                dataset: dataset.to_string(),
            })?
            .to_string();

        let files_uploaded = self.upload_tree(dataset, &version, local_path).await?;
        let (basename, hash) = fingerprint(local_path).await?;

        self.update_manifest(dataset, |manifest| {
            if !manifest.merge_version_entry(&version, &basename, &hash) {
                return Err(EngineError::VersionNotFound {
                    dataset: dataset.to_string(),
                    version: version.clone(),
                });
            }
            Ok(())
        })
        .await?;

        info!(dataset, version = %version, basename = %basename, files_uploaded, "added files");
        Ok(AddReport {
            version,
            basename,
            hash,
            files_uploaded,
        })
    }

    /// All version identifiers, newest first. An empty list is a normal
    /// outcome for a freshly initialized dataset.
    pub async fn versions(&self, dataset: &str) -> Result<Vec<String>, EngineError> {
        let (manifest, _) = self.fetch_manifest(dataset).await?;
        Ok(manifest.versions_desc())
    }

    /// The newest version identifier.
    pub async fn latest(&self, dataset: &str) -> Result<String, EngineError> {
        let (manifest, _) = self.fetch_manifest(dataset).await?;
        manifest
            .latest_version()
            .map(str::to_string)
            .ok_or_else(|| EngineError::NoVersions {
                dataset: dataset.to_string(),
            })
    }

    /// Replace a version's contents wholesale.
    ///
    /// Every object under the version's prefix is removed, the local tree is
    /// re-uploaded, and the version's metadata map is replaced with the
    /// single fresh entry rather than merged.
    pub async fn overwrite(
        &self,
        dataset: &str,
        version: &str,
        local_path: &Path,
    ) -> Result<AddReport, EngineError> {
        let (manifest, _) = self.fetch_manifest(dataset).await?;
        if !manifest.versions.contains_key(version) {
            return Err(EngineError::VersionNotFound {
                dataset: dataset.to_string(),
                version: version.to_string(),
            });
        }

        self.remove_version_objects(dataset, version).await?;
        let files_uploaded = self.upload_tree(dataset, version, local_path).await?;
        let (basename, hash) = fingerprint(local_path).await?;

        self.update_manifest(dataset, |manifest| {
            let fresh = VersionMetadata::from([(basename.clone(), hash.clone())]);
            if !manifest.replace_version_metadata(version, fresh) {
                return Err(EngineError::VersionNotFound {
                    dataset: dataset.to_string(),
                    version: version.to_string(),
                });
            }
            Ok(())
        })
        .await?;

        info!(dataset, version, basename = %basename, files_uploaded, "overwrote version");
        Ok(AddReport {
            version: version.to_string(),
            basename,
            hash,
            files_uploaded,
        })
    }

    /// Remove a version's objects and drop it from the manifest.
    ///
    /// A version absent from the manifest is not an error: the prefix sweep
    /// is a no-op and the manifest write still succeeds.
    pub async fn delete(&self, dataset: &str, version: &str) -> Result<(), EngineError> {
        self.remove_version_objects(dataset, version).await?;

        self.update_manifest(dataset, |manifest| {
            if !manifest.remove_version(version) {
                debug!(dataset, version, "version absent from manifest; nothing to drop");
            }
            Ok(())
        })
        .await?;

        info!(dataset, version, "deleted version");
        Ok(())
    }

    // ----- internals -----

    async fn fetch_manifest(
        &self,
        dataset: &str,
    ) -> Result<(Manifest, Option<String>), EngineError> {
        let body = self
            .backend
            .get_object(dataset, &self.manifest_filename)
            .await
            .map_err(|e| match e {
                BackendError::NotFound { .. } => EngineError::ManifestMissing {
                    dataset: dataset.to_string(),
                },
                other => EngineError::Backend(other),
            })?;
        let manifest = Manifest::parse(&body.data)?;
        Ok((manifest, body.etag))
    }

    /// Fetch → mutate → conditional-put loop for the manifest object.
    ///
    /// The write carries the generation tag the manifest was read at; a
    /// concurrent writer turns the put into a `PreconditionFailed`, and the
    /// whole cycle is retried against the fresh manifest.
    async fn update_manifest<F>(&self, dataset: &str, mut mutate: F) -> Result<Manifest, EngineError>
    where
        F: FnMut(&mut Manifest) -> Result<(), EngineError>,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let (mut manifest, etag) = self.fetch_manifest(dataset).await?;
            mutate(&mut manifest)?;

            let yaml = manifest.to_yaml()?;
            let condition = match etag {
                Some(tag) => WriteCondition::IfMatch(tag),
                None => WriteCondition::Any,
            };
            match self
                .backend
                .put_object(dataset, &self.manifest_filename, Bytes::from(yaml), condition)
                .await
            {
                Ok(()) => return Ok(manifest),
                Err(BackendError::PreconditionFailed { .. }) => {
                    warn!(dataset, attempt, "manifest changed concurrently; retrying");
                    tokio::time::sleep(CAS_RETRY_BASE * attempt).await;
                }
                Err(other) => return Err(EngineError::Backend(other)),
            }
        }

        Err(EngineError::ConflictRetriesExhausted {
            dataset: dataset.to_string(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    /// Upload every regular file under `local_path`, sequentially in sorted
    /// walk order. Returns the number of files uploaded.
    async fn upload_tree(
        &self,
        dataset: &str,
        version: &str,
        local_path: &Path,
    ) -> Result<usize, EngineError> {
        let files = collect_files(local_path).await?;
        let count = files.len();

        for (abs, rel) in files {
            let key = versioned_key(version, &rel);
            let data = tokio::fs::read(&abs).await?;
            debug!(dataset, key = %key, size = data.len(), "uploading file");
            self.backend
                .put_object(dataset, &key, Bytes::from(data), WriteCondition::Any)
                .await?;
        }

        Ok(count)
    }

    async fn remove_version_objects(&self, dataset: &str, version: &str) -> Result<(), EngineError> {
        let prefix = format!("{version}/");
        let failures = self.backend.remove_prefix(dataset, &prefix).await?;
        // Partial failures do not block the manifest update that follows;
        // survivors are stale objects the next overwrite sweep can retry.
        for failure in &failures {
            warn!(dataset, key = %failure.key, message = %failure.message, "object survived bulk delete");
        }
        Ok(())
    }
}

/// Enumerate the regular files under `path`, paired with their paths
/// relative to `path`'s parent (so the top-level folder name is retained).
/// A single-file path yields just its basename.
async fn collect_files(path: &Path) -> Result<Vec<(PathBuf, PathBuf)>, EngineError> {
    if !path.exists() {
        return Err(EngineError::LocalPathMissing(path.to_path_buf()));
    }

    let root = path.to_path_buf();
    let base = root.parent().map(Path::to_path_buf).unwrap_or_default();

    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let msg = e.to_string();
                EngineError::Io(e.into_io_error().unwrap_or_else(|| std::io::Error::other(msg)))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = match entry.path().strip_prefix(&base) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => PathBuf::from(entry.file_name()),
            };
            files.push((entry.path().to_path_buf(), rel));
        }
        Ok(files)
    })
    .await
    .map_err(|e| EngineError::Io(std::io::Error::other(e)))?
}

/// Basename of the added path plus the content hash over its tree.
async fn fingerprint(path: &Path) -> Result<(String, String), EngineError> {
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let owned = path.to_path_buf();
    let hash = tokio::task::spawn_blocking(move || hash_tree(&owned))
        .await
        .map_err(|e| EngineError::Io(std::io::Error::other(e)))??;
    Ok((basename, hash))
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
