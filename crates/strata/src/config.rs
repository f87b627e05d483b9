//! TOML configuration for the `strata` CLI.
//!
//! Backend selection and credentials live here; the engine treats the
//! resulting backend handle as an opaque, already-validated input. When no
//! config file is passed, `~/.strata.toml` is read if present, otherwise a
//! filesystem backend rooted under the home directory is used.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use serde::Deserialize;
use strata_backend::{Backend, FsBackend, S3Backend, S3Settings};
use strata_types::DEFAULT_MANIFEST_FILENAME;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Override for the manifest object name within each dataset root.
    pub manifest_filename: Option<String>,
    /// Backend selection.
    pub backend: BackendSection,
    /// Filesystem backend settings.
    pub fs: FsSection,
    /// S3 backend settings.
    pub s3: S3Section,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[backend]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    /// Backend kind: `"fs"` (default) or `"s3"`.
    pub kind: String,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            kind: "fs".to_string(),
        }
    }
}

/// `[fs]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FsSection {
    /// Base directory holding dataset roots.
    pub root: PathBuf,
}

impl Default for FsSection {
    fn default() -> Self {
        let root = dirs::home_dir()
            .map(|h| h.join(".strata"))
            .unwrap_or_else(|| PathBuf::from(".strata"));
        Self { root }
    }
}

/// `[s3]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct S3Section {
    /// Endpoint URL for non-AWS stores (e.g. `http://localhost:9000`).
    pub endpoint: Option<String>,
    /// Static access key.
    pub access_key: Option<String>,
    /// Static secret key.
    pub secret_key: Option<String>,
    /// Bucket region.
    pub region: Option<String>,
    /// Path-style addressing, required by MinIO. Defaults to true.
    pub force_path_style: Option<bool>,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, falling back to `~/.strata.toml` and
    /// then to defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => dirs::home_dir()
                .map(|h| h.join(".strata.toml"))
                .filter(|p| p.exists()),
        };
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(&p)
                    .with_context(|| format!("failed to read config file {}", p.display()))?;
                let config: CliConfig = toml::from_str(&content)
                    .with_context(|| format!("failed to parse config file {}", p.display()))?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Effective manifest object name.
    pub fn manifest_filename(&self) -> &str {
        self.manifest_filename
            .as_deref()
            .unwrap_or(DEFAULT_MANIFEST_FILENAME)
    }

    /// Construct the backend this config selects.
    pub fn build_backend(&self) -> anyhow::Result<Arc<dyn Backend>> {
        match self.backend.kind.as_str() {
            "fs" => {
                let backend = FsBackend::new(&self.fs.root).with_context(|| {
                    format!("failed to open fs backend at {}", self.fs.root.display())
                })?;
                Ok(Arc::new(backend))
            }
            "s3" => {
                let mut missing = Vec::new();
                if self.s3.access_key.as_deref().unwrap_or("").is_empty() {
                    missing.push("access_key");
                }
                if self.s3.secret_key.as_deref().unwrap_or("").is_empty() {
                    missing.push("secret_key");
                }
                if !missing.is_empty() {
                    bail!(
                        "the following fields are missing from the [s3] config: {}",
                        missing.join(", ")
                    );
                }
                let settings = S3Settings {
                    endpoint: self.s3.endpoint.clone(),
                    access_key: self.s3.access_key.clone().unwrap_or_default(),
                    secret_key: self.s3.secret_key.clone().unwrap_or_default(),
                    region: self.s3.region.clone(),
                    force_path_style: self.s3.force_path_style.unwrap_or(true),
                };
                Ok(Arc::new(S3Backend::new(settings)))
            }
            other => bail!("unknown backend kind {other:?} (expected \"fs\" or \"s3\")"),
        }
    }
}
