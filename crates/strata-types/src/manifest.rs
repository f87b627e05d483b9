//! The dataset manifest: a YAML document colocated with the data.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// Manifest object key used when none is configured.
pub const DEFAULT_MANIFEST_FILENAME: &str = "MANIFEST.yaml";

/// Per-version metadata: basename of each added file or directory mapped to
/// the content hash computed when it was added.
pub type VersionMetadata = BTreeMap<String, String>;

/// Kind of catalogue asset a manifest describes.
///
/// The versioning engine only ever creates `dataset` manifests, but it must
/// round-trip every kind the surrounding catalogue knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Database,
    Dataset,
    Featureset,
    Model,
    Notebook,
    Pipeline,
    Report,
    Service,
    Stream,
    Table,
    User,
    Workflow,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssetKind::Database => "database",
            AssetKind::Dataset => "dataset",
            AssetKind::Featureset => "featureset",
            AssetKind::Model => "model",
            AssetKind::Notebook => "notebook",
            AssetKind::Pipeline => "pipeline",
            AssetKind::Report => "report",
            AssetKind::Service => "service",
            AssetKind::Stream => "stream",
            AssetKind::Table => "table",
            AssetKind::User => "user",
            AssetKind::Workflow => "workflow",
        };
        f.write_str(s)
    }
}

/// The persisted description of one dataset.
///
/// Version identifiers are fixed-width decimal unix-seconds strings, so the
/// `BTreeMap` key order is both lexical and chronological; descending
/// iteration yields newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Stable identifier; immutable after creation.
    pub name: String,
    /// Free-form description of the asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Publication timestamp, set when the manifest is first created.
    #[serde(
        rename = "published-on",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub published_on: Option<DateTime<Utc>>,
    /// Names of assets this one depends on. Unused by the engine.
    #[serde(
        rename = "depends-on",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub depends_on: Option<Vec<String>>,
    /// Asset kind.
    #[serde(rename = "type")]
    pub kind: AssetKind,
    /// Opaque metadata, untouched by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, serde_yaml::Value>>,
    /// Search flags, untouched by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Version identifier → metadata, ordered by creation.
    #[serde(default)]
    pub versions: BTreeMap<String, VersionMetadata>,
}

impl Manifest {
    /// Create a fresh dataset manifest with no versions.
    pub fn new_dataset(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            published_on: Some(Utc::now()),
            depends_on: None,
            kind: AssetKind::Dataset,
            labels: None,
            tags: None,
            versions: BTreeMap::new(),
        }
    }

    /// Parse a manifest from YAML bytes.
    pub fn parse(data: &[u8]) -> Result<Self, ManifestError> {
        Ok(serde_yaml::from_slice(data)?)
    }

    /// Serialize the manifest to a YAML string.
    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate required fields: a non-blank name. The asset kind is already
    /// enforced by the typed enum at parse time.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.name.trim().is_empty() {
            return Err(ManifestError::EmptyName);
        }
        Ok(())
    }

    /// All version identifiers, newest first.
    pub fn versions_desc(&self) -> Vec<String> {
        self.versions.keys().rev().cloned().collect()
    }

    /// The newest version identifier, if any version exists.
    pub fn latest_version(&self) -> Option<&str> {
        self.versions.keys().next_back().map(String::as_str)
    }

    /// Mint a new version identifier from a unix-seconds timestamp.
    ///
    /// Identifiers must stay strictly increasing: a mint never lands on or
    /// below the current maximum, even when the clock stepped backwards or
    /// two invocations share the same second. The candidate starts at the
    /// later of `now_secs` and one past the newest identifier, then bumps
    /// forward while the key is taken.
    pub fn mint_version(&self, now_secs: u64) -> String {
        let floor = self
            .latest_version()
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(0, |latest| latest.saturating_add(1));
        let mut candidate = now_secs.max(floor);
        loop {
            let id = candidate.to_string();
            if !self.versions.contains_key(&id) {
                return id;
            }
            candidate += 1;
        }
    }

    /// Merge one `basename → hash` entry into an existing version's metadata.
    ///
    /// Entries for other basenames are preserved; an existing entry for the
    /// same basename is overwritten. Returns `false` if the version is not
    /// present in the manifest.
    pub fn merge_version_entry(&mut self, version: &str, basename: &str, hash: &str) -> bool {
        match self.versions.get_mut(version) {
            Some(meta) => {
                meta.insert(basename.to_string(), hash.to_string());
                true
            }
            None => false,
        }
    }

    /// Replace a version's metadata wholesale. Returns `false` if the
    /// version is not present.
    pub fn replace_version_metadata(&mut self, version: &str, metadata: VersionMetadata) -> bool {
        match self.versions.get_mut(version) {
            Some(meta) => {
                *meta = metadata;
                true
            }
            None => false,
        }
    }

    /// Remove a version from the manifest. Returns `true` if it was present.
    pub fn remove_version(&mut self, version: &str) -> bool {
        self.versions.remove(version).is_some()
    }
}
