//! Manifest model shared across the Strata workspace.
//!
//! A dataset is described by a single [`Manifest`]: identity, free-form
//! labels, and a map of version identifier to version metadata. The manifest
//! is a specialization of the generic catalogue asset descriptor; the
//! versioning engine only actively uses the `versions` field and passes the
//! rest through unchanged.

mod error;
mod manifest;

pub use error::ManifestError;
pub use manifest::{AssetKind, Manifest, VersionMetadata, DEFAULT_MANIFEST_FILENAME};
