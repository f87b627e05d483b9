//! Error types for manifest parsing and validation.

/// Errors that can occur while parsing or validating a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The document is not valid YAML or does not match the manifest shape.
    #[error("invalid manifest document: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The `name` field is missing or blank.
    #[error("manifest name is empty")]
    EmptyName,
}
