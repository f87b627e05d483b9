//! Error types for engine commands.

use strata_backend::BackendError;
use strata_types::ManifestError;

/// Coarse error category, used by callers to pick exit codes and decide
/// whether a retry can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input detected before any remote mutation.
    Validation,
    /// The command does not make sense against the dataset's current state.
    Logic,
    /// The backing store failed or was unreachable.
    Backend,
}

/// Errors that can occur during engine commands.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The backend reported an error.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The manifest could not be parsed or failed validation.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// A local file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A command that requires a manifest found none at the dataset root.
    #[error("no manifest found at {dataset}")]
    ManifestMissing {
        /// Dataset root that was probed.
        dataset: String,
    },

    /// `init` found a manifest already present at the dataset root.
    #[error("manifest already exists at {dataset}")]
    ManifestAlreadyExists {
        /// Dataset root that was probed.
        dataset: String,
    },

    /// The dataset has no versions to operate on.
    #[error("no versions found at {dataset}")]
    NoVersions {
        /// Dataset root that was inspected.
        dataset: String,
    },

    /// The named version is absent from the manifest.
    #[error("no version {version} found at {dataset}")]
    VersionNotFound {
        /// Dataset root that was inspected.
        dataset: String,
        /// The version identifier that was requested.
        version: String,
    },

    /// The local path to add does not exist or is not a file or directory.
    #[error("local path not found: {0}")]
    LocalPathMissing(std::path::PathBuf),

    /// The manifest compare-and-swap loop kept losing to concurrent writers.
    #[error("gave up persisting manifest for {dataset} after {attempts} conflicts")]
    ConflictRetriesExhausted {
        /// Dataset root being updated.
        dataset: String,
        /// How many attempts were made.
        attempts: u32,
    },
}

impl EngineError {
    /// Classify the error for exit-code selection and retry policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::Manifest(_)
            | EngineError::ManifestAlreadyExists { .. }
            | EngineError::LocalPathMissing(_)
            | EngineError::Io(_) => ErrorClass::Validation,
            EngineError::ManifestMissing { .. }
            | EngineError::NoVersions { .. }
            | EngineError::VersionNotFound { .. } => ErrorClass::Logic,
            EngineError::Backend(_) | EngineError::ConflictRetriesExhausted { .. } => {
                ErrorClass::Backend
            }
        }
    }

    /// Whether retrying the whole command could plausibly succeed.
    ///
    /// Validation and logic errors never are; backend errors are when the
    /// underlying failure was transport-level.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Backend(e) => e.is_retryable(),
            EngineError::ConflictRetriesExhausted { .. } => true,
            _ => false,
        }
    }
}
