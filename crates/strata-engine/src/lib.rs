//! Versioning engine orchestrating manifest read/mutate/write cycles
//! against a storage backend.
//!
//! Each command is a one-shot execution: fetch the current manifest (when
//! one must exist), mutate it in memory, perform the object operations, and
//! write the manifest back under a generation precondition. There is no
//! persistent in-process state between commands.

pub mod engine;
pub mod error;
pub mod hash;
pub mod path;

pub use engine::{AddReport, InitOutcome, VersioningEngine};
pub use error::{EngineError, ErrorClass};
pub use hash::hash_tree;
pub use path::versioned_key;

#[cfg(test)]
mod tests;
