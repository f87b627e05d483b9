//! Storage backend trait and implementations.
//!
//! This crate defines the [`Backend`] trait for persisting dataset objects
//! and manifests, along with three concrete backends:
//!
//! - [`S3Backend`] — S3-compatible object storage (AWS, MinIO, Ceph RGW).
//! - [`FsBackend`] — hierarchical filesystem rooted at a base directory.
//! - [`MemoryBackend`] — in-memory storage backed by a `RwLock<HashMap>`,
//!   used for tests and throwaway runs.
//!
//! [`FaultBackend`] wraps any of them and injects storage faults for
//! failure-path testing.

mod error;
mod fault_backend;
mod fs_backend;
mod memory_backend;
mod s3_backend;
mod traits;

pub use error::BackendError;
pub use fault_backend::FaultBackend;
pub use fs_backend::FsBackend;
pub use memory_backend::MemoryBackend;
pub use s3_backend::{S3Backend, S3Settings};
pub use traits::{Backend, ObjectBody, ObjectStat, RemoveFailure, WriteCondition};
