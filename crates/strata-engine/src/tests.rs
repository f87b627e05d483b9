//! Tests for the versioning engine, driven against the in-memory and
//! filesystem backends.

use std::path::Path;
use std::sync::Arc;

use strata_backend::{Backend, FaultBackend, FsBackend, MemoryBackend};
use strata_types::{AssetKind, Manifest, DEFAULT_MANIFEST_FILENAME};
use tempfile::TempDir;

use crate::engine::{InitOutcome, VersioningEngine};
use crate::error::{EngineError, ErrorClass};

fn memory_engine() -> (VersioningEngine, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let engine = VersioningEngine::new(backend.clone(), DEFAULT_MANIFEST_FILENAME);
    (engine, backend)
}

/// A local directory named `data` containing one CSV file.
fn data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    std::fs::create_dir(&data).unwrap();
    std::fs::write(data.join("a.csv"), "col1,col2\n1,2\n").unwrap();
    dir
}

async fn remote_manifest(backend: &MemoryBackend, dataset: &str) -> Manifest {
    let body = backend
        .get_object(dataset, DEFAULT_MANIFEST_FILENAME)
        .await
        .unwrap();
    Manifest::parse(&body.data).unwrap()
}

async fn object_keys(backend: &MemoryBackend, dataset: &str, prefix: &str) -> Vec<String> {
    backend
        .list_prefix(dataset, prefix)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.key)
        .collect()
}

#[tokio::test]
async fn test_init_then_versions_is_empty() {
    let (engine, _) = memory_engine();
    let outcome = engine.init("ds1", None).await.unwrap();

    let InitOutcome::Created { manifest } = outcome else {
        panic!("expected a generated manifest");
    };
    assert_eq!(manifest.kind, AssetKind::Dataset);
    assert!(manifest.name.starts_with("dataset-"));

    assert!(engine.versions("ds1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_init_twice_fails() {
    let (engine, _) = memory_engine();
    engine.init("ds1", None).await.unwrap();

    let err = engine.init("ds1", None).await.unwrap_err();
    assert!(matches!(err, EngineError::ManifestAlreadyExists { .. }));
    assert_eq!(err.class(), ErrorClass::Validation);
}

#[tokio::test]
async fn test_init_with_local_manifest() {
    let (engine, backend) = memory_engine();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("my-manifest.yaml");
    std::fs::write(&path, "name: sales\ntype: dataset\nversions: {}\n").unwrap();

    let outcome = engine.init("ds1", Some(&path)).await.unwrap();
    assert!(matches!(outcome, InitOutcome::Uploaded { ref name } if name == "sales"));

    let remote = remote_manifest(&backend, "ds1").await;
    assert_eq!(remote.name, "sales");
    assert!(remote.versions.is_empty());
}

#[tokio::test]
async fn test_init_rejects_invalid_local_manifest() {
    let (engine, backend) = memory_engine();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.yaml");
    std::fs::write(&path, "name: \"\"\ntype: dataset\n").unwrap();

    let err = engine.init("ds1", Some(&path)).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);

    // Nothing was uploaded.
    assert!(backend
        .stat_object("ds1", DEFAULT_MANIFEST_FILENAME)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_new_version_identifiers_strictly_increase() {
    let (engine, _) = memory_engine();
    engine.init("ds1", None).await.unwrap();

    let v1 = engine.new_version("ds1").await.unwrap();
    let v2 = engine.new_version("ds1").await.unwrap();
    let v3 = engine.new_version("ds1").await.unwrap();

    // Minted within the same second these would collide; the engine bumps
    // forward, so they are strictly increasing.
    assert!(v1 < v2 && v2 < v3);
    assert_eq!(engine.latest("ds1").await.unwrap(), v3);
    assert_eq!(engine.versions("ds1").await.unwrap(), vec![v3, v2, v1]);
}

#[tokio::test]
async fn test_new_version_records_empty_metadata() {
    let (engine, backend) = memory_engine();
    engine.init("ds1", None).await.unwrap();
    let v = engine.new_version("ds1").await.unwrap();

    let remote = remote_manifest(&backend, "ds1").await;
    assert!(remote.versions[&v].is_empty());
}

#[tokio::test]
async fn test_latest_without_versions_fails() {
    let (engine, _) = memory_engine();
    engine.init("ds1", None).await.unwrap();

    let err = engine.latest("ds1").await.unwrap_err();
    assert!(matches!(err, EngineError::NoVersions { .. }));
    assert_eq!(err.class(), ErrorClass::Logic);
}

#[tokio::test]
async fn test_add_uploads_under_latest_version() {
    let (engine, backend) = memory_engine();
    let dir = data_dir();
    engine.init("ds1", None).await.unwrap();
    let v = engine.new_version("ds1").await.unwrap();

    let report = engine.add("ds1", &dir.path().join("data")).await.unwrap();
    assert_eq!(report.version, v);
    assert_eq!(report.basename, "data");
    assert_eq!(report.files_uploaded, 1);

    // The top-level folder name is retained inside the version.
    assert_eq!(
        object_keys(&backend, "ds1", &format!("{v}/")).await,
        vec![format!("{v}/data/a.csv")]
    );

    let remote = remote_manifest(&backend, "ds1").await;
    assert_eq!(remote.versions[&v]["data"], report.hash);
}

#[tokio::test]
async fn test_add_single_file_uses_basename() {
    let (engine, backend) = memory_engine();
    let dir = data_dir();
    engine.init("ds1", None).await.unwrap();
    let v = engine.new_version("ds1").await.unwrap();

    let report = engine
        .add("ds1", &dir.path().join("data").join("a.csv"))
        .await
        .unwrap();
    assert_eq!(report.basename, "a.csv");
    assert_eq!(
        object_keys(&backend, "ds1", &format!("{v}/")).await,
        vec![format!("{v}/a.csv")]
    );
}

#[tokio::test]
async fn test_add_without_versions_fails() {
    let (engine, _) = memory_engine();
    let dir = data_dir();
    engine.init("ds1", None).await.unwrap();

    let err = engine.add("ds1", &dir.path().join("data")).await.unwrap_err();
    assert!(matches!(err, EngineError::NoVersions { .. }));
}

#[tokio::test]
async fn test_add_without_manifest_fails() {
    let (engine, _) = memory_engine();
    let dir = data_dir();

    let err = engine.add("ds1", &dir.path().join("data")).await.unwrap_err();
    assert!(matches!(err, EngineError::ManifestMissing { .. }));
}

#[tokio::test]
async fn test_add_missing_local_path_fails_before_upload() {
    let (engine, backend) = memory_engine();
    engine.init("ds1", None).await.unwrap();
    let v = engine.new_version("ds1").await.unwrap();

    let err = engine.add("ds1", Path::new("/no/such/dir")).await.unwrap_err();
    assert!(matches!(err, EngineError::LocalPathMissing(_)));
    assert!(object_keys(&backend, "ds1", &format!("{v}/")).await.is_empty());
}

#[tokio::test]
async fn test_add_is_idempotent_on_object_set_and_hash() {
    let (engine, backend) = memory_engine();
    let dir = data_dir();
    engine.init("ds1", None).await.unwrap();
    let v = engine.new_version("ds1").await.unwrap();

    let first = engine.add("ds1", &dir.path().join("data")).await.unwrap();
    let keys_before = object_keys(&backend, "ds1", &format!("{v}/")).await;

    let second = engine.add("ds1", &dir.path().join("data")).await.unwrap();
    let keys_after = object_keys(&backend, "ds1", &format!("{v}/")).await;

    assert_eq!(keys_before, keys_after);
    assert_eq!(first.hash, second.hash);

    let remote = remote_manifest(&backend, "ds1").await;
    assert_eq!(remote.versions[&v].len(), 1);
}

#[tokio::test]
async fn test_add_merges_entries_across_basenames() {
    let (engine, backend) = memory_engine();
    let dir = data_dir();
    let extra = dir.path().join("extra");
    std::fs::create_dir(&extra).unwrap();
    std::fs::write(extra.join("b.csv"), "x,y\n").unwrap();

    engine.init("ds1", None).await.unwrap();
    let v = engine.new_version("ds1").await.unwrap();
    engine.add("ds1", &dir.path().join("data")).await.unwrap();
    engine.add("ds1", &extra).await.unwrap();

    let remote = remote_manifest(&backend, "ds1").await;
    let meta = &remote.versions[&v];
    assert_eq!(meta.len(), 2);
    assert!(meta.contains_key("data") && meta.contains_key("extra"));
}

#[tokio::test]
async fn test_overwrite_replaces_object_set_and_metadata() {
    let (engine, backend) = memory_engine();
    let dir = data_dir();
    std::fs::write(dir.path().join("data").join("b.csv"), "3,4\n").unwrap();

    engine.init("ds1", None).await.unwrap();
    let v = engine.new_version("ds1").await.unwrap();
    engine.add("ds1", &dir.path().join("data")).await.unwrap();
    assert_eq!(object_keys(&backend, "ds1", &format!("{v}/")).await.len(), 2);

    let fresh = dir.path().join("fresh");
    std::fs::create_dir(&fresh).unwrap();
    std::fs::write(fresh.join("only.csv"), "9,9\n").unwrap();

    let report = engine.overwrite("ds1", &v, &fresh).await.unwrap();
    assert_eq!(report.basename, "fresh");

    // Exactly the new files, never a superset including stale ones.
    assert_eq!(
        object_keys(&backend, "ds1", &format!("{v}/")).await,
        vec![format!("{v}/fresh/only.csv")]
    );

    let remote = remote_manifest(&backend, "ds1").await;
    let meta = &remote.versions[&v];
    assert_eq!(meta.len(), 1);
    assert_eq!(meta["fresh"], report.hash);
}

#[tokio::test]
async fn test_overwrite_missing_version_fails() {
    let (engine, _) = memory_engine();
    let dir = data_dir();
    engine.init("ds1", None).await.unwrap();

    let err = engine
        .overwrite("ds1", "1700000000", &dir.path().join("data"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::VersionNotFound { .. }));
    assert_eq!(err.class(), ErrorClass::Logic);
}

#[tokio::test]
async fn test_delete_removes_version_and_leaves_others() {
    let (engine, backend) = memory_engine();
    let dir = data_dir();
    engine.init("ds1", None).await.unwrap();
    let v1 = engine.new_version("ds1").await.unwrap();
    engine.add("ds1", &dir.path().join("data")).await.unwrap();
    let v2 = engine.new_version("ds1").await.unwrap();
    engine.add("ds1", &dir.path().join("data")).await.unwrap();

    engine.delete("ds1", &v2).await.unwrap();

    assert_eq!(engine.versions("ds1").await.unwrap(), vec![v1.clone()]);
    assert!(object_keys(&backend, "ds1", &format!("{v2}/")).await.is_empty());

    // The surviving version's objects and metadata are untouched.
    assert!(!object_keys(&backend, "ds1", &format!("{v1}/")).await.is_empty());
    let remote = remote_manifest(&backend, "ds1").await;
    assert_eq!(remote.versions[&v1].len(), 1);
}

#[tokio::test]
async fn test_delete_missing_version_is_not_an_error() {
    let (engine, _) = memory_engine();
    engine.init("ds1", None).await.unwrap();
    engine.delete("ds1", "1700000000").await.unwrap();
    assert!(engine.versions("ds1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_with_stuck_objects_still_drops_version() {
    let (setup_engine, backend) = memory_engine();
    let dir = data_dir();
    setup_engine.init("ds1", None).await.unwrap();
    let v = setup_engine.new_version("ds1").await.unwrap();
    setup_engine.add("ds1", &dir.path().join("data")).await.unwrap();

    // One uploaded object refuses to go away.
    let stuck = format!("{v}/data/a.csv");
    let flaky = Arc::new(FaultBackend::new(backend.clone()).stuck_key(&stuck));
    let engine = VersioningEngine::new(flaky, DEFAULT_MANIFEST_FILENAME);

    // The surviving object is reported, not fatal: the version still
    // disappears from the manifest.
    engine.delete("ds1", &v).await.unwrap();
    assert!(engine.versions("ds1").await.unwrap().is_empty());
    assert!(backend.get_object("ds1", &stuck).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_write_conflicts_are_retryable_backend_errors() {
    let (setup_engine, backend) = memory_engine();
    setup_engine.init("ds1", None).await.unwrap();

    // Every manifest write loses to a phantom concurrent writer.
    let flaky = Arc::new(
        FaultBackend::new(backend).conflicting_put(DEFAULT_MANIFEST_FILENAME),
    );
    let engine = VersioningEngine::new(flaky, DEFAULT_MANIFEST_FILENAME);

    let err = engine.new_version("ds1").await.unwrap_err();
    assert!(matches!(err, EngineError::ConflictRetriesExhausted { .. }));
    assert_eq!(err.class(), ErrorClass::Backend);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_concurrent_new_versions_both_land() {
    let (engine, _) = memory_engine();
    let engine = Arc::new(engine);
    engine.init("ds1", None).await.unwrap();

    // Both invocations race on the manifest put; the loser retries against
    // the fresh manifest and mints a distinct identifier.
    let a = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.new_version("ds1").await })
    };
    let b = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.new_version("ds1").await })
    };
    let va = a.await.unwrap().unwrap();
    let vb = b.await.unwrap().unwrap();

    assert_ne!(va, vb);
    assert_eq!(engine.versions("ds1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_scenario_end_to_end() {
    let (engine, backend) = memory_engine();
    let dir = data_dir();

    engine.init("ds1", None).await.unwrap();
    let remote = remote_manifest(&backend, "ds1").await;
    assert_eq!(remote.kind, AssetKind::Dataset);
    assert!(remote.versions.is_empty());

    let v = engine.new_version("ds1").await.unwrap();
    assert_eq!(v.len(), 10, "unix-seconds identifiers are 10 digits wide");

    engine.add("ds1", &dir.path().join("data")).await.unwrap();
    assert_eq!(
        object_keys(&backend, "ds1", "").await.len(),
        2, // the manifest plus the uploaded file
    );

    engine.delete("ds1", &v).await.unwrap();
    assert!(engine.versions("ds1").await.unwrap().is_empty());
    assert!(object_keys(&backend, "ds1", &format!("{v}/")).await.is_empty());
}

#[tokio::test]
async fn test_full_cycle_on_filesystem_backend() {
    let store_dir = TempDir::new().unwrap();
    let backend = Arc::new(FsBackend::new(store_dir.path()).unwrap());
    let engine = VersioningEngine::new(backend.clone(), DEFAULT_MANIFEST_FILENAME);
    let dir = data_dir();

    engine.init("ds1", None).await.unwrap();
    let v = engine.new_version("ds1").await.unwrap();
    engine.add("ds1", &dir.path().join("data")).await.unwrap();

    assert!(store_dir
        .path()
        .join("ds1")
        .join(&v)
        .join("data")
        .join("a.csv")
        .exists());
    assert_eq!(engine.latest("ds1").await.unwrap(), v);

    engine.delete("ds1", &v).await.unwrap();
    assert!(engine.versions("ds1").await.unwrap().is_empty());
    assert!(!store_dir.path().join("ds1").join(&v).exists());
}
