//! Content hashing for local trees.

use std::io::Read;
use std::path::Path;

use crate::error::EngineError;

/// Compute a single blake3 digest over a file or directory tree.
///
/// Regular files are visited in sorted order; each file's path relative to
/// the root and its byte content feed the hasher, so the digest changes
/// exactly when the tree's structure or content changes. The digest is an
/// informational fingerprint stored in version metadata; it is never
/// verified against the uploaded bytes.
pub fn hash_tree(path: &Path) -> Result<String, EngineError> {
    if !path.exists() {
        return Err(EngineError::LocalPathMissing(path.to_path_buf()));
    }

    let mut hasher = blake3::Hasher::new();
    for entry in walkdir::WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let msg = e.to_string();
            EngineError::Io(e.into_io_error().unwrap_or_else(|| std::io::Error::other(msg)))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(path)
            .unwrap_or_else(|_| entry.path());
        // Normalize separators so the digest is platform-independent.
        let rel_key = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        hasher.update(rel_key.as_bytes());
        hasher.update(&[0]);

        let mut file = std::fs::File::open(entry.path())?;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        hasher.update(&[0]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}
