//! Versioned object key resolution.

use std::path::Path;

/// Join a version identifier and a relative file path into one object key.
///
/// Path separators are normalized to `/`, so the same key is produced on
/// every platform. Distinct `(version, relative_path)` pairs never collide:
/// the version occupies the first path segment and the relative path cannot
/// climb out of it.
pub fn versioned_key(version: &str, relative_path: &Path) -> String {
    let mut key = String::from(version);
    for component in relative_path.components() {
        let segment = component.as_os_str().to_string_lossy();
        if segment.is_empty() || segment == "." {
            continue;
        }
        key.push('/');
        key.push_str(&segment);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_joins_version_and_path() {
        assert_eq!(
            versioned_key("1700000000", Path::new("data/a.csv")),
            "1700000000/data/a.csv"
        );
    }

    #[test]
    fn test_single_component() {
        assert_eq!(versioned_key("1700000000", Path::new("a.csv")), "1700000000/a.csv");
    }

    #[test]
    fn test_skips_current_dir_component() {
        assert_eq!(
            versioned_key("1700000000", Path::new("./data/a.csv")),
            "1700000000/data/a.csv"
        );
    }

    #[test]
    fn test_stable() {
        let p = PathBuf::from("data/nested/a.csv");
        assert_eq!(versioned_key("1", &p), versioned_key("1", &p));
    }

    #[test]
    fn test_injective_across_versions() {
        let p = Path::new("data/a.csv");
        assert_ne!(versioned_key("1700000000", p), versioned_key("1700000001", p));
    }
}
