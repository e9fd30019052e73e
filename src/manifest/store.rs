use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::manifest::Manifest;
use crate::paths::RalphPaths;

/// Errors that can occur while loading or saving a manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// No manifest exists for the spec.
    #[error("No manifest found at {}. Run \"ralph decompose\" first to split the spec into sub-specs.", path.display())]
    NotFound { path: PathBuf },

    /// IO error reading or writing the manifest.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The manifest is not valid JSON or does not match the schema.
    #[error("Malformed manifest {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The manifest could not be serialized.
    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Manifest persistence under `.ralph/specs/<spec>/manifest.json`.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    paths: RalphPaths,
}

impl ManifestStore {
    pub fn new(paths: RalphPaths) -> Self {
        Self { paths }
    }

    /// Manifest location for a spec.
    pub fn path(&self, spec: &str) -> PathBuf {
        self.paths.manifest_path(spec)
    }

    /// Load the manifest for a spec.
    pub fn load(&self, spec: &str) -> Result<Manifest, ManifestError> {
        let path = self.path(spec);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound { path });
            }
            Err(source) => return Err(ManifestError::Io { path, source }),
        };
        serde_json::from_str(&content).map_err(|source| ManifestError::Parse { path, source })
    }

    /// Persist the manifest for a spec.
    ///
    /// The file is written to a sibling temp file, synced, then renamed over
    /// the target, so a failed save never leaves a truncated manifest behind.
    pub fn save(&self, spec: &str, manifest: &Manifest) -> Result<(), ManifestError> {
        let path = self.path(spec);
        let mut json = serde_json::to_string_pretty(manifest)?;
        json.push('\n');
        write_atomic(&path, json.as_bytes()).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("json.tmp");

    let result = (|| {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{SubSpecEntry, SubSpecStatus};
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> ManifestStore {
        ManifestStore::new(RalphPaths::new(temp_dir.path()))
    }

    #[test]
    fn test_load_missing_manifest_is_not_found() {
        let temp_dir = TempDir::new().expect("temp dir");
        let err = store(&temp_dir).load("auth").unwrap_err();
        assert!(matches!(err, ManifestError::NotFound { .. }));
        assert!(err.to_string().contains("ralph decompose"));
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().expect("temp dir");
        let store = store(&temp_dir);
        let mut manifest = Manifest::from_entries(vec![
            SubSpecEntry::new("a", &[]),
            SubSpecEntry::new("b", &["a"]),
        ]);
        manifest.apply_statuses([("a", SubSpecStatus::Complete)]);

        store.save("auth", &manifest).expect("save");
        let loaded = store.load("auth").expect("load");

        assert_eq!(loaded, manifest);
        assert!(!store.path("auth").with_extension("json.tmp").exists());
    }

    #[test]
    fn test_load_malformed_manifest() {
        let temp_dir = TempDir::new().expect("temp dir");
        let store = store(&temp_dir);
        let path = store.path("auth");
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "{ not json").expect("write");

        let err = store.load("auth").unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
    }

    #[test]
    fn test_failed_save_keeps_previous_manifest() {
        let temp_dir = TempDir::new().expect("temp dir");
        let store = store(&temp_dir);
        let manifest = Manifest::from_entries(vec![SubSpecEntry::new("a", &[])]);
        store.save("auth", &manifest).expect("save");

        // A directory squatting on the temp path makes the write fail.
        let temp_path = store.path("auth").with_extension("json.tmp");
        fs::create_dir_all(&temp_path).expect("block temp path");

        let mut updated = manifest.clone();
        updated.apply_statuses([("a", SubSpecStatus::Failed)]);
        assert!(store.save("auth", &updated).is_err());

        let loaded = store.load("auth").expect("load");
        assert_eq!(loaded.status_of("a"), Some(SubSpecStatus::Pending));
    }
}
