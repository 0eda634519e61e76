//! Key-value stores holding each scene's encoded activation records.
//!
//! Stores see records only in their encoded text form; decoding and stale
//! record handling belong to the registry.

use std::{
    collections::BTreeMap,
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DOCUMENT_VERSION: u32 = 1;

/// Durable storage for encoded activation records, keyed by scene name.
pub trait ActivationStore: fmt::Debug {
    /// Returns the encoded records saved for `scene`, if any.
    fn load(&self, scene: &str) -> Result<Option<String>, StoreError>;

    /// Replaces the encoded records saved for `scene`.
    fn save(&mut self, scene: &str, encoded: &str) -> Result<(), StoreError>;
}

/// Failures raised while reading or writing persisted records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing file could not be read or written.
    #[error("failed to read/write activation store {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The backing file is not a valid preferences document.
    #[error("activation store {path} is malformed: {source}")]
    Malformed {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// The backing file was written by an incompatible version.
    #[error("activation store {path} has unsupported version {version}")]
    UnsupportedVersion {
        /// File with the unexpected version.
        path: PathBuf,
        /// Version found in the file.
        version: u32,
    },
}

/// In-memory store, useful for tests and for hosts with their own persistence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryActivationStore {
    scenes: BTreeMap<String, String>,
}

impl MemoryActivationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `encoded` for `scene`.
    #[must_use]
    pub fn with_scene(scene: impl Into<String>, encoded: impl Into<String>) -> Self {
        let mut store = Self::new();
        let _ = store.scenes.insert(scene.into(), encoded.into());
        store
    }
}

impl ActivationStore for MemoryActivationStore {
    fn load(&self, scene: &str) -> Result<Option<String>, StoreError> {
        Ok(self.scenes.get(scene).cloned())
    }

    fn save(&mut self, scene: &str, encoded: &str) -> Result<(), StoreError> {
        let _ = self.scenes.insert(scene.to_owned(), encoded.to_owned());
        Ok(())
    }
}

/// Versioned JSON preferences file shared by every scene.
///
/// Each save rewrites the whole document through a temporary file followed by a
/// rename, so a crash mid-write leaves the previous document intact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileActivationStore {
    path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferencesDocument {
    version: u32,
    #[serde(default)]
    scenes: BTreeMap<String, String>,
}

impl FileActivationStore {
    /// Creates a store backed by the file at `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<PreferencesDocument, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(PreferencesDocument {
                    version: DOCUMENT_VERSION,
                    scenes: BTreeMap::new(),
                });
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let document: PreferencesDocument =
            serde_json::from_str(&contents).map_err(|source| StoreError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        if document.version != DOCUMENT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                path: self.path.clone(),
                version: document.version,
            });
        }
        Ok(document)
    }
}

impl ActivationStore for FileActivationStore {
    fn load(&self, scene: &str) -> Result<Option<String>, StoreError> {
        let mut document = self.read_document()?;
        Ok(document.scenes.remove(scene))
    }

    fn save(&mut self, scene: &str, encoded: &str) -> Result<(), StoreError> {
        let mut document = self.read_document()?;
        let _ = document
            .scenes
            .insert(scene.to_owned(), encoded.to_owned());
        let text = serde_json::to_string_pretty(&document).map_err(|source| {
            StoreError::Malformed {
                path: self.path.clone(),
                source,
            }
        })?;
        write_text_atomic(&self.path, &text).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_path_for(path);
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(text.as_bytes())?;
    file.sync_all()?;
    drop(file);
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("activations.json");
    let tmp_name = format!("{file_name}.tmp");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileActivationStore::new(dir.path().join("prefs.json"));
        assert!(store.load("arena").expect("load").is_none());
    }

    #[test]
    fn scenes_are_stored_side_by_side() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("prefs.json");
        let mut store = FileActivationStore::new(&path);
        store.save("arena", "a|b|0.000,0.000,0.000|x").expect("save arena");
        store.save("forest", "").expect("save forest");
        store.save("arena", "a|c|1.000,0.000,0.000|y").expect("overwrite arena");

        let reopened = FileActivationStore::new(&path);
        assert_eq!(
            reopened.load("arena").expect("load").as_deref(),
            Some("a|c|1.000,0.000,0.000|y")
        );
        assert_eq!(reopened.load("forest").expect("load").as_deref(), Some(""));
        assert!(!dir.path().join("nested").join("prefs.json.tmp").exists());
    }

    #[test]
    fn leftover_temp_file_from_an_interrupted_write_is_replaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prefs.json");
        fs::write(dir.path().join("prefs.json.tmp"), "half a docu").expect("write");

        let mut store = FileActivationStore::new(&path);
        store.save("arena", "a|b|0.000,0.000,0.000|x").expect("save");

        assert_eq!(
            FileActivationStore::new(&path).load("arena").expect("load").as_deref(),
            Some("a|b|0.000,0.000,0.000|x")
        );
        assert!(!dir.path().join("prefs.json.tmp").exists());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prefs.json");
        fs::write(&path, r#"{ "version": 7, "scenes": {} }"#).expect("write");
        let store = FileActivationStore::new(&path);
        assert!(matches!(
            store.load("arena"),
            Err(StoreError::UnsupportedVersion { version: 7, .. })
        ));
    }

    #[test]
    fn garbage_is_reported_as_malformed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prefs.json");
        fs::write(&path, "not json").expect("write");
        let store = FileActivationStore::new(&path);
        assert!(matches!(
            store.load("arena"),
            Err(StoreError::Malformed { .. })
        ));
    }

    #[test]
    fn memory_store_round_trips() {
        let mut store = MemoryActivationStore::with_scene("arena", "old");
        store.save("arena", "new").expect("save");
        assert_eq!(store.load("arena").expect("load").as_deref(), Some("new"));
        assert!(store.load("other").expect("load").is_none());
    }
}
