//! Snapshot storage for learned state.
//!
//! Provides the `SnapshotStore` trait with a JSON file and an in-memory
//! implementation. Stores hand back raw JSON so the learning store can
//! apply its own lenient import.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use docmatch_learning::LearningSnapshot;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors from snapshot store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Trait for snapshot stores (file, memory, ...).
pub trait SnapshotStore {
    /// Load the stored snapshot, `None` when nothing has been saved yet.
    fn load(&self) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    /// Persist a snapshot, replacing any previous one.
    fn save(&self, snapshot: &LearningSnapshot) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Store name for logging.
    fn name(&self) -> &'static str;
}

/// Snapshot kept in a single JSON file.
///
/// Saves go to a sibling temp file first and are renamed into place, so a
/// crash mid-write never leaves a truncated snapshot behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl SnapshotStore for JsonFileStore {
    async fn load(&self) -> Result<Option<Value>, StoreError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No snapshot file yet");
                return Ok(None);
            }
            Err(err) => return Err(Self::io_error(&self.path)(err)),
        };

        let value = serde_json::from_str(&text)?;
        tracing::debug!(path = %self.path.display(), bytes = text.len(), "Loaded snapshot");
        Ok(Some(value))
    }

    async fn save(&self, snapshot: &LearningSnapshot) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(Self::io_error(parent))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &body)
            .await
            .map_err(Self::io_error(&temp))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(Self::io_error(&self.path))?;

        tracing::info!(
            path = %self.path.display(),
            patterns = snapshot.patterns.len(),
            terms = snapshot.term_mappings.len(),
            "Saved snapshot"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "json-file"
    }
}

/// Snapshot kept in memory; for tests and embedding hosts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    value: Mutex<Option<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with an existing document.
    pub fn with_value(value: Value) -> Self {
        Self {
            value: Mutex::new(Some(value)),
        }
    }
}

impl SnapshotStore for MemoryStore {
    async fn load(&self) -> Result<Option<Value>, StoreError> {
        Ok(self.value.lock().await.clone())
    }

    async fn save(&self, snapshot: &LearningSnapshot) -> Result<(), StoreError> {
        let value = serde_json::to_value(snapshot)?;
        *self.value.lock().await = Some(value);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmatch_learning::LearningStore;
    use pretty_assertions::assert_eq;

    fn trained() -> LearningStore {
        let mut store = LearningStore::default();
        store.record_match("Exhibit A5-01 Letter", "bundle/A5-01 Letter.pdf", 0.9, true);
        store.record_match("Exhibit A5-02 Letter", "bundle/notes.txt", 0.3, false);
        store
    }

    async fn round_trip(backend: &impl SnapshotStore) {
        let learned = trained();
        backend.save(&learned.export_snapshot()).await.unwrap();

        let value = backend.load().await.unwrap().unwrap();
        let mut restored = LearningStore::default();
        restored.import_snapshot(value).unwrap();
        assert_eq!(restored.statistics(), learned.statistics());
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileStore::new(dir.path().join("nested/learning.json"));
        round_trip(&backend).await;

        // Overwrites leave no temp file behind.
        round_trip(&backend).await;
        let names: Vec<String> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["learning.json".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(backend.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learning.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Json(_)));
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let backend = MemoryStore::new();
        assert!(backend.load().await.unwrap().is_none());
        round_trip(&backend).await;
        assert_eq!(backend.name(), "memory");
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let backend = JsonFileStore::new("/data/learning.json");
        assert_eq!(backend.temp_path(), PathBuf::from("/data/learning.json.tmp"));
    }
}
