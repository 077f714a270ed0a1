//! JSON file persistence
//!
//! A missing file loads as the empty value; every other I/O or parse
//! failure is a `PositionPersistence` error. Writes go through a temp file
//! and a rename so a crash never leaves a truncated snapshot behind.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::position::manager::Position;
use crate::strategy::TrendState;

/// Open positions snapshot
pub type PositionStore = JsonStore<Vec<Position>>;

/// Per-asset trend states
pub type TrendStateStore = JsonStore<HashMap<String, TrendState>>;

#[derive(Debug, Clone)]
pub struct JsonStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<T> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No state at {}, starting fresh", self.path.display());
                return Ok(T::default());
            }
            Err(e) => {
                return Err(Error::PositionPersistence(format!(
                    "read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        serde_json::from_str(&data).map_err(|e| {
            Error::PositionPersistence(format!("parse {}: {}", self.path.display(), e))
        })
    }

    pub async fn save(&self, value: &T) -> Result<()> {
        let data = serde_json::to_string_pretty(value)
            .map_err(|e| Error::PositionPersistence(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::PositionPersistence(format!("mkdir {}: {}", parent.display(), e)))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| Error::PositionPersistence(format!("write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::PositionPersistence(format!("rename {}: {}", self.path.display(), e)))?;

        debug!("Saved {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrendStateStore::new(dir.path().join("absent.json"));
        let states = tokio_test::block_on(store.load()).unwrap();
        assert!(states.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrendStateStore::new(dir.path().join("nested/data/asset_states.json"));

        let mut states = HashMap::new();
        states.insert("JUP".to_string(), TrendState::Bullish);
        store.save(&states).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.get("JUP"), Some(&TrendState::Bullish));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = PositionStore::new(&path);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, Error::PositionPersistence(_)));
    }

    #[tokio::test]
    async fn test_unreadable_path_is_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where a file is expected
        let store = PositionStore::new(dir.path());
        assert!(store.load().await.is_err());
    }
}
