//! Content-keyed store of processed records.
//!
//! One pretty-printed JSON file per input text, named by the SHA-256 of the
//! text, under `output.destination_folder`.

use std::path::{Path, PathBuf};

use coci_common::EventRecord;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Lower-case hex SHA-256 of the CfP text.
pub fn cache_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct ResultCache {
    dir: PathBuf,
}

impl ResultCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Raw persisted JSON for `key`, if present.
    pub async fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => {
                debug!(path = %path.display(), "Cache hit");
                Ok(Some(json))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn store(&self, key: &str, record: &EventRecord) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let json = serde_json::to_string_pretty(record).map_err(PipelineError::InvalidRecord)?;
        tokio::fs::write(&path, json).await?;
        debug!(path = %path.display(), "Result cached");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cache_key_is_sha256_hex() {
        assert_eq!(
            cache_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(cache_key("ISWC 2025"), cache_key("ISWC 2025 "));
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path().join("results"));
        let key = cache_key("call for papers");

        assert!(cache.load(&key).await.unwrap().is_none());

        let record = EventRecord { event_name: "ISWC 2025".to_string(), ..Default::default() };
        let path = cache.store(&key, &record).await.unwrap();
        assert!(path.ends_with(format!("{key}.json")));

        let json = cache.load(&key).await.unwrap().unwrap();
        let back: EventRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
