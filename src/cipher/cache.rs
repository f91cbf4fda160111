//! Persistence of assembled cipher programs with a freshness window

use crate::cipher::assemble::AssembledProgram;
use crate::error::SigfetchError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use moka::future::Cache;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Opaque key-value persistence for cache records.
///
/// A missing record is never an error.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a record
    async fn read(&self, key: &str) -> Option<Vec<u8>>;

    /// Write a record, replacing any previous one
    async fn write(&self, key: &str, blob: Vec<u8>) -> Result<(), SigfetchError>;

    /// Remove a record
    async fn remove(&self, key: &str);
}

/// One JSON file per record inside a cache directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn read(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(blob) => Some(blob),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read cache record {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn write(&self, key: &str, blob: Vec<u8>) -> Result<(), SigfetchError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path_for(key), blob).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) {
        let path = self.path_for(key);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove cache record {}: {}", path.display(), e);
            }
        }
    }
}

/// In-process store backed by moka
#[derive(Clone)]
pub struct MemoryStore {
    records: Cache<String, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: Cache::builder().max_capacity(64).build(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn read(&self, key: &str) -> Option<Vec<u8>> {
        self.records.get(key).await
    }

    async fn write(&self, key: &str, blob: Vec<u8>) -> Result<(), SigfetchError> {
        self.records.insert(key.to_string(), blob).await;
        Ok(())
    }

    async fn remove(&self, key: &str) {
        self.records.invalidate(key).await;
    }
}

/// Cache of assembled programs keyed by script identifier
#[derive(Clone)]
pub struct CipherCache {
    store: Option<Arc<dyn CacheStore>>,
    freshness: Duration,
}

impl CipherCache {
    /// Create a cache over `store` with a one hour freshness window
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store: Some(store),
            freshness: Duration::hours(1),
        }
    }

    /// Cache that never stores anything
    pub fn disabled() -> Self {
        Self {
            store: None,
            freshness: Duration::hours(1),
        }
    }

    /// In-memory cache
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// File-backed cache under `dir`
    pub fn on_disk(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileStore::new(dir)))
    }

    /// Set the freshness window
    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    /// Check whether a store is attached
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Fetch a fresh program for `script_id`
    pub async fn lookup(&self, script_id: &str) -> Option<AssembledProgram> {
        self.lookup_at(script_id, Utc::now()).await
    }

    /// Fetch a program for `script_id` that is fresh as of `now`
    pub async fn lookup_at(&self, script_id: &str, now: DateTime<Utc>) -> Option<AssembledProgram> {
        let store = self.store.as_ref()?;
        let blob = store.read(script_id).await?;
        let program: AssembledProgram = match serde_json::from_slice(&blob) {
            Ok(program) => program,
            Err(e) => {
                warn!("Discarding unreadable cipher cache entry: {}", e);
                return None;
            }
        };

        if !program.is_valid_for(script_id, now, self.freshness) {
            debug!(
                "Cipher cache entry for {} rejected (stored for {}, created {})",
                script_id, program.script_id, program.created
            );
            return None;
        }

        debug!("Cipher cache hit for {}", script_id);
        Some(program)
    }

    /// Persist `program` under `script_id`
    pub async fn store(&self, script_id: &str, program: &AssembledProgram) -> Result<(), SigfetchError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let blob = serde_json::to_vec(program)?;
        store.write(script_id, blob).await
    }

    /// Drop any entry for `script_id`
    pub async fn invalidate(&self, script_id: &str) {
        if let Some(store) = &self.store {
            store.remove(script_id).await;
        }
    }
}
