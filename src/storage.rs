//! Key-value storage backends
//!
//! The engine only needs point reads, point writes and atomic batches, so both
//! backends expose exactly that through [`KvBackend`].

use crate::config::{StorageBackendKind, StorageConfig};
use crate::errors::StorageError;
use dashmap::DashMap;
use rocksdb::{Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

pub trait KvBackend: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    /// Write every pair or none of them
    fn batch_write(&self, items: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError>;
}

/// Open the backend selected in the storage configuration
pub fn open_backend(config: &StorageConfig) -> Result<Arc<dyn KvBackend>, StorageError> {
    match config.backend {
        StorageBackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        StorageBackendKind::Rocksdb => {
            if config.clear_on_start {
                tracing::warn!(path = %config.data_directory, "Clearing database on start");
                let _ = std::fs::remove_dir_all(&config.data_directory);
            }
            Ok(Arc::new(RocksBackend::new(&config.data_directory)?))
        }
    }
}

/// Process-local store, used by tests and `--memory` runs
#[derive(Default)]
pub struct MemoryBackend {
    entries: DashMap<Vec<u8>, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    fn batch_write(&self, items: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError> {
        for (key, value) in items {
            self.entries.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

/// RocksDB-backed store
#[derive(Clone)]
pub struct RocksBackend {
    db: Arc<DB>,
}

impl RocksBackend {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path.as_ref()).map_err(|e| {
            StorageError::DatabaseOpenFailed(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl KvBackend for RocksBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db.put(key, value).map_err(StorageError::from)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.db.delete(key).map_err(StorageError::from)
    }

    fn batch_write(&self, items: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        for (key, value) in items {
            batch.put(key, value);
        }
        self.db.write(batch).map_err(StorageError::from)
    }
}
