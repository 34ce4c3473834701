// storage/src/db.rs

use crate::{StorageError, StorageResult};
use dag_core::{Hash, Metadata, Record};
use rocksdb::{IteratorMode, Options, DB};
use std::path::Path;
use std::sync::Arc;

/// Column families for the two kinds of persisted state: immutable records
/// and the consensus metadata attached to them.
#[derive(Debug, Clone, Copy)]
pub enum ColumnFamily {
    Records,
    Metadata,
    Meta,
}

impl ColumnFamily {
    fn as_str(&self) -> &'static str {
        match self {
            ColumnFamily::Records => "records",
            ColumnFamily::Metadata => "metadata",
            ColumnFamily::Meta => "meta",
        }
    }

    fn all() -> Vec<Self> {
        vec![Self::Records, Self::Metadata, Self::Meta]
    }
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
    pub create_if_missing: bool,
    pub max_open_files: i32,
    pub write_buffer_size: usize,
    pub max_write_buffer_number: i32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./data".to_string(),
            create_if_missing: true,
            max_open_files: 1024,
            write_buffer_size: 64 * 1024 * 1024,
            max_write_buffer_number: 3,
        }
    }
}

/// The persisted half of storage: records and their metadata, keyed by
/// hash. Everything derived from this (tip caches, height index,
/// verification-child index) lives only in memory, in [`crate::indexes::Indexes`],
/// and is rebuilt from this data on restart.
pub struct Database {
    db: Arc<DB>,
}

impl Database {
    pub fn open(config: DatabaseConfig) -> StorageResult<Self> {
        Self::open_path(&config.path, &config)
    }

    fn open_path(path: impl AsRef<Path>, config: &DatabaseConfig) -> StorageResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);

        let cfs: Vec<_> = ColumnFamily::all().iter().map(|cf| cf.as_str()).collect();
        let db = DB::open_cf(&opts, path, &cfs).map_err(|e| StorageError::Database(e.to_string()))?;

        tracing::info!(path = %config.path, "storage database opened");
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get_record(&self, hash: &Hash) -> StorageResult<Option<Record>> {
        let cf = self.cf(ColumnFamily::Records)?;
        match self.db.get_cf(cf, hash.as_bytes()).map_err(|e| StorageError::Database(e.to_string()))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))?)),
            None => Ok(None),
        }
    }

    pub fn put_record(&self, record: &Record) -> StorageResult<()> {
        let cf = self.cf(ColumnFamily::Records)?;
        let bytes = bincode::serialize(record).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.db
            .put_cf(cf, record.hash.as_bytes(), bytes)
            .map_err(|e| StorageError::Database(e.to_string()))?;
        tracing::debug!(hash = %record.hash, "stored record");
        Ok(())
    }

    pub fn get_metadata(&self, hash: &Hash) -> StorageResult<Option<Metadata>> {
        let cf = self.cf(ColumnFamily::Metadata)?;
        match self.db.get_cf(cf, hash.as_bytes()).map_err(|e| StorageError::Database(e.to_string()))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))?)),
            None => Ok(None),
        }
    }

    pub fn put_metadata(&self, hash: &Hash, metadata: &Metadata) -> StorageResult<()> {
        let cf = self.cf(ColumnFamily::Metadata)?;
        let bytes = bincode::serialize(metadata).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.db.put_cf(cf, hash.as_bytes(), bytes).map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    pub fn store_meta(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let cf = self.cf(ColumnFamily::Meta)?;
        self.db.put_cf(cf, key.as_bytes(), value).map_err(|e| StorageError::Database(e.to_string()))
    }

    pub fn get_meta(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let cf = self.cf(ColumnFamily::Meta)?;
        self.db.get_cf(cf, key.as_bytes()).map_err(|e| StorageError::Database(e.to_string()))
    }

    /// Iterate over every stored record hash, in arbitrary key order. Used
    /// once at startup to rebuild the in-memory indexes.
    pub fn iter_record_hashes(&self) -> StorageResult<Vec<Hash>> {
        let cf = self.cf(ColumnFamily::Records)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StorageError::Database(e.to_string()))?;
            out.push(Hash::from_slice(&key).map_err(|_| StorageError::Corruption("invalid hash key".into()))?);
        }
        Ok(out)
    }

    fn cf(&self, cf_type: ColumnFamily) -> StorageResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(cf_type.as_str())
            .ok_or_else(|| StorageError::Database(format!("{} column family not found", cf_type.as_str())))
    }
}
