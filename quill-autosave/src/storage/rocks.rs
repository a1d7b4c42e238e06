//! RocksDB-backed local store.
//!
//! Column families:
//! - `documents` — Live document records (bincode, LZ4 compressed)
//! - `metadata`  — Owner, version counter and sizes per document (bincode)
//! - `versions`  — Immutable version snapshots (LZ4 compressed, keyed by doc_id:version)
//! - `patterns`  — Learned editing patterns (bincode, keyed by PatternKey)
//! - `drafts`    — Unsaved content journal (LZ4 compressed, keyed by owner:doc_id)
//!
//! The store implements every collaborator contract the engine consumes, so
//! a single `Arc<LocalStore>` can stand in for the remote document store,
//! the pattern store and the draft journal.

use async_trait::async_trait;
use quill_core::{
    unix_now, DocumentFields, DocumentId, DocumentStore, DraftStore, EditableDocument,
    EditingPattern, OwnerId, PatternKey, PatternStore, StoreFailure, VersionDraft,
    VersionSnapshot,
};
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// Column family names.
const CF_DOCUMENTS: &str = "documents";
const CF_METADATA: &str = "metadata";
const CF_VERSIONS: &str = "versions";
const CF_PATTERNS: &str = "patterns";
const CF_DRAFTS: &str = "drafts";

/// All column family names for initialization.
const COLUMN_FAMILIES: &[&str] = &[CF_DOCUMENTS, CF_METADATA, CF_VERSIONS, CF_PATTERNS, CF_DRAFTS];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: true; saves are infrequent)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 256)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 16MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("quill_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: true,
            max_open_files: 256,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Create config for testing (small caches, no fsync).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

/// Per-document bookkeeping stored next to the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub doc_id: DocumentId,
    pub owner_id: OwnerId,
    /// Highest version number assigned so far (0 = no versions)
    pub latest_version: u64,
    /// Uncompressed record size in bytes
    pub record_size: u64,
    /// Compressed record size in bytes
    pub compressed_size: u64,
    /// Creation timestamp (seconds since epoch)
    pub created_at: u64,
    /// Last modified timestamp (seconds since epoch)
    pub updated_at: u64,
}

impl DocumentMetadata {
    fn new(doc_id: DocumentId, owner_id: OwnerId) -> Self {
        let now = unix_now();
        Self {
            doc_id,
            owner_id,
            latest_version: 0,
            record_size: 0,
            compressed_size: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Storage errors.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// RocksDB internal error
    DatabaseError(String),
    /// Document not found
    NotFound(Uuid),
    /// Caller does not own the document
    NotOwned { doc_id: Uuid, owner: Uuid },
    /// Version snapshot not found
    VersionNotFound { doc_id: Uuid, version: u64 },
    /// Serialization failed
    SerializationError(String),
    /// Deserialization failed
    DeserializationError(String),
    /// Compression error
    CompressionError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DatabaseError(e) => write!(f, "Database error: {e}"),
            StoreError::NotFound(id) => write!(f, "Document not found: {id}"),
            StoreError::NotOwned { doc_id, owner } => {
                write!(f, "Document {doc_id} is not owned by {owner}")
            }
            StoreError::VersionNotFound { doc_id, version } => {
                write!(f, "Version {version} of document {doc_id} not found")
            }
            StoreError::SerializationError(e) => write!(f, "Serialization error: {e}"),
            StoreError::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            StoreError::CompressionError(e) => write!(f, "Compression error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

impl From<StoreError> for StoreFailure {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => StoreFailure::NotFound(id),
            StoreError::NotOwned { doc_id, owner } => StoreFailure::NotOwned { doc_id, owner },
            other => StoreFailure::Unavailable(other.to_string()),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
    Ok(value)
}

fn decompress(bytes: &[u8]) -> Result<Vec<u8>, StoreError> {
    lz4_flex::decompress_size_prepended(bytes).map_err(|e| StoreError::CompressionError(e.to_string()))
}

/// RocksDB-backed local store.
pub struct LocalStore {
    /// RocksDB instance (single-threaded mode — concurrency via tokio)
    db: DBWithThreadMode<SingleThreaded>,
    /// Store configuration
    config: StoreConfig,
    /// Serializes metadata read-modify-write cycles
    meta_lock: Mutex<()>,
}

impl LocalStore {
    /// Open the store at the configured path.
    ///
    /// Creates the database and column families if they don't exist.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        log::info!("Opened local store at {}", config.path.display());

        Ok(Self {
            db,
            config,
            meta_lock: Mutex::new(()),
        })
    }

    /// Build column-family-specific options.
    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_VERSIONS => {
                // Append-only, prefix-scanned by doc_id
                opts.set_max_write_buffer_number(4);
                opts.set_prefix_extractor(rocksdb::SliceTransform::create_fixed_prefix(16));
                // Values are already LZ4 framed
                opts.set_compression_type(DBCompressionType::None);
            }
            CF_DOCUMENTS | CF_DRAFTS => {
                opts.set_max_write_buffer_number(2);
                opts.set_compression_type(DBCompressionType::None);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            CF_METADATA | CF_PATTERNS => {
                // Small values, frequent reads
                opts.set_max_write_buffer_number(2);
                opts.set_compression_type(DBCompressionType::Lz4);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            _ => {}
        }

        opts
    }

    fn write_opts(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }

    fn lock_meta(&self) -> std::sync::MutexGuard<'_, ()> {
        self.meta_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ─── Documents ────────────────────────────────────────────────────

    /// Create a new document owned by `owner`.
    pub fn create_document(
        &self,
        owner: OwnerId,
        fields: DocumentFields,
    ) -> Result<EditableDocument, StoreError> {
        let doc = EditableDocument::new(Uuid::new_v4(), owner, fields);
        let _guard = self.lock_meta();
        let meta = DocumentMetadata::new(doc.id, owner);
        self.write_document(&doc, meta)?;
        Ok(doc)
    }

    /// Overwrite a document's fields after checking ownership.
    pub fn update_document(
        &self,
        owner: OwnerId,
        doc_id: DocumentId,
        fields: DocumentFields,
    ) -> Result<EditableDocument, StoreError> {
        let _guard = self.lock_meta();
        let meta = self.load_metadata(doc_id)?;
        if meta.owner_id != owner {
            return Err(StoreError::NotOwned { doc_id, owner });
        }
        let mut doc = self.load_document(doc_id)?;
        doc.apply(fields);
        self.write_document(&doc, meta)?;
        Ok(doc)
    }

    fn write_document(&self, doc: &EditableDocument, mut meta: DocumentMetadata) -> Result<(), StoreError> {
        let cf_docs = self.cf(CF_DOCUMENTS)?;
        let cf_meta = self.cf(CF_METADATA)?;

        let raw = encode(doc)?;
        let compressed = lz4_flex::compress_prepend_size(&raw);
        meta.record_size = raw.len() as u64;
        meta.compressed_size = compressed.len() as u64;
        meta.updated_at = doc.updated_at;

        // Atomic batch write: record + metadata
        let mut batch = WriteBatch::default();
        let key = doc.id.as_bytes().to_vec();
        batch.put_cf(&cf_docs, &key, &compressed);
        batch.put_cf(&cf_meta, &key, encode(&meta)?);
        self.db.write_opt(batch, &self.write_opts())?;
        Ok(())
    }

    pub fn load_document(&self, doc_id: DocumentId) -> Result<EditableDocument, StoreError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        match self.db.get_cf(&cf, doc_id.as_bytes())? {
            Some(compressed) => decode(&decompress(&compressed)?),
            None => Err(StoreError::NotFound(doc_id)),
        }
    }

    pub fn load_metadata(&self, doc_id: DocumentId) -> Result<DocumentMetadata, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        match self.db.get_cf(&cf, doc_id.as_bytes())? {
            Some(bytes) => decode(&bytes),
            None => Err(StoreError::NotFound(doc_id)),
        }
    }

    pub fn document_exists(&self, doc_id: DocumentId) -> Result<bool, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        Ok(self.db.get_cf(&cf, doc_id.as_bytes())?.is_some())
    }

    /// List all document IDs, optionally restricted to one owner.
    pub fn list_documents(&self, owner: Option<OwnerId>) -> Result<Vec<DocumentId>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        let mut doc_ids = Vec::new();

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            let meta: DocumentMetadata = decode(&value)?;
            if owner.map_or(true, |o| o == meta.owner_id) {
                doc_ids.push(meta.doc_id);
            }
        }

        Ok(doc_ids)
    }

    /// Delete a document with its metadata, versions and draft.
    pub fn delete_document(&self, owner: OwnerId, doc_id: DocumentId) -> Result<(), StoreError> {
        let _guard = self.lock_meta();
        let meta = self.load_metadata(doc_id)?;
        if meta.owner_id != owner {
            return Err(StoreError::NotOwned { doc_id, owner });
        }

        let cf_docs = self.cf(CF_DOCUMENTS)?;
        let cf_meta = self.cf(CF_METADATA)?;
        let cf_versions = self.cf(CF_VERSIONS)?;
        let cf_drafts = self.cf(CF_DRAFTS)?;

        let key = doc_id.as_bytes().to_vec();
        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_docs, &key);
        batch.delete_cf(&cf_meta, &key);
        batch.delete_cf(&cf_drafts, Self::draft_key(owner, Some(doc_id)));

        for version_key in self.version_keys(doc_id)? {
            batch.delete_cf(&cf_versions, &version_key);
        }

        self.db.write_opt(batch, &self.write_opts())?;
        Ok(())
    }

    // ─── Versions ─────────────────────────────────────────────────────

    /// Append a version snapshot, assigning the next version number.
    pub fn create_version(
        &self,
        owner: OwnerId,
        doc_id: DocumentId,
        draft: VersionDraft,
    ) -> Result<VersionSnapshot, StoreError> {
        let _guard = self.lock_meta();
        let mut meta = self.load_metadata(doc_id)?;
        if meta.owner_id != owner {
            return Err(StoreError::NotOwned { doc_id, owner });
        }

        meta.latest_version += 1;
        let snapshot = draft.into_snapshot(doc_id, meta.latest_version, unix_now());
        let compressed = lz4_flex::compress_prepend_size(&encode(&snapshot)?);

        let cf_versions = self.cf(CF_VERSIONS)?;
        let cf_meta = self.cf(CF_METADATA)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_versions, Self::version_key(doc_id, snapshot.version), &compressed);
        batch.put_cf(&cf_meta, doc_id.as_bytes(), encode(&meta)?);
        self.db.write_opt(batch, &self.write_opts())?;

        Ok(snapshot)
    }

    pub fn load_version(&self, doc_id: DocumentId, version: u64) -> Result<VersionSnapshot, StoreError> {
        let cf = self.cf(CF_VERSIONS)?;
        match self.db.get_cf(&cf, Self::version_key(doc_id, version))? {
            Some(compressed) => decode(&decompress(&compressed)?),
            None => Err(StoreError::VersionNotFound { doc_id, version }),
        }
    }

    /// All snapshots of a document in version order.
    pub fn list_versions(&self, doc_id: DocumentId) -> Result<Vec<VersionSnapshot>, StoreError> {
        let cf = self.cf(CF_VERSIONS)?;
        let start_key = Self::version_key(doc_id, 0);

        let mut versions = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&start_key, rocksdb::Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            // Stop once we've passed this document's key prefix
            if key.len() < 24 || &key[..16] != doc_id.as_bytes() {
                break;
            }
            versions.push(decode(&decompress(&value)?)?);
        }

        Ok(versions)
    }

    pub fn latest_version_number(&self, doc_id: DocumentId) -> Result<u64, StoreError> {
        Ok(self.load_metadata(doc_id)?.latest_version)
    }

    fn version_keys(&self, doc_id: DocumentId) -> Result<Vec<Vec<u8>>, StoreError> {
        let cf = self.cf(CF_VERSIONS)?;
        let start_key = Self::version_key(doc_id, 0);

        let mut keys = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&start_key, rocksdb::Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if key.len() < 24 || &key[..16] != doc_id.as_bytes() {
                break;
            }
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    // ─── Patterns ─────────────────────────────────────────────────────

    pub fn load_pattern(&self, key: &PatternKey) -> Result<Option<EditingPattern>, StoreError> {
        let cf = self.cf(CF_PATTERNS)?;
        match self.db.get_cf(&cf, key.to_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn save_pattern(&self, key: &PatternKey, pattern: &EditingPattern) -> Result<(), StoreError> {
        let cf = self.cf(CF_PATTERNS)?;
        self.db
            .put_cf_opt(&cf, key.to_bytes(), encode(pattern)?, &self.write_opts())?;
        Ok(())
    }

    // ─── Drafts ───────────────────────────────────────────────────────

    pub fn save_draft(
        &self,
        owner: OwnerId,
        doc_id: Option<DocumentId>,
        content: &str,
    ) -> Result<(), StoreError> {
        let cf = self.cf(CF_DRAFTS)?;
        let compressed = lz4_flex::compress_prepend_size(content.as_bytes());
        self.db
            .put_cf_opt(&cf, Self::draft_key(owner, doc_id), &compressed, &self.write_opts())?;
        Ok(())
    }

    pub fn load_draft(&self, owner: OwnerId, doc_id: Option<DocumentId>) -> Result<Option<String>, StoreError> {
        let cf = self.cf(CF_DRAFTS)?;
        match self.db.get_cf(&cf, Self::draft_key(owner, doc_id))? {
            Some(compressed) => {
                let bytes = decompress(&compressed)?;
                String::from_utf8(bytes)
                    .map(Some)
                    .map_err(|e| StoreError::DeserializationError(e.to_string()))
            }
            None => Ok(None),
        }
    }

    pub fn clear_draft(&self, owner: OwnerId, doc_id: Option<DocumentId>) -> Result<(), StoreError> {
        let cf = self.cf(CF_DRAFTS)?;
        self.db
            .delete_cf_opt(&cf, Self::draft_key(owner, doc_id), &self.write_opts())?;
        Ok(())
    }

    /// Force a flush of memtables to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::DatabaseError(format!("Column family '{name}' not found")))
    }

    /// Build a version key: doc_id (16 bytes) + version (8 bytes big-endian).
    fn version_key(doc_id: DocumentId, version: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(doc_id.as_bytes());
        key.extend_from_slice(&version.to_be_bytes());
        key
    }

    /// Build a draft key: owner (16 bytes) + doc_id (16 bytes, nil when unsaved).
    fn draft_key(owner: OwnerId, doc_id: Option<DocumentId>) -> Vec<u8> {
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(owner.as_bytes());
        key.extend_from_slice(doc_id.unwrap_or_else(Uuid::nil).as_bytes());
        key
    }
}

/// Get number of CPU cores for RocksDB parallelism.
fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn create(&self, owner: OwnerId, fields: DocumentFields) -> Result<DocumentId, StoreFailure> {
        Ok(self.create_document(owner, fields)?.id)
    }

    async fn owner_of(&self, doc_id: DocumentId) -> Result<Option<OwnerId>, StoreFailure> {
        match self.load_metadata(doc_id) {
            Ok(meta) => Ok(Some(meta.owner_id)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        owner: OwnerId,
        doc_id: DocumentId,
        fields: DocumentFields,
    ) -> Result<(), StoreFailure> {
        self.update_document(owner, doc_id, fields)?;
        Ok(())
    }

    async fn create_version(
        &self,
        owner: OwnerId,
        doc_id: DocumentId,
        draft: VersionDraft,
    ) -> Result<u64, StoreFailure> {
        Ok(LocalStore::create_version(self, owner, doc_id, draft)?.version)
    }

    async fn load_version(
        &self,
        doc_id: DocumentId,
        version: u64,
    ) -> Result<Option<VersionSnapshot>, StoreFailure> {
        match LocalStore::load_version(self, doc_id, version) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(StoreError::VersionNotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_versions(&self, doc_id: DocumentId) -> Result<Vec<VersionSnapshot>, StoreFailure> {
        Ok(LocalStore::list_versions(self, doc_id)?)
    }
}

impl PatternStore for LocalStore {
    fn load_pattern(&self, key: &PatternKey) -> Result<Option<EditingPattern>, StoreFailure> {
        Ok(LocalStore::load_pattern(self, key)?)
    }

    fn save_pattern(&self, key: &PatternKey, pattern: &EditingPattern) -> Result<(), StoreFailure> {
        Ok(LocalStore::save_pattern(self, key, pattern)?)
    }
}

impl DraftStore for LocalStore {
    fn save_draft(&self, owner: OwnerId, doc_id: Option<DocumentId>, content: &str) -> Result<(), StoreFailure> {
        Ok(LocalStore::save_draft(self, owner, doc_id, content)?)
    }

    fn load_draft(&self, owner: OwnerId, doc_id: Option<DocumentId>) -> Result<Option<String>, StoreFailure> {
        Ok(LocalStore::load_draft(self, owner, doc_id)?)
    }

    fn clear_draft(&self, owner: OwnerId, doc_id: Option<DocumentId>) -> Result<(), StoreFailure> {
        Ok(LocalStore::clear_draft(self, owner, doc_id)?)
    }
}
