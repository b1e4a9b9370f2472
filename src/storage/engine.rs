//! Per-collection persistence.
//!
//! Every collection owns two files under the storage root:
//! - `<name>.bin`: append-only little-endian `f64` coordinates with bincode
//!   payload images interleaved, read through a memory mapping
//! - `<name>_meta.bin`: one position record per insert, rewritten in full
//!   when a vector is tombstoned
//!
//! All access to one collection's files is serialized by that collection's
//! `RwLock`: reads take it shared, appends and rewrites take it exclusive.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, error, info};

use crate::storage::error::{IoContext, StorageError, StorageResult};
use crate::storage::mapped::MappedRegion;
use crate::storage::payload::{Payload, decode_payload, encode_payload};
use crate::storage::positions::{PositionRecord, decode_records};

/// Number of bytes per stored coordinate.
pub const BYTES_PER_F64: usize = 8;

/// Mutable state of one collection's files, guarded by its lock.
#[derive(Debug)]
struct StoreState {
    region: MappedRegion,
    /// Records currently in the metadata file.
    record_count: u64,
}

#[derive(Debug)]
struct CollectionStore {
    meta_path: PathBuf,
    state: RwLock<StoreState>,
}

/// Storage engine for every collection under one root directory.
#[derive(Debug)]
pub struct StorageEngine {
    root: PathBuf,
    stores: DashMap<String, Arc<CollectionStore>>,
}

impl StorageEngine {
    /// Creates an engine rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).with_path(&root)?;
        Ok(Self {
            root,
            stores: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.bin"))
    }

    pub fn meta_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}_meta.bin"))
    }

    pub fn config_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.json"))
    }

    pub fn indexes_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}_indexes.json"))
    }

    pub fn has_collection(&self, collection: &str) -> bool {
        self.stores.contains_key(collection)
    }

    /// Registers a collection, creating empty backing files if they do not
    /// exist yet, and maps its data file.
    pub fn add_collection(&self, collection: &str) -> StorageResult<()> {
        if self.has_collection(collection) {
            return Ok(());
        }

        let region = MappedRegion::open(self.data_path(collection)).inspect_err(|e| {
            error!("Cannot open data file for collection '{collection}': {e}");
        })?;

        let meta_path = self.meta_path(collection);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&meta_path)
            .with_path(&meta_path)?;
        let record_count = read_records(&meta_path)?.len() as u64;

        debug!(
            "Mapped collection '{collection}' ({} data bytes, {record_count} position records)",
            region.len()
        );

        self.stores.insert(
            collection.to_string(),
            Arc::new(CollectionStore {
                meta_path,
                state: RwLock::new(StoreState {
                    region,
                    record_count,
                }),
            }),
        );
        info!("Storage registered for collection '{collection}'");
        Ok(())
    }

    /// Unmaps a collection and deletes its data, metadata, config and index
    /// definition files.
    pub fn remove_collection(&self, collection: &str) -> StorageResult<()> {
        if let Some((_, store)) = self.stores.remove(collection) {
            // Wait for in-flight readers before the mapping goes away
            let _guard = store.state.write();
        }

        for path in [
            self.data_path(collection),
            self.meta_path(collection),
            self.config_path(collection),
            self.indexes_path(collection),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).with_path(&path),
            }
        }
        info!("Storage removed for collection '{collection}'");
        Ok(())
    }

    /// Appends `coords` and returns the offset of the first value and the
    /// number of values written.
    pub fn write_vector(&self, collection: &str, coords: &[f64]) -> StorageResult<(u64, usize)> {
        let store = self.store(collection)?;
        let mut state = store.state.write();

        let mut bytes = Vec::with_capacity(coords.len() * BYTES_PER_F64);
        for value in coords {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        let path = state.region.path().to_path_buf();
        let offset = state
            .region
            .with_write_access(|file, size| {
                file.seek(SeekFrom::Start(size)).with_path(&path)?;
                file.write_all(&bytes).with_path(&path)?;
                Ok(size)
            })
            .inspect_err(|e| error!("Vector write failed for '{collection}': {e}"))?;

        Ok((offset, coords.len()))
    }

    /// Reads `count` coordinates starting at `offset`.
    ///
    /// Returns an empty vector when the data file has no content.
    pub fn read_vector(&self, collection: &str, offset: u64, count: usize) -> StorageResult<Vec<f64>> {
        let store = self.store(collection)?;
        let state = store.state.read();

        if state.region.is_empty() {
            return Ok(Vec::new());
        }

        let bytes = state
            .region
            .slice(offset, (count * BYTES_PER_F64) as u64)?;
        Ok(bytes
            .chunks_exact(BYTES_PER_F64)
            .map(|chunk| {
                let mut raw = [0u8; BYTES_PER_F64];
                raw.copy_from_slice(chunk);
                f64::from_le_bytes(raw)
            })
            .collect())
    }

    /// Appends one payload image and returns its starting offset.
    ///
    /// The file is grown to its final size before the image is written at
    /// the previous end.
    pub fn write_payload(&self, collection: &str, payload: &Payload) -> StorageResult<u64> {
        let encoded = encode_payload(payload)?;
        let store = self.store(collection)?;
        let mut state = store.state.write();

        let path = state.region.path().to_path_buf();
        state
            .region
            .with_write_access(|file, size| {
                file.set_len(size + encoded.len() as u64).with_path(&path)?;
                file.seek(SeekFrom::Start(size)).with_path(&path)?;
                file.write_all(&encoded).with_path(&path)?;
                Ok(size)
            })
            .inspect_err(|e| error!("Payload write failed for '{collection}': {e}"))
    }

    /// Decodes the payload image starting at `offset`.
    pub fn read_payload(&self, collection: &str, offset: u64) -> StorageResult<Payload> {
        let store = self.store(collection)?;
        let state = store.state.read();
        let bytes = state.region.tail(offset)?;
        let (payload, _) = decode_payload(bytes, offset)?;
        Ok(payload)
    }

    /// Appends one position record and returns its ordinal in the file.
    pub fn append_position(
        &self,
        collection: &str,
        id: &str,
        data_start: i64,
        payload_start: i64,
    ) -> StorageResult<u64> {
        let store = self.store(collection)?;
        let mut state = store.state.write();

        let line = PositionRecord::new(id, data_start, payload_start).to_line()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&store.meta_path)
            .with_path(&store.meta_path)?;
        file.write_all(line.as_bytes())
            .with_path(&store.meta_path)?;

        let ordinal = state.record_count;
        state.record_count += 1;
        Ok(ordinal)
    }

    /// Reads every position record in append order.
    pub fn read_all_positions(&self, collection: &str) -> StorageResult<Vec<PositionRecord>> {
        let store = self.store(collection)?;
        let _state = store.state.read();
        read_records(&store.meta_path)
    }

    /// Replaces the offsets of one record and rewrites the metadata file.
    ///
    /// The record at `ordinal` is used when it belongs to `id`; otherwise the
    /// last live record for `id` is. The new file is written beside the old
    /// one and renamed over it.
    pub fn rewrite_position(
        &self,
        collection: &str,
        ordinal: Option<u64>,
        id: &str,
        data_start: i64,
        payload_start: i64,
    ) -> StorageResult<()> {
        let store = self.store(collection)?;
        let mut state = store.state.write();

        let mut records = read_records(&store.meta_path)?;
        let at_ordinal = ordinal
            .map(|o| o as usize)
            .filter(|&o| records.get(o).is_some_and(|r| r.vector_id == id));
        let target = at_ordinal
            .or_else(|| {
                records
                    .iter()
                    .rposition(|r| r.vector_id == id && !r.is_tombstone())
            })
            .ok_or_else(|| StorageError::PositionNotFound { id: id.to_string() })?;

        records[target].data_start = data_start;
        records[target].payload_start = payload_start;

        let mut contents = String::new();
        for record in &records {
            contents.push_str(&record.to_line()?);
        }

        let tmp_path = store.meta_path.with_extension("bin.tmp");
        fs::write(&tmp_path, contents).with_path(&tmp_path)?;
        fs::rename(&tmp_path, &store.meta_path).with_path(&store.meta_path)?;
        state.record_count = records.len() as u64;

        debug!("Rewrote position record {target} for '{id}' in '{collection}'");
        Ok(())
    }

    /// Size of the data file in bytes.
    pub fn data_len(&self, collection: &str) -> StorageResult<u64> {
        let store = self.store(collection)?;
        let state = store.state.read();
        Ok(state.region.len())
    }

    fn store(&self, collection: &str) -> StorageResult<Arc<CollectionStore>> {
        self.stores
            .get(collection)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StorageError::UnknownCollection(collection.to_string()))
    }
}

fn read_records(path: &Path) -> StorageResult<Vec<PositionRecord>> {
    match File::open(path) {
        Ok(file) => decode_records(BufReader::new(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e).with_path(path),
    }
}
