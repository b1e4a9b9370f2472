//! Vector entities and their in-memory/on-disk lifecycle.
//!
//! An entity is either *materialized* (its coordinates are held in memory)
//! or *on-disk-only* (coordinates are read from the storage engine on every
//! access). Entities created by a durable insert start out on-disk-only and
//! become materialized when [`VectorEntity::unindex`] loads them, which the
//! KD-tree does on every insertion.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::storage::{Payload, StorageEngine, StorageResult, TOMBSTONE};

/// Durable location of an entity's data.
#[derive(Debug, Clone)]
struct Backing {
    storage: Arc<StorageEngine>,
    collection: String,
}

#[derive(Debug)]
struct EntityState {
    coords: Vec<f64>,
    data_start: i64,
    payload_start: i64,
    /// `true` while `coords` is not authoritative and reads go to storage.
    indexed: bool,
    /// Ordinal of this entity's record in the position file.
    position: Option<u64>,
}

/// One point of a collection.
#[derive(Debug)]
pub struct VectorEntity {
    id: String,
    dimension: usize,
    backing: Option<Backing>,
    state: RwLock<EntityState>,
}

impl VectorEntity {
    /// Creates an entity whose coordinates live only in memory.
    pub fn materialized(id: impl Into<String>, coords: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            dimension: coords.len(),
            backing: None,
            state: RwLock::new(EntityState {
                coords,
                data_start: TOMBSTONE,
                payload_start: TOMBSTONE,
                indexed: false,
                position: None,
            }),
        }
    }

    /// Creates an on-disk-only entity for data already written to
    /// `collection`'s files.
    pub fn persisted(
        id: impl Into<String>,
        dimension: usize,
        storage: Arc<StorageEngine>,
        collection: impl Into<String>,
        data_start: i64,
        payload_start: i64,
        position: Option<u64>,
    ) -> Self {
        Self {
            id: id.into(),
            dimension,
            backing: Some(Backing {
                storage,
                collection: collection.into(),
            }),
            state: RwLock::new(EntityState {
                coords: Vec::new(),
                data_start,
                payload_start,
                indexed: true,
                position,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn is_durable(&self) -> bool {
        self.backing.is_some()
    }

    pub fn data_start(&self) -> i64 {
        self.state.read().data_start
    }

    pub fn payload_start(&self) -> i64 {
        self.state.read().payload_start
    }

    pub fn position(&self) -> Option<u64> {
        self.state.read().position
    }

    pub fn set_position(&self, position: u64) {
        self.state.write().position = Some(position);
    }

    /// Whether the coordinates must be read from storage.
    pub fn is_indexed(&self) -> bool {
        self.state.read().indexed
    }

    pub fn is_tombstone(&self) -> bool {
        self.state.read().data_start < 0 && self.backing.is_some()
    }

    /// Reloads the coordinates from storage and keeps them in memory.
    ///
    /// Does nothing for tombstones and for entities without storage.
    pub fn unindex(&self) -> StorageResult<()> {
        let Some(backing) = &self.backing else {
            return Ok(());
        };

        let mut state = self.state.write();
        if state.data_start < 0 {
            return Ok(());
        }
        state.coords =
            backing
                .storage
                .read_vector(&backing.collection, state.data_start as u64, self.dimension)?;
        state.indexed = false;
        Ok(())
    }

    /// Runs `f` against the current coordinates.
    ///
    /// On-disk-only entities are read from storage on every call.
    pub fn with_data<R>(&self, f: impl FnOnce(&[f64]) -> R) -> StorageResult<R> {
        let state = self.state.read();
        match (&self.backing, state.indexed) {
            (Some(backing), true) if state.data_start >= 0 => {
                let coords = backing.storage.read_vector(
                    &backing.collection,
                    state.data_start as u64,
                    self.dimension,
                )?;
                Ok(f(&coords))
            }
            _ => Ok(f(&state.coords)),
        }
    }

    /// Owned copy of the coordinates.
    pub fn get_data(&self) -> StorageResult<Vec<f64>> {
        self.with_data(<[f64]>::to_vec)
    }

    /// Decodes this entity's payload from storage.
    ///
    /// `None` for tombstones and for entities without storage.
    pub fn read_payload(&self) -> StorageResult<Option<Payload>> {
        let Some(backing) = &self.backing else {
            return Ok(None);
        };
        let payload_start = self.state.read().payload_start;
        if payload_start < 0 {
            return Ok(None);
        }
        backing
            .storage
            .read_payload(&backing.collection, payload_start as u64)
            .map(Some)
    }

    /// Marks the entity as permanently deleted.
    ///
    /// Both offsets become `-1`; the position ordinal is kept so the caller
    /// can rewrite the matching record.
    pub fn tombstone(&self) {
        let mut state = self.state.write();
        state.data_start = TOMBSTONE;
        state.payload_start = TOMBSTONE;
        state.coords.clear();
        state.indexed = false;
    }
}
