//! The database: a registry of collections under one storage root.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{error, info, warn};

use crate::collection::{Collection, CollectionConfig, CollectionInfo, NewPoint, SearchHit};
use crate::config::Settings;
use crate::error::{VdbError, VdbResult};
use crate::search::SearchParams;
use crate::storage::StorageEngine;
use crate::storage::error::IoContext;
use crate::vector::{DistanceMetric, VectorDimension};

/// Suffixes reserved for a collection's sidecar files.
const RESERVED_SUFFIXES: [&str; 2] = ["_indexes", "_meta"];

/// Embedded vector database.
///
/// Owns the storage engine and every loaded collection. Cloning the
/// returned `Arc<Collection>` handles is the way to share a collection
/// across threads.
#[derive(Debug)]
pub struct VectorDb {
    settings: Settings,
    storage: Arc<StorageEngine>,
    collections: DashMap<String, Arc<Collection>>,
}

impl VectorDb {
    /// Opens the database at `settings.storage.path`, restoring every
    /// collection found there.
    ///
    /// A collection that fails to restore is logged and skipped.
    pub fn open(settings: Settings) -> VdbResult<Self> {
        settings.validate()?;
        let storage = Arc::new(StorageEngine::new(&settings.storage.path)?);
        let db = Self {
            settings,
            storage,
            collections: DashMap::new(),
        };

        let configs = config_files(db.storage.root())?;
        let found = configs.len();
        for path in configs {
            match db.restore_collection(&path) {
                Ok(collection) => {
                    db.collections
                        .insert(collection.name().to_string(), Arc::new(collection));
                }
                Err(e) => error!("Skipping collection at {}: {e}", path.display()),
            }
        }

        info!(
            "Opened database at {} with {}/{found} collections",
            db.storage.root().display(),
            db.collections.len()
        );
        Ok(db)
    }

    fn restore_collection(&self, config_path: &Path) -> VdbResult<Collection> {
        let config = CollectionConfig::read(config_path)?;
        validate_collection_name(&config.name)?;
        if self.storage.config_path(&config.name) != config_path {
            warn!(
                "Config {} names collection '{}'",
                config_path.display(),
                config.name
            );
        }
        Collection::restore(
            config,
            Arc::clone(&self.storage),
            self.settings.search.clone(),
        )
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Creates a collection with fresh files.
    pub fn add_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> VdbResult<Arc<Collection>> {
        validate_collection_name(name)?;
        let dimension = VectorDimension::new(dimension)?;

        match self.collections.entry(name.to_string()) {
            Entry::Occupied(_) => Err(VdbError::CollectionExists(name.to_string())),
            Entry::Vacant(slot) => {
                // Files left behind by a collection that failed to restore
                if self.storage.config_path(name).exists() {
                    return Err(VdbError::CollectionExists(name.to_string()));
                }
                let collection = Arc::new(Collection::create(
                    name,
                    dimension,
                    metric,
                    Arc::clone(&self.storage),
                    self.settings.search.clone(),
                )?);
                slot.insert(Arc::clone(&collection));
                Ok(collection)
            }
        }
    }

    /// Unloads a collection and deletes all of its files.
    pub fn delete_collection(&self, name: &str) -> VdbResult<()> {
        let (_, collection) = self
            .collections
            .remove(name)
            .ok_or_else(|| VdbError::CollectionNotFound(name.to_string()))?;
        self.storage.remove_collection(collection.name())?;
        info!("Deleted collection '{name}'");
        Ok(())
    }

    pub fn collection(&self, name: &str) -> VdbResult<Arc<Collection>> {
        self.collections
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| VdbError::CollectionNotFound(name.to_string()))
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Info for every collection, sorted by name.
    pub fn list_collections(&self) -> Vec<CollectionInfo> {
        let mut infos: Vec<CollectionInfo> = self
            .collections
            .iter()
            .map(|entry| entry.value().info())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn insert(&self, collection: &str, point: NewPoint) -> VdbResult<String> {
        self.collection(collection)?.insert(point)
    }

    pub fn search(
        &self,
        collection: &str,
        target: &[f64],
        params: &SearchParams,
    ) -> VdbResult<Vec<SearchHit>> {
        self.collection(collection)?.search(target, params)
    }

    pub fn delete_by_id<S: AsRef<str>>(&self, collection: &str, ids: &[S]) -> VdbResult<usize> {
        self.collection(collection)?.delete_by_id(ids)
    }

    /// Rewrites every collection config so persisted diagonals are current.
    pub fn flush(&self) -> VdbResult<()> {
        for entry in self.collections.iter() {
            entry.value().write_config()?;
        }
        info!("Flushed {} collection configs", self.collections.len());
        Ok(())
    }
}

/// Collection names are non-empty, use `[A-Za-z0-9_-]` and must not collide
/// with sidecar file names.
pub fn validate_collection_name(name: &str) -> VdbResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !RESERVED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix));
    if valid {
        Ok(())
    } else {
        Err(VdbError::InvalidCollectionName(name.to_string()))
    }
}

/// `<name>.json` files under `root`, excluding index definition files,
/// sorted by path.
fn config_files(root: &Path) -> VdbResult<Vec<std::path::PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(root).with_path(root)? {
        let path = entry.with_path(root)?.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let is_indexes = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| stem.ends_with("_indexes"));
        if !is_indexes {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
