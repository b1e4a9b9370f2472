//! Collections: one named vector space with its tree, bounds and indexes.
//!
//! A collection owns the id-to-entity map (the *space*), the KD-tree built
//! from it, the bounding box of the live vectors and any secondary indexes.
//! Inserts and deletes take the collection's write lock; searches share the
//! read lock and may run concurrently.
//!
//! Every mutation reaches the storage engine before it becomes visible in
//! the space, so the space can always be rebuilt from disk.

mod bounds;
mod config;

pub use bounds::BoundingBox;
pub use config::{CollectionConfig, read_index_definitions, write_index_definitions};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::SearchConfig;
use crate::error::{VdbError, VdbResult};
use crate::filter::{Filter, matches_all};
use crate::index::{IndexDefinition, KdTree, SecondaryIndex};
use crate::search::{Candidate, SearchEngine, SearchOptions, SearchParams};
use crate::storage::{Payload, PayloadValue, StorageEngine, StorageError, TOMBSTONE, live_records};
use crate::vector::{DistanceMetric, VectorDimension, VectorEntity, generate_id};

/// A vector to insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPoint {
    /// Caller-chosen id; empty asks for a generated one.
    #[serde(default)]
    pub id: String,
    pub vector: Vec<f64>,
    #[serde(default)]
    pub payload: Payload,
}

impl NewPoint {
    pub fn new(id: impl Into<String>, vector: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            vector,
            payload: Payload::new(),
        }
    }

    /// A point whose id is generated on insert.
    pub fn anonymous(vector: Vec<f64>) -> Self {
        Self::new(String::new(), vector)
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<PayloadValue>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub distance: f64,
    pub payload: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f64>>,
}

/// Summary of a collection for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub node_count: usize,
    pub diagonal_length: f64,
    pub indexes: Vec<IndexDefinition>,
}

#[derive(Debug)]
struct CollectionState {
    space: HashMap<String, Arc<VectorEntity>>,
    tree: KdTree,
    bounds: BoundingBox,
    indexes: BTreeMap<String, SecondaryIndex>,
}

/// A named, durable vector space.
#[derive(Debug)]
pub struct Collection {
    name: String,
    dimension: VectorDimension,
    metric: DistanceMetric,
    storage: Arc<StorageEngine>,
    search: SearchConfig,
    state: RwLock<CollectionState>,
}

impl Collection {
    /// Creates an empty collection with fresh backing files and config.
    pub fn create(
        name: impl Into<String>,
        dimension: VectorDimension,
        metric: DistanceMetric,
        storage: Arc<StorageEngine>,
        search: SearchConfig,
    ) -> VdbResult<Self> {
        let name = name.into();
        storage.add_collection(&name)?;
        let collection = Self::empty(name, dimension, metric, storage, search);
        collection.write_config()?;
        info!(
            "Created collection '{}' ({} dimensions, {})",
            collection.name, dimension, metric
        );
        Ok(collection)
    }

    /// Restores a collection from its config, position file and index
    /// definitions.
    ///
    /// The last record per id wins and tombstoned ids are skipped. An index
    /// that can no longer be built is dropped with a warning.
    pub fn restore(
        config: CollectionConfig,
        storage: Arc<StorageEngine>,
        search: SearchConfig,
    ) -> VdbResult<Self> {
        storage.add_collection(&config.name)?;
        let collection = Self::empty(
            config.name,
            config.dimension,
            config.metric,
            Arc::clone(&storage),
            search,
        );

        let records = storage.read_all_positions(&collection.name)?;
        let total_records = records.len();
        let definitions = read_index_definitions(&storage.indexes_path(&collection.name))?;

        {
            let mut state = collection.state.write();
            for (ordinal, record) in live_records(records) {
                let entity = VectorEntity::persisted(
                    record.vector_id.clone(),
                    collection.dimension.get(),
                    Arc::clone(&storage),
                    collection.name.clone(),
                    record.data_start,
                    record.payload_start,
                    Some(ordinal),
                );
                state.space.insert(record.vector_id, Arc::new(entity));
            }
            collection.rebuild_locked(&mut state)?;

            let entities = sorted_entities(&state.space);
            for definition in definitions {
                let name = definition.name.clone();
                match collection.build_index(&entities, definition) {
                    Ok(index) => {
                        state.indexes.insert(name, index);
                    }
                    Err(e) => warn!(
                        "Dropping index '{name}' of collection '{}': {e}",
                        collection.name
                    ),
                }
            }

            info!(
                "Restored collection '{}': {} live vectors from {total_records} position records, {} indexes",
                collection.name,
                state.space.len(),
                state.indexes.len()
            );
        }

        Ok(collection)
    }

    fn empty(
        name: String,
        dimension: VectorDimension,
        metric: DistanceMetric,
        storage: Arc<StorageEngine>,
        search: SearchConfig,
    ) -> Self {
        Self {
            state: RwLock::new(CollectionState {
                space: HashMap::new(),
                tree: KdTree::new(dimension.get()),
                bounds: BoundingBox::new(dimension.get()),
                indexes: BTreeMap::new(),
            }),
            name,
            dimension,
            metric,
            storage,
            search,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.state.read().space.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().space.contains_key(id)
    }

    /// Snapshot of the current bounding box.
    pub fn bounds(&self) -> BoundingBox {
        self.state.read().bounds.clone()
    }

    /// Current config, including the live diagonal length.
    pub fn config(&self) -> CollectionConfig {
        let mut config = CollectionConfig::new(self.name.clone(), self.dimension, self.metric);
        config.diagonal_length = self.state.read().bounds.diagonal_length();
        config
    }

    /// Writes `<name>.json`.
    pub fn write_config(&self) -> VdbResult<()> {
        self.config()
            .write(&self.storage.config_path(&self.name))
    }

    /// Inserts one vector and returns its id.
    ///
    /// Fails without side effects on a dimension mismatch or a duplicate id.
    /// Coordinates and payload are written first; the position record that
    /// makes the vector durable is appended only once it sits in the tree.
    pub fn insert(&self, point: NewPoint) -> VdbResult<String> {
        self.dimension.validate_vector(&point.vector)?;

        let mut guard = self.state.write();
        let state = &mut *guard;

        let id = if point.id.is_empty() {
            generate_id()
        } else {
            point.id
        };
        if state.space.contains_key(&id) {
            return Err(VdbError::DuplicateId {
                collection: self.name.clone(),
                id,
            });
        }

        let (data_start, _) = self
            .storage
            .write_vector(&self.name, &point.vector)
            .map_err(|e| self.storage_failure(e))?;
        let payload_start = self
            .storage
            .write_payload(&self.name, &point.payload)
            .map_err(|e| self.storage_failure(e))?;

        let entity = Arc::new(VectorEntity::persisted(
            id.clone(),
            self.dimension.get(),
            Arc::clone(&self.storage),
            self.name.clone(),
            data_start as i64,
            payload_start as i64,
            None,
        ));
        self.commit_insert(state, entity, &point.payload)?;

        debug!("Inserted '{id}' into '{}' at offset {data_start}", self.name);
        Ok(id)
    }

    /// Links a freshly written entity into the tree, then records its
    /// position, bounds, space entry and index buckets.
    ///
    /// A tree failure leaves no position record behind. A failed append
    /// drops the entity from the tree again.
    fn commit_insert(
        &self,
        state: &mut CollectionState,
        entity: Arc<VectorEntity>,
        payload: &Payload,
    ) -> VdbResult<()> {
        state.tree.insert(Arc::clone(&entity))?;

        let appended = self.storage.append_position(
            &self.name,
            entity.id(),
            entity.data_start(),
            entity.payload_start(),
        );
        let ordinal = match appended {
            Ok(ordinal) => ordinal,
            Err(e) => {
                let failure = self.storage_failure(e);
                self.rebuild_locked(state)?;
                return Err(failure);
            }
        };
        entity.set_position(ordinal);

        entity.with_data(|coords| state.bounds.include(coords))?;
        state
            .space
            .insert(entity.id().to_string(), Arc::clone(&entity));

        for index in state.indexes.values_mut() {
            if let Err(e) = index.add(Arc::clone(&entity), payload) {
                warn!(
                    "Vector '{}' not added to index '{}' of '{}': {e}",
                    entity.id(),
                    index.name(),
                    self.name
                );
            }
        }
        Ok(())
    }

    /// Inserts points in order, stopping at the first failure.
    ///
    /// Points before the failing one stay inserted.
    pub fn insert_batch(&self, points: Vec<NewPoint>) -> VdbResult<Vec<String>> {
        let mut ids = Vec::with_capacity(points.len());
        for (position, point) in points.into_iter().enumerate() {
            let id = self.insert(point).map_err(|e| VdbError::BatchFailed {
                position,
                source: Box::new(e),
            })?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Tombstones every id and rebuilds the tree and indexes.
    ///
    /// Fails before changing anything if any id is unknown. Returns the
    /// number of deleted vectors.
    pub fn delete_by_id<S: AsRef<str>>(&self, ids: &[S]) -> VdbResult<usize> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_ref().to_string()).collect();
        let mut state = self.state.write();
        self.delete_locked(&mut state, &ids)
    }

    /// Tombstones every live vector whose payload matches all `filters`.
    ///
    /// Returns the deleted ids. An empty filter list is rejected.
    pub fn delete_by_filter(&self, filters: &[Filter]) -> VdbResult<Vec<String>> {
        if filters.is_empty() {
            return Err(VdbError::InvalidSearchParams(
                "delete by filter needs at least one filter".to_string(),
            ));
        }

        let mut state = self.state.write();
        let mut ids = Vec::new();
        for entity in sorted_entities(&state.space) {
            match entity.read_payload() {
                Ok(Some(payload)) if matches_all(filters, &payload) => {
                    ids.push(entity.id().to_string());
                }
                Ok(_) => {}
                Err(e) => warn!(
                    "Skipping '{}' in '{}': payload unreadable: {e}",
                    entity.id(),
                    self.name
                ),
            }
        }

        if !ids.is_empty() {
            self.delete_locked(&mut state, &ids)?;
        }
        Ok(ids)
    }

    fn delete_locked(&self, state: &mut CollectionState, ids: &[String]) -> VdbResult<usize> {
        if let Some(missing) = ids.iter().find(|id| !state.space.contains_key(id.as_str())) {
            return Err(VdbError::VectorNotFound {
                collection: self.name.clone(),
                id: missing.clone(),
            });
        }

        let mut seen = HashSet::new();
        let mut deleted = 0;
        let mut failure = None;
        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            let Some(entity) = state.space.get(id).cloned() else {
                continue;
            };
            if let Err(e) = self.storage.rewrite_position(
                &self.name,
                entity.position(),
                id,
                TOMBSTONE,
                TOMBSTONE,
            ) {
                failure = Some(self.storage_failure(e));
                break;
            }
            entity.tombstone();
            state.space.remove(id);
            deleted += 1;
        }

        // The tree must forget whatever was tombstoned, even after a failure
        self.rebuild_locked(state)?;
        if let Some(e) = failure {
            return Err(e);
        }

        debug!("Deleted {deleted} vectors from '{}'", self.name);
        Ok(deleted)
    }

    /// Rebuilds the tree, bounds and every secondary index from the space.
    pub fn rebuild(&self) -> VdbResult<()> {
        let mut state = self.state.write();
        self.rebuild_locked(&mut state)
    }

    fn rebuild_locked(&self, state: &mut CollectionState) -> VdbResult<()> {
        let entities = sorted_entities(&state.space);

        state.tree = KdTree::from_entities(self.dimension.get(), &entities)?;
        state.bounds.reset();
        for entity in &entities {
            let bounds = &mut state.bounds;
            entity.with_data(|coords| bounds.include(coords))?;
        }

        let definitions: Vec<IndexDefinition> = state
            .indexes
            .values()
            .map(|index| index.definition().clone())
            .collect();
        for definition in definitions {
            let name = definition.name.clone();
            let index = self.build_index(&entities, definition)?;
            state.indexes.insert(name, index);
        }

        debug!(
            "Rebuilt '{}': {} nodes, tree height {}",
            self.name,
            state.tree.len(),
            state.tree.height()
        );
        Ok(())
    }

    /// k-nearest-neighbour search over the whole collection.
    pub fn search(&self, target: &[f64], params: &SearchParams) -> VdbResult<Vec<SearchHit>> {
        let state = self.state.read();
        self.search_tree(&state.tree, &state.bounds, target, params)
    }

    /// k-nearest-neighbour search restricted to vectors whose payload holds
    /// `value` under the key of index `index_name`.
    ///
    /// A value with no vectors yields no hits.
    pub fn index_search(
        &self,
        index_name: &str,
        value: &PayloadValue,
        target: &[f64],
        params: &SearchParams,
    ) -> VdbResult<Vec<SearchHit>> {
        let state = self.state.read();
        let index = state
            .indexes
            .get(index_name)
            .ok_or_else(|| VdbError::IndexNotFound {
                collection: self.name.clone(),
                index: index_name.to_string(),
            })?;

        match index.bucket(value)? {
            Some(tree) => self.search_tree(tree, &state.bounds, target, params),
            None => {
                self.dimension.validate_vector(target)?;
                Ok(Vec::new())
            }
        }
    }

    fn search_tree(
        &self,
        tree: &KdTree,
        bounds: &BoundingBox,
        target: &[f64],
        params: &SearchParams,
    ) -> VdbResult<Vec<SearchHit>> {
        self.dimension.validate_vector(target)?;
        params.validate()?;

        if tree.is_empty() {
            return Ok(Vec::new());
        }

        // Never more results than nodes, so huge `k` values stay cheap
        let k = if params.k == 0 {
            self.search.default_k
        } else {
            params.k
        }
        .min(tree.len());
        let mut engine = SearchEngine::new(SearchOptions {
            k,
            workers: self.search.workers,
            queue_capacity: self.search.queue_capacity,
            pruning_factor: params.pruning_factor.unwrap_or(self.search.pruning_factor),
            filters: params.filters.clone(),
        })?;
        let mut candidates = engine.run(tree, target, self.metric, bounds.extents())?;

        if self.metric == DistanceMetric::Euclidean && params.max_distance_percent > 0.0 {
            let limit = params.max_distance_percent * bounds.diagonal_length();
            candidates.retain(|c| c.distance <= limit);
        }
        candidates.sort();

        let hits = self.hydrate(candidates, params.include_vectors);
        debug!("Search on '{}' returned {} hits (k={k})", self.name, hits.len());
        Ok(hits)
    }

    /// Attaches payloads (and optionally coordinates) to ranked candidates.
    /// A candidate whose data cannot be read is skipped.
    fn hydrate(&self, candidates: Vec<Candidate>, include_vectors: bool) -> Vec<SearchHit> {
        let mut hits = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let entity = &candidate.entity;
            let payload = match entity.read_payload() {
                Ok(payload) => payload.unwrap_or_default(),
                Err(e) => {
                    warn!("Skipping hit '{}' in '{}': {e}", entity.id(), self.name);
                    continue;
                }
            };
            let vector = if include_vectors {
                match entity.get_data() {
                    Ok(coords) => Some(coords),
                    Err(e) => {
                        warn!("Skipping hit '{}' in '{}': {e}", entity.id(), self.name);
                        continue;
                    }
                }
            } else {
                None
            };
            hits.push(SearchHit {
                id: entity.id().to_string(),
                distance: candidate.distance,
                payload,
                vector,
            });
        }
        hits
    }

    /// Builds a secondary index over `key` and persists its definition.
    pub fn create_index(&self, name: &str, key: &str) -> VdbResult<()> {
        let mut state = self.state.write();
        if state.indexes.contains_key(name) {
            return Err(VdbError::IndexExists {
                collection: self.name.clone(),
                index: name.to_string(),
            });
        }

        let entities = sorted_entities(&state.space);
        let index = self.build_index(
            &entities,
            IndexDefinition {
                name: name.to_string(),
                key: key.to_string(),
            },
        )?;
        info!(
            "Created index '{name}' on key '{key}' of '{}' with {} values",
            self.name,
            index.bucket_count()
        );
        state.indexes.insert(name.to_string(), index);
        self.persist_indexes(&state)
    }

    pub fn delete_index(&self, name: &str) -> VdbResult<()> {
        let mut state = self.state.write();
        if state.indexes.remove(name).is_none() {
            return Err(VdbError::IndexNotFound {
                collection: self.name.clone(),
                index: name.to_string(),
            });
        }
        info!("Deleted index '{name}' of '{}'", self.name);
        self.persist_indexes(&state)
    }

    pub fn list_indexes(&self) -> Vec<IndexDefinition> {
        self.state
            .read()
            .indexes
            .values()
            .map(|index| index.definition().clone())
            .collect()
    }

    fn build_index(
        &self,
        entities: &[Arc<VectorEntity>],
        definition: IndexDefinition,
    ) -> VdbResult<SecondaryIndex> {
        let mut entries = Vec::with_capacity(entities.len());
        for entity in entities {
            if let Some(payload) = entity.read_payload()? {
                entries.push((Arc::clone(entity), payload));
            }
        }
        SecondaryIndex::build(definition, self.dimension.get(), entries)
    }

    fn persist_indexes(&self, state: &CollectionState) -> VdbResult<()> {
        let definitions: Vec<IndexDefinition> = state
            .indexes
            .values()
            .map(|index| index.definition().clone())
            .collect();
        write_index_definitions(&self.storage.indexes_path(&self.name), &definitions)
    }

    pub fn info(&self) -> CollectionInfo {
        let state = self.state.read();
        CollectionInfo {
            name: self.name.clone(),
            dimension: self.dimension.get(),
            metric: self.metric,
            node_count: state.space.len(),
            diagonal_length: state.bounds.diagonal_length(),
            indexes: state
                .indexes
                .values()
                .map(|index| index.definition().clone())
                .collect(),
        }
    }

    /// Ids of every live vector, in insertion order.
    pub fn list_vectors(&self) -> Vec<String> {
        sorted_entities(&self.state.read().space)
            .iter()
            .map(|entity| entity.id().to_string())
            .collect()
    }

    pub fn get_vector(&self, id: &str) -> VdbResult<Vec<f64>> {
        let entity = self.entity(id)?;
        Ok(entity.get_data()?)
    }

    pub fn read_payload(&self, id: &str) -> VdbResult<Payload> {
        let entity = self.entity(id)?;
        Ok(entity.read_payload()?.unwrap_or_default())
    }

    fn entity(&self, id: &str) -> VdbResult<Arc<VectorEntity>> {
        self.state
            .read()
            .space
            .get(id)
            .cloned()
            .ok_or_else(|| VdbError::VectorNotFound {
                collection: self.name.clone(),
                id: id.to_string(),
            })
    }

    fn storage_failure(&self, e: StorageError) -> VdbError {
        if e.is_fatal() {
            error!("Storage failure on collection '{}': {e}", self.name);
        }
        e.into()
    }
}

/// Entities ordered by position record, so rebuilds are deterministic.
fn sorted_entities(space: &HashMap<String, Arc<VectorEntity>>) -> Vec<Arc<VectorEntity>> {
    let mut entities: Vec<Arc<VectorEntity>> = space.values().cloned().collect();
    entities.sort_by(|a, b| {
        a.position()
            .unwrap_or(u64::MAX)
            .cmp(&b.position().unwrap_or(u64::MAX))
            .then_with(|| a.id().cmp(b.id()))
    });
    entities
}
