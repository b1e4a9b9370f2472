//! Payload-keyed secondary indexes.
//!
//! A secondary index picks one payload key and keeps a separate KD-tree for
//! every distinct value found under that key. Searching one bucket limits
//! the candidates to vectors carrying that value.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{VdbError, VdbResult};
use crate::index::kdtree::KdTree;
use crate::storage::{Payload, PayloadValue};
use crate::vector::VectorEntity;

/// Persisted definition of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub key: String,
}

/// Hashable form of an indexable payload value.
///
/// Only integers, floats and strings can be indexed. Integers and floats are
/// distinct keys: `3` and `3.0` land in different buckets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Integer(i64),
    Float(u64),
    Text(String),
}

impl IndexKey {
    /// Converts the value stored under `key` into an index key.
    pub fn from_value(key: &str, value: &PayloadValue) -> VdbResult<Self> {
        match value {
            PayloadValue::Integer(i) => Ok(Self::Integer(*i)),
            // -0.0 and 0.0 share a bucket
            PayloadValue::Float(f) => Ok(Self::Float(if *f == 0.0 { 0 } else { f.to_bits() })),
            PayloadValue::Text(s) => Ok(Self::Text(s.clone())),
            PayloadValue::Boolean(_) | PayloadValue::Array(_) | PayloadValue::Map(_) => {
                Err(VdbError::UnsupportedIndexValue {
                    key: key.to_string(),
                    found: value.type_name(),
                })
            }
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One secondary index: payload value to KD-tree.
#[derive(Debug)]
pub struct SecondaryIndex {
    definition: IndexDefinition,
    dimension: usize,
    buckets: HashMap<IndexKey, KdTree>,
}

impl SecondaryIndex {
    /// Builds the index from `(entity, payload)` pairs.
    ///
    /// Entities whose payload lacks the key are skipped. A value of an
    /// unsupported type under the key fails the whole build. Buckets are
    /// built in parallel.
    pub fn build(
        definition: IndexDefinition,
        dimension: usize,
        entries: Vec<(Arc<VectorEntity>, Payload)>,
    ) -> VdbResult<Self> {
        let mut groups: HashMap<IndexKey, Vec<Arc<VectorEntity>>> = HashMap::new();
        for (entity, payload) in entries {
            let Some(value) = payload.get(&definition.key) else {
                continue;
            };
            let key = IndexKey::from_value(&definition.key, value)?;
            groups.entry(key).or_default().push(entity);
        }

        let buckets = groups
            .into_par_iter()
            .map(|(key, entities)| {
                KdTree::from_entities(dimension, &entities).map(|tree| (key, tree))
            })
            .collect::<VdbResult<HashMap<_, _>>>()?;

        debug!(
            "Built index '{}' on key '{}' with {} buckets",
            definition.name,
            definition.key,
            buckets.len()
        );

        Ok(Self {
            definition,
            dimension,
            buckets,
        })
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn key(&self) -> &str {
        &self.definition.key
    }

    /// Adds one entity to the bucket for its payload value.
    ///
    /// Returns `false` when the payload does not carry the indexed key.
    pub fn add(&mut self, entity: Arc<VectorEntity>, payload: &Payload) -> VdbResult<bool> {
        let Some(value) = payload.get(&self.definition.key) else {
            return Ok(false);
        };
        let key = IndexKey::from_value(&self.definition.key, value)?;
        let dimension = self.dimension;
        self.buckets
            .entry(key)
            .or_insert_with(|| KdTree::new(dimension))
            .insert(entity)?;
        Ok(true)
    }

    /// The tree for vectors whose payload holds `value` under the key.
    pub fn bucket(&self, value: &PayloadValue) -> VdbResult<Option<&KdTree>> {
        let key = IndexKey::from_value(&self.definition.key, value)?;
        Ok(self.buckets.get(&key))
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Distinct values with their vector counts.
    pub fn bucket_sizes(&self) -> Vec<(IndexKey, usize)> {
        self.buckets
            .iter()
            .map(|(key, tree)| (key.clone(), tree.len()))
            .collect()
    }
}
