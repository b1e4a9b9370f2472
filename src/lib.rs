//! Embedded vector database with durable storage and concurrent k-NN search.
//!
//! Vectors live in named [`Collection`]s. Each collection persists to an
//! append-only memory-mapped data file plus a position log, keeps a KD-tree
//! over its live vectors and answers nearest-neighbour queries with a pool
//! of worker threads feeding a bounded result heap.

pub mod collection;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod index;
pub mod logging;
pub mod search;
pub mod storage;
pub mod vector;

// Explicit exports for better API clarity
pub use collection::{Collection, CollectionConfig, CollectionInfo, NewPoint, SearchHit};
pub use config::Settings;
pub use database::VectorDb;
pub use error::{VdbError, VdbResult};
pub use filter::{Filter, Operator};
pub use index::{IndexDefinition, KdTree};
pub use search::{SearchEngine, SearchParams};
pub use storage::{Payload, PayloadValue, StorageEngine, StorageError, StorageResult};
pub use vector::{DistanceMetric, VectorDimension, VectorEntity};
