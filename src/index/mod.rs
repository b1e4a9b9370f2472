//! Spatial indexes: the primary KD-tree and payload-keyed secondary indexes.

mod kdtree;
mod secondary;

pub use kdtree::{KdNode, KdTree, NodeId};
pub use secondary::{IndexDefinition, IndexKey, SecondaryIndex};
