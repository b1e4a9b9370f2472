//! Arena-backed KD-tree over vector entities.
//!
//! Nodes live in a `Vec` and reference their children by [`NodeId`]. The
//! tree is grown by insertion only: no rebalancing, no node removal. A
//! collection forgets deleted entities by building a fresh tree from its
//! live set.

use std::sync::Arc;

use crate::error::VdbResult;
use crate::vector::VectorEntity;

/// Index of a node in its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    #[must_use]
    pub fn get(&self) -> usize {
        self.0
    }
}

/// A KD-tree node.
///
/// Descendants under `less` have `coord[axis] < entity.coord[axis]`, those
/// under `greater` have `coord[axis] >= entity.coord[axis]`.
#[derive(Debug)]
pub struct KdNode {
    entity: Arc<VectorEntity>,
    less: Option<NodeId>,
    greater: Option<NodeId>,
    depth: usize,
}

impl KdNode {
    pub fn entity(&self) -> &Arc<VectorEntity> {
        &self.entity
    }

    pub fn less(&self) -> Option<NodeId> {
        self.less
    }

    pub fn greater(&self) -> Option<NodeId> {
        self.greater
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Splitting coordinate of this node in a `dimension`-wide space.
    #[inline]
    pub fn axis(&self, dimension: usize) -> usize {
        self.depth % dimension
    }
}

/// KD-tree over the entities of one collection (or one secondary index
/// bucket).
#[derive(Debug)]
pub struct KdTree {
    dimension: usize,
    nodes: Vec<KdNode>,
    root: Option<NodeId>,
}

impl KdTree {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            nodes: Vec::new(),
            root: None,
        }
    }

    /// Builds a tree by inserting `entities` in iteration order.
    pub fn from_entities<'a>(
        dimension: usize,
        entities: impl IntoIterator<Item = &'a Arc<VectorEntity>>,
    ) -> VdbResult<Self> {
        let mut tree = Self::new(dimension);
        for entity in entities {
            tree.insert(Arc::clone(entity))?;
        }
        Ok(tree)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &KdNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every entity in the tree, in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = &Arc<VectorEntity>> {
        self.nodes.iter().map(|node| &node.entity)
    }

    /// Length of the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        self.nodes.iter().map(|n| n.depth + 1).max().unwrap_or(0)
    }

    /// Inserts `entity`, descending by one coordinate per level.
    ///
    /// A durable entity first reloads its coordinates from storage so stale
    /// in-memory data never decides its position.
    pub fn insert(&mut self, entity: Arc<VectorEntity>) -> VdbResult<NodeId> {
        entity.unindex()?;

        let Some(mut current) = self.root else {
            let id = self.push(entity, 0);
            self.root = Some(id);
            return Ok(id);
        };

        let coords = entity.get_data()?;
        loop {
            let node = &self.nodes[current.0];
            let axis = node.axis(self.dimension);
            let split = node.entity.with_data(|d| d[axis])?;
            let goes_less = coords[axis] < split;
            let child = if goes_less { node.less } else { node.greater };
            let child_depth = node.depth + 1;

            match child {
                Some(next) => current = next,
                None => {
                    let id = self.push(entity, child_depth);
                    let parent = &mut self.nodes[current.0];
                    if goes_less {
                        parent.less = Some(id);
                    } else {
                        parent.greater = Some(id);
                    }
                    return Ok(id);
                }
            }
        }
    }

    fn push(&mut self, entity: Arc<VectorEntity>, depth: usize) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(KdNode {
            entity,
            less: None,
            greater: None,
            depth,
        });
        id
    }
}
