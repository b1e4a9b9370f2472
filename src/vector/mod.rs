//! Vectors, distance metrics and the entity lifecycle.
//!
//! Coordinates are `f64` and stored as fixed-width little-endian values, so
//! a vector read back from disk is bit-identical to the one written.

mod entity;
mod types;

pub use entity::VectorEntity;
pub use types::{
    DistanceMetric, VectorDimension, cosine_distance, euclidean_distance, generate_id,
};
