//! Axis-aligned bounding box of a collection's live vectors.

use serde::Serialize;

/// Running min/max corners with per-axis extent and squared diagonal.
///
/// The box starts empty and snaps to the first vector it sees, so it only
/// ever spans real data. It is not seeded at the origin: a collection whose
/// vectors all lie far from zero gets extents covering just those vectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundingBox {
    min: Vec<f64>,
    max: Vec<f64>,
    extents: Vec<f64>,
    diagonal_length: f64,
    empty: bool,
}

impl BoundingBox {
    pub fn new(dimension: usize) -> Self {
        Self {
            min: vec![0.0; dimension],
            max: vec![0.0; dimension],
            extents: vec![0.0; dimension],
            diagonal_length: 0.0,
            empty: true,
        }
    }

    /// Grows the box to enclose `coords`.
    pub fn include(&mut self, coords: &[f64]) {
        if self.empty {
            self.min.copy_from_slice(coords);
            self.max.copy_from_slice(coords);
            self.empty = false;
        } else {
            for (axis, &value) in coords.iter().enumerate() {
                if value < self.min[axis] {
                    self.min[axis] = value;
                }
                if value > self.max[axis] {
                    self.max[axis] = value;
                }
            }
        }

        self.diagonal_length = 0.0;
        for axis in 0..self.extents.len() {
            let extent = self.max[axis] - self.min[axis];
            self.extents[axis] = extent;
            self.diagonal_length += extent * extent;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.extents.len());
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn min(&self) -> &[f64] {
        &self.min
    }

    pub fn max(&self) -> &[f64] {
        &self.max
    }

    /// `max - min` per axis.
    pub fn extents(&self) -> &[f64] {
        &self.extents
    }

    /// Sum of squared extents (no square root).
    pub fn diagonal_length(&self) -> f64 {
        self.diagonal_length
    }

    pub fn contains(&self, coords: &[f64]) -> bool {
        !self.empty
            && coords
                .iter()
                .enumerate()
                .all(|(axis, v)| *v >= self.min[axis] && *v <= self.max[axis])
    }
}
