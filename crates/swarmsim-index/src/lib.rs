//! Spatial indexing abstractions for agent neighborhood queries.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors emitted by spatial index implementations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Common behaviour exposed by neighborhood indices.
pub trait NeighborhoodIndex {
    /// Rebuild internal structures from agent positions, discarding prior contents.
    fn rebuild(&mut self, positions: &[(f32, f32)]) -> Result<(), IndexError>;

    /// Visit every indexed agent within `radius` of the query point, skipping
    /// `exclude` when present. The visitor receives the agent's index and its
    /// squared distance from the query point.
    fn for_each_within(
        &self,
        x: f32,
        y: f32,
        radius: f32,
        exclude: Option<usize>,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    );
}

/// Uniform grid bucketing agents by `floor(coordinate / cell_size)`.
///
/// The grid is rebuilt wholesale every tick by the orchestrator, so no
/// incremental insert/remove surface exists. Query results are identical, as
/// a set, to a brute-force scan for any positive cell size; the cell size
/// only tunes performance and is typically matched to the neighbor radius.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniformGridIndex {
    /// Edge length of each grid cell used for bucketing agents.
    pub cell_size: f32,
    #[serde(skip)]
    buckets: HashMap<(i32, i32), Vec<usize>>,
    #[serde(skip)]
    positions: Vec<(f32, f32)>,
}

impl UniformGridIndex {
    /// Create a new uniform grid with the provided cell size.
    #[must_use]
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            buckets: HashMap::new(),
            positions: Vec::new(),
        }
    }

    fn cell_of(&self, x: f32, y: f32) -> (i32, i32) {
        (
            (x / self.cell_size).floor() as i32,
            (y / self.cell_size).floor() as i32,
        )
    }

    /// Number of agents currently indexed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the index currently holds no agents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Collect the indices of all agents within `radius` of `(x, y)`.
    #[must_use]
    pub fn query_radius(&self, x: f32, y: f32, radius: f32, exclude: Option<usize>) -> Vec<usize> {
        let mut hits = Vec::new();
        self.for_each_within(x, y, radius, exclude, &mut |idx, _| hits.push(idx));
        hits
    }
}

impl Default for UniformGridIndex {
    fn default() -> Self {
        Self::new(50.0)
    }
}

impl NeighborhoodIndex for UniformGridIndex {
    fn rebuild(&mut self, positions: &[(f32, f32)]) -> Result<(), IndexError> {
        if self.cell_size <= 0.0 {
            return Err(IndexError::InvalidConfig("cell_size must be positive"));
        }
        for bucket in self.buckets.values_mut() {
            bucket.clear();
        }
        self.positions.clear();
        self.positions.extend_from_slice(positions);
        for (idx, &(x, y)) in positions.iter().enumerate() {
            let cell = self.cell_of(x, y);
            self.buckets.entry(cell).or_default().push(idx);
        }
        Ok(())
    }

    fn for_each_within(
        &self,
        x: f32,
        y: f32,
        radius: f32,
        exclude: Option<usize>,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        if radius <= 0.0 || self.positions.is_empty() {
            return;
        }
        let radius_sq = radius * radius;
        let rings = (radius / self.cell_size).ceil() as i32;
        let (cx, cy) = self.cell_of(x, y);
        for gy in (cy - rings)..=(cy + rings) {
            for gx in (cx - rings)..=(cx + rings) {
                let Some(bucket) = self.buckets.get(&(gx, gy)) else {
                    continue;
                };
                for &idx in bucket {
                    if exclude == Some(idx) {
                        continue;
                    }
                    let (px, py) = self.positions[idx];
                    let dx = px - x;
                    let dy = py - y;
                    let dist_sq = dx * dx + dy * dy;
                    if dist_sq <= radius_sq {
                        visitor(idx, OrderedFloat(dist_sq));
                    }
                }
            }
        }
    }
}
