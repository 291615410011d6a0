//! Scalar pheromone grid used by the foraging strategy for stigmergic
//! coordination.

use serde::{Deserialize, Serialize};

/// Upper bound on any single cell value.
pub const FIELD_MAX: f32 = 12.0;
/// Values below this snap to exactly zero during evaporation.
pub const SNAP_EPSILON: f32 = 0.01;
/// Multiplicative evaporation factor applied every tick.
pub const EVAPORATION: f32 = 0.993;
/// Blend weight a cell keeps for itself during diffusion.
const DIFFUSE_SELF_WEIGHT: f32 = 0.6;
/// Blend weight contributed by each of the 8 neighbors during diffusion.
const DIFFUSE_NEIGHBOR_WEIGHT: f32 = 0.05;
/// Fraction deposited into the 4 cardinal neighbors of the deposit cell.
const DEPOSIT_SPREAD: f32 = 0.3;

/// Dense row-major grid of non-negative pheromone intensities.
///
/// Out-of-bounds reads return `0.0` and out-of-bounds writes are ignored;
/// callers never need to pre-check coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PheromoneField {
    width: usize,
    height: usize,
    cell_size: f32,
    cells: Vec<f32>,
    #[serde(skip)]
    scratch: Vec<f32>,
}

impl PheromoneField {
    /// Build a field covering a `world_width x world_height` rectangle with
    /// the given cell size (fixed for the lifetime of the field).
    #[must_use]
    pub fn new(world_width: f32, world_height: f32, cell_size: f32) -> Self {
        let width = (world_width / cell_size).ceil().max(1.0) as usize;
        let height = (world_height / cell_size).ceil().max(1.0) as usize;
        Self {
            width,
            height,
            cell_size,
            cells: vec![0.0; width * height],
            scratch: vec![0.0; width * height],
        }
    }

    /// Grid width in cells.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Raw cell values, row-major.
    #[must_use]
    pub fn cells(&self) -> &[f32] {
        &self.cells
    }

    fn cell_index(&self, x: f32, y: f32) -> Option<usize> {
        if x < 0.0 || y < 0.0 {
            return None;
        }
        let gx = (x / self.cell_size) as usize;
        let gy = (y / self.cell_size) as usize;
        if gx >= self.width || gy >= self.height {
            return None;
        }
        Some(gy * self.width + gx)
    }

    /// Intensity at a world position; `0.0` outside the grid.
    #[must_use]
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        self.cell_index(x, y).map_or(0.0, |idx| self.cells[idx])
    }

    /// Deposit `amount` at a world position: the containing cell receives the
    /// full amount, its 4 cardinal neighbors 30% each, all additively clamped
    /// to [`FIELD_MAX`]. Writes outside the grid are ignored.
    pub fn deposit(&mut self, x: f32, y: f32, amount: f32) {
        if amount <= 0.0 {
            return;
        }
        self.deposit_at(x, y, amount);
        let step = self.cell_size;
        let spread = amount * DEPOSIT_SPREAD;
        self.deposit_at(x - step, y, spread);
        self.deposit_at(x + step, y, spread);
        self.deposit_at(x, y - step, spread);
        self.deposit_at(x, y + step, spread);
    }

    fn deposit_at(&mut self, x: f32, y: f32, amount: f32) {
        if let Some(idx) = self.cell_index(x, y) {
            self.cells[idx] = (self.cells[idx] + amount).min(FIELD_MAX);
        }
    }

    /// Multiplicative evaporation; sub-[`SNAP_EPSILON`] residue snaps to
    /// exactly zero so empty regions become truly empty.
    pub fn evaporate(&mut self) {
        for cell in &mut self.cells {
            *cell *= EVAPORATION;
            if *cell < SNAP_EPSILON {
                *cell = 0.0;
            }
        }
    }

    /// Blend each cell with its 8-neighborhood (self weight 0.6, each present
    /// neighbor 0.05), normalized by the weight actually present so edges and
    /// corners are not drained.
    pub fn diffuse(&mut self) {
        let width = self.width;
        let height = self.height;
        self.scratch.resize(width * height, 0.0);
        self.scratch.copy_from_slice(&self.cells);
        let previous = &self.scratch;

        for gy in 0..height {
            for gx in 0..width {
                let mut total = previous[gy * width + gx] * DIFFUSE_SELF_WEIGHT;
                let mut weight = DIFFUSE_SELF_WEIGHT;
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = gx as i32 + dx;
                        let ny = gy as i32 + dy;
                        if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                            continue;
                        }
                        total += previous[ny as usize * width + nx as usize]
                            * DIFFUSE_NEIGHBOR_WEIGHT;
                        weight += DIFFUSE_NEIGHBOR_WEIGHT;
                    }
                }
                self.cells[gy * width + gx] = (total / weight).min(FIELD_MAX);
            }
        }
    }

    /// Zero every cell.
    pub fn clear(&mut self) {
        self.cells.fill(0.0);
    }

    /// Sum of all cell values.
    #[must_use]
    pub fn total(&self) -> f32 {
        self.cells.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_clamps_to_field_max() {
        let mut field = PheromoneField::new(100.0, 100.0, 10.0);
        for _ in 0..10 {
            field.deposit(55.0, 55.0, 3.0);
        }
        assert!((field.sample(55.0, 55.0) - FIELD_MAX).abs() < f32::EPSILON);
    }

    #[test]
    fn deposit_spreads_to_cardinal_neighbors() {
        let mut field = PheromoneField::new(100.0, 100.0, 10.0);
        field.deposit(55.0, 55.0, 2.0);
        assert!((field.sample(55.0, 55.0) - 2.0).abs() < 1e-6);
        assert!((field.sample(45.0, 55.0) - 0.6).abs() < 1e-6);
        assert!((field.sample(65.0, 55.0) - 0.6).abs() < 1e-6);
        assert!((field.sample(55.0, 45.0) - 0.6).abs() < 1e-6);
        assert!((field.sample(55.0, 65.0) - 0.6).abs() < 1e-6);
        // diagonals untouched
        assert_eq!(field.sample(45.0, 45.0), 0.0);
    }

    #[test]
    fn out_of_bounds_access_is_ignored() {
        let mut field = PheromoneField::new(100.0, 100.0, 10.0);
        field.deposit(-5.0, 50.0, 3.0);
        field.deposit(500.0, 50.0, 3.0);
        assert_eq!(field.sample(-5.0, 50.0), 0.0);
        assert_eq!(field.sample(500.0, 50.0), 0.0);
        // edge deposit still lands in-bounds cells
        field.deposit(5.0, 5.0, 1.0);
        assert!(field.sample(5.0, 5.0) > 0.0);
    }

    #[test]
    fn evaporation_strictly_decays_and_reaches_exact_zero() {
        let mut field = PheromoneField::new(100.0, 100.0, 10.0);
        field.deposit(50.0, 50.0, 3.0);
        let mut previous = field.total();
        assert!(previous > 0.0);
        let mut ticks = 0;
        while field.total() > 0.0 {
            field.evaporate();
            let current = field.total();
            assert!(
                current < previous || current == 0.0,
                "decay must be strict while non-zero"
            );
            previous = current;
            ticks += 1;
            assert!(ticks < 2_000, "field failed to reach zero in bounded time");
        }
        assert_eq!(field.total(), 0.0);
    }

    #[test]
    fn diffusion_spreads_without_inflating_peaks() {
        let mut field = PheromoneField::new(100.0, 100.0, 10.0);
        field.deposit(55.0, 55.0, 6.0);
        let peak_before = field.sample(55.0, 55.0);
        field.diffuse();
        assert!(field.sample(55.0, 55.0) < peak_before);
        // diagonal neighbors now hold pheromone via the 8-neighborhood blend
        assert!(field.sample(45.0, 45.0) > 0.0);
    }

    #[test]
    fn diffusion_at_corner_normalizes_present_weight() {
        let mut field = PheromoneField::new(30.0, 30.0, 10.0);
        field.deposit(5.0, 5.0, 1.0);
        let before = field.total();
        field.diffuse();
        // corner cells blend over fewer neighbors but must not explode
        for &cell in field.cells() {
            assert!(cell <= FIELD_MAX);
            assert!(cell >= 0.0);
        }
        assert!(field.total() <= before * 1.5);
    }
}
