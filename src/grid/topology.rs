use serde::{Deserialize, Serialize};

use crate::grid::cell::{GeoCoordinate, GridPosition};
use crate::grid::geodesy::{degree_step, round_micro};

/// Moore neighbourhood offsets (row, col), in row-major order.
const MOORE_OFFSETS: [(i64, i64); 8] = [
    (-1, -1), // Northwest
    (-1, 0),  // North
    (-1, 1),  // Northeast
    (0, -1),  // West
    (0, 1),   // East
    (1, -1),  // Southwest
    (1, 0),   // South
    (1, 1),   // Southeast
];

/// Mapping between grid positions, dense indices and geographic coordinates.
///
/// The reference corner is the north-west corner of the bounding box; row `r`
/// lies `r * scale` metres south of it and column `c` lies `c * scale` metres east.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridLayout {
    pub rows: u32,
    pub cols: u32,
    pub origin: GeoCoordinate,
    pub lat_step: f64,
    pub lon_step: f64,
}

impl GridLayout {
    pub fn new(rows: u32, cols: u32, origin: GeoCoordinate, scale_m: f64) -> Self {
        let (lat_step, lon_step) = degree_step(scale_m, origin.latitude);
        GridLayout {
            rows,
            cols,
            origin,
            lat_step,
            lon_step,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    pub fn contains(&self, position: GridPosition) -> bool {
        position.row < self.rows && position.col < self.cols
    }

    /// Dense row-major index, or `None` if out of bounds.
    pub fn index(&self, position: GridPosition) -> Option<usize> {
        if !self.contains(position) {
            return None;
        }
        Some(position.row as usize * self.cols as usize + position.col as usize)
    }

    pub fn position(&self, index: usize) -> GridPosition {
        let cols = self.cols as usize;
        GridPosition::new((index / cols) as u32, (index % cols) as u32)
    }

    /// Geographic coordinate of a grid position, rounded to micro-degrees.
    pub fn coordinate(&self, position: GridPosition) -> GeoCoordinate {
        GeoCoordinate::new(
            round_micro(self.origin.latitude - position.row as f64 * self.lat_step),
            round_micro(self.origin.longitude + position.col as f64 * self.lon_step),
        )
    }

    /// Nearest grid position for a coordinate, or `None` if it falls outside the grid.
    pub fn locate(&self, coordinate: GeoCoordinate) -> Option<GridPosition> {
        let row = ((self.origin.latitude - coordinate.latitude) / self.lat_step).round();
        let col = ((coordinate.longitude - self.origin.longitude) / self.lon_step).round();
        if !row.is_finite() || !col.is_finite() || row < 0.0 || col < 0.0 {
            return None;
        }
        let position = GridPosition::new(row as u32, col as u32);
        if (row as u64) >= self.rows as u64 || (col as u64) >= self.cols as u64 {
            return None;
        }
        Some(position)
    }

    /// All coordinates in row-major order.
    pub fn coordinates(&self) -> Vec<GeoCoordinate> {
        (0..self.cell_count())
            .map(|i| self.coordinate(self.position(i)))
            .collect()
    }
}

/// Build Moore (8-direction) adjacency for a `rows` x `cols` grid without wrapping.
///
/// Returns one neighbour list per cell in row-major order. Lists are sorted
/// ascending and all relationships are bidirectional.
pub fn moore_neighbors(rows: u32, cols: u32) -> Vec<Vec<u32>> {
    let total = rows as usize * cols as usize;
    let mut adjacency = Vec::with_capacity(total);

    for row in 0..rows as i64 {
        for col in 0..cols as i64 {
            let mut neighbors = Vec::with_capacity(8);
            for &(dr, dc) in &MOORE_OFFSETS {
                let nr = row + dr;
                let nc = col + dc;
                if nr < 0 || nc < 0 || nr >= rows as i64 || nc >= cols as i64 {
                    continue;
                }
                neighbors.push((nr * cols as i64 + nc) as u32);
            }
            adjacency.push(neighbors);
        }
    }

    adjacency
}
