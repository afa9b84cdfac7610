pub mod cell;
pub mod geodesy;
pub mod topology;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::provider::{fetch_all, EnvironmentProvider, EnvironmentalAttributes, ProviderError};
use crate::simulation::combustion::CombustionParams;
use crate::simulation::SimClock;
pub use cell::{Cell, Coefficients, GeoCoordinate, GridPosition, Stage};
use topology::{moore_neighbors, GridLayout};

// === Construction inputs ===

/// Geographic bounding box in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    /// North-west corner, the origin grid rows and columns are offset from.
    pub fn reference_corner(&self) -> GeoCoordinate {
        GeoCoordinate::new(self.north, self.west)
    }

    pub fn contains(&self, coordinate: GeoCoordinate) -> bool {
        (self.south..=self.north).contains(&coordinate.latitude)
            && (self.west..=self.east).contains(&coordinate.longitude)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();
        if !(-90.0..=90.0).contains(&self.north) || !(-90.0..=90.0).contains(&self.south) {
            errors.push(format!(
                "bounds latitudes must be within -90..90, got north={} south={}",
                self.north, self.south
            ));
        }
        if !(-180.0..=180.0).contains(&self.west) || !(-180.0..=180.0).contains(&self.east) {
            errors.push(format!(
                "bounds longitudes must be within -180..180, got west={} east={}",
                self.west, self.east
            ));
        }
        if self.south >= self.north {
            errors.push(format!(
                "bounds.south must be < bounds.north, got {} >= {}",
                self.south, self.north
            ));
        }
        if self.west >= self.east {
            errors.push(format!(
                "bounds.west must be < bounds.east, got {} >= {}",
                self.west, self.east
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }
}

/// Everything needed to lay out a grid: dimensions, geographic extent and step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub rows: u32,
    pub cols: u32,
    pub bounds: BoundingBox,
    /// Metres per grid step.
    pub scale: f64,
}

impl GridSpec {
    pub fn layout(&self) -> GridLayout {
        GridLayout::new(self.rows, self.cols, self.bounds.reference_corner(), self.scale)
    }
}

/// A coordinate the provider could not describe; its cell is non-combustible.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeGap {
    pub position: GridPosition,
    pub coordinate: GeoCoordinate,
    pub error: ProviderError,
}

/// Errors that abort grid construction.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    EmptyDimensions { rows: u32, cols: u32 },
    InvalidScale(f64),
    InvalidBounds(String),
    InvalidParams(String),
    /// Every single fetch failed with `Unavailable`.
    ProviderUnavailable(String),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::EmptyDimensions { rows, cols } => {
                write!(f, "Grid dimensions must be non-zero, got {}x{}", rows, cols)
            }
            BuildError::InvalidScale(scale) => {
                write!(f, "Grid scale must be a positive number of metres, got {}", scale)
            }
            BuildError::InvalidBounds(reason) => write!(f, "Invalid bounding box: {}", reason),
            BuildError::InvalidParams(reason) => {
                write!(f, "Invalid combustion parameters: {}", reason)
            }
            BuildError::ProviderUnavailable(reason) => {
                write!(f, "Environment provider unavailable for every cell: {}", reason)
            }
        }
    }
}

impl std::error::Error for BuildError {}

// === Grid ===

/// Dense grid of cells plus the scheduler's clock.
#[derive(Debug, Clone)]
pub struct Grid {
    layout: GridLayout,
    scale: f64,
    cells: Vec<Cell>,
    params: CombustionParams,
    pub(crate) clock: SimClock,
    gaps: Vec<AttributeGap>,
}

impl Grid {
    pub fn rows(&self) -> u32 {
        self.layout.rows
    }

    pub fn cols(&self) -> u32 {
        self.layout.cols
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn params(&self) -> &CombustionParams {
        &self.params
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    pub fn index_of(&self, position: GridPosition) -> Option<usize> {
        self.layout.index(position)
    }

    pub fn cell(&self, position: GridPosition) -> Option<&Cell> {
        self.index_of(position).map(|i| &self.cells[i])
    }

    pub fn neighbors(&self, position: GridPosition) -> impl Iterator<Item = &Cell> {
        self.cell(position)
            .into_iter()
            .flat_map(|c| c.neighbors.iter().map(|&n| &self.cells[n as usize]))
    }

    /// Coordinates the provider could not describe during construction.
    pub fn gaps(&self) -> &[AttributeGap] {
        &self.gaps
    }

    pub fn count_stage(&self, stage: Stage) -> usize {
        self.cells.iter().filter(|c| c.stage == stage).count()
    }

    /// Owned, serialisable copy of the current state.
    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            rows: self.rows(),
            cols: self.cols(),
            scale: self.scale,
            tick: self.clock.tick,
            elapsed_minutes: self.clock.elapsed_minutes,
            cells: self.cells.iter().map(CellSnapshot::from_cell).collect(),
        }
    }
}

/// Build a grid by querying `provider` once per cell, then linking Moore adjacency.
///
/// Cells whose attributes cannot be fetched (or fail validation) become
/// non-combustible and are listed in [`Grid::gaps`]. Only structural problems,
/// or a provider that is unavailable for every cell, abort the build.
pub fn build_grid<P>(
    spec: &GridSpec,
    provider: &P,
    params: CombustionParams,
) -> Result<Grid, BuildError>
where
    P: EnvironmentProvider + ?Sized,
{
    if spec.rows == 0 || spec.cols == 0 {
        return Err(BuildError::EmptyDimensions {
            rows: spec.rows,
            cols: spec.cols,
        });
    }
    if !spec.scale.is_finite() || spec.scale <= 0.0 {
        return Err(BuildError::InvalidScale(spec.scale));
    }
    spec.bounds.validate().map_err(BuildError::InvalidBounds)?;
    params.validate().map_err(BuildError::InvalidParams)?;

    let start = Instant::now();
    let layout = spec.layout();
    let coordinates = layout.coordinates();

    let overflow = coordinates.last().filter(|c| !spec.bounds.contains(**c));
    if let Some(last) = overflow {
        warn!(
            rows = spec.rows,
            cols = spec.cols,
            scale = spec.scale,
            south_east_lat = last.latitude,
            south_east_lon = last.longitude,
            "Grid extends beyond the bounding box"
        );
    }

    let results = fetch_all(provider, &coordinates);

    let mut cells = Vec::with_capacity(coordinates.len());
    let mut gaps = Vec::new();
    let mut unavailable = 0usize;

    for (index, (coordinate, result)) in coordinates.iter().zip(results).enumerate() {
        let position = layout.position(index);
        let attributes = match checked(result, *coordinate) {
            Ok(attrs) => Some(attrs),
            Err(error) => {
                if matches!(error, ProviderError::Unavailable(_)) {
                    unavailable += 1;
                }
                warn!(
                    row = position.row,
                    col = position.col,
                    error = %error,
                    "Attribute gap, cell marked non-combustible"
                );
                gaps.push(AttributeGap {
                    position,
                    coordinate: *coordinate,
                    error,
                });
                None
            }
        };
        cells.push(Cell::new(position, *coordinate, attributes, &params));
    }

    if unavailable == cells.len() {
        let reason = gaps
            .first()
            .map(|g| g.error.to_string())
            .unwrap_or_default();
        return Err(BuildError::ProviderUnavailable(reason));
    }

    for (cell, neighbors) in cells.iter_mut().zip(moore_neighbors(spec.rows, spec.cols)) {
        cell.neighbors = neighbors;
    }

    let combustible = cells.iter().filter(|c| c.combustible).count();
    info!(
        rows = spec.rows,
        cols = spec.cols,
        combustible,
        gaps = gaps.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Grid built"
    );
    debug!(tick_minutes = params.tick_minutes(spec.scale), "Clock step");

    Ok(Grid {
        layout,
        scale: spec.scale,
        cells,
        params,
        clock: SimClock::new(params.tick_minutes(spec.scale)),
        gaps,
    })
}

/// Turn a provider answer into validated attributes.
fn checked(
    result: Result<EnvironmentalAttributes, ProviderError>,
    coordinate: GeoCoordinate,
) -> Result<EnvironmentalAttributes, ProviderError> {
    let attrs = result?;
    attrs.validate().map_err(|reason| ProviderError::Invalid {
        latitude: coordinate.latitude,
        longitude: coordinate.longitude,
        reason,
    })?;
    Ok(attrs)
}

// === Snapshots ===

/// Read-only state of one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub position: GridPosition,
    pub coordinate: GeoCoordinate,
    pub stage: Stage,
    pub intensity: f64,
    pub combustible: bool,
    pub ignited_at: Option<u64>,
    pub attributes: Option<EnvironmentalAttributes>,
    pub coefficients: Coefficients,
}

impl CellSnapshot {
    pub fn from_cell(cell: &Cell) -> Self {
        CellSnapshot {
            position: cell.position,
            coordinate: cell.coordinate,
            stage: cell.stage,
            intensity: cell.intensity,
            combustible: cell.combustible,
            ignited_at: cell.ignited_at,
            attributes: cell.attributes,
            coefficients: cell.coefficients,
        }
    }
}

/// Owned copy of a whole grid at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub rows: u32,
    pub cols: u32,
    pub scale: f64,
    pub tick: u64,
    pub elapsed_minutes: f64,
    pub cells: Vec<CellSnapshot>,
}

impl GridSnapshot {
    pub fn cell(&self, position: GridPosition) -> Option<&CellSnapshot> {
        if position.row >= self.rows || position.col >= self.cols {
            return None;
        }
        self.cells
            .get(position.row as usize * self.cols as usize + position.col as usize)
    }

    /// One line per row using [`Stage::glyph`]; non-combustible cells print as `~`.
    pub fn render_ascii(&self) -> String {
        let mut out = String::with_capacity(self.cells.len() + self.rows as usize);
        for row in self.cells.chunks(self.cols.max(1) as usize) {
            for cell in row {
                out.push(if cell.combustible { cell.stage.glyph() } else { '~' });
            }
            out.push('\n');
        }
        out
    }

    /// Burn map scored against observed fire: `H` hit, `M` miss, `F` false alarm,
    /// `.` neither, `~` non-combustible.
    pub fn render_validation(&self) -> String {
        let mut out = String::with_capacity(self.cells.len() + self.rows as usize);
        for row in self.cells.chunks(self.cols.max(1) as usize) {
            for cell in row {
                let observed = cell.attributes.is_some_and(|a| a.observed_fire);
                out.push(match (cell.combustible, cell.stage.has_burned(), observed) {
                    (false, _, _) => '~',
                    (true, true, true) => 'H',
                    (true, false, true) => 'M',
                    (true, true, false) => 'F',
                    (true, false, false) => '.',
                });
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{from_fn, Surface, UniformProvider};

    fn attrs() -> EnvironmentalAttributes {
        EnvironmentalAttributes {
            elevation: 100.0,
            fuel_load: 70.0,
            temperature: 30.0,
            humidity: 20.0,
            wind_direction: 0.0,
            wind_speed: 0.0,
            surface: Surface::Vegetation,
            observed_fire: false,
        }
    }

    fn spec(rows: u32, cols: u32) -> GridSpec {
        GridSpec {
            rows,
            cols,
            bounds: BoundingBox {
                north: 44.0,
                south: 43.9,
                east: 5.1,
                west: 5.0,
            },
            scale: 30.0,
        }
    }

    #[test]
    fn builds_dense_grid_with_symmetric_adjacency() {
        let grid = build_grid(&spec(4, 5), &UniformProvider(attrs()), CombustionParams::default())
            .unwrap();
        assert_eq!(grid.cells().len(), 20);
        assert!(grid.gaps().is_empty());
        for (i, cell) in grid.cells().iter().enumerate() {
            assert_eq!(grid.index_of(cell.position), Some(i));
            for &n in &cell.neighbors {
                assert!(grid.cells()[n as usize].neighbors.contains(&(i as u32)));
            }
        }
    }

    #[test]
    fn provider_queried_once_per_cell() {
        let calls = std::cell::Cell::new(0u32);
        let provider = from_fn(|_| {
            calls.set(calls.get() + 1);
            Ok(attrs())
        });
        build_grid(&spec(3, 3), &provider, CombustionParams::default()).unwrap();
        assert_eq!(calls.get(), 9);
    }

    #[test]
    fn missing_attributes_become_non_combustible_gaps() {
        let provider = from_fn(|c: GeoCoordinate| {
            if c.longitude == 5.0 {
                Err(ProviderError::not_found(c))
            } else {
                Ok(attrs())
            }
        });
        let grid = build_grid(&spec(3, 3), &provider, CombustionParams::default()).unwrap();
        assert_eq!(grid.gaps().len(), 3);
        for gap in grid.gaps() {
            assert_eq!(gap.position.col, 0);
            let cell = grid.cell(gap.position).unwrap();
            assert!(!cell.combustible);
            assert!(cell.attributes.is_none());
        }
        assert!(grid.cell(GridPosition::new(1, 1)).unwrap().combustible);
    }

    #[test]
    fn invalid_records_are_gaps() {
        let provider = UniformProvider(EnvironmentalAttributes {
            fuel_load: 250.0,
            ..attrs()
        });
        let grid = build_grid(&spec(2, 2), &provider, CombustionParams::default()).unwrap();
        assert_eq!(grid.gaps().len(), 4);
        assert!(matches!(grid.gaps()[0].error, ProviderError::Invalid { .. }));
    }

    struct ShortBatch;

    impl EnvironmentProvider for ShortBatch {
        fn fetch_attributes(
            &self,
            _coordinate: GeoCoordinate,
        ) -> Result<EnvironmentalAttributes, ProviderError> {
            Ok(attrs())
        }

        fn fetch_batch(
            &self,
            coordinates: &[GeoCoordinate],
        ) -> Vec<Result<EnvironmentalAttributes, ProviderError>> {
            coordinates[..coordinates.len() - 1]
                .iter()
                .map(|&c| self.fetch_attributes(c))
                .collect()
        }
    }

    #[test]
    fn short_provider_batch_leaves_gap_not_missing_cell() {
        let grid = build_grid(&spec(3, 3), &ShortBatch, CombustionParams::default()).unwrap();
        assert_eq!(grid.cells().len(), 9);
        let last = grid.cell(GridPosition::new(2, 2)).unwrap();
        assert!(!last.combustible);
        assert_eq!(grid.gaps().len(), 1);
        assert!(matches!(grid.gaps()[0].error, ProviderError::Unavailable(_)));
        assert_eq!(grid.neighbors(GridPosition::new(2, 2)).count(), 3);
    }

    #[test]
    fn invalid_combustion_params_rejected() {
        let params = CombustionParams {
            decay_rate: -0.5,
            burnout_ticks: 1,
            ..CombustionParams::default()
        };
        let err = build_grid(&spec(1, 1), &UniformProvider(attrs()), params).unwrap_err();
        assert!(matches!(&err, BuildError::InvalidParams(r) if r.contains("decay_rate")));
        assert!(err.to_string().contains("combustion parameters"));
    }

    #[test]
    fn provider_down_everywhere_aborts() {
        let provider = from_fn(|_| Err(ProviderError::Unavailable("timeout".to_string())));
        let err = build_grid(&spec(2, 2), &provider, CombustionParams::default()).unwrap_err();
        assert!(matches!(err, BuildError::ProviderUnavailable(_)));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn zero_dimensions_rejected() {
        let err = build_grid(&spec(0, 3), &UniformProvider(attrs()), CombustionParams::default())
            .unwrap_err();
        assert_eq!(err, BuildError::EmptyDimensions { rows: 0, cols: 3 });
    }

    #[test]
    fn bad_scale_rejected() {
        let mut s = spec(2, 2);
        s.scale = 0.0;
        assert!(matches!(
            build_grid(&s, &UniformProvider(attrs()), CombustionParams::default()),
            Err(BuildError::InvalidScale(_))
        ));
    }

    #[test]
    fn inverted_bounds_rejected() {
        let mut s = spec(2, 2);
        s.bounds.south = 45.0;
        assert!(matches!(
            build_grid(&s, &UniformProvider(attrs()), CombustionParams::default()),
            Err(BuildError::InvalidBounds(_))
        ));
    }

    #[test]
    fn water_cells_are_not_combustible() {
        let provider = UniformProvider(EnvironmentalAttributes {
            surface: Surface::Water,
            ..attrs()
        });
        let grid = build_grid(&spec(2, 2), &provider, CombustionParams::default()).unwrap();
        assert!(grid.cells().iter().all(|c| !c.combustible));
        assert!(grid.gaps().is_empty());
    }

    #[test]
    fn clock_step_follows_scale() {
        let grid = build_grid(&spec(2, 2), &UniformProvider(attrs()), CombustionParams::default())
            .unwrap();
        assert_eq!(grid.clock().tick, 0);
        assert!((grid.clock().tick_minutes - 1.5).abs() < 1e-12);
    }

    #[test]
    fn snapshot_mirrors_cells() {
        let grid = build_grid(&spec(2, 3), &UniformProvider(attrs()), CombustionParams::default())
            .unwrap();
        let snap = grid.snapshot();
        assert_eq!(snap.cells.len(), 6);
        let p = GridPosition::new(1, 2);
        assert_eq!(snap.cell(p).unwrap().position, p);
        assert!(snap.cell(GridPosition::new(2, 0)).is_none());
        assert_eq!(snap.render_ascii(), "...\n...\n");
    }

    #[test]
    fn validation_map_marks_hits_misses_and_false_alarms() {
        let provider = from_fn(|c: GeoCoordinate| {
            Ok(EnvironmentalAttributes {
                observed_fire: c.longitude > 5.0,
                surface: if c.latitude < 44.0 { Surface::Water } else { Surface::Vegetation },
                ..attrs()
            })
        });
        let grid = build_grid(&spec(2, 3), &provider, CombustionParams::default()).unwrap();
        let mut snap = grid.snapshot();
        snap.cells[0].stage = Stage::Extinguished;
        snap.cells[1].stage = Stage::Decaying;
        assert_eq!(snap.render_validation(), "FHM\n~~~\n");
    }

    #[test]
    fn neighbors_iterator_resolves_cells() {
        let grid = build_grid(&spec(3, 3), &UniformProvider(attrs()), CombustionParams::default())
            .unwrap();
        assert_eq!(grid.neighbors(GridPosition::new(1, 1)).count(), 8);
        assert_eq!(grid.neighbors(GridPosition::new(0, 0)).count(), 3);
        assert_eq!(grid.neighbors(GridPosition::new(9, 9)).count(), 0);
    }
}
