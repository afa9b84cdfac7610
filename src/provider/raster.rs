use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::grid::cell::{GeoCoordinate, GridPosition};
use crate::grid::topology::GridLayout;
use crate::provider::{fetch_all, EnvironmentProvider, EnvironmentalAttributes, ProviderError};

/// Pre-sampled attributes on a regular lattice.
///
/// Lookups snap a coordinate to the nearest lattice point. Lattice points
/// without a record, and coordinates outside the lattice, are `NotFound`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterProvider {
    layout: GridLayout,
    /// Row-major, `layout.rows * layout.cols` entries.
    records: Vec<Option<EnvironmentalAttributes>>,
}

impl RasterProvider {
    pub fn new(
        layout: GridLayout,
        records: Vec<Option<EnvironmentalAttributes>>,
    ) -> Result<Self, String> {
        if records.len() != layout.cell_count() {
            return Err(format!(
                "raster has {} records but a {}x{} layout needs {}",
                records.len(),
                layout.rows,
                layout.cols,
                layout.cell_count()
            ));
        }
        Ok(RasterProvider { layout, records })
    }

    /// Sample `source` at every lattice point of `layout`. Failed lookups become holes.
    pub fn capture<P: EnvironmentProvider + ?Sized>(layout: GridLayout, source: &P) -> Self {
        let records = fetch_all(source, &layout.coordinates())
            .into_iter()
            .map(Result::ok)
            .collect();
        RasterProvider { layout, records }
    }

    /// Load a raster from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Cannot read raster {}: {}", path.display(), e))?;
        let raster: RasterProvider = serde_json::from_str(&content)
            .map_err(|e| format!("Invalid raster JSON in {}: {}", path.display(), e))?;
        RasterProvider::new(raster.layout, raster.records)
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Cannot encode raster: {}", e))?;
        fs::write(path, json).map_err(|e| format!("Cannot write raster {}: {}", path.display(), e))
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn record(&self, position: GridPosition) -> Option<&EnvironmentalAttributes> {
        self.layout
            .index(position)
            .and_then(|i| self.records[i].as_ref())
    }

    pub fn set_record(&mut self, position: GridPosition, attributes: Option<EnvironmentalAttributes>) {
        if let Some(i) = self.layout.index(position) {
            self.records[i] = attributes;
        }
    }
}

impl EnvironmentProvider for RasterProvider {
    fn fetch_attributes(
        &self,
        coordinate: GeoCoordinate,
    ) -> Result<EnvironmentalAttributes, ProviderError> {
        self.layout
            .locate(coordinate)
            .and_then(|p| self.record(p))
            .copied()
            .ok_or_else(|| ProviderError::not_found(coordinate))
    }
}
