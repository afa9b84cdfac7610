use serde::{Deserialize, Serialize};

use crate::provider::EnvironmentalAttributes;
use crate::simulation::combustion::{self, CombustionParams};

// === Position ===

/// Integer grid address. Rows grow southward, columns eastward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GridPosition {
    pub row: u32,
    pub col: u32,
}

impl GridPosition {
    pub const fn new(row: u32, col: u32) -> Self {
        GridPosition { row, col }
    }

    /// Max of the row and column offsets.
    pub fn chebyshev_distance(self, other: GridPosition) -> u32 {
        self.row.abs_diff(other.row).max(self.col.abs_diff(other.col))
    }
}

impl std::fmt::Display for GridPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Latitude/longitude in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        GeoCoordinate {
            latitude,
            longitude,
        }
    }
}

// === Fire state ===

/// Combustion stage. Declaration order is the only order a cell may visit them in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Stage {
    Unburned,
    Spreading,
    Saturated,
    Decaying,
    Extinguished,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Unburned,
        Stage::Spreading,
        Stage::Saturated,
        Stage::Decaying,
        Stage::Extinguished,
    ];

    /// Stages whose cells belong to the frontier.
    pub fn is_active(self) -> bool {
        matches!(self, Stage::Spreading | Stage::Saturated | Stage::Decaying)
    }

    pub fn has_burned(self) -> bool {
        self != Stage::Unburned
    }

    /// Single-character glyph for terminal maps.
    pub fn glyph(self) -> char {
        match self {
            Stage::Unburned => '.',
            Stage::Spreading => '#',
            Stage::Saturated => '*',
            Stage::Decaying => '+',
            Stage::Extinguished => '_',
        }
    }
}

/// Combustion coefficients of a cell.
///
/// `fuel_factor` and `base_rate` are fixed at construction. The pair factors
/// describe the strongest burning neighbour that heated this cell on the most
/// recent tick it received heat.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coefficients {
    pub fuel_factor: f64,
    pub base_rate: f64,
    pub wind_factor: f64,
    pub slope_factor: f64,
    pub effective_rate: f64,
}

// === Cell ===

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub position: GridPosition,
    pub coordinate: GeoCoordinate,
    /// `None` when the provider had no usable record for this coordinate.
    pub attributes: Option<EnvironmentalAttributes>,
    pub combustible: bool,
    /// Grid indices of Moore neighbours, ascending.
    pub neighbors: Vec<u32>,
    pub coefficients: Coefficients,
    pub(crate) intensity: f64,
    pub(crate) stage: Stage,
    pub(crate) ignited_at: Option<u64>,
}

impl Cell {
    pub fn new(
        position: GridPosition,
        coordinate: GeoCoordinate,
        attributes: Option<EnvironmentalAttributes>,
        params: &CombustionParams,
    ) -> Self {
        let combustible = attributes.is_some_and(|a| a.is_combustible());
        let coefficients = match attributes {
            Some(attrs) => Coefficients {
                fuel_factor: combustion::fuel_factor(attrs.fuel_load),
                base_rate: combustion::base_rate(&attrs, params),
                ..Coefficients::default()
            },
            None => Coefficients::default(),
        };

        Cell {
            position,
            coordinate,
            attributes,
            combustible,
            neighbors: Vec::with_capacity(8),
            coefficients,
            intensity: 0.0,
            stage: Stage::Unburned,
            ignited_at: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Fire intensity in [0, 1].
    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    /// Tick at which the cell started spreading.
    pub fn ignited_at(&self) -> Option<u64> {
        self.ignited_at
    }

    /// Can still receive heat and catch fire.
    pub fn is_ignitable(&self) -> bool {
        self.combustible && self.stage == Stage::Unburned
    }

    pub fn elevation(&self) -> Option<f64> {
        self.attributes.map(|a| a.elevation)
    }

    /// Whether the provider reported an active fire at this cell.
    pub fn observed_fire(&self) -> bool {
        self.attributes.is_some_and(|a| a.observed_fire)
    }
}
