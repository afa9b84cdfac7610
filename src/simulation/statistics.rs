use serde::{Deserialize, Serialize};

use crate::grid::cell::Stage;
use crate::grid::Grid;

/// Number of cells in each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub unburned: u32,
    pub spreading: u32,
    pub saturated: u32,
    pub decaying: u32,
    pub extinguished: u32,
}

impl StageCounts {
    pub fn get(&self, stage: Stage) -> u32 {
        match stage {
            Stage::Unburned => self.unburned,
            Stage::Spreading => self.spreading,
            Stage::Saturated => self.saturated,
            Stage::Decaying => self.decaying,
            Stage::Extinguished => self.extinguished,
        }
    }

    fn bump(&mut self, stage: Stage) {
        let slot = match stage {
            Stage::Unburned => &mut self.unburned,
            Stage::Spreading => &mut self.spreading,
            Stage::Saturated => &mut self.saturated,
            Stage::Decaying => &mut self.decaying,
            Stage::Extinguished => &mut self.extinguished,
        };
        *slot += 1;
    }

    pub fn total(&self) -> u32 {
        Stage::ALL.iter().map(|&s| self.get(s)).sum()
    }
}

/// Simulated burn scored against reported active-fire detections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireValidation {
    /// Burned and observed.
    pub hits: u32,
    /// Observed but never reached by the simulated fire.
    pub misses: u32,
    /// Burned without an observation.
    pub false_alarms: u32,
}

impl FireValidation {
    pub fn observed(&self) -> u32 {
        self.hits + self.misses
    }

    /// Share of observed cells the simulation burned, if anything was observed.
    pub fn hit_rate(&self) -> Option<f64> {
        match self.observed() {
            0 => None,
            n => Some(self.hits as f64 / n as f64),
        }
    }

    /// Share of burned cells with no observation, if anything burned.
    pub fn false_alarm_ratio(&self) -> Option<f64> {
        match self.hits + self.false_alarms {
            0 => None,
            n => Some(self.false_alarms as f64 / n as f64),
        }
    }

    fn record(&mut self, burned: bool, observed: bool) {
        match (burned, observed) {
            (true, true) => self.hits += 1,
            (false, true) => self.misses += 1,
            (true, false) => self.false_alarms += 1,
            (false, false) => {}
        }
    }
}

/// Per-tick aggregate metrics of a fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickStatistics {
    pub tick: u64,
    pub elapsed_minutes: f64,
    pub stage_counts: StageCounts,
    /// Spreading, saturated and decaying cells.
    pub frontier: u32,
    /// Cells past the unburned stage.
    pub burned_cells: u32,
    /// Hectares.
    pub burned_area_ha: f64,
    /// Mean intensity over combustible cells.
    pub mean_intensity: f64,
    pub validation: FireValidation,
}

/// Compute statistics for the current grid state.
pub fn compute_statistics(grid: &Grid) -> TickStatistics {
    let mut counts = StageCounts::default();
    let mut total_intensity = 0.0_f64;
    let mut combustible = 0u32;
    let mut validation = FireValidation::default();

    for cell in grid.cells() {
        counts.bump(cell.stage());
        if cell.combustible {
            validation.record(cell.stage().has_burned(), cell.observed_fire());
            combustible += 1;
            total_intensity += cell.intensity();
        }
    }

    let burned_cells = counts.total() - counts.unburned;
    let cell_area_ha = grid.scale() * grid.scale() / 10_000.0;

    TickStatistics {
        tick: grid.clock().tick,
        elapsed_minutes: grid.clock().elapsed_minutes,
        stage_counts: counts,
        frontier: counts.spreading + counts.saturated + counts.decaying,
        burned_cells,
        burned_area_ha: burned_cells as f64 * cell_area_ha,
        mean_intensity: if combustible == 0 {
            0.0
        } else {
            total_intensity / combustible as f64
        },
        validation,
    }
}
