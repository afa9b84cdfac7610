use std::io::Write;

use serde::Serialize;
use tracing::{info, warn};

use crate::grid::cell::Stage;
use crate::grid::Grid;
use crate::simulation::statistics::{compute_statistics, TickStatistics};
use crate::simulation::SimClock;

/// Receives the grid once after every tick.
///
/// Observers run synchronously between ticks and see a consistent, fully
/// committed state. They cannot mutate the grid.
pub trait Observer {
    fn on_tick(&mut self, clock: &SimClock, grid: &Grid);
}

impl Observer for () {
    fn on_tick(&mut self, _clock: &SimClock, _grid: &Grid) {}
}

impl<A: Observer, B: Observer> Observer for (A, B) {
    fn on_tick(&mut self, clock: &SimClock, grid: &Grid) {
        self.0.on_tick(clock, grid);
        self.1.on_tick(clock, grid);
    }
}

impl<O: Observer> Observer for Option<O> {
    fn on_tick(&mut self, clock: &SimClock, grid: &Grid) {
        if let Some(observer) = self {
            observer.on_tick(clock, grid);
        }
    }
}

impl<O: Observer + ?Sized> Observer for &mut O {
    fn on_tick(&mut self, clock: &SimClock, grid: &Grid) {
        (**self).on_tick(clock, grid);
    }
}

impl<O: Observer + ?Sized> Observer for Box<O> {
    fn on_tick(&mut self, clock: &SimClock, grid: &Grid) {
        (**self).on_tick(clock, grid);
    }
}

/// Observer backed by a closure.
pub struct FnObserver<F>(F);

pub fn from_fn<F>(f: F) -> FnObserver<F>
where
    F: FnMut(&SimClock, &Grid),
{
    FnObserver(f)
}

impl<F> Observer for FnObserver<F>
where
    F: FnMut(&SimClock, &Grid),
{
    fn on_tick(&mut self, clock: &SimClock, grid: &Grid) {
        (self.0)(clock, grid)
    }
}

// === Trace output ===

#[derive(Serialize)]
struct ChangedCell {
    row: u32,
    col: u32,
    stage: Stage,
    intensity: f64,
}

#[derive(Serialize)]
struct TraceLine<'a> {
    tick: u64,
    elapsed_minutes: f64,
    statistics: &'a TickStatistics,
    changed: Vec<ChangedCell>,
}

/// Writes one JSON object per tick listing the cells whose stage or intensity changed.
///
/// The first write error is logged and disables further output; the run itself continues.
pub struct JsonLinesObserver<W: Write> {
    writer: W,
    previous: Vec<(Stage, f64)>,
    lines: u64,
    failed: bool,
}

impl<W: Write> JsonLinesObserver<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesObserver {
            writer,
            previous: Vec::new(),
            lines: 0,
            failed: false,
        }
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, clock: &SimClock, grid: &Grid) -> std::io::Result<()> {
        if self.previous.len() != grid.cells().len() {
            self.previous = vec![(Stage::Unburned, 0.0); grid.cells().len()];
        }

        let mut changed = Vec::new();
        for (cell, prev) in grid.cells().iter().zip(self.previous.iter_mut()) {
            let now = (cell.stage(), cell.intensity());
            if now != *prev {
                changed.push(ChangedCell {
                    row: cell.position.row,
                    col: cell.position.col,
                    stage: now.0,
                    intensity: now.1,
                });
                *prev = now;
            }
        }

        let statistics = compute_statistics(grid);
        let line = TraceLine {
            tick: clock.tick,
            elapsed_minutes: clock.elapsed_minutes,
            statistics: &statistics,
            changed,
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }
}

impl<W: Write> Observer for JsonLinesObserver<W> {
    fn on_tick(&mut self, clock: &SimClock, grid: &Grid) {
        if self.failed {
            return;
        }
        if let Err(e) = self.write_line(clock, grid) {
            warn!(tick = clock.tick, error = %e, "Trace output failed, disabling");
            self.failed = true;
        }
    }
}

/// Logs run statistics every `every` ticks.
pub struct ProgressObserver {
    every: u64,
}

impl ProgressObserver {
    pub fn new(every: u64) -> Self {
        ProgressObserver {
            every: every.max(1),
        }
    }
}

impl Observer for ProgressObserver {
    fn on_tick(&mut self, clock: &SimClock, grid: &Grid) {
        if clock.tick % self.every != 0 {
            return;
        }
        let stats = compute_statistics(grid);
        info!(
            tick = clock.tick,
            elapsed_minutes = clock.elapsed_minutes,
            frontier = stats.frontier,
            spreading = stats.stage_counts.spreading,
            burned_cells = stats.burned_cells,
            burned_area_ha = stats.burned_area_ha,
            "Fire progress"
        );
    }
}

/// Records `(stage, intensity)` of every cell after every tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    ticks: Vec<u64>,
    frames: Vec<Vec<(Stage, f64)>>,
}

impl History {
    pub fn new() -> Self {
        History::default()
    }

    pub fn frames(&self) -> &[Vec<(Stage, f64)>] {
        &self.frames
    }

    pub fn ticks(&self) -> &[u64] {
        &self.ticks
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Stage of the cell at dense index `index` after each recorded tick.
    pub fn stages_of(&self, index: usize) -> Vec<Stage> {
        self.frames.iter().filter_map(|f| f.get(index).map(|c| c.0)).collect()
    }
}

impl Observer for History {
    fn on_tick(&mut self, clock: &SimClock, grid: &Grid) {
        self.ticks.push(clock.tick);
        self.frames.push(
            grid.cells()
                .iter()
                .map(|c| (c.stage(), c.intensity()))
                .collect(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{build_grid, BoundingBox, GridPosition, GridSpec};
    use crate::provider::{EnvironmentalAttributes, Surface, UniformProvider};
    use crate::simulation::combustion::CombustionParams;
    use crate::simulation::{ignite, ignite_many, RunOptions};

    fn grid() -> Grid {
        let spec = GridSpec {
            rows: 3,
            cols: 3,
            bounds: BoundingBox {
                north: 38.0,
                south: 37.9,
                east: -122.0,
                west: -122.1,
            },
            scale: 30.0,
        };
        let attrs = EnvironmentalAttributes {
            elevation: 0.0,
            fuel_load: 70.0,
            temperature: 30.0,
            humidity: 20.0,
            wind_direction: 0.0,
            wind_speed: 0.0,
            surface: Surface::Vegetation,
            observed_fire: false,
        };
        let params = CombustionParams {
            precision: 1.0,
            burnout_ticks: 8,
            decay_rate: 0.5,
            ..CombustionParams::default()
        };
        build_grid(&spec, &UniformProvider(attrs), params).unwrap()
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn json_lines_one_line_per_tick() {
        let mut g = grid();
        let mut trace = JsonLinesObserver::new(Vec::new());
        let outcome = ignite(&mut g, GridPosition::new(1, 1), 1600, &mut trace).unwrap();
        assert_eq!(trace.lines_written(), outcome.ticks);

        let out = String::from_utf8(trace.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len() as u64, outcome.ticks);
        assert_eq!(lines[0]["tick"], 1);
        assert!(lines[0]["statistics"]["stage_counts"]["spreading"].as_u64().unwrap() >= 1);
    }

    #[test]
    fn json_lines_report_only_changes() {
        let mut g = grid();
        let mut trace = JsonLinesObserver::new(Vec::new());
        ignite(&mut g, GridPosition::new(1, 1), 2, &mut trace).unwrap();
        let out = String::from_utf8(trace.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        // Tick 1: seed becomes visible plus eight heated neighbours.
        assert_eq!(lines[0]["changed"].as_array().unwrap().len(), 9);
        // Tick 2: only the neighbours gained heat.
        assert_eq!(lines[1]["changed"].as_array().unwrap().len(), 8);
    }

    #[test]
    fn write_failure_disables_trace_but_run_completes() {
        let mut g = grid();
        let mut trace = JsonLinesObserver::new(FailingWriter);
        let outcome = ignite(&mut g, GridPosition::new(0, 0), 1600, &mut trace).unwrap();
        assert!(trace.has_failed());
        assert_eq!(trace.lines_written(), 0);
        assert!(outcome.ticks > 1);
    }

    #[test]
    fn pair_forwards_to_both() {
        let mut g = grid();
        let mut observers = (History::new(), History::new());
        ignite(&mut g, GridPosition::new(2, 2), 4, &mut observers).unwrap();
        assert_eq!(observers.0.len(), 4);
        assert_eq!(observers.0, observers.1);
    }

    #[test]
    fn history_records_ticks_in_order() {
        let mut g = grid();
        let mut history = History::new();
        let outcome = ignite(&mut g, GridPosition::new(0, 0), 1600, &mut history).unwrap();
        assert_eq!(history.len() as u64, outcome.ticks);
        assert_eq!(history.ticks()[0], 1);
        let seed = history.stages_of(0);
        assert_eq!(seed.last(), Some(&Stage::Extinguished));
    }

    #[test]
    fn progress_and_dyn_observers_compose() {
        let mut g = grid();
        let mut progress = ProgressObserver::new(2);
        let observer: &mut dyn Observer = &mut progress;
        let outcome =
            ignite_many(&mut g, &[GridPosition::new(1, 1)], &RunOptions::new(6), observer).unwrap();
        assert_eq!(outcome.ticks, 6);

        let mut boxed: Box<dyn Observer> = Box::new(History::new());
        let mut g = grid();
        ignite(&mut g, GridPosition::new(1, 1), 3, &mut boxed).unwrap();
    }
}
