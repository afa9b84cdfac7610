pub mod combustion;
pub mod observer;
pub mod statistics;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::grid::cell::{GridPosition, Stage};
use crate::grid::Grid;
use crate::simulation::combustion::{contribution, spread_between, PairCoefficients};
use crate::simulation::observer::Observer;
use crate::simulation::statistics::{compute_statistics, TickStatistics};

/// Simulated time. Starts at tick 0 and advances by a fixed step per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimClock {
    pub tick: u64,
    pub elapsed_minutes: f64,
    /// Simulated minutes per tick.
    pub tick_minutes: f64,
}

impl SimClock {
    pub fn new(tick_minutes: f64) -> Self {
        SimClock {
            tick: 0,
            elapsed_minutes: 0.0,
            tick_minutes,
        }
    }

    fn advance(&mut self) {
        self.tick += 1;
        self.elapsed_minutes = self.tick as f64 * self.tick_minutes;
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// No cell is spreading, saturated or decaying.
    FrontierExhausted,
    IterationCap,
    Cancelled,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::FrontierExhausted => write!(f, "frontier exhausted"),
            Termination::IterationCap => write!(f, "iteration cap reached"),
            Termination::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Cooperative cancellation, checked after every tick.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_iterations: u64,
    pub cancel: Option<CancelFlag>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            max_iterations: 1600,
            cancel: None,
        }
    }
}

impl RunOptions {
    pub fn new(max_iterations: u64) -> Self {
        RunOptions {
            max_iterations,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

/// Rejected ignition request. The grid is left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnitionError {
    NoIgnitionPoints,
    OutOfBounds {
        position: GridPosition,
        rows: u32,
        cols: u32,
    },
    NonCombustible(GridPosition),
    AlreadyBurning(GridPosition),
    ZeroIterationCap,
}

impl std::fmt::Display for IgnitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnitionError::NoIgnitionPoints => write!(f, "No ignition points given"),
            IgnitionError::OutOfBounds {
                position,
                rows,
                cols,
            } => write!(
                f,
                "Ignition point {} is outside the {}x{} grid",
                position, rows, cols
            ),
            IgnitionError::NonCombustible(p) => {
                write!(f, "Ignition point {} is not combustible", p)
            }
            IgnitionError::AlreadyBurning(p) => {
                write!(f, "Ignition point {} is already burning or burned", p)
            }
            IgnitionError::ZeroIterationCap => {
                write!(f, "max_iterations must be > 0")
            }
        }
    }
}

impl std::error::Error for IgnitionError {}

/// Summary of a finished run. The grid holds the final per-cell state.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub ticks: u64,
    pub elapsed_minutes: f64,
    pub termination: Termination,
    pub statistics: TickStatistics,
    /// Cells that reached the spreading stage, seeds included.
    pub ignited_cells: usize,
}

/// Counts of what happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickResult {
    pub ignited: usize,
    pub saturated: usize,
    pub began_decay: usize,
    pub extinguished: usize,
    pub frontier: usize,
}

// === Frontier ===

#[derive(Debug, Clone, Copy, Default)]
struct Incoming {
    delta: f64,
    strongest: Option<PairCoefficients>,
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Saturate(u32),
    BeginDecay(u32),
    Decay(u32),
}

/// Cells that are spreading, saturated or decaying, iterated in grid order.
///
/// Also owns the scratch buffers a tick accumulates into, so repeated ticks
/// do not reallocate.
#[derive(Debug, Clone)]
pub struct Frontier {
    active: Vec<bool>,
    members: Vec<u32>,
    incoming: Vec<Incoming>,
    touched: Vec<u32>,
    transitions: Vec<Transition>,
}

impl Frontier {
    /// Collect every active cell currently on the grid.
    pub fn from_grid(grid: &Grid) -> Self {
        let n = grid.cells().len();
        let mut active = vec![false; n];
        let mut members = Vec::new();
        for (i, cell) in grid.cells().iter().enumerate() {
            if cell.stage.is_active() {
                active[i] = true;
                members.push(i as u32);
            }
        }
        Frontier {
            active,
            members,
            incoming: vec![Incoming::default(); n],
            touched: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.active.get(index).copied().unwrap_or(false)
    }

    /// Grid indices of member cells, ascending.
    pub fn members(&self) -> &[u32] {
        &self.members
    }
}

// === Tick ===

/// Advance the fire by one tick.
///
/// Phase 1 reads the grid and accumulates every spreading cell's contribution
/// to its unburned neighbours, plus the stage transitions due this tick.
/// Phase 2 commits them. A cell ignited in phase 2 does not spread until the
/// next tick, and the result does not depend on iteration order.
pub fn execute_tick(grid: &mut Grid, frontier: &mut Frontier) -> TickResult {
    let tick = grid.clock.tick;
    let params = *grid.params();
    let tick_minutes = grid.clock.tick_minutes;
    let scale = grid.scale();

    frontier.touched.clear();
    frontier.transitions.clear();

    // Phase 1: read-only accumulation.
    {
        let cells = grid.cells();
        for &s in &frontier.members {
            let source = &cells[s as usize];
            let burned_out = source
                .ignited_at
                .is_some_and(|t| tick.saturating_sub(t) >= params.burnout_ticks as u64);

            match source.stage {
                Stage::Spreading if burned_out => {
                    frontier.transitions.push(Transition::BeginDecay(s));
                }
                Stage::Spreading => {
                    let mut has_target = false;
                    for &n in &source.neighbors {
                        let target = &cells[n as usize];
                        if !target.is_ignitable() {
                            continue;
                        }
                        has_target = true;
                        let Some(pair) = spread_between(source, target, &params) else {
                            continue;
                        };
                        let slot = &mut frontier.incoming[n as usize];
                        if slot.delta == 0.0 && slot.strongest.is_none() {
                            frontier.touched.push(n);
                        }
                        slot.delta += contribution(pair.effective_rate, tick_minutes, scale);
                        if slot
                            .strongest
                            .is_none_or(|best| pair.effective_rate > best.effective_rate)
                        {
                            slot.strongest = Some(pair);
                        }
                    }
                    if !has_target {
                        frontier.transitions.push(Transition::Saturate(s));
                    }
                }
                Stage::Saturated if burned_out => {
                    frontier.transitions.push(Transition::BeginDecay(s));
                }
                Stage::Decaying => frontier.transitions.push(Transition::Decay(s)),
                _ => {}
            }
        }
    }

    // Phase 2: apply in ascending grid order.
    let mut result = TickResult::default();
    let next_tick = tick + 1;
    frontier.touched.sort_unstable();

    let cells = grid.cells_mut();
    for &n in &frontier.touched {
        let slot = std::mem::take(&mut frontier.incoming[n as usize]);
        let cell = &mut cells[n as usize];
        if !cell.is_ignitable() {
            continue;
        }
        cell.intensity = (cell.intensity + slot.delta).min(1.0);
        if let Some(pair) = slot.strongest {
            cell.coefficients.wind_factor = pair.wind_factor;
            cell.coefficients.slope_factor = pair.slope_factor;
            cell.coefficients.effective_rate = pair.effective_rate;
        }
        if cell.intensity >= 1.0 {
            cell.intensity = 1.0;
            cell.stage = Stage::Spreading;
            cell.ignited_at = Some(next_tick);
            frontier.active[n as usize] = true;
            frontier.members.push(n);
            result.ignited += 1;
        }
    }

    for &transition in &frontier.transitions {
        match transition {
            Transition::Saturate(s) => {
                cells[s as usize].stage = Stage::Saturated;
                result.saturated += 1;
            }
            Transition::BeginDecay(s) => {
                cells[s as usize].stage = Stage::Decaying;
                result.began_decay += 1;
            }
            Transition::Decay(s) => {
                let cell = &mut cells[s as usize];
                cell.intensity -= params.decay_rate;
                if cell.intensity <= 0.0 {
                    cell.intensity = 0.0;
                    cell.stage = Stage::Extinguished;
                    frontier.active[s as usize] = false;
                    result.extinguished += 1;
                }
            }
        }
    }

    if result.extinguished > 0 {
        let active = &frontier.active;
        frontier.members.retain(|&m| active[m as usize]);
    }
    if result.ignited > 0 {
        frontier.members.sort_unstable();
    }

    grid.clock.advance();
    result.frontier = frontier.len();

    debug!(
        tick = grid.clock.tick,
        ignited = result.ignited,
        saturated = result.saturated,
        began_decay = result.began_decay,
        extinguished = result.extinguished,
        frontier = result.frontier,
        "Tick complete"
    );

    result
}

// === Runs ===

/// Ignite a single cell and run until the frontier empties or `max_iterations` ticks pass.
pub fn ignite<O: Observer + ?Sized>(
    grid: &mut Grid,
    start: GridPosition,
    max_iterations: u64,
    observer: &mut O,
) -> Result<RunOutcome, IgnitionError> {
    ignite_many(grid, &[start], &RunOptions::new(max_iterations), observer)
}

/// Ignite every cell in `starts` at the current tick and run the fire to completion.
///
/// All starts are validated before the grid is touched; duplicates are collapsed.
/// The observer sees the grid after every tick.
pub fn ignite_many<O: Observer + ?Sized>(
    grid: &mut Grid,
    starts: &[GridPosition],
    options: &RunOptions,
    observer: &mut O,
) -> Result<RunOutcome, IgnitionError> {
    let seeds = validate_starts(grid, starts, options).inspect_err(|e| {
        warn!(error = %e, "Ignition rejected");
    })?;

    let seeded_at = grid.clock.tick;
    for &i in &seeds {
        let cell = &mut grid.cells_mut()[i];
        cell.stage = Stage::Spreading;
        cell.intensity = 1.0;
        cell.ignited_at = Some(seeded_at);
    }
    info!(
        seeds = seeds.len(),
        tick = seeded_at,
        max_iterations = options.max_iterations,
        "Fire ignited"
    );

    let start = Instant::now();
    let mut frontier = Frontier::from_grid(grid);
    let mut ticks = 0u64;

    let termination = loop {
        if frontier.is_empty() {
            break Termination::FrontierExhausted;
        }
        if ticks >= options.max_iterations {
            break Termination::IterationCap;
        }
        execute_tick(grid, &mut frontier);
        ticks += 1;
        observer.on_tick(&grid.clock, grid);
        if options.is_cancelled() {
            break Termination::Cancelled;
        }
    };

    let statistics = compute_statistics(grid);
    let ignited_cells = grid
        .cells()
        .iter()
        .filter(|c| c.ignited_at.is_some())
        .count();

    info!(
        termination = %termination,
        ticks,
        elapsed_minutes = grid.clock.elapsed_minutes,
        ignited_cells,
        burned_area_ha = statistics.burned_area_ha,
        wall_ms = start.elapsed().as_millis() as u64,
        "Run finished"
    );

    Ok(RunOutcome {
        ticks,
        elapsed_minutes: grid.clock.elapsed_minutes,
        termination,
        statistics,
        ignited_cells,
    })
}

/// Resolve ignition points to sorted, unique grid indices.
fn validate_starts(
    grid: &Grid,
    starts: &[GridPosition],
    options: &RunOptions,
) -> Result<Vec<usize>, IgnitionError> {
    if options.max_iterations == 0 {
        return Err(IgnitionError::ZeroIterationCap);
    }
    if starts.is_empty() {
        return Err(IgnitionError::NoIgnitionPoints);
    }

    let mut seeds = Vec::with_capacity(starts.len());
    for &position in starts {
        let index = grid.index_of(position).ok_or(IgnitionError::OutOfBounds {
            position,
            rows: grid.rows(),
            cols: grid.cols(),
        })?;
        let cell = &grid.cells()[index];
        if !cell.combustible {
            return Err(IgnitionError::NonCombustible(position));
        }
        if cell.stage != Stage::Unburned {
            return Err(IgnitionError::AlreadyBurning(position));
        }
        seeds.push(index);
    }
    seeds.sort_unstable();
    seeds.dedup();
    Ok(seeds)
}
