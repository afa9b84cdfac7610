use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::simulation::SimulationConfig;
use crate::config::terrain::{ProviderConfig, TerrainParams};
use crate::grid::{build_grid, CellSnapshot, GridPosition, GridSnapshot};
use crate::persistence::{self, RunSnapshot};
use crate::provider::{CachedProvider, EnvironmentProvider, ProceduralProvider, RasterProvider};
use crate::simulation::observer::{JsonLinesObserver, ProgressObserver};
use crate::simulation::{ignite_many, RunOptions};

/// Ticks between progress log lines.
const PROGRESS_EVERY: u64 = 100;

/// Parse a `ROW,COL` pair.
pub fn parse_position(s: &str) -> Result<GridPosition, String> {
    let (row, col) = s
        .split_once(',')
        .ok_or_else(|| format!("expected ROW,COL, got '{}'", s))?;
    let row = row
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid row '{}': {}", row.trim(), e))?;
    let col = col
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid column '{}': {}", col.trim(), e))?;
    Ok(GridPosition::new(row, col))
}

/// Options of the `simulate` command.
#[derive(Debug, Clone, Default)]
pub struct SimulateOptions {
    pub terrain: PathBuf,
    /// Overrides the terrain file's ignition points when non-empty.
    pub ignite: Vec<GridPosition>,
    pub max_iterations: Option<u64>,
    pub trace: Option<PathBuf>,
    pub no_snapshot: bool,
}

/// Construct the configured attribute source.
pub fn open_provider(config: &ProviderConfig) -> Result<Box<dyn EnvironmentProvider>, String> {
    if config.is_raster() {
        let path = config
            .raster_path
            .as_deref()
            .ok_or("provider.raster_path is required in raster mode")?;
        let raster = RasterProvider::from_file(Path::new(path))?;
        info!(path, rows = raster.layout().rows, cols = raster.layout().cols, "Raster loaded");
        Ok(Box::new(raster))
    } else {
        let provider = ProceduralProvider::new(&config.procedural);
        info!(seed = provider.seed(), "Procedural terrain");
        Ok(Box::new(provider))
    }
}

/// Build the grid, light the fire and run it to completion.
pub fn simulate(config: &SimulationConfig, options: &SimulateOptions) -> Result<(), String> {
    let terrain = TerrainParams::from_file(&options.terrain)?;
    let spec = terrain.grid_spec();

    let base = open_provider(&terrain.provider)?;
    let grid = match terrain.provider.cache_path.as_deref().map(Path::new) {
        Some(cache_path) => {
            let cached = CachedProvider::with_cache_file(base, cache_path)
                .map_err(|e| format!("Failed to load attribute cache: {}", e))?;
            let grid = build_grid(&spec, &cached, config.combustion());
            debug!(hits = cached.hits(), misses = cached.misses(), "Attribute cache usage");
            if let Err(e) = cached.save(cache_path) {
                warn!(path = %cache_path.display(), error = %e, "Attribute cache save failed");
            }
            grid
        }
        None => build_grid(&spec, &base, config.combustion()),
    };
    let mut grid = grid.map_err(|e| format!("Failed to build grid: {}", e))?;

    let starts = if options.ignite.is_empty() {
        terrain.ignition_points()
    } else {
        options.ignite.clone()
    };

    let run_options = RunOptions::new(options.max_iterations.unwrap_or(config.max_iterations));

    let trace = match &options.trace {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| format!("Cannot create trace file {}: {}", path.display(), e))?;
            Some(JsonLinesObserver::new(BufWriter::new(file)))
        }
        None => None,
    };
    let mut observers = (ProgressObserver::new(PROGRESS_EVERY), trace);

    let outcome = ignite_many(&mut grid, &starts, &run_options, &mut observers)
        .map_err(|e| format!("Cannot ignite: {}", e))?;

    if let Some(trace) = observers.1 {
        let lines = trace.lines_written();
        trace
            .into_inner()
            .flush()
            .map_err(|e| format!("Cannot flush trace file: {}", e))?;
        if let Some(path) = &options.trace {
            println!("Trace: {} tick(s) written to {}", lines, path.display());
        }
    }

    let stats = &outcome.statistics;
    println!("=== Run summary ===");
    println!("Grid: {}x{} @ {} m", grid.rows(), grid.cols(), grid.scale());
    println!("Attribute gaps: {}", grid.gaps().len());
    println!("Termination: {}", outcome.termination);
    println!(
        "Ticks: {} ({:.1} simulated minutes)",
        outcome.ticks, outcome.elapsed_minutes
    );
    println!("Ignited cells: {}", outcome.ignited_cells);
    println!(
        "Burned: {} cells, {:.2} ha",
        stats.burned_cells, stats.burned_area_ha
    );
    println!(
        "Stages: unburned {} | spreading {} | saturated {} | decaying {} | extinguished {}",
        stats.stage_counts.unburned,
        stats.stage_counts.spreading,
        stats.stage_counts.saturated,
        stats.stage_counts.decaying,
        stats.stage_counts.extinguished
    );

    if !options.no_snapshot {
        let snapshot_dir = Path::new(&config.snapshot_directory);
        let run = RunSnapshot::new(&grid, &starts, &outcome);
        let path = persistence::save_snapshot(&run, snapshot_dir)
            .map_err(|e| format!("Cannot save snapshot: {}", e))?;
        println!("Snapshot saved: {}", path.display());

        if let Err(e) = persistence::prune_snapshots(snapshot_dir, config.max_snapshots as usize) {
            warn!(error = %e, "Snapshot pruning failed");
        }
    }

    Ok(())
}

/// Inspect a cell or the burn map of a stored run.
pub fn inspect(
    config: &SimulationConfig,
    snapshot: Option<&Path>,
    cell: Option<GridPosition>,
    show_map: bool,
) -> Result<(), String> {
    let run = match snapshot {
        Some(path) => persistence::load_snapshot(path),
        None => persistence::load_latest_valid_snapshot(Path::new(&config.snapshot_directory)),
    }
    .map_err(|e| format!("Failed to load snapshot: {}", e))?;

    let grid = run.grid();
    if let Some(position) = cell {
        let c = grid.cell(position).ok_or_else(|| {
            format!(
                "Cell {} not found (grid is {}x{})",
                position, grid.rows, grid.cols
            )
        })?;
        print_cell(c);
        Ok(())
    } else if show_map {
        print_run(&run, &grid);
        Ok(())
    } else {
        Err("Specify --cell ROW,COL or --map".to_string())
    }
}

fn print_cell(cell: &CellSnapshot) {
    println!("=== Cell {} ===", cell.position);
    println!(
        "Coordinate: ({:.6}, {:.6})",
        cell.coordinate.latitude, cell.coordinate.longitude
    );
    println!("Stage: {:?}", cell.stage);
    println!("Intensity: {:.3}", cell.intensity);
    match cell.ignited_at {
        Some(t) => println!("Ignited at tick: {}", t),
        None => println!("Ignited at tick: never"),
    }
    println!();
    println!("--- Attributes ---");
    match &cell.attributes {
        Some(a) => {
            println!("  Surface: {:?}", a.surface);
            println!("  Elevation: {:.1} m", a.elevation);
            println!("  Fuel load: {:.1}%", a.fuel_load);
            println!("  Temperature: {:.1}°C", a.temperature);
            println!("  Humidity: {:.1}%", a.humidity);
            println!("  Wind: {:.1} m/s from {:.0}°", a.wind_speed, a.wind_direction);
            println!("  Observed fire: {}", if a.observed_fire { "yes" } else { "no" });
        }
        None => println!("  (no data, non-combustible)"),
    }
    println!();
    println!("--- Coefficients ---");
    let k = &cell.coefficients;
    println!("  Fuel factor: {:.4}", k.fuel_factor);
    println!("  Base rate: {:.4} m/min", k.base_rate);
    println!("  Wind factor: {:.4}", k.wind_factor);
    println!("  Slope factor: {:.4}", k.slope_factor);
    println!("  Effective rate: {:.4} m/min", k.effective_rate);
}

fn print_run(run: &RunSnapshot, grid: &GridSnapshot) {
    println!("=== Run {} ===", run.id);
    println!(
        "Grid: {}x{} @ {} m | ticks {} | {}",
        run.rows, run.cols, run.scale, run.ticks, run.termination
    );
    let ignitions: Vec<String> = run.ignitions.iter().map(|p| p.to_string()).collect();
    println!("Ignitions: {}", ignitions.join(" "));
    println!(
        "Burned: {} cells, {:.2} ha",
        run.statistics.burned_cells, run.statistics.burned_area_ha
    );
    println!();
    print!("{}", grid.render_ascii());
    println!();
    println!("Legend: . unburned  # spreading  * saturated  + decaying  _ extinguished  ~ non-combustible");

    let v = run.statistics.validation;
    if v.observed() == 0 {
        return;
    }
    println!();
    println!("=== Observed fire ===");
    println!(
        "Hits: {}  Misses: {}  False alarms: {}",
        v.hits, v.misses, v.false_alarms
    );
    if let Some(rate) = v.hit_rate() {
        println!("Hit rate: {:.1}%", rate * 100.0);
    }
    if let Some(ratio) = v.false_alarm_ratio() {
        println!("False alarm ratio: {:.1}%", ratio * 100.0);
    }
    println!();
    print!("{}", grid.render_validation());
    println!();
    println!("Legend: H hit  M missed  F false alarm  . neither  ~ non-combustible");
}

/// Print the snapshot table for `dir`.
pub fn list_snapshots(dir: &Path) -> Result<(), String> {
    let snapshots =
        persistence::list_snapshots(dir).map_err(|e| format!("Error listing snapshots: {}", e))?;
    if snapshots.is_empty() {
        println!("No snapshots found in {}", dir.display());
        return Ok(());
    }

    println!("{:<68} {:>8} {:>12}", "File", "Ticks", "Size");
    println!("{}", "-".repeat(90));
    for s in &snapshots {
        let name = s
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("?");
        println!("{:<68} {:>8} {:>9} KB", name, s.ticks, s.file_size / 1024);
    }
    println!("\n{} snapshot(s) in {}", snapshots.len(), dir.display());
    Ok(())
}
