use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::grid::{CellSnapshot, Grid, GridPosition, GridSnapshot};
use crate::simulation::statistics::TickStatistics;
use crate::simulation::{RunOutcome, Termination};

/// Final state of a finished run, persisted for later inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub id: Uuid,
    /// Unix seconds.
    pub created_at: u64,
    pub rows: u32,
    pub cols: u32,
    pub scale: f64,
    pub ignitions: Vec<GridPosition>,
    pub ticks: u64,
    pub elapsed_minutes: f64,
    pub termination: Termination,
    pub statistics: TickStatistics,
    pub cells: Vec<CellSnapshot>,
}

impl RunSnapshot {
    pub fn new(grid: &Grid, ignitions: &[GridPosition], outcome: &RunOutcome) -> Self {
        let snapshot = grid.snapshot();
        RunSnapshot {
            id: Uuid::new_v4(),
            created_at: unix_timestamp_now(),
            rows: snapshot.rows,
            cols: snapshot.cols,
            scale: snapshot.scale,
            ignitions: ignitions.to_vec(),
            ticks: outcome.ticks,
            elapsed_minutes: outcome.elapsed_minutes,
            termination: outcome.termination,
            statistics: outcome.statistics.clone(),
            cells: snapshot.cells,
        }
    }

    /// Grid view of the stored cells.
    pub fn grid(&self) -> GridSnapshot {
        GridSnapshot {
            rows: self.rows,
            cols: self.cols,
            scale: self.scale,
            tick: self.statistics.tick,
            elapsed_minutes: self.elapsed_minutes,
            cells: self.cells.clone(),
        }
    }
}

/// Metadata about a snapshot file on disk.
#[derive(Debug, Clone)]
pub struct SnapshotMetadata {
    pub path: PathBuf,
    pub id: Uuid,
    pub ticks: u64,
    pub timestamp: u64,
    pub file_size: u64,
}

/// Errors that can occur during snapshot operations.
#[derive(Debug)]
pub enum SnapshotError {
    Io(io::Error),
    Serialize(String),
    Deserialize(String),
    Corrupt(PathBuf),
    NoValidSnapshots,
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Io(e) => write!(f, "I/O error: {}", e),
            SnapshotError::Serialize(e) => write!(f, "Serialization error: {}", e),
            SnapshotError::Deserialize(e) => write!(f, "Deserialization error: {}", e),
            SnapshotError::Corrupt(path) => {
                write!(f, "Corrupt snapshot: {}", path.display())
            }
            SnapshotError::NoValidSnapshots => {
                write!(
                    f,
                    "No valid snapshots found. Run a fire first with: wildfire simulate"
                )
            }
        }
    }
}

impl std::error::Error for SnapshotError {}

impl From<io::Error> for SnapshotError {
    fn from(e: io::Error) -> Self {
        SnapshotError::Io(e)
    }
}

fn snapshot_filename(ticks: u64, timestamp: u64, id: Uuid) -> String {
    format!("run-tick{}-{}-{}.bin", ticks, timestamp, id.simple())
}

/// Parse tick count, timestamp and run id from `run-tick{N}-{timestamp}-{id}.bin`.
fn parse_snapshot_filename(filename: &str) -> Option<(u64, u64, Uuid)> {
    let stem = filename.strip_suffix(".bin")?;
    let rest = stem.strip_prefix("run-tick")?;
    let mut parts = rest.splitn(3, '-');
    let tick = parts.next()?.parse::<u64>().ok()?;
    let ts = parts.next()?.parse::<u64>().ok()?;
    let id = Uuid::try_parse(parts.next()?).ok()?;
    Some((tick, ts, id))
}

fn unix_timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Save a run snapshot using a temp file and atomic rename.
pub fn save_snapshot(run: &RunSnapshot, snapshot_dir: &Path) -> Result<PathBuf, SnapshotError> {
    fs::create_dir_all(snapshot_dir)?;

    let filename = snapshot_filename(run.ticks, run.created_at, run.id);
    let target = snapshot_dir.join(&filename);
    let tmp = snapshot_dir.join(format!(".{}.tmp", filename));

    let encoded = bincode::serialize(run).map_err(|e| SnapshotError::Serialize(e.to_string()))?;

    if let Err(e) = fs::write(&tmp, &encoded) {
        let _ = fs::remove_file(&tmp);
        return Err(SnapshotError::Io(e));
    }

    if let Err(e) = fs::rename(&tmp, &target) {
        let _ = fs::remove_file(&tmp);
        return Err(SnapshotError::Io(e));
    }

    debug!(path = %target.display(), bytes = encoded.len(), "Snapshot written");
    Ok(target)
}

/// Load a run snapshot, checking that the cell list matches the stored dimensions.
pub fn load_snapshot(path: &Path) -> Result<RunSnapshot, SnapshotError> {
    let data = fs::read(path)?;
    let run: RunSnapshot =
        bincode::deserialize(&data).map_err(|e| SnapshotError::Deserialize(e.to_string()))?;

    if run.cells.len() != run.rows as usize * run.cols as usize {
        return Err(SnapshotError::Corrupt(path.to_path_buf()));
    }

    Ok(run)
}

/// List snapshots in a directory, newest first.
pub fn list_snapshots(snapshot_dir: &Path) -> Result<Vec<SnapshotMetadata>, SnapshotError> {
    if !snapshot_dir.exists() {
        return Ok(Vec::new());
    }

    let mut snapshots = Vec::new();

    for entry in fs::read_dir(snapshot_dir)? {
        let entry = entry?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(str::to_string)
        else {
            continue;
        };

        if filename.starts_with('.') {
            continue;
        }

        if let Some((ticks, timestamp, id)) = parse_snapshot_filename(&filename) {
            let file_size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            snapshots.push(SnapshotMetadata {
                path,
                id,
                ticks,
                timestamp,
                file_size,
            });
        }
    }

    snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.ticks.cmp(&a.ticks)));

    Ok(snapshots)
}

/// Keep only the `max_snapshots` most recent snapshots. Returns the deleted paths.
pub fn prune_snapshots(
    snapshot_dir: &Path,
    max_snapshots: usize,
) -> Result<Vec<PathBuf>, SnapshotError> {
    let snapshots = list_snapshots(snapshot_dir)?;

    let mut deleted = Vec::new();
    for snapshot in snapshots.iter().skip(max_snapshots) {
        fs::remove_file(&snapshot.path)?;
        deleted.push(snapshot.path.clone());
    }

    Ok(deleted)
}

/// Load the most recent valid snapshot, skipping corrupt ones.
pub fn load_latest_valid_snapshot(snapshot_dir: &Path) -> Result<RunSnapshot, SnapshotError> {
    for snapshot in list_snapshots(snapshot_dir)? {
        match load_snapshot(&snapshot.path) {
            Ok(run) => return Ok(run),
            Err(e) => {
                warn!(
                    path = %snapshot.path.display(),
                    error = %e,
                    "Corrupt snapshot, trying next"
                );
            }
        }
    }

    Err(SnapshotError::NoValidSnapshots)
}
