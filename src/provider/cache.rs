use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::grid::cell::GeoCoordinate;
use crate::provider::{EnvironmentProvider, EnvironmentalAttributes, ProviderError};

/// Coordinate rounded to micro-degrees.
type CacheKey = (i64, i64);

fn cache_key(coordinate: GeoCoordinate) -> CacheKey {
    (
        (coordinate.latitude * 1e6).round() as i64,
        (coordinate.longitude * 1e6).round() as i64,
    )
}

#[derive(Debug)]
pub enum CacheError {
    Io(io::Error),
    Serialize(String),
    Corrupt { path: PathBuf, reason: String },
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Io(e) => write!(f, "Cache I/O error: {}", e),
            CacheError::Serialize(e) => write!(f, "Cache serialization error: {}", e),
            CacheError::Corrupt { path, reason } => {
                write!(f, "Corrupt attribute cache {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for CacheError {}

impl From<io::Error> for CacheError {
    fn from(e: io::Error) -> Self {
        CacheError::Io(e)
    }
}

/// On-disk layout: records sorted by key so identical caches produce identical bytes.
#[derive(Serialize, Deserialize)]
struct CacheFile {
    records: Vec<(CacheKey, EnvironmentalAttributes)>,
}

/// Memoising wrapper around another provider.
///
/// Only successful lookups are cached; failures are retried on the next fetch.
pub struct CachedProvider<P> {
    inner: P,
    entries: Mutex<HashMap<CacheKey, EnvironmentalAttributes>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<P: EnvironmentProvider> CachedProvider<P> {
    pub fn new(inner: P) -> Self {
        CachedProvider {
            inner,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Wrap `inner`, pre-populated from `path`. A missing file starts empty.
    pub fn with_cache_file(inner: P, path: &Path) -> Result<Self, CacheError> {
        let provider = CachedProvider::new(inner);
        let loaded = provider.load(path)?;
        debug!(path = %path.display(), entries = loaded, "Attribute cache loaded");
        Ok(provider)
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, EnvironmentalAttributes>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Merge records from `path` into the cache, returning how many were read.
    pub fn load(&self, path: &Path) -> Result<usize, CacheError> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CacheError::Io(e)),
        };
        let file: CacheFile = bincode::deserialize(&data).map_err(|e| CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let count = file.records.len();
        self.lock().extend(file.records);
        Ok(count)
    }

    /// Write every cached record to `path` atomically (temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let mut records: Vec<_> = self.lock().iter().map(|(k, v)| (*k, *v)).collect();
        records.sort_by_key(|(k, _)| *k);
        let encoded = bincode::serialize(&CacheFile { records })
            .map_err(|e| CacheError::Serialize(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attributes".to_string());
        let tmp = path.with_file_name(format!(".{}.tmp", file_name));

        if let Err(e) = fs::write(&tmp, &encoded) {
            let _ = fs::remove_file(&tmp);
            return Err(CacheError::Io(e));
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(CacheError::Io(e));
        }
        Ok(())
    }
}

impl<P: EnvironmentProvider> EnvironmentProvider for CachedProvider<P> {
    fn fetch_attributes(
        &self,
        coordinate: GeoCoordinate,
    ) -> Result<EnvironmentalAttributes, ProviderError> {
        let key = cache_key(coordinate);
        if let Some(attrs) = self.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(*attrs);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let attrs = self.inner.fetch_attributes(coordinate)?;
        self.lock().insert(key, attrs);
        Ok(attrs)
    }

    /// Serve hits from memory and forward all misses to the inner provider in one batch.
    fn fetch_batch(
        &self,
        coordinates: &[GeoCoordinate],
    ) -> Vec<Result<EnvironmentalAttributes, ProviderError>> {
        let mut results: Vec<Option<Result<EnvironmentalAttributes, ProviderError>>> =
            Vec::with_capacity(coordinates.len());
        let mut missing = Vec::new();
        let mut missing_at = Vec::new();

        {
            let entries = self.lock();
            for (i, &coordinate) in coordinates.iter().enumerate() {
                match entries.get(&cache_key(coordinate)) {
                    Some(attrs) => results.push(Some(Ok(*attrs))),
                    None => {
                        results.push(None);
                        missing.push(coordinate);
                        missing_at.push(i);
                    }
                }
            }
        }

        let hits = (coordinates.len() - missing.len()) as u64;
        self.hits.fetch_add(hits, Ordering::Relaxed);
        self.misses.fetch_add(missing.len() as u64, Ordering::Relaxed);
        debug!(hits, misses = missing.len(), "Attribute cache lookup");

        if !missing.is_empty() {
            let fetched = self.inner.fetch_batch(&missing);
            let mut entries = self.lock();
            for ((i, coordinate), result) in missing_at.into_iter().zip(missing).zip(fetched) {
                if let Ok(attrs) = &result {
                    entries.insert(cache_key(coordinate), *attrs);
                }
                results[i] = Some(result);
            }
        }

        results
            .into_iter()
            .zip(coordinates)
            .map(|(r, &c)| r.unwrap_or_else(|| Err(ProviderError::not_found(c))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{from_fn, Surface};
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn attrs_for(c: GeoCoordinate) -> EnvironmentalAttributes {
        EnvironmentalAttributes {
            elevation: c.latitude * 10.0,
            fuel_load: 50.0,
            temperature: 25.0,
            humidity: 40.0,
            wind_direction: 180.0,
            wind_speed: 2.0,
            surface: Surface::Vegetation,
            observed_fire: false,
        }
    }

    #[test]
    fn second_fetch_is_a_hit() {
        let calls = AtomicUsize::new(0);
        let cached = CachedProvider::new(from_fn(|c| {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok(attrs_for(c))
        }));
        let c = GeoCoordinate::new(44.000001, 5.0);
        let first = cached.fetch_attributes(c).unwrap();
        let second = cached.fetch_attributes(c).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(cached.hits(), 1);
        assert_eq!(cached.misses(), 1);
    }

    #[test]
    fn failures_are_not_cached() {
        let calls = AtomicUsize::new(0);
        let cached = CachedProvider::new(from_fn(|c| {
            calls.fetch_add(1, Ordering::Relaxed);
            Err(ProviderError::not_found(c))
        }));
        let c = GeoCoordinate::new(1.0, 1.0);
        assert!(cached.fetch_attributes(c).is_err());
        assert!(cached.fetch_attributes(c).is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert!(cached.is_empty());
    }

    #[test]
    fn batch_mixes_hits_and_misses_in_order() {
        let cached = CachedProvider::new(from_fn(|c| Ok(attrs_for(c))));
        let coords = [
            GeoCoordinate::new(1.0, 0.0),
            GeoCoordinate::new(2.0, 0.0),
            GeoCoordinate::new(3.0, 0.0),
        ];
        cached.fetch_attributes(coords[1]).unwrap();

        let results = cached.fetch_batch(&coords);
        let elevations: Vec<f64> = results.into_iter().map(|r| r.unwrap().elevation).collect();
        assert_eq!(elevations, vec![10.0, 20.0, 30.0]);
        assert_eq!(cached.hits(), 1);
        assert_eq!(cached.misses(), 3);
        assert_eq!(cached.len(), 3);
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache").join("attributes.bin");

        let cached = CachedProvider::new(from_fn(|c| Ok(attrs_for(c))));
        cached.fetch_attributes(GeoCoordinate::new(4.0, 4.0)).unwrap();
        cached.fetch_attributes(GeoCoordinate::new(5.0, 5.0)).unwrap();
        cached.save(&path).unwrap();
        assert!(path.exists());

        let offline = CachedProvider::with_cache_file(
            from_fn(|c| Err(ProviderError::not_found(c))),
            &path,
        )
        .unwrap();
        assert_eq!(offline.len(), 2);
        let attrs = offline.fetch_attributes(GeoCoordinate::new(5.0, 5.0)).unwrap();
        assert_eq!(attrs.elevation, 50.0);
    }

    #[test]
    fn missing_cache_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let cached = CachedProvider::with_cache_file(
            from_fn(|c| Ok(attrs_for(c))),
            &dir.path().join("absent.bin"),
        )
        .unwrap();
        assert!(cached.is_empty());
    }

    #[test]
    fn corrupt_cache_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.bin");
        fs::write(&path, b"not a cache").unwrap();
        let result = CachedProvider::with_cache_file(from_fn(|c| Ok(attrs_for(c))), &path);
        assert!(matches!(result, Err(CacheError::Corrupt { .. })));
    }

    #[test]
    fn no_temp_file_left_after_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("attributes.bin");
        let cached = CachedProvider::new(from_fn(|c| Ok(attrs_for(c))));
        cached.fetch_attributes(GeoCoordinate::new(1.0, 2.0)).unwrap();
        cached.save(&path).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["attributes.bin".to_string()]);
    }
}
