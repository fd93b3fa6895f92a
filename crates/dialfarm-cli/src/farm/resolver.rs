//! Shared coordinate resolver with a durable, per-geometry cache.
//!
//! One resolver serves every session worker. Published maps live behind
//! `Arc`s and are replaced, never mutated, so readers only hold the read
//! lock long enough to clone a pointer. Persisting and publishing happen
//! under a single writer lock; capturing the UI does not, so a slow device
//! never holds up resolution for the others.
//!
//! On disk each geometry has its own `<W>x<H>.txt` file. Files are written
//! to a temporary name and renamed into place.
//!
//! A cached fallback grid is kept as a last resort but never short-circuits
//! a lookup: every request for that geometry tries the live UI again until
//! one resolves.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dialfarm_core::coords::{CoordinateMap, ScreenSize};
use dialfarm_core::elements::hierarchy::UiSnapshot;
use dialfarm_core::error::ApiError;
use dialfarm_core::grid::fallback_grid;
use dialfarm_core::resolve::{resolve, Resolution, ResolutionSource, ResolveOptions};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::farm::paths::{cache_file, parse_cache_file_name};

pub struct CoordinateResolver {
    /// `None` keeps maps in memory only.
    cache_dir: Option<PathBuf>,
    options: ResolveOptions,
    published: RwLock<HashMap<ScreenSize, Arc<CoordinateMap>>>,
    write_lock: Mutex<()>,
}

impl CoordinateResolver {
    pub fn new(cache_dir: Option<PathBuf>, options: ResolveOptions) -> Self {
        Self {
            cache_dir,
            options,
            published: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// A usable cached map for this geometry, from memory or disk.
    ///
    /// Disk entries that fail to parse or lack part of the keypad are
    /// treated as absent.
    pub async fn cached(&self, size: ScreenSize) -> Option<Arc<CoordinateMap>> {
        if let Some(map) = self.published.read().await.get(&size) {
            return Some(map.clone());
        }

        let map = match self.load(size).await {
            Ok(Some(map)) => map,
            Ok(None) => return None,
            Err(e) => {
                warn!("Ignoring coordinate cache: {}", e);
                return None;
            }
        };
        if !map.has_complete_keypad() {
            warn!(
                size = %size,
                missing = ?map.missing_keypad_keys(),
                "Ignoring incomplete coordinate cache"
            );
            return None;
        }

        debug!(size = %size, "Loaded coordinate cache from disk");
        let map = Arc::new(map);
        self.published
            .write()
            .await
            .entry(size)
            .or_insert_with(|| map.clone());
        Some(map)
    }

    /// Return a coordinate map for `size`, resolving from a fresh snapshot
    /// when nothing is cached, when the cached map is the fallback grid, or
    /// when `force` is set.
    ///
    /// `capture` is only awaited when a live resolution is needed; `None`
    /// means the snapshot could not be taken and the fallback grid is used.
    pub async fn obtain<F>(&self, size: ScreenSize, force: bool, capture: F) -> Resolution
    where
        F: Future<Output = Option<UiSnapshot>>,
    {
        if !force {
            if let Some(map) = self.cached(size).await {
                if *map != fallback_grid(size) {
                    return Resolution {
                        map: (*map).clone(),
                        source: ResolutionSource::Cached,
                        missing: Vec::new(),
                    };
                }
                debug!(size = %size, "Cached map is the fallback grid, retrying live UI");
            }
        }

        let snapshot = capture.await;
        let resolution = resolve(snapshot.as_ref(), size, self.options);
        if !resolution.missing.is_empty() {
            info!(
                size = %size,
                missing = ?resolution.missing,
                "Keypad incomplete in live UI, using fallback grid"
            );
        }

        self.publish(size, &resolution.map).await;
        resolution
    }

    async fn publish(&self, size: ScreenSize, map: &CoordinateMap) {
        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.persist(size, map).await {
            warn!("Coordinate map kept in memory only: {}", e);
        }
        self.published
            .write()
            .await
            .insert(size, Arc::new(map.clone()));
    }

    /// Every readable cache file, sorted by geometry. Unreadable files are
    /// logged and skipped.
    pub async fn list(&self) -> Result<Vec<(ScreenSize, CoordinateMap)>, ApiError> {
        let mut entries = Vec::new();
        for size in self.cached_sizes().await? {
            match self.load(size).await {
                Ok(Some(map)) => entries.push((size, map)),
                Ok(None) => {}
                Err(e) => warn!("{}", e),
            }
        }
        Ok(entries)
    }

    /// Remove every cache file and forget every published map. Returns how
    /// many files were removed.
    pub async fn clear(&self) -> Result<usize, ApiError> {
        let _guard = self.write_lock.lock().await;
        self.published.write().await.clear();

        let sizes = self.cached_sizes().await?;
        for size in &sizes {
            if let Some(path) = self.cache_path(*size) {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| cache_error(&path, e))?;
            }
        }
        Ok(sizes.len())
    }

    fn cache_path(&self, size: ScreenSize) -> Option<PathBuf> {
        self.cache_dir.as_deref().map(|dir| cache_file(dir, size))
    }

    async fn cached_sizes(&self) -> Result<Vec<ScreenSize>, ApiError> {
        let Some(dir) = &self.cache_dir else {
            return Ok(Vec::new());
        };
        let mut read_dir = match tokio::fs::read_dir(dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(cache_error(dir, e)),
        };

        let mut sizes = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| cache_error(dir, e))?
        {
            if let Some(size) = parse_cache_file_name(&entry.path()) {
                sizes.push(size);
            }
        }
        sizes.sort_by_key(|s| (s.width, s.height));
        Ok(sizes)
    }

    async fn load(&self, size: ScreenSize) -> Result<Option<CoordinateMap>, ApiError> {
        let Some(path) = self.cache_path(size) else {
            return Ok(None);
        };
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(cache_error(&path, e)),
        };
        CoordinateMap::from_cache_text(&text)
            .map(Some)
            .map_err(|e| ApiError::cache(&path.display().to_string(), e.message))
    }

    async fn persist(&self, size: ScreenSize, map: &CoordinateMap) -> Result<(), ApiError> {
        let Some(dir) = &self.cache_dir else {
            return Ok(());
        };
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| cache_error(dir, e))?;

        let path = cache_file(dir, size);
        let tmp = path.with_extension("txt.tmp");
        tokio::fs::write(&tmp, map.to_cache_text())
            .await
            .map_err(|e| cache_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| cache_error(&path, e))?;
        debug!(size = %size, path = %path.display(), "Persisted coordinate map");
        Ok(())
    }
}

fn cache_error(path: &Path, err: std::io::Error) -> ApiError {
    ApiError::cache(&path.display().to_string(), err.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::farm::test_support::dial_pad_snapshot;
    use dialfarm_core::coords::Key;

    fn resolver(dir: &Path) -> CoordinateResolver {
        CoordinateResolver::new(Some(dir.to_path_buf()), ResolveOptions::default())
    }

    #[tokio::test]
    async fn live_resolution_is_persisted_and_reloaded() {
        let tmp = tempfile::tempdir().unwrap();
        let size = ScreenSize::DEFAULT;

        let first = resolver(tmp.path())
            .obtain(size, false, async { Some(dial_pad_snapshot()) })
            .await;
        assert_eq!(first.source, ResolutionSource::Live);

        let text = std::fs::read_to_string(tmp.path().join("720x1612.txt")).unwrap();
        assert_eq!(CoordinateMap::from_cache_text(&text).unwrap(), first.map);

        // A new process sees the same map without capturing.
        let fresh = resolver(tmp.path());
        let captures = AtomicUsize::new(0);
        let second = fresh
            .obtain(size, false, async {
                captures.fetch_add(1, Ordering::SeqCst);
                None
            })
            .await;
        assert_eq!(second.source, ResolutionSource::Cached);
        assert_eq!(captures.load(Ordering::SeqCst), 0);
        assert_eq!(second.map, first.map);
    }

    #[tokio::test]
    async fn force_bypasses_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = resolver(tmp.path());
        let size = ScreenSize::DEFAULT;
        let captures = AtomicUsize::new(0);

        for force in [false, false, true] {
            resolver
                .obtain(size, force, async {
                    captures.fetch_add(1, Ordering::SeqCst);
                    Some(dial_pad_snapshot())
                })
                .await;
        }
        assert_eq!(captures.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn geometries_are_cached_separately() {
        let resolver = CoordinateResolver::new(None, ResolveOptions::default());
        let small = ScreenSize::DEFAULT;
        let large = ScreenSize::new(1080, 2400).unwrap();

        resolver
            .obtain(small, false, async { Some(dial_pad_snapshot()) })
            .await;
        assert!(resolver.cached(small).await.is_some());
        assert!(resolver.cached(large).await.is_none());

        let other = resolver.obtain(large, false, async { None }).await;
        assert_eq!(other.source, ResolutionSource::Fallback);
        assert_eq!(other.map, fallback_grid(large));
    }

    #[tokio::test]
    async fn corrupt_cache_file_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("720x1612.txt"), "1:10,20\ngarbage\n").unwrap();

        let resolver = resolver(tmp.path());
        assert!(resolver.cached(ScreenSize::DEFAULT).await.is_none());

        let resolution = resolver.obtain(ScreenSize::DEFAULT, false, async { None }).await;
        assert_eq!(resolution.source, ResolutionSource::Fallback);

        // Replaced by a valid file.
        let text = std::fs::read_to_string(tmp.path().join("720x1612.txt")).unwrap();
        assert!(CoordinateMap::from_cache_text(&text).is_ok());
    }

    #[tokio::test]
    async fn incomplete_cache_file_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("720x1612.txt"), "1:10,20\nCALL:5,5\n").unwrap();
        assert!(resolver(tmp.path())
            .cached(ScreenSize::DEFAULT)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn cached_fallback_grid_is_retried_live() {
        let tmp = tempfile::tempdir().unwrap();
        let size = ScreenSize::DEFAULT;
        let first = resolver(tmp.path()).obtain(size, false, async { None }).await;
        assert_eq!(first.source, ResolutionSource::Fallback);
        assert!(tmp.path().join("720x1612.txt").exists());

        // Still unreadable: the grid is served again, not pinned as cached.
        let resolver = resolver(tmp.path());
        let captures = AtomicUsize::new(0);
        let again = resolver
            .obtain(size, false, async {
                captures.fetch_add(1, Ordering::SeqCst);
                None
            })
            .await;
        assert_eq!(again.source, ResolutionSource::Fallback);
        assert_eq!(captures.load(Ordering::SeqCst), 1);

        let live = resolver
            .obtain(size, false, async { Some(dial_pad_snapshot()) })
            .await;
        assert_eq!(live.source, ResolutionSource::Live);

        let cached = resolver.obtain(size, false, async { None }).await;
        assert_eq!(cached.source, ResolutionSource::Cached);
        assert_eq!(cached.map, live.map);
    }

    #[tokio::test]
    async fn list_and_clear() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = resolver(tmp.path());
        let large = ScreenSize::new(1080, 2400).unwrap();
        resolver.obtain(large, false, async { None }).await;
        resolver
            .obtain(ScreenSize::DEFAULT, false, async { Some(dial_pad_snapshot()) })
            .await;
        std::fs::write(tmp.path().join("notes.md"), "not a cache").unwrap();

        let listed = resolver.list().await.unwrap();
        let sizes: Vec<ScreenSize> = listed.iter().map(|(s, _)| *s).collect();
        assert_eq!(sizes, vec![ScreenSize::DEFAULT, large]);
        assert_eq!(listed[1].1.get(Key::Call), Some(large.call_fallback()));

        assert_eq!(resolver.clear().await.unwrap(), 2);
        assert!(resolver.list().await.unwrap().is_empty());
        assert!(resolver.cached(large).await.is_none());
        assert!(tmp.path().join("notes.md").exists());
    }

    #[tokio::test]
    async fn missing_cache_dir_lists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = resolver(&tmp.path().join("never-created"));
        assert!(resolver.list().await.unwrap().is_empty());
        assert_eq!(resolver.clear().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn published_map_matches_resolution() {
        let resolver = CoordinateResolver::new(None, ResolveOptions::default());
        let resolution = resolver
            .obtain(ScreenSize::DEFAULT, false, async { Some(dial_pad_snapshot()) })
            .await;
        let cached = resolver.cached(ScreenSize::DEFAULT).await.unwrap();
        assert_eq!(*cached, resolution.map);
    }
}
