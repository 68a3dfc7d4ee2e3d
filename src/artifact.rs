//! Process-wide compiled-artifact cache.
//!
//! Maps the content hash of generated context source to its compiled unit.
//! The in-memory map is append-only for the process lifetime: a given hash
//! is deterministic for its source, so an entry never needs eviction or
//! replacement.
//!
//! Optionally backed by a directory holding one bincode file per hash
//! (`<hash>.ctxu`), so identical registry state in a later process reuses
//! the compiled unit instead of recompiling. Disk reuse trusts the hash; a
//! file that fails to deserialize is treated as a miss and overwritten by
//! the next store. Every disk failure is swallowed; concurrent writers
//! racing on the same hash-named file are expected and harmless, because
//! any valid artifact for that hash is as good as any other.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::backend::ast::CompiledUnit;
use crate::hash::ContentHash;

/// Extension of on-disk artifact files.
const ARTIFACT_EXT: &str = "ctxu";

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".exprhost-cache";

/// Append-only compiled-artifact cache, keyed by content hash.
pub struct ArtifactCache {
    units: RwLock<FxHashMap<ContentHash, Arc<CompiledUnit>>>,
    disk_dir: Option<PathBuf>,
}

impl ArtifactCache {
    /// In-memory cache with no disk persistence.
    pub fn in_memory() -> Self {
        Self {
            units: RwLock::new(FxHashMap::default()),
            disk_dir: None,
        }
    }

    /// Cache persisting artifacts under the given directory.
    ///
    /// The directory is created lazily on first store; creation failure
    /// silently degrades to in-memory behavior.
    pub fn with_disk_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            units: RwLock::new(FxHashMap::default()),
            disk_dir: Some(dir.into()),
        }
    }

    /// Cache persisting under [`DEFAULT_CACHE_DIR`].
    pub fn with_default_dir() -> Self {
        Self::with_disk_dir(DEFAULT_CACHE_DIR)
    }

    /// Look up a compiled unit, consulting memory then disk.
    pub fn get(&self, hash: ContentHash) -> Option<Arc<CompiledUnit>> {
        if let Some(unit) = self.units.read().get(&hash) {
            trace!(%hash, "artifact cache hit (memory)");
            return Some(unit.clone());
        }
        let unit = self.load_from_disk(hash)?;
        debug!(%hash, "artifact cache hit (disk)");
        let unit = Arc::new(unit);
        // Another thread may have inserted meanwhile; keep the canonical
        // entry, discard ours.
        let mut units = self.units.write();
        Some(units.entry(hash).or_insert(unit).clone())
    }

    /// Store a compiled unit under its hash.
    ///
    /// Returns the canonical entry: if another thread raced us here, the
    /// first insert wins and the caller adopts it.
    pub fn store(&self, hash: ContentHash, unit: Arc<CompiledUnit>) -> Arc<CompiledUnit> {
        let canonical = {
            let mut units = self.units.write();
            units.entry(hash).or_insert(unit).clone()
        };
        self.persist_to_disk(hash, &canonical);
        canonical
    }

    /// Number of in-memory entries.
    pub fn len(&self) -> usize {
        self.units.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.read().is_empty()
    }

    fn artifact_path(dir: &Path, hash: ContentHash) -> PathBuf {
        dir.join(format!("{}.{ARTIFACT_EXT}", hash.file_stem()))
    }

    fn load_from_disk(&self, hash: ContentHash) -> Option<CompiledUnit> {
        let dir = self.disk_dir.as_deref()?;
        let path = Self::artifact_path(dir, hash);
        let bytes = fs::read(&path).ok()?;
        match bincode::deserialize(&bytes) {
            Ok(unit) => Some(unit),
            Err(err) => {
                debug!(%hash, %err, "discarding unreadable artifact file");
                None
            }
        }
    }

    fn persist_to_disk(&self, hash: ContentHash, unit: &CompiledUnit) {
        let Some(dir) = self.disk_dir.as_deref() else {
            return;
        };
        if let Err(err) = fs::create_dir_all(dir) {
            debug!(%err, "artifact cache directory unavailable");
            return;
        }
        let path = Self::artifact_path(dir, hash);
        if path.exists() {
            // Existing file wins; content is deterministic for the hash.
            return;
        }
        match bincode::serialize(unit) {
            Ok(bytes) => {
                if let Err(err) = fs::write(&path, bytes) {
                    // Concurrent writer or filesystem trouble; either way
                    // the eventual reader only needs some valid artifact.
                    debug!(%hash, %err, "artifact write skipped");
                }
            }
            Err(err) => debug!(%hash, %err, "artifact serialization failed"),
        }
    }
}

impl Default for ArtifactCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CompileOptions, CompileRefs, Compiler};

    fn unit_for(source: &str) -> Arc<CompiledUnit> {
        Arc::new(
            Compiler::compile(source, &CompileRefs::default(), CompileOptions::default(), "ctx")
                .unwrap(),
        )
    }

    #[test]
    fn store_then_get_returns_same_unit() {
        let cache = ArtifactCache::in_memory();
        let source = "class Globals { float x; }";
        let hash = ContentHash::of(source);
        let unit = unit_for(source);
        let stored = cache.store(hash, unit.clone());
        assert!(Arc::ptr_eq(&stored, &unit));
        assert!(Arc::ptr_eq(&cache.get(hash).unwrap(), &unit));
    }

    #[test]
    fn first_store_wins_on_race() {
        let cache = ArtifactCache::in_memory();
        let source = "class Globals { float x; }";
        let hash = ContentHash::of(source);
        let first = unit_for(source);
        let second = unit_for(source);
        cache.store(hash, first.clone());
        let canonical = cache.store(hash, second);
        assert!(Arc::ptr_eq(&canonical, &first));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = "class Globals { float pressure; string label; }";
        let hash = ContentHash::of(source);

        let writer = ArtifactCache::with_disk_dir(dir.path());
        writer.store(hash, unit_for(source));

        // A fresh cache over the same directory finds the artifact.
        let reader = ArtifactCache::with_disk_dir(dir.path());
        let loaded = reader.get(hash).expect("disk artifact");
        assert!(loaded.class("Globals").is_some());
    }

    #[test]
    fn corrupt_disk_artifact_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let source = "class Globals { float x; }";
        let hash = ContentHash::of(source);
        let path = dir
            .path()
            .join(format!("{}.{ARTIFACT_EXT}", hash.file_stem()));
        fs::write(&path, b"not bincode").unwrap();

        let cache = ArtifactCache::with_disk_dir(dir.path());
        assert!(cache.get(hash).is_none());
    }

    #[test]
    fn missing_entry_is_none() {
        let cache = ArtifactCache::in_memory();
        assert!(cache.get(ContentHash::of("nothing")).is_none());
    }
}
