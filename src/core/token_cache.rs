/*
 * Per-path memoization of file token counts.
 *
 * A record is only valid while its freshness key (the file's modification time
 * when the count was computed) equals the file's current modification time.
 * Directories are never stored here; their totals are derived live from their
 * children by the tree walker. The cache performs no I/O itself: callers pass
 * a `compute` closure that is only invoked on a miss.
 *
 * The map sits behind a `Mutex` that is only held for lookups and inserts, so
 * concurrent readers of disjoint subtrees never wait on each other's file
 * reads. Two readers recomputing the same stale record at once both store the
 * same value, which is harmless.
 */
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheRecord {
    pub token_count: usize,
    pub freshness_key: SystemTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
pub struct EntryCache {
    records: Mutex<HashMap<PathBuf, CacheRecord>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EntryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /*
     * Returns the cached count for `path` if its freshness key matches;
     * otherwise runs `compute`, stores the result under `freshness_key` and
     * returns it.
     */
    pub fn get<F>(&self, path: &Path, freshness_key: SystemTime, compute: F) -> usize
    where
        F: FnOnce() -> usize,
    {
        if let Some(record) = self.lookup(path) {
            if record.freshness_key == freshness_key {
                self.hits.fetch_add(1, Ordering::Relaxed);
                log::trace!("EntryCache: Hit for {path:?} ({} tokens).", record.token_count);
                return record.token_count;
            }
            log::debug!("EntryCache: Stale record for {path:?}; recomputing.");
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let token_count = compute();
        self.insert(
            path.to_path_buf(),
            CacheRecord {
                token_count,
                freshness_key,
            },
        );
        token_count
    }

    pub fn invalidate(&self, path: &Path) -> bool {
        let removed = self.with_records(|records| records.remove(path).is_some());
        if removed {
            log::debug!("EntryCache: Invalidated {path:?}.");
        }
        removed
    }

    /* Drops every record at or below `path`. Returns how many were removed. */
    pub fn invalidate_subtree(&self, path: &Path) -> usize {
        let removed = self.with_records(|records| {
            let before = records.len();
            records.retain(|cached, _| !cached.starts_with(path));
            before - records.len()
        });
        if removed > 0 {
            log::debug!("EntryCache: Invalidated {removed} record(s) under {path:?}.");
        }
        removed
    }

    pub fn clear_all(&self) {
        let cleared = self.with_records(|records| {
            let count = records.len();
            records.clear();
            count
        });
        log::debug!("EntryCache: Cleared all {cleared} record(s).");
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.with_records(|records| records.contains_key(path))
    }

    pub fn lookup(&self, path: &Path) -> Option<CacheRecord> {
        self.with_records(|records| records.get(path).copied())
    }

    pub fn len(&self) -> usize {
        self.with_records(|records| records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn insert(&self, path: PathBuf, record: CacheRecord) {
        self.with_records(|records| {
            records.insert(path, record);
        });
    }

    // A poisoned lock only means another reader panicked mid-insert; the map
    // itself is still a valid set of records.
    fn with_records<R>(&self, f: impl FnOnce(&mut HashMap<PathBuf, CacheRecord>) -> R) -> R {
        let mut guard = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}
