/*
 * Reads the tree lazily, one directory at a time, and answers token counts.
 *
 * File counts go through the `EntryCache` keyed by the file's current
 * modification time, so a read is only repeated after the file changed.
 * Directory counts are never cached: they are the live sum of the directory's
 * current non-excluded children, which keeps them consistent with whatever the
 * cache holds for the files underneath. Every I/O failure on this path turns
 * into an omitted child or a count of 0; nothing is propagated.
 */
use super::config::TreeConfig;
use super::exclusion::ExclusionEngine;
use super::file_system::FileSystemProviderOperations;
use super::models::{Entry, EntryKind};
use super::token_cache::EntryCache;
use super::tokenizer_utils::TokenEstimator;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

pub struct TreeWalker {
    root: PathBuf,
    file_system: Arc<dyn FileSystemProviderOperations>,
    exclusion: Arc<ExclusionEngine>,
    cache: EntryCache,
    estimator: RwLock<Arc<TokenEstimator>>,
    config: RwLock<TreeConfig>,
}

impl TreeWalker {
    pub fn new(
        root: PathBuf,
        file_system: Arc<dyn FileSystemProviderOperations>,
        config: &TreeConfig,
    ) -> Self {
        let estimator = TokenEstimator::new(config.tokenizer_strategy());
        Self::with_estimator(root, file_system, config, estimator)
    }

    /* Builds a walker around an already-resolved estimator. */
    pub fn with_estimator(
        root: PathBuf,
        file_system: Arc<dyn FileSystemProviderOperations>,
        config: &TreeConfig,
        estimator: TokenEstimator,
    ) -> Self {
        let exclusion = Arc::new(ExclusionEngine::new(
            root.clone(),
            Arc::clone(&file_system),
            config.show_hidden,
        ));
        log::debug!(
            "TreeWalker: Created for {root:?} with tokenizer '{}'.",
            estimator.strategy()
        );
        TreeWalker {
            root,
            file_system,
            exclusion,
            cache: EntryCache::new(),
            estimator: RwLock::new(Arc::new(estimator)),
            config: RwLock::new(config.clone()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &EntryCache {
        &self.cache
    }

    pub fn exclusion(&self) -> &ExclusionEngine {
        &self.exclusion
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystemProviderOperations> {
        &self.file_system
    }

    pub fn estimator(&self) -> Arc<TokenEstimator> {
        match self.estimator.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /*
     * Applies new settings. When the change affects how file counts are
     * computed (tokenizer, size cap, excluded extensions) the estimator is
     * re-resolved and the whole cache is cleared. Returns whether that happened.
     */
    pub fn apply_config(&self, config: &TreeConfig) -> bool {
        self.exclusion.set_show_hidden(config.show_hidden);

        let counts_changed = {
            let mut current = match self.config.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let changed = current.counts_differ_from(config);
            *current = config.clone();
            changed
        };

        if counts_changed {
            log::debug!("TreeWalker: Count-affecting settings changed; rebuilding estimator.");
            self.replace_estimator(TokenEstimator::new(config.tokenizer_strategy()));
        }
        counts_changed
    }

    /* Swaps the estimator and drops every cached count. */
    pub fn replace_estimator(&self, estimator: TokenEstimator) {
        {
            let mut guard = match self.estimator.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = Arc::new(estimator);
        }
        self.cache.clear_all();
    }

    /*
     * Lists the non-excluded children of a directory, unsorted, with
     * `token_count` left empty. Children that cannot be stat'ed are omitted;
     * an unreadable directory lists as empty.
     */
    pub fn list_children(&self, path: &Path) -> Vec<Entry> {
        let listing = match self.file_system.list_dir(path) {
            Ok(listing) => listing,
            Err(e) => {
                log::warn!("TreeWalker: Could not list {path:?}: {e}");
                return Vec::new();
            }
        };

        let mut children = Vec::with_capacity(listing.len());
        for item in listing {
            let child_path = path.join(&item.name);
            if self.exclusion.is_excluded(&child_path) {
                continue;
            }
            match self.file_system.stat(&child_path) {
                Ok(stat) => children.push(Entry::new(child_path, stat)),
                Err(e) => {
                    log::warn!("TreeWalker: Omitting {child_path:?}, stat failed: {e}");
                }
            }
        }
        log::trace!("TreeWalker: Listed {} child(ren) of {path:?}.", children.len());
        children
    }

    /* Same as `list_children`, with every entry's token count filled in. */
    pub fn list_children_with_counts(&self, path: &Path) -> Vec<Entry> {
        let mut children = self.list_children(path);
        for child in &mut children {
            child.token_count = Some(self.count_entry(child));
        }
        children
    }

    /*
     * The token count of a file or directory. Excluded and unreadable paths
     * count 0.
     */
    pub fn token_count_of(&self, path: &Path) -> usize {
        if self.exclusion.is_excluded(path) {
            return 0;
        }
        match self.file_system.stat(path) {
            Ok(stat) => self.count_entry(&Entry::new(path.to_path_buf(), stat)),
            Err(e) => {
                log::warn!("TreeWalker: Could not stat {path:?}: {e}");
                0
            }
        }
    }

    /* Counts a freshly stat'ed, non-excluded entry. */
    fn count_entry(&self, entry: &Entry) -> usize {
        self.count_within(entry, &mut Vec::new())
    }

    /*
     * `ancestors` holds the resolved paths of the directories being summed
     * above `entry`. A directory resolving to one of them is a symlink cycle
     * and contributes 0.
     */
    fn count_within(&self, entry: &Entry, ancestors: &mut Vec<PathBuf>) -> usize {
        if entry.kind == EntryKind::File {
            return self.file_token_count(entry);
        }
        let resolved = match self.file_system.canonicalize(&entry.path) {
            Ok(resolved) => resolved,
            Err(e) => {
                log::warn!("TreeWalker: Could not resolve {:?}: {e}", entry.path);
                return 0;
            }
        };
        if ancestors.contains(&resolved) {
            log::debug!(
                "TreeWalker: {:?} links back to {resolved:?}; not descending.",
                entry.path
            );
            return 0;
        }
        ancestors.push(resolved);
        let total = self
            .list_children(&entry.path)
            .iter()
            .map(|child| self.count_within(child, ancestors))
            .sum();
        ancestors.pop();
        total
    }

    fn file_token_count(&self, entry: &Entry) -> usize {
        self.cache
            .get(&entry.path, entry.modified_at, || self.compute_file_count(entry))
    }

    fn compute_file_count(&self, entry: &Entry) -> usize {
        let (max_file_size, extension_excluded) = {
            let config = match self.config.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            (
                config.max_file_size,
                config.is_extension_excluded(&entry.path),
            )
        };

        if extension_excluded {
            log::trace!("TreeWalker: {:?} has an excluded extension.", entry.path);
            return 0;
        }
        if entry.size > max_file_size {
            log::debug!(
                "TreeWalker: {:?} is {} bytes, above the {max_file_size} byte limit.",
                entry.path,
                entry.size
            );
            return 0;
        }

        match self.file_system.read_file(&entry.path, max_file_size) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let count = self.estimator().estimate(&text);
                log::trace!("TreeWalker: Counted {count} tokens in {:?}.", entry.path);
                count
            }
            Err(e) => {
                log::warn!("TreeWalker: Could not read {:?}: {e}", entry.path);
                0
            }
        }
    }

    /*
     * Pre-computes the count of every non-excluded file under the root so
     * later reads are cache hits. Walks the disk directly; exclusion rules
     * prune whole directories. Returns the number of files counted.
     */
    pub fn warm_cache(&self) -> usize {
        let exclusion = Arc::clone(&self.exclusion);
        let mut walker_builder = WalkBuilder::new(&self.root);
        walker_builder
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |dir_entry| !exclusion.is_excluded(dir_entry.path()));

        let mut files = 0;
        for entry_result in walker_builder.build() {
            let dir_entry = match entry_result {
                Ok(dir_entry) => dir_entry,
                Err(e) => {
                    log::warn!("TreeWalker: Skipping entry while warming cache: {e}");
                    continue;
                }
            };
            if !dir_entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let path = dir_entry.path();
            match self.file_system.stat(path) {
                Ok(stat) => {
                    self.file_token_count(&Entry::new(path.to_path_buf(), stat));
                    files += 1;
                }
                Err(e) => log::warn!("TreeWalker: Could not stat {path:?}: {e}"),
            }
        }
        log::debug!("TreeWalker: Warmed cache with {files} file(s) under {:?}.", self.root);
        files
    }
}
