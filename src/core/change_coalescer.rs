/*
 * Turns a burst of raw change notifications into a single refresh.
 *
 * The coalescer is a single-slot state machine: every accepted event
 * invalidates what it must in the walker's cache and (re)arms one pending
 * refresh whose deadline is `now + window`. `poll` fires that refresh once the
 * deadline has passed. Time is passed in explicitly so the state machine can
 * be driven deterministically; `spawn_coalescing_worker` drives it from a
 * channel on a background thread.
 */
use super::config::TreeConfig;
use super::models::{ChangeEvent, ChangeKind};
use super::path_utils;
use super::tree_walker::TreeWalker;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/* What the presentation layer should re-request. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshSignal {
    Full,
    /* Changed files with their ancestor chains up to the root. */
    Paths(Vec<PathBuf>),
}

#[derive(Debug)]
struct PendingRefresh {
    deadline: Instant,
    full: bool,
    targets: BTreeSet<PathBuf>,
}

#[derive(Debug)]
pub struct ChangeCoalescer {
    window: Duration,
    partial_refresh: bool,
    pending: Option<PendingRefresh>,
}

impl ChangeCoalescer {
    pub fn new(window: Duration, partial_refresh: bool) -> Self {
        ChangeCoalescer {
            window,
            partial_refresh,
            pending: None,
        }
    }

    pub fn from_config(config: &TreeConfig) -> Self {
        Self::new(config.debounce_window(), config.partial_refresh)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /*
     * Applies one change notification. Events for excluded paths are dropped
     * without touching the pending refresh, except the root's ignore file,
     * whose change reloads the patterns and forces a full refresh.
     */
    pub fn record(&mut self, event: &ChangeEvent, walker: &TreeWalker, now: Instant) {
        let path = event.path.as_path();

        if walker.exclusion().is_ignore_file(path) {
            log::debug!("ChangeCoalescer: Ignore file changed; reloading patterns.");
            walker.exclusion().reload_patterns();
            self.arm_full(now);
            return;
        }
        if walker.exclusion().is_excluded(path) {
            log::trace!("ChangeCoalescer: Dropping event for excluded {path:?}.");
            return;
        }

        match event.kind {
            ChangeKind::Changed if self.partial_refresh && walker.cache().contains(path) => {
                walker.cache().invalidate(path);
                let chain = path_utils::ancestor_chain(path, walker.root());
                log::trace!("ChangeCoalescer: Targeted refresh for {path:?}.");
                self.arm_paths(chain, now);
            }
            ChangeKind::Changed => {
                walker.cache().invalidate(path);
                self.arm_full(now);
            }
            ChangeKind::Created => self.arm_full(now),
            ChangeKind::Deleted => {
                walker.cache().invalidate_subtree(path);
                self.arm_full(now);
            }
        }
    }

    /*
     * Applies new settings to the walker. Count-affecting changes clear the
     * cache inside `apply_config`; any change schedules a full refresh.
     */
    pub fn record_config_change(&mut self, walker: &TreeWalker, config: &TreeConfig, now: Instant) {
        if walker.apply_config(config) {
            log::debug!("ChangeCoalescer: Tokenizer settings changed; cache cleared.");
        }
        self.window = config.debounce_window();
        self.partial_refresh = config.partial_refresh;
        self.arm_full(now);
    }

    /* Fires and clears the pending refresh if its deadline has passed. */
    pub fn poll(&mut self, now: Instant) -> Option<RefreshSignal> {
        if self.pending.as_ref()?.deadline > now {
            return None;
        }
        let pending = self.pending.take()?;
        let signal = if pending.full {
            RefreshSignal::Full
        } else {
            RefreshSignal::Paths(pending.targets.into_iter().collect())
        };
        log::debug!("ChangeCoalescer: Firing {signal:?}.");
        Some(signal)
    }

    /* Drops the pending refresh, if any. */
    pub fn cancel(&mut self) {
        if self.pending.take().is_some() {
            log::trace!("ChangeCoalescer: Pending refresh cancelled.");
        }
    }

    fn arm(&mut self, now: Instant) -> &mut PendingRefresh {
        let deadline = now + self.window;
        let pending = self.pending.get_or_insert_with(|| PendingRefresh {
            deadline,
            full: false,
            targets: BTreeSet::new(),
        });
        pending.deadline = deadline;
        pending
    }

    fn arm_full(&mut self, now: Instant) {
        let pending = self.arm(now);
        pending.full = true;
        pending.targets.clear();
    }

    fn arm_paths(&mut self, paths: Vec<PathBuf>, now: Instant) {
        let pending = self.arm(now);
        if !pending.full {
            pending.targets.extend(paths);
        }
    }
}

/*
 * Runs a coalescer on a background thread. Events are drained from `events`;
 * each fired refresh is handed to `on_refresh`. When the sender side
 * disconnects, any pending refresh is delivered and the thread exits.
 */
pub fn spawn_coalescing_worker<F>(
    walker: Arc<TreeWalker>,
    events: Receiver<ChangeEvent>,
    mut coalescer: ChangeCoalescer,
    mut on_refresh: F,
) -> JoinHandle<()>
where
    F: FnMut(RefreshSignal) + Send + 'static,
{
    thread::spawn(move || {
        log::debug!("ChangeCoalescer: Worker started for {:?}.", walker.root());
        loop {
            let received = match coalescer.deadline() {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    events.recv_timeout(timeout)
                }
                None => events.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(event) => coalescer.record(&event, &walker, Instant::now()),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if coalescer.is_pending() {
                        let deadline = coalescer.deadline().unwrap_or_else(Instant::now);
                        if let Some(signal) = coalescer.poll(deadline) {
                            on_refresh(signal);
                        }
                    }
                    break;
                }
            }
            if let Some(signal) = coalescer.poll(Instant::now()) {
                on_refresh(signal);
            }
        }
        log::debug!("ChangeCoalescer: Worker stopped.");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::file_system::CoreFileSystemProvider;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::mpsc;
    use tempfile::tempdir;

    const WINDOW: Duration = Duration::from_millis(300);

    fn walker_for(root: &Path) -> TreeWalker {
        TreeWalker::new(
            root.to_path_buf(),
            Arc::new(CoreFileSystemProvider::new()),
            &TreeConfig {
                tokenizer: "heuristic".to_string(),
                ..TreeConfig::default()
            },
        )
    }

    #[test]
    fn test_burst_of_events_fires_one_refresh_after_window() {
        let dir = tempdir().unwrap();
        let walker = walker_for(dir.path());
        let mut coalescer = ChangeCoalescer::new(WINDOW, true);
        let start = Instant::now();

        for i in 0..10 {
            let event = ChangeEvent::new(dir.path().join(format!("f{i}.txt")), ChangeKind::Created);
            coalescer.record(&event, &walker, start + Duration::from_millis(i * 10));
        }

        // The window restarts with every event.
        assert_eq!(coalescer.poll(start + WINDOW), None);
        let last = start + Duration::from_millis(90);
        assert_eq!(coalescer.poll(last + WINDOW), Some(RefreshSignal::Full));
        assert_eq!(coalescer.poll(last + WINDOW * 2), None);
    }

    #[test]
    fn test_changed_known_file_refreshes_ancestor_chain() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let file = sub.join("a.txt");
        fs::write(&file, "hello there").unwrap();
        let walker = walker_for(dir.path());
        walker.token_count_of(&file);
        assert!(walker.cache().contains(&file));

        let mut coalescer = ChangeCoalescer::new(WINDOW, true);
        let now = Instant::now();
        coalescer.record(&ChangeEvent::new(&file, ChangeKind::Changed), &walker, now);

        assert!(!walker.cache().contains(&file));
        assert_eq!(
            coalescer.poll(now + WINDOW),
            Some(RefreshSignal::Paths(vec![
                dir.path().to_path_buf(),
                sub.clone(),
                file.clone()
            ]))
        );
    }

    #[test]
    fn test_changed_without_partial_support_is_full() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "x").unwrap();
        let walker = walker_for(dir.path());
        walker.token_count_of(&file);

        let mut coalescer = ChangeCoalescer::new(WINDOW, false);
        let now = Instant::now();
        coalescer.record(&ChangeEvent::new(&file, ChangeKind::Changed), &walker, now);
        assert_eq!(coalescer.poll(now + WINDOW), Some(RefreshSignal::Full));
        assert!(!walker.cache().contains(&file));
    }

    #[test]
    fn test_full_refresh_absorbs_targeted_paths() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "x").unwrap();
        let walker = walker_for(dir.path());
        walker.token_count_of(&file);

        let mut coalescer = ChangeCoalescer::new(WINDOW, true);
        let now = Instant::now();
        coalescer.record(
            &ChangeEvent::new(dir.path().join("new.txt"), ChangeKind::Created),
            &walker,
            now,
        );
        coalescer.record(&ChangeEvent::new(&file, ChangeKind::Changed), &walker, now);
        assert_eq!(coalescer.poll(now + WINDOW), Some(RefreshSignal::Full));
    }

    #[test]
    fn test_deleted_directory_invalidates_subtree() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("a.txt"), "a").unwrap();
        fs::write(sub.join("b.txt"), "b").unwrap();
        let walker = walker_for(dir.path());
        walker.token_count_of(&sub);
        assert_eq!(walker.cache().len(), 2);

        let mut coalescer = ChangeCoalescer::new(WINDOW, true);
        coalescer.record(&ChangeEvent::new(&sub, ChangeKind::Deleted), &walker, Instant::now());
        assert!(walker.cache().is_empty());
    }

    #[test]
    fn test_excluded_paths_do_not_arm_refresh() {
        let dir = tempdir().unwrap();
        let walker = walker_for(dir.path());
        let mut coalescer = ChangeCoalescer::new(WINDOW, true);
        coalescer.record(
            &ChangeEvent::new(dir.path().join(".git/index"), ChangeKind::Changed),
            &walker,
            Instant::now(),
        );
        assert!(!coalescer.is_pending());
    }

    #[test]
    fn test_ignore_file_change_reloads_patterns() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "a.txt\n").unwrap();
        let walker = walker_for(dir.path());
        assert!(walker.exclusion().is_excluded(&dir.path().join("a.txt")));

        fs::write(dir.path().join(".gitignore"), "b.txt\n").unwrap();
        let mut coalescer = ChangeCoalescer::new(WINDOW, true);
        let now = Instant::now();
        coalescer.record(
            &ChangeEvent::new(dir.path().join(".gitignore"), ChangeKind::Changed),
            &walker,
            now,
        );
        assert!(!walker.exclusion().is_excluded(&dir.path().join("a.txt")));
        assert_eq!(coalescer.poll(now + WINDOW), Some(RefreshSignal::Full));
    }

    #[test]
    fn test_tokenizer_change_clears_cache_before_refresh() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "one two").unwrap();
        let walker = walker_for(dir.path());
        walker.token_count_of(&file);

        let mut coalescer = ChangeCoalescer::new(WINDOW, true);
        let now = Instant::now();
        let config = TreeConfig {
            tokenizer: "whitespace".to_string(),
            ..TreeConfig::default()
        };
        coalescer.record_config_change(&walker, &config, now);
        assert!(walker.cache().is_empty());
        assert_eq!(coalescer.poll(now + config.debounce_window()), Some(RefreshSignal::Full));
    }

    #[test]
    fn test_cancel_drops_pending_refresh() {
        let dir = tempdir().unwrap();
        let walker = walker_for(dir.path());
        let mut coalescer = ChangeCoalescer::new(WINDOW, true);
        let now = Instant::now();
        coalescer.record(
            &ChangeEvent::new(dir.path().join("x"), ChangeKind::Created),
            &walker,
            now,
        );
        coalescer.cancel();
        assert_eq!(coalescer.poll(now + WINDOW), None);
    }

    #[test]
    fn test_worker_delivers_single_refresh_for_burst() {
        let dir = tempdir().unwrap();
        let walker = Arc::new(walker_for(dir.path()));
        let (tx, rx) = mpsc::channel();
        let signals = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&signals);

        let handle = spawn_coalescing_worker(
            walker,
            rx,
            ChangeCoalescer::new(Duration::from_millis(50), true),
            move |signal| sink.lock().unwrap().push(signal),
        );
        for i in 0..5 {
            tx.send(ChangeEvent::new(dir.path().join(format!("{i}.txt")), ChangeKind::Created))
                .unwrap();
        }
        drop(tx);
        handle.join().unwrap();

        assert_eq!(*signals.lock().unwrap(), vec![RefreshSignal::Full]);
    }
}
