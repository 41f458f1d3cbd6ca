/*
 * Drag-and-drop moves and deletions of tree entries.
 *
 * Each item of a batch is attempted independently: a failure is recorded for
 * that item and the batch continues. Only successful items touch the cache
 * (old and new subtrees invalidated) and the selection (members relocated or
 * dropped); failed items leave both exactly as they were.
 */
use super::change_coalescer::RefreshSignal;
use super::file_system::FileSystemError;
use super::path_utils;
use super::selection::SelectionSet;
use super::tree_walker::TreeWalker;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct ItemFailure {
    pub path: PathBuf,
    pub error: FileSystemError,
}

#[derive(Debug, Default)]
pub struct MoveReport {
    /* `(old, new)` pairs of completed moves, in batch order. */
    pub moved: Vec<(PathBuf, PathBuf)>,
    pub failed: Vec<ItemFailure>,
}

impl MoveReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /* A full refresh when anything moved. */
    pub fn refresh_signal(&self) -> Option<RefreshSignal> {
        (!self.moved.is_empty()).then_some(RefreshSignal::Full)
    }
}

#[derive(Debug, Default)]
pub struct DeleteReport {
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<ItemFailure>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn refresh_signal(&self) -> Option<RefreshSignal> {
        (!self.deleted.is_empty()).then_some(RefreshSignal::Full)
    }
}

/*
 * Moves every source into `destination_dir`, keeping its basename and never
 * overwriting. Moving a directory into itself or one of its descendants, and
 * moving onto an existing name (including its own current location), fail
 * for that item only.
 */
pub fn move_entries(
    walker: &TreeWalker,
    selection: &mut SelectionSet,
    sources: &[PathBuf],
    destination_dir: &Path,
) -> MoveReport {
    let mut report = MoveReport::default();

    for source in sources {
        match move_one(walker, source, destination_dir) {
            Ok(target) => {
                walker.cache().invalidate_subtree(source);
                walker.cache().invalidate_subtree(&target);
                selection.rename_subtree(source, &target);
                log::debug!("EntryMover: Moved {source:?} -> {target:?}");
                report.moved.push((source.clone(), target));
            }
            Err(error) => {
                log::warn!("EntryMover: Could not move {source:?} into {destination_dir:?}: {error}");
                report.failed.push(ItemFailure {
                    path: source.clone(),
                    error,
                });
            }
        }
    }

    log::debug!(
        "EntryMover: Move batch finished, {} moved, {} failed.",
        report.moved.len(),
        report.failed.len()
    );
    report
}

/* Returns the new location on success. */
fn move_one(
    walker: &TreeWalker,
    source: &Path,
    destination_dir: &Path,
) -> Result<PathBuf, FileSystemError> {
    let invalid = || FileSystemError::InvalidMove {
        source: source.to_path_buf(),
        destination: destination_dir.to_path_buf(),
    };
    let name = source.file_name().ok_or_else(invalid)?;
    if path_utils::is_same_or_descendant(destination_dir, source) {
        return Err(invalid());
    }
    let target = destination_dir.join(name);
    walker.file_system().rename_no_overwrite(source, &target)?;
    Ok(target)
}

/* Deletes each path, invalidating its cached subtree and dropping it from the selection. */
pub fn delete_entries(
    walker: &TreeWalker,
    selection: &mut SelectionSet,
    paths: &[PathBuf],
    recursive: bool,
) -> DeleteReport {
    let mut report = DeleteReport::default();

    for path in paths {
        match walker.file_system().delete(path, recursive) {
            Ok(()) => {
                walker.cache().invalidate_subtree(path);
                selection.forget_subtree(path);
                log::debug!("EntryMover: Deleted {path:?}");
                report.deleted.push(path.clone());
            }
            Err(error) => {
                log::warn!("EntryMover: Could not delete {path:?}: {error}");
                report.failed.push(ItemFailure {
                    path: path.clone(),
                    error,
                });
            }
        }
    }
    report
}
