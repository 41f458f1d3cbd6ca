use super::models::{ChangeEvent, ChangeKind, DirListing, EntryKind, FileStat};
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::SystemTime;

/*
 * This module defines the contract the token tree expects from the file system
 * (`FileSystemProviderOperations`) and its std-backed implementation
 * `CoreFileSystemProvider`. Reads used by the tree walker are expected to fail
 * softly at the call site; renames and deletes report errors so a drag-and-drop
 * batch can surface them per item. Watching is delegated to `notify` and
 * translated into `ChangeEvent`s.
 */

/*
 * Defines custom error types for file system operations.
 * This enum centralizes error handling for I/O issues, move collisions,
 * oversized reads and watcher setup, providing more specific error information
 * than a bare `io::Error`.
 */
#[derive(Debug)]
pub enum FileSystemError {
    Io(io::Error),
    NotFound(PathBuf),
    AlreadyExists(PathBuf),
    TooLarge { path: PathBuf, limit: u64 },
    InvalidMove { source: PathBuf, destination: PathBuf },
    Watch(notify::Error),
}

impl From<io::Error> for FileSystemError {
    fn from(err: io::Error) -> Self {
        FileSystemError::Io(err)
    }
}

impl From<notify::Error> for FileSystemError {
    fn from(err: notify::Error) -> Self {
        FileSystemError::Watch(err)
    }
}

impl std::fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileSystemError::Io(e) => write!(f, "I/O error: {e}"),
            FileSystemError::NotFound(p) => write!(f, "Path not found: {p:?}"),
            FileSystemError::AlreadyExists(p) => write!(f, "Destination already exists: {p:?}"),
            FileSystemError::TooLarge { path, limit } => {
                write!(f, "File {path:?} exceeds the {limit} byte read limit")
            }
            FileSystemError::InvalidMove {
                source,
                destination,
            } => write!(f, "Cannot move {source:?} into {destination:?}"),
            FileSystemError::Watch(e) => write!(f, "File watcher error: {e}"),
        }
    }
}

impl std::error::Error for FileSystemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileSystemError::Io(e) => Some(e),
            FileSystemError::Watch(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FileSystemError>;

/*
 * Keeps a watcher alive while its events are consumed. Dropping the guard stops
 * the underlying watch; the receiver then reports disconnection.
 */
pub struct WatchGuard {
    _watcher: Option<Box<dyn Send>>,
}

/* A live watch: the guard plus the stream of translated change events. */
pub struct WatchHandle {
    guard: WatchGuard,
    events: Receiver<ChangeEvent>,
}

impl WatchHandle {
    /* Wraps a bare receiver, for providers that have no native watcher to keep alive. */
    pub fn from_receiver(events: Receiver<ChangeEvent>) -> Self {
        WatchHandle {
            guard: WatchGuard { _watcher: None },
            events,
        }
    }

    pub fn events(&self) -> &Receiver<ChangeEvent> {
        &self.events
    }

    pub fn into_parts(self) -> (WatchGuard, Receiver<ChangeEvent>) {
        (self.guard, self.events)
    }
}

/*
 * Defines the file system operations the token tree depends on.
 * All operations may fail. The tree read path (`stat`, `list_dir`,
 * `read_file`) treats failures as "value unavailable"; `rename_no_overwrite`
 * and `delete` failures are reported to the caller per item.
 */
pub trait FileSystemProviderOperations: Send + Sync {
    fn stat(&self, path: &Path) -> Result<FileStat>;

    fn list_dir(&self, path: &Path) -> Result<Vec<DirListing>>;

    /* The absolute path with every symlink resolved. */
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;

    /*
     * Reads a whole file, refusing with `TooLarge` when it holds more than
     * `max_bytes` bytes. Implementations must not read past the cap.
     */
    fn read_file(&self, path: &Path, max_bytes: u64) -> Result<Vec<u8>>;

    /* Renames `source` to `destination`, failing with `AlreadyExists` instead of overwriting. */
    fn rename_no_overwrite(&self, source: &Path, destination: &Path) -> Result<()>;

    fn delete(&self, path: &Path, recursive: bool) -> Result<()>;

    fn watch(&self, path: &Path) -> Result<WatchHandle>;
}

/*
 * The core implementation of `FileSystemProviderOperations` on top of `std::fs`,
 * with `notify` providing recursive watches.
 */
pub struct CoreFileSystemProvider {}

impl CoreFileSystemProvider {
    pub fn new() -> Self {
        CoreFileSystemProvider {}
    }
}

impl Default for CoreFileSystemProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn stat_from_metadata(metadata: &fs::Metadata) -> FileStat {
    FileStat {
        kind: if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        },
        size: metadata.len(),
        // Platforms without mtime support get a fixed key, which simply means
        // the cache never sees a change for them.
        modified_at: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
    }
}

fn map_not_found(err: io::Error, path: &Path) -> FileSystemError {
    if err.kind() == io::ErrorKind::NotFound {
        FileSystemError::NotFound(path.to_path_buf())
    } else {
        FileSystemError::Io(err)
    }
}

impl FileSystemProviderOperations for CoreFileSystemProvider {
    fn stat(&self, path: &Path) -> Result<FileStat> {
        let metadata = fs::metadata(path).map_err(|e| map_not_found(e, path))?;
        Ok(stat_from_metadata(&metadata))
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<DirListing>> {
        let mut listing = Vec::new();
        for entry_result in fs::read_dir(path).map_err(|e| map_not_found(e, path))? {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("CoreFileSystemProvider: Skipping unreadable entry in {path:?}: {e}");
                    continue;
                }
            };
            // Follow symlinks so a link to a directory lists as a directory.
            let kind = match fs::metadata(entry.path()) {
                Ok(metadata) if metadata.is_dir() => EntryKind::Directory,
                Ok(_) => EntryKind::File,
                Err(e) => {
                    log::warn!(
                        "CoreFileSystemProvider: Could not stat {:?}: {e}",
                        entry.path()
                    );
                    continue;
                }
            };
            listing.push(DirListing {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        Ok(listing)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path).map_err(|e| map_not_found(e, path))
    }

    fn read_file(&self, path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
        let file = File::open(path).map_err(|e| map_not_found(e, path))?;
        let mut buffer = Vec::new();
        // Read one byte past the cap so an oversized file is detected without
        // pulling the whole thing into memory.
        file.take(max_bytes.saturating_add(1))
            .read_to_end(&mut buffer)?;
        if buffer.len() as u64 > max_bytes {
            return Err(FileSystemError::TooLarge {
                path: path.to_path_buf(),
                limit: max_bytes,
            });
        }
        Ok(buffer)
    }

    fn rename_no_overwrite(&self, source: &Path, destination: &Path) -> Result<()> {
        if fs::symlink_metadata(source).is_err() {
            return Err(FileSystemError::NotFound(source.to_path_buf()));
        }
        if fs::symlink_metadata(destination).is_ok() {
            return Err(FileSystemError::AlreadyExists(destination.to_path_buf()));
        }
        log::debug!("CoreFileSystemProvider: Renaming {source:?} -> {destination:?}");
        fs::rename(source, destination)?;
        Ok(())
    }

    fn delete(&self, path: &Path, recursive: bool) -> Result<()> {
        let metadata = fs::symlink_metadata(path).map_err(|e| map_not_found(e, path))?;
        log::debug!("CoreFileSystemProvider: Deleting {path:?} (recursive: {recursive})");
        if metadata.is_dir() {
            if recursive {
                fs::remove_dir_all(path)?;
            } else {
                fs::remove_dir(path)?;
            }
        } else {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn watch(&self, path: &Path) -> Result<WatchHandle> {
        let (tx, rx) = mpsc::channel::<ChangeEvent>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for change in translate_notify_event(&event) {
                        // The receiver is gone once the watch is dropped.
                        if tx.send(change).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => log::warn!("CoreFileSystemProvider: Watch error: {e}"),
            },
            Config::default(),
        )?;
        watcher.watch(path, RecursiveMode::Recursive)?;
        log::debug!("CoreFileSystemProvider: Watching {path:?} recursively.");
        Ok(WatchHandle {
            guard: WatchGuard {
                _watcher: Some(Box::new(watcher)),
            },
            events: rx,
        })
    }
}

/*
 * Maps a `notify` event onto change events. Renames are reported per path as
 * a creation when the path exists afterwards and a deletion otherwise; access
 * events are dropped.
 */
fn translate_notify_event(event: &Event) -> Vec<ChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(_)) => None,
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => Some(ChangeKind::Changed),
        EventKind::Access(_) => return Vec::new(),
    };
    event
        .paths
        .iter()
        .map(|path| {
            let kind = kind.unwrap_or_else(|| {
                if path.exists() {
                    ChangeKind::Created
                } else {
                    ChangeKind::Deleted
                }
            });
            ChangeEvent::new(path.clone(), kind)
        })
        .collect()
}
