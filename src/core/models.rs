/*
 * Plain data types shared by every component of the token tree: the `Entry`
 * produced on each tree read, the raw stat/listing records exchanged with the
 * file system provider, and the change notifications fed to the coalescer.
 * Entries are rebuilt on every read and never mutated after being handed out.
 */
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        self == EntryKind::Directory
    }
}

/*
 * Metadata returned by `FileSystemProviderOperations::stat`.
 * `modified_at` doubles as the freshness key for cached token counts.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub kind: EntryKind,
    pub size: u64,
    pub modified_at: SystemTime,
}

/* One raw item of a directory listing, before stat or exclusion. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    pub name: String,
    pub kind: EntryKind,
}

/*
 * One node of the tree as surfaced to sorting and presentation.
 * `token_count` stays `None` until a caller explicitly asks for counts.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub token_count: Option<usize>,
    pub size: u64,
    pub modified_at: SystemTime,
}

impl Entry {
    pub fn new(path: PathBuf, stat: FileStat) -> Self {
        Entry {
            path,
            kind: stat.kind,
            token_count: None,
            size: stat.size,
            modified_at: stat.modified_at,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /* The basename used for display, sorting and search. */
    pub fn name(&self) -> &str {
        basename(&self.path)
    }

    #[cfg(test)]
    pub fn new_test(path: &str, kind: EntryKind, size: u64, token_count: Option<usize>) -> Self {
        Entry {
            path: PathBuf::from(path),
            kind,
            token_count,
            size,
            modified_at: SystemTime::UNIX_EPOCH,
        }
    }
}

/*
 * Returns the final component of a path as UTF-8, or an empty string for
 * roots and paths whose file name is not valid UTF-8.
 */
pub fn basename(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Changed,
    Created,
    Deleted,
}

/* A raw notification coming from an external watcher. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        ChangeEvent {
            path: path.into(),
            kind,
        }
    }
}
