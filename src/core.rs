/*
 * This module consolidates the core, UI-agnostic logic of the token tree:
 * token estimation and caching, lazy tree walking with exclusion rules,
 * sorting/filtering/search, change coalescing, selection and moves, plus the
 * file system, configuration, git status and presentation collaborators.
 * Key abstractions (`FileSystemProviderOperations`, `ConfigManagerOperations`,
 * `GitStatusOperations`, `TokenCounterOperations`) are re-exported here.
 */
pub mod arrange;
pub mod change_coalescer;
pub mod config;
pub mod entry_mover;
pub mod exclusion;
pub mod file_system;
pub mod git_status;
pub mod models;
pub mod path_utils;
pub mod presentation;
pub mod selection;
pub mod token_cache;
pub mod tokenizer_utils;
pub mod tree_walker;

// Re-export key structures and enums
pub use models::{ChangeEvent, ChangeKind, DirListing, Entry, EntryKind, FileStat};

// Re-export file system related items
pub use file_system::{
    CoreFileSystemProvider, FileSystemError, FileSystemProviderOperations, WatchHandle,
};

// Re-export config related items
pub use config::{ConfigError, ConfigManagerOperations, CoreConfigManager, TreeConfig};

pub use tokenizer_utils::{
    CoreTikTokenCounter, TokenCounterOperations, TokenEstimator, TokenizerStrategy,
};

pub use token_cache::{CacheStats, EntryCache};

pub use exclusion::{ExclusionEngine, ExclusionReason};

pub use tree_walker::TreeWalker;

pub use arrange::{SortDirection, SortMode, SortState, ViewFilter, arrange};

pub use change_coalescer::{ChangeCoalescer, RefreshSignal, spawn_coalescing_worker};

pub use selection::SelectionSet;

pub use entry_mover::{DeleteReport, ItemFailure, MoveReport, delete_entries, move_entries};

pub use git_status::{CoreGitStatusProvider, GitFileStatus, GitStatusOperations};

pub use presentation::{EntryViewModel, build_view_model, format_token_badge};
