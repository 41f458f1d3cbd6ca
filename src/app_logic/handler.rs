use crate::core::{
    ChangeCoalescer, ChangeEvent, ConfigManagerOperations, Entry, EntryViewModel,
    FileSystemProviderOperations, GitStatusOperations, RefreshSignal, SelectionSet, SortMode,
    SortState, TreeConfig, TreeWalker, ViewFilter, arrange, build_view_model, delete_entries,
    move_entries,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

// Made pub(crate) for access from handler_tests.rs
pub(crate) const APP_NAME_FOR_SETTINGS: &str = "TokenTree";

/* Commands a tree view host sends to the session. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeCommand {
    Click(PathBuf),
    ToggleSelect(PathBuf),
    ShiftClick(PathBuf),
    /* Selects every child currently displayed for a directory. */
    SelectAllIn(PathBuf),
    ClearSelection,
    SelectSortMode(SortMode),
    SetSearch(Option<String>),
    SetFilter(Option<String>),
    SetShowHidden(bool),
    DropOnto {
        sources: Vec<PathBuf>,
        destination: PathBuf,
    },
    DeleteSelection {
        recursive: bool,
    },
    FileChanged(ChangeEvent),
    UpdateConfig(TreeConfig),
    Refresh,
}

/* What the host must do in response to a command. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeUpdate {
    Refresh(RefreshSignal),
    SelectionChanged(Vec<PathBuf>),
    ItemFailed { path: PathBuf, message: String },
    ConfigSaveFailed(String),
}

/*
 * Owns the state of one token tree: the walker with its cache, the session's
 * sort and filter, the selection and the change coalescer. It processes
 * `TreeCommand`s and answers with `TreeUpdate`s for the host to apply,
 * persisting settings changes through `ConfigManagerOperations`.
 */
pub struct TreeSession {
    pub(crate) walker: Arc<TreeWalker>,
    pub(crate) config: TreeConfig,
    pub(crate) sort: SortState,
    pub(crate) filter: ViewFilter,
    pub(crate) selection: SelectionSet,
    pub(crate) coalescer: ChangeCoalescer,
    pub(crate) displayed: HashMap<PathBuf, Vec<PathBuf>>,
    pub(crate) config_manager: Arc<dyn ConfigManagerOperations>,
    pub(crate) git_status: Arc<dyn GitStatusOperations>,
}

impl TreeSession {
    /*
     * Creates a session for `root`, loading the persisted settings. A
     * settings file that cannot be read is logged and replaced by defaults.
     */
    pub fn new(
        root: PathBuf,
        file_system: Arc<dyn FileSystemProviderOperations>,
        config_manager: Arc<dyn ConfigManagerOperations>,
        git_status: Arc<dyn GitStatusOperations>,
    ) -> Self {
        let config = match config_manager.load_config(APP_NAME_FOR_SETTINGS) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("TreeSession: Could not load settings, using defaults: {e}");
                TreeConfig::default()
            }
        };
        Self::with_config(root, file_system, config, config_manager, git_status)
    }

    pub fn with_config(
        root: PathBuf,
        file_system: Arc<dyn FileSystemProviderOperations>,
        config: TreeConfig,
        config_manager: Arc<dyn ConfigManagerOperations>,
        git_status: Arc<dyn GitStatusOperations>,
    ) -> Self {
        let walker = Arc::new(TreeWalker::new(root, file_system, &config));
        Self::with_walker(walker, config, config_manager, git_status)
    }

    pub fn with_walker(
        walker: Arc<TreeWalker>,
        config: TreeConfig,
        config_manager: Arc<dyn ConfigManagerOperations>,
        git_status: Arc<dyn GitStatusOperations>,
    ) -> Self {
        log::debug!("TreeSession: Opened {:?}.", walker.root());
        TreeSession {
            coalescer: ChangeCoalescer::from_config(&config),
            filter: ViewFilter {
                show_hidden: config.show_hidden,
                ..ViewFilter::default()
            },
            walker,
            config,
            sort: SortState::default(),
            selection: SelectionSet::new(),
            displayed: HashMap::new(),
            config_manager,
            git_status,
        }
    }

    pub fn root(&self) -> &Path {
        self.walker.root()
    }

    pub fn walker(&self) -> &Arc<TreeWalker> {
        &self.walker
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn sort_state(&self) -> SortState {
        self.sort
    }

    pub fn set_sort_state(&mut self, sort: SortState) {
        self.sort = sort;
    }

    pub fn view_filter(&self) -> &ViewFilter {
        &self.filter
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    /*
     * The children of `dir` with token counts, narrowed and ordered by the
     * session's filter and sort. The resulting order is remembered for
     * shift-click ranges.
     */
    pub fn arranged_children(&mut self, dir: &Path) -> Vec<Entry> {
        let children = self.walker.list_children_with_counts(dir);
        let arranged = arrange(children, &self.sort, &self.filter);
        self.displayed.insert(
            dir.to_path_buf(),
            arranged.iter().map(|entry| entry.path.clone()).collect(),
        );
        arranged
    }

    /* `arranged_children` turned into view models with git decorations. */
    pub fn children(&mut self, dir: &Path) -> Vec<EntryViewModel> {
        let arranged = self.arranged_children(dir);
        let statuses = self.git_status.status_for_root(self.walker.root());
        arranged
            .iter()
            .map(|entry| {
                build_view_model(
                    entry,
                    &self.config.badge_suffix,
                    statuses.get(&entry.path).copied(),
                )
            })
            .collect()
    }

    /* Fires the pending coalesced refresh once its window has elapsed. */
    pub fn poll_refresh(&mut self, now: Instant) -> Option<RefreshSignal> {
        self.coalescer.poll(now)
    }

    pub fn handle(&mut self, command: TreeCommand) -> Vec<TreeUpdate> {
        log::trace!("TreeSession: Handling {command:?}");
        match command {
            TreeCommand::Click(path) => {
                self.selection.click(&path);
                self.selection_changed()
            }
            TreeCommand::ToggleSelect(path) => {
                self.selection.toggle(&path);
                self.selection_changed()
            }
            TreeCommand::ShiftClick(path) => {
                let displayed = path
                    .parent()
                    .and_then(|parent| self.displayed.get(parent))
                    .cloned()
                    .unwrap_or_default();
                self.selection.shift_click(&path, &displayed);
                self.selection_changed()
            }
            TreeCommand::SelectAllIn(dir) => {
                let displayed = self.displayed.get(&dir).cloned().unwrap_or_default();
                self.selection.select_many(&displayed, false);
                self.selection_changed()
            }
            TreeCommand::ClearSelection => {
                self.selection.clear();
                self.selection_changed()
            }
            TreeCommand::SelectSortMode(mode) => {
                self.sort.select(mode);
                vec![TreeUpdate::Refresh(RefreshSignal::Full)]
            }
            TreeCommand::SetSearch(term) => {
                self.filter.search_term = term;
                vec![TreeUpdate::Refresh(RefreshSignal::Full)]
            }
            TreeCommand::SetFilter(text) => {
                self.filter.filter_text = text;
                vec![TreeUpdate::Refresh(RefreshSignal::Full)]
            }
            TreeCommand::SetShowHidden(show_hidden) => {
                let config = TreeConfig {
                    show_hidden,
                    ..self.config.clone()
                };
                self.apply_config(config)
            }
            TreeCommand::DropOnto {
                sources,
                destination,
            } => self.drop_onto(&sources, &destination),
            TreeCommand::DeleteSelection { recursive } => self.delete_selection(recursive),
            TreeCommand::FileChanged(event) => {
                self.coalescer.record(&event, &self.walker, Instant::now());
                Vec::new()
            }
            TreeCommand::UpdateConfig(config) => self.apply_config(config),
            TreeCommand::Refresh => {
                self.walker.cache().clear_all();
                self.walker.exclusion().reload_patterns();
                self.coalescer.cancel();
                vec![TreeUpdate::Refresh(RefreshSignal::Full)]
            }
        }
    }

    fn selection_changed(&self) -> Vec<TreeUpdate> {
        vec![TreeUpdate::SelectionChanged(self.selection.paths())]
    }

    fn drop_onto(&mut self, sources: &[PathBuf], destination: &Path) -> Vec<TreeUpdate> {
        let report = move_entries(&self.walker, &mut self.selection, sources, destination);
        let mut updates: Vec<TreeUpdate> = report
            .failed
            .iter()
            .map(|failure| TreeUpdate::ItemFailed {
                path: failure.path.clone(),
                message: failure.error.to_string(),
            })
            .collect();
        if let Some(signal) = report.refresh_signal() {
            // The move is reported directly; a watcher echo of it is redundant.
            self.coalescer.cancel();
            updates.push(TreeUpdate::Refresh(signal));
            updates.push(TreeUpdate::SelectionChanged(self.selection.paths()));
        }
        updates
    }

    fn delete_selection(&mut self, recursive: bool) -> Vec<TreeUpdate> {
        let targets = self.selection.paths();
        let report = delete_entries(&self.walker, &mut self.selection, &targets, recursive);
        let mut updates: Vec<TreeUpdate> = report
            .failed
            .iter()
            .map(|failure| TreeUpdate::ItemFailed {
                path: failure.path.clone(),
                message: failure.error.to_string(),
            })
            .collect();
        if let Some(signal) = report.refresh_signal() {
            self.coalescer.cancel();
            updates.push(TreeUpdate::Refresh(signal));
            updates.push(TreeUpdate::SelectionChanged(self.selection.paths()));
        }
        updates
    }

    /*
     * Applies and persists new settings. The refresh is immediate rather than
     * coalesced, since the change came from the user.
     */
    fn apply_config(&mut self, config: TreeConfig) -> Vec<TreeUpdate> {
        let mut updates = Vec::new();
        if config == self.config {
            return updates;
        }

        self.coalescer
            .record_config_change(&self.walker, &config, Instant::now());
        self.coalescer.cancel();
        self.filter.show_hidden = config.show_hidden;

        if let Err(e) = self
            .config_manager
            .save_config(APP_NAME_FOR_SETTINGS, &config)
        {
            log::error!("TreeSession: Failed to save settings: {e}");
            updates.push(TreeUpdate::ConfigSaveFailed(e.to_string()));
        }
        self.config = config;
        updates.push(TreeUpdate::Refresh(RefreshSignal::Full));
        updates
    }
}
