/*
 * Multi-selection state for the tree: plain click, ctrl-toggle, shift-range
 * and explicit multi-select, plus the bookkeeping that keeps the set valid
 * after entries are deleted or moved.
 *
 * Invariant: `last_selected` is either `None` or a member of the set.
 */
use super::path_utils;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    selected: BTreeSet<PathBuf>,
    last_selected: Option<PathBuf>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn click(&mut self, path: &Path) {
        self.selected.clear();
        self.selected.insert(path.to_path_buf());
        self.last_selected = Some(path.to_path_buf());
    }

    /*
     * Toggles membership of `path`. Deselecting the anchor clears it, since
     * the anchor must stay a member.
     */
    pub fn toggle(&mut self, path: &Path) {
        if self.selected.remove(path) {
            self.last_selected = None;
        } else {
            self.selected.insert(path.to_path_buf());
            self.last_selected = Some(path.to_path_buf());
        }
    }

    /*
     * Extends the selection from the anchor to `path`. When both are present
     * in `displayed` (the current on-screen order), everything between them is
     * selected too. Without an anchor this is a plain click. The anchor does
     * not move, so repeated shift-clicks grow from the same point.
     */
    pub fn shift_click(&mut self, path: &Path, displayed: &[PathBuf]) {
        let Some(anchor) = self.last_selected.clone() else {
            self.click(path);
            return;
        };

        let anchor_index = displayed.iter().position(|p| *p == anchor);
        let target_index = displayed.iter().position(|p| p == path);
        if let (Some(a), Some(b)) = (anchor_index, target_index) {
            let (from, to) = if a <= b { (a, b) } else { (b, a) };
            self.selected.extend(displayed[from..=to].iter().cloned());
        }
        self.selected.insert(anchor);
        self.selected.insert(path.to_path_buf());
    }

    /* Replaces (or, with `extend`, grows) the selection with `paths`. */
    pub fn select_many(&mut self, paths: &[PathBuf], extend: bool) {
        if !extend {
            self.selected.clear();
            self.last_selected = None;
        }
        self.selected.extend(paths.iter().cloned());
        if let Some(last) = paths.last() {
            self.last_selected = Some(last.clone());
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.last_selected = None;
    }

    /* Removes `path` and everything below it. */
    pub fn forget_subtree(&mut self, path: &Path) {
        self.selected
            .retain(|selected| !path_utils::is_same_or_descendant(selected, path));
        if self
            .last_selected
            .as_deref()
            .is_some_and(|last| path_utils::is_same_or_descendant(last, path))
        {
            self.last_selected = None;
        }
    }

    /* Rewrites members at or below `old` to the same place under `new`. */
    pub fn rename_subtree(&mut self, old: &Path, new: &Path) {
        let moved: Vec<PathBuf> = self
            .selected
            .iter()
            .filter(|selected| path_utils::is_same_or_descendant(selected, old))
            .cloned()
            .collect();
        for path in moved {
            self.selected.remove(&path);
            if let Some(relocated) = path_utils::relocate(&path, old, new) {
                self.selected.insert(relocated);
            }
        }
        if let Some(last) = self.last_selected.take() {
            self.last_selected = Some(path_utils::relocate(&last, old, new).unwrap_or(last));
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.selected.contains(path)
    }

    pub fn last_selected(&self) -> Option<&Path> {
        self.last_selected.as_deref()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /* Selected paths in path order. */
    pub fn paths(&self) -> Vec<PathBuf> {
        self.selected.iter().cloned().collect()
    }
}
