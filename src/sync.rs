//! Keeps the selection consistent with the tree after every enumeration or
//! expand/collapse, using a single rule for all triggers.

use crate::fs::entry::FileEntry;
use crate::fs::tree::TreeState;

/// Selected file in the flattened view. `index` is `None` when nothing is
/// selected, and otherwise always the position of `path` in the current
/// flattened list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub path: Option<String>,
    pub index: Option<usize>,
}

impl Selection {
    pub fn select(&mut self, path: &str, index: usize) {
        self.path = Some(path.to_string());
        self.index = Some(index);
    }

    pub fn clear(&mut self) {
        self.path = None;
        self.index = None;
    }

    pub fn is_selected(&self, path: &str) -> bool {
        self.path.as_deref() == Some(path)
    }
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// The previous selection is still visible. `needs_load` is set when its
    /// cached content is empty.
    Kept {
        path: String,
        index: usize,
        needs_load: bool,
    },
    /// The previous selection is gone (or there was none); the first visible
    /// file is now selected and must be loaded.
    First { path: String },
    /// Nothing is visible; the selection was cleared.
    Cleared,
}

impl Reconciled {
    /// Path whose content the caller should load next, if any.
    pub fn load_target(&self) -> Option<&str> {
        match self {
            Reconciled::Kept {
                path,
                needs_load: true,
                ..
            } => Some(path),
            Reconciled::First { path } => Some(path),
            _ => None,
        }
    }
}

/// Apply the selection rule against the tree's current flattened view.
pub fn reconcile(tree: &TreeState, selection: &mut Selection) -> Reconciled {
    if let Some(path) = selection.path.clone() {
        if let Some(index) = tree.find_index_by_path(&path) {
            selection.index = Some(index);
            let needs_load = tree.entry(&path).map_or(true, |e| !e.is_loaded());
            return Reconciled::Kept {
                path,
                index,
                needs_load,
            };
        }
    }

    match tree.flat_items.first() {
        Some(first) => {
            let path = first.path.clone();
            selection.select(&path, 0);
            Reconciled::First { path }
        }
        None => {
            selection.clear();
            Reconciled::Cleared
        }
    }
}

/// Rebuild the tree from a fresh enumeration (keeping expansion), then
/// reconcile the selection.
pub fn apply_enumeration(
    tree: &mut TreeState,
    selection: &mut Selection,
    entries: Vec<FileEntry>,
) -> Reconciled {
    tree.rebuild(entries);
    let outcome = reconcile(tree, selection);
    tracing::debug!(?outcome, files = tree.entries().len(), "reconciled enumeration");
    outcome
}

/// Toggle a directory, then reconcile. `None` if `path` is not a directory.
pub fn apply_toggle(tree: &mut TreeState, selection: &mut Selection, path: &str) -> Option<Reconciled> {
    tree.toggle(path)?;
    Some(reconcile(tree, selection))
}
