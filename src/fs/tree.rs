use std::cmp::Ordering;
use std::collections::HashMap;

use crate::fs::entry::FileEntry;

/// Type of tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// A node in the file tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    /// Forward-slash path; empty for the root.
    pub path: String,
    pub kind: NodeKind,
    pub children: Vec<TreeNode>,
    /// Index into `TreeState::entries` for file nodes.
    pub entry_ref: Option<usize>,
    /// Only meaningful for directories.
    pub expanded: bool,
}

impl TreeNode {
    fn directory(name: &str, path: String, expanded: bool) -> Self {
        Self {
            name: name.to_string(),
            path,
            kind: NodeKind::Directory,
            children: Vec::new(),
            entry_ref: None,
            expanded,
        }
    }

    fn file(name: &str, path: &str, entry_ref: usize) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            kind: NodeKind::File,
            children: Vec::new(),
            entry_ref: Some(entry_ref),
            expanded: false,
        }
    }

    fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// A visible file leaf in the flattened view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatItem {
    pub name: String,
    pub path: String,
    /// Number of directories between the root and this file.
    pub depth: usize,
    pub entry_ref: usize,
}

/// The tree built from one backend enumeration, plus its flattened view.
pub struct TreeState {
    pub root: TreeNode,
    entries: Vec<FileEntry>,
    /// Path -> child indices from the root, for every node.
    routes: HashMap<String, Vec<usize>>,
    pub flat_items: Vec<FlatItem>,
}

impl Default for TreeState {
    fn default() -> Self {
        Self {
            root: TreeNode::directory("", String::new(), true),
            entries: Vec::new(),
            routes: HashMap::new(),
            flat_items: Vec::new(),
        }
    }
}

impl TreeState {
    /// Build a tree from a flat entry list; every directory starts expanded.
    #[cfg(test)]
    pub fn new(entries: Vec<FileEntry>) -> Self {
        let mut state = Self::default();
        state.rebuild(entries);
        state
    }

    /// Replace the tree with one built from `entries`.
    ///
    /// Directory expansion is carried over from the previous tree by path;
    /// directories that did not exist before start expanded.
    pub fn rebuild(&mut self, entries: Vec<FileEntry>) {
        let previous = self.collect_expansion();
        self.root = Self::build(&entries, &previous);
        self.entries = entries;
        self.routes.clear();
        Self::index_routes(&self.root, &mut Vec::new(), &mut self.routes);
        self.flatten();
    }

    fn build(entries: &[FileEntry], previous: &HashMap<String, bool>) -> TreeNode {
        let mut root = TreeNode::directory("", String::new(), true);

        for (idx, entry) in entries.iter().enumerate() {
            let parts: Vec<&str> = entry.relative_path.split('/').collect();
            let mut current = &mut root;

            for (i, part) in parts.iter().enumerate() {
                if i == parts.len() - 1 {
                    current
                        .children
                        .push(TreeNode::file(part, &entry.relative_path, idx));
                    break;
                }

                let pos = match current
                    .children
                    .iter()
                    .position(|c| c.is_dir() && c.name == *part)
                {
                    Some(pos) => pos,
                    None => {
                        let dir_path = parts[..=i].join("/");
                        let expanded = previous.get(&dir_path).copied().unwrap_or(true);
                        current
                            .children
                            .push(TreeNode::directory(part, dir_path, expanded));
                        current.children.len() - 1
                    }
                };
                current = &mut current.children[pos];
            }
        }

        Self::sort_recursive(&mut root);
        root
    }

    /// Directories before files, then by name (case-insensitive, ties broken
    /// by the raw name so the order is total).
    fn compare(a: &TreeNode, b: &TreeNode) -> Ordering {
        b.is_dir()
            .cmp(&a.is_dir())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.name.cmp(&b.name))
    }

    fn sort_recursive(node: &mut TreeNode) {
        node.children.sort_by(Self::compare);
        for child in node.children.iter_mut().filter(|c| c.is_dir()) {
            Self::sort_recursive(child);
        }
    }

    fn index_routes(node: &TreeNode, route: &mut Vec<usize>, routes: &mut HashMap<String, Vec<usize>>) {
        for (i, child) in node.children.iter().enumerate() {
            route.push(i);
            routes.insert(child.path.clone(), route.clone());
            if child.is_dir() {
                Self::index_routes(child, route, routes);
            }
            route.pop();
        }
    }

    /// Rebuild the flat list of visible file leaves.
    pub fn flatten(&mut self) {
        self.flat_items.clear();
        Self::flatten_node(&self.root, 0, &mut self.flat_items);
    }

    fn flatten_node(node: &TreeNode, depth: usize, items: &mut Vec<FlatItem>) {
        for child in &node.children {
            match child.kind {
                NodeKind::File => {
                    if let Some(entry_ref) = child.entry_ref {
                        items.push(FlatItem {
                            name: child.name.clone(),
                            path: child.path.clone(),
                            depth,
                            entry_ref,
                        });
                    }
                }
                NodeKind::Directory => {
                    if child.expanded {
                        Self::flatten_node(child, depth + 1, items);
                    }
                }
            }
        }
    }

    /// Flip the expansion of the directory at `path` and re-flatten.
    ///
    /// Returns the new expansion state, or `None` if `path` is not a directory.
    pub fn toggle(&mut self, path: &str) -> Option<bool> {
        let node = self.find_node_mut(path)?;
        if !node.is_dir() {
            return None;
        }
        node.expanded = !node.expanded;
        let expanded = node.expanded;
        self.flatten();
        Some(expanded)
    }

    /// Find a node by path through the route index.
    pub fn find_node(&self, path: &str) -> Option<&TreeNode> {
        let route = self.routes.get(path)?;
        let mut node = &self.root;
        for &i in route {
            node = node.children.get(i)?;
        }
        Some(node)
    }

    fn find_node_mut(&mut self, path: &str) -> Option<&mut TreeNode> {
        let route = self.routes.get(path)?;
        let mut node = &mut self.root;
        for &i in route {
            node = node.children.get_mut(i)?;
        }
        Some(node)
    }

    /// Expansion state of every directory, keyed by path.
    pub fn collect_expansion(&self) -> HashMap<String, bool> {
        let mut expansion = HashMap::new();
        Self::collect_expansion_of(&self.root, &mut expansion);
        expansion
    }

    fn collect_expansion_of(node: &TreeNode, expansion: &mut HashMap<String, bool>) {
        for child in node.children.iter().filter(|c| c.is_dir()) {
            expansion.insert(child.path.clone(), child.expanded);
            Self::collect_expansion_of(child, expansion);
        }
    }

    /// All entries of the current enumeration, in backend order.
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// The entry for a file path, visible or not.
    pub fn entry(&self, path: &str) -> Option<&FileEntry> {
        let idx = self.find_node(path)?.entry_ref?;
        self.entries.get(idx)
    }

    /// Mutable access for the component that loads content.
    pub fn entry_mut(&mut self, path: &str) -> Option<&mut FileEntry> {
        let idx = self.find_node(path)?.entry_ref?;
        self.entries.get_mut(idx)
    }

    /// Visible entries in flattened order.
    pub fn visible_entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.flat_items
            .iter()
            .filter_map(|item| self.entries.get(item.entry_ref))
    }

    /// Position of a file in the flattened view.
    pub fn find_index_by_path(&self, path: &str) -> Option<usize> {
        self.flat_items.iter().position(|item| item.path == path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
