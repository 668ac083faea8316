pub mod backend;
pub mod entry;
pub mod guard;
pub mod listing;
pub mod tree;
pub mod watcher;
