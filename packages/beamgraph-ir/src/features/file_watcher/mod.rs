//! File watcher bridge
//!
//! notify-based monitoring producing [`FileChangeEvent`] streams for the
//! synchronizer.

pub mod ports;
pub mod watcher;

pub use ports::{FileChangeEvent, FileChangeKind, FileEventHandler, WatchConfig};
pub use watcher::FileWatcher;
