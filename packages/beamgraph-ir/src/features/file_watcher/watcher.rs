//! File watcher bridge
//!
//! Cross-platform file system monitoring on the `notify` crate, with
//! debouncing and extension/fragment filtering. Events are delivered to a
//! [`FileEventHandler`]; the synchronizer is the core-side consumer.

use super::ports::{FileChangeEvent, FileChangeKind, FileEventHandler, WatchConfig};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

/// Watches a directory tree and forwards debounced change events
pub struct FileWatcher {
    config: WatchConfig,
    handler: Arc<Mutex<dyn FileEventHandler>>,
    watcher: Option<RecommendedWatcher>,
    event_tx: Option<Sender<Event>>,
    event_rx: Option<Receiver<Event>>,
    processor_thread: Option<thread::JoinHandle<()>>,
    running: Arc<Mutex<bool>>,
}

impl FileWatcher {
    /// Create a watcher; the root path must be an existing directory.
    pub fn new(
        config: WatchConfig,
        handler: Arc<Mutex<dyn FileEventHandler>>,
    ) -> Result<Self, String> {
        if !config.root_path.exists() {
            return Err(format!(
                "root path does not exist: {}",
                config.root_path.display()
            ));
        }
        if !config.root_path.is_dir() {
            return Err(format!(
                "root path is not a directory: {}",
                config.root_path.display()
            ));
        }

        let (event_tx, event_rx) = channel();
        Ok(Self {
            config,
            handler,
            watcher: None,
            event_tx: Some(event_tx),
            event_rx: Some(event_rx),
            processor_thread: None,
            running: Arc::new(Mutex::new(false)),
        })
    }

    /// Start watching; spawns the background processor thread.
    pub fn start(&mut self) -> Result<(), String> {
        if *self.running.lock() {
            return Err("watcher already running".to_string());
        }

        if self.event_rx.is_none() {
            let (tx, rx) = channel();
            self.event_tx = Some(tx);
            self.event_rx = Some(rx);
        }
        let event_tx = self
            .event_tx
            .as_ref()
            .ok_or("event sender not available")?
            .clone();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(error) => warn!(%error, "file watcher error"),
            },
            NotifyConfig::default(),
        )
        .map_err(|e| format!("failed to create watcher: {}", e))?;

        let mode = if self.config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(&self.config.root_path, mode)
            .map_err(|e| format!("failed to watch path: {}", e))?;
        self.watcher = Some(watcher);

        let event_rx = self.event_rx.take().ok_or("event receiver not available")?;
        let handler = self.handler.clone();
        let config = self.config.clone();
        let running = self.running.clone();
        *running.lock() = true;

        self.processor_thread = Some(thread::spawn(move || {
            Self::process_events(event_rx, handler, config, running);
        }));
        Ok(())
    }

    /// Stop watching and join the processor thread.
    pub fn stop(&mut self) -> Result<(), String> {
        if !*self.running.lock() {
            return Ok(());
        }
        *self.running.lock() = false;
        self.watcher = None;
        if let Some(thread) = self.processor_thread.take() {
            thread
                .join()
                .map_err(|_| "failed to join processor thread".to_string())?;
        }
        Ok(())
    }

    fn process_events(
        event_rx: Receiver<Event>,
        handler: Arc<Mutex<dyn FileEventHandler>>,
        config: WatchConfig,
        running: Arc<Mutex<bool>>,
    ) {
        // path → (latest event, first seen in this window)
        let mut pending: HashMap<PathBuf, (FileChangeEvent, Instant)> = HashMap::new();

        while *running.lock() {
            match event_rx.recv_timeout(Duration::from_millis(50)) {
                Ok(event) => {
                    for change in Self::convert_event(&event, &config) {
                        match pending.entry(change.file_path.clone()) {
                            Entry::Occupied(mut occupied) => occupied.get_mut().0 = change,
                            Entry::Vacant(vacant) => {
                                vacant.insert((change, Instant::now()));
                            }
                        }
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            }

            // Flush entries whose debounce window elapsed
            let now = Instant::now();
            let ready: Vec<PathBuf> = pending
                .iter()
                .filter(|(_, (_, first_seen))| now.duration_since(*first_seen) >= config.debounce)
                .map(|(path, _)| path.clone())
                .collect();
            for path in ready {
                if let Some((change, _)) = pending.remove(&path) {
                    handler.lock().handle_event(change);
                }
            }
        }

        // Drain whatever is left on shutdown
        for (_, (change, _)) in pending.drain() {
            handler.lock().handle_event(change);
        }
    }

    /// Convert a notify event into watched change events, applying the
    /// extension and ignore filters.
    fn convert_event(event: &Event, config: &WatchConfig) -> Vec<FileChangeEvent> {
        let kind = match event.kind {
            EventKind::Create(_) => FileChangeKind::Created,
            EventKind::Modify(_) => FileChangeKind::Modified,
            EventKind::Remove(_) => FileChangeKind::Deleted,
            _ => return Vec::new(),
        };
        event
            .paths
            .iter()
            .filter(|path| Self::should_process(path, config))
            .map(|path| FileChangeEvent::new(kind, path.clone()))
            .collect()
    }

    fn should_process(path: &Path, config: &WatchConfig) -> bool {
        let path_str = path.to_string_lossy();
        if config
            .ignore_fragments
            .iter()
            .any(|fragment| path_str.contains(fragment.as_str()))
        {
            return false;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some(extension) => config
                .extensions
                .iter()
                .any(|watched| watched == extension),
            None => false,
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_filter() {
        let config = WatchConfig::default();
        assert!(FileWatcher::should_process(Path::new("/p/lib/a.ex"), &config));
        assert!(FileWatcher::should_process(Path::new("/p/test/a.exs"), &config));
        assert!(!FileWatcher::should_process(Path::new("/p/README.md"), &config));
        assert!(!FileWatcher::should_process(Path::new("/p/bin/tool"), &config));
    }

    #[test]
    fn test_ignore_fragments() {
        let config = WatchConfig::default();
        assert!(!FileWatcher::should_process(
            Path::new("/p/_build/dev/lib/a.ex"),
            &config
        ));
        assert!(!FileWatcher::should_process(
            Path::new("/p/deps/pkg/lib/a.ex"),
            &config
        ));
    }

    #[test]
    fn test_missing_root_rejected() {
        struct Noop;
        impl FileEventHandler for Noop {
            fn handle_event(&mut self, _event: FileChangeEvent) {}
        }
        let config = WatchConfig {
            root_path: PathBuf::from("/definitely/not/here"),
            ..WatchConfig::default()
        };
        assert!(FileWatcher::new(config, Arc::new(Mutex::new(Noop))).is_err());
    }

    #[test]
    fn test_end_to_end_create_event() {
        use std::sync::mpsc::channel as std_channel;

        struct Collect(std::sync::mpsc::Sender<FileChangeEvent>);
        impl FileEventHandler for Collect {
            fn handle_event(&mut self, event: FileChangeEvent) {
                let _ = self.0.send(event);
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = std_channel();
        let config = WatchConfig {
            root_path: dir.path().to_path_buf(),
            debounce: Duration::from_millis(50),
            ..WatchConfig::default()
        };
        let mut watcher = FileWatcher::new(config, Arc::new(Mutex::new(Collect(tx)))).unwrap();
        watcher.start().unwrap();

        std::fs::write(dir.path().join("sample.ex"), "defmodule Sample do end").unwrap();

        // Creation (or the editor-dependent modify) must arrive within the
        // debounce window plus slack
        let event = rx.recv_timeout(Duration::from_secs(5)).expect("event arrives");
        assert!(event.file_path.ends_with("sample.ex"));
        watcher.stop().unwrap();
    }
}
