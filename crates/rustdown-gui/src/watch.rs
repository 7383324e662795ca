//! Native change notifications for the active document.
//!
//! The parent directory is watched rather than the file, since atomic saves
//! replace the file's inode. Events are hints only; the periodic check still
//! runs.

use std::{
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver},
};

use eframe::egui;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

pub struct FileWatcher {
    watcher: Option<RecommendedWatcher>,
    target: Option<PathBuf>,
    ctx: egui::Context,
    events: Receiver<PathBuf>,
    sender: mpsc::Sender<PathBuf>,
}

impl FileWatcher {
    pub fn new(ctx: egui::Context) -> Self {
        let (sender, events) = mpsc::channel();
        Self {
            watcher: None,
            target: None,
            ctx,
            events,
            sender,
        }
    }

    /// Watches `path`, replacing the previous target.
    pub fn follow(&mut self, path: Option<&Path>) {
        if self.target.as_deref() == path {
            return;
        }
        self.watcher = None;
        self.target = path.map(Path::to_path_buf);
        let Some(path) = path else {
            return;
        };
        match self.start(path) {
            Ok(watcher) => {
                debug!(path = %path.display(), "watching");
                self.watcher = Some(watcher);
            }
            Err(err) => warn!(path = %path.display(), "file watch unavailable: {err}"),
        }
    }

    /// Paths reported changed since the last call, deduplicated.
    pub fn changed(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.events.try_iter().collect();
        paths.sort();
        paths.dedup();
        paths
    }

    fn start(&self, path: &Path) -> notify::Result<RecommendedWatcher> {
        let target = path.to_path_buf();
        let sender = self.sender.clone();
        let ctx = self.ctx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else {
                return;
            };
            if matches!(event.kind, EventKind::Access(_)) {
                return;
            }
            if event.paths.iter().any(|p| p == &target) && sender.send(target.clone()).is_ok() {
                ctx.request_repaint();
            }
        })?;
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }
}
