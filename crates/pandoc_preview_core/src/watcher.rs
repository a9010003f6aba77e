//! File watching over the source document and its satellite files.
//!
//! The watched set holds the source path plus every satellite referenced by
//! the latest pipeline run. Parent directories are watched non-recursively
//! and events are filtered down to the watched files, so editors that replace
//! files via write-rename still trigger.

use crate::error::PipelineError;
use notify::{Event as NotifyEvent, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Events emitted by the watcher.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A watched file's content or metadata changed.
    Changed(PathBuf),
    /// The backend reported an error.
    Error(String),
}

/// Watches a mutable set of file paths and emits a change event per path.
///
/// The backend may coalesce rapid successive changes into a single event;
/// the pipeline's latest-wins run handling absorbs that.
pub struct DocumentWatcher {
    backend: RecommendedWatcher,
    /// Watched files, shared with the backend callback for event filtering.
    files: Arc<Mutex<HashSet<PathBuf>>>,
    /// Watch refcount per parent directory.
    dir_refs: HashMap<PathBuf, usize>,
}

impl DocumentWatcher {
    /// Create an idle watcher and the receiver its events arrive on.
    pub fn new() -> Result<(Self, mpsc::UnboundedReceiver<WatchEvent>), notify::Error> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let files: Arc<Mutex<HashSet<PathBuf>>> = Arc::default();
        let filter = Arc::clone(&files);

        let backend = RecommendedWatcher::new(
            move |res: Result<NotifyEvent, notify::Error>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify()
                        || event.kind.is_create()
                        || event.kind.is_remove())
                    {
                        return;
                    }
                    let Ok(watched) = filter.lock() else {
                        return;
                    };
                    for path in &event.paths {
                        if watched.contains(path) {
                            let _ = event_tx.send(WatchEvent::Changed(path.clone()));
                        }
                    }
                }
                Err(e) => {
                    let _ = event_tx.send(WatchEvent::Error(e.to_string()));
                }
            },
            notify::Config::default(),
        )?;

        Ok((
            Self {
                backend,
                files,
                dir_refs: HashMap::new(),
            },
            event_rx,
        ))
    }

    /// Add `path` to the watched set.
    ///
    /// Fails with [`PipelineError::WatchFailure`] if the path cannot be
    /// resolved or the backend rejects its directory; the caller reports the
    /// failure as a warning and carries on.
    pub fn watch(&mut self, path: &Path) -> Result<(), PipelineError> {
        let path = canonical(path)?;
        if self.contains(&path) {
            return Ok(());
        }
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| PipelineError::WatchFailure {
                path: path.clone(),
                reason: "path has no parent directory".to_string(),
            })?;

        if !self.dir_refs.contains_key(&dir) {
            self.backend
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(|e| PipelineError::WatchFailure {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
        }
        *self.dir_refs.entry(dir).or_insert(0) += 1;

        if let Ok(mut files) = self.files.lock() {
            files.insert(path.clone());
        }
        tracing::debug!(path = %path.display(), "watching");
        Ok(())
    }

    /// Remove `path` (as stored, i.e. canonical) from the watched set.
    fn unwatch(&mut self, path: &Path) {
        let removed = self
            .files
            .lock()
            .map(|mut files| files.remove(path))
            .unwrap_or(false);
        if !removed {
            return;
        }
        if let Some(dir) = path.parent() {
            if let Some(refs) = self.dir_refs.get_mut(dir) {
                *refs -= 1;
                if *refs == 0 {
                    self.dir_refs.remove(dir);
                    let _ = self.backend.unwatch(dir);
                }
            }
        }
        tracing::debug!(path = %path.display(), "no longer watching");
    }

    /// Clear the watched set entirely; used when a new document replaces the
    /// current one.
    pub fn unwatch_all(&mut self) {
        if let Ok(mut files) = self.files.lock() {
            files.clear();
        }
        for dir in std::mem::take(&mut self.dir_refs).into_keys() {
            let _ = self.backend.unwatch(&dir);
        }
    }

    /// Diff-apply a recomputed desired set: paths no longer referenced are
    /// dropped, new ones are added. Per-path watch failures are returned as
    /// warnings; the rest of the set is still applied.
    pub fn apply(&mut self, desired: &HashSet<PathBuf>) -> Vec<PipelineError> {
        let mut warnings = Vec::new();

        let mut wanted = HashSet::with_capacity(desired.len());
        for path in desired {
            match canonical(path) {
                Ok(path) => {
                    wanted.insert(path);
                }
                Err(e) => warnings.push(e),
            }
        }

        let stale: Vec<PathBuf> = self
            .watched()
            .into_iter()
            .filter(|p| !wanted.contains(p))
            .collect();
        for path in stale {
            self.unwatch(&path);
        }

        for path in wanted {
            if let Err(e) = self.watch(&path) {
                warnings.push(e);
            }
        }

        warnings
    }

    /// Snapshot of the watched set.
    pub fn watched(&self) -> HashSet<PathBuf> {
        self.files
            .lock()
            .map(|files| files.clone())
            .unwrap_or_default()
    }

    fn contains(&self, path: &Path) -> bool {
        self.files
            .lock()
            .map(|files| files.contains(path))
            .unwrap_or(false)
    }
}

fn canonical(path: &Path) -> Result<PathBuf, PipelineError> {
    path.canonicalize().map_err(|e| PipelineError::WatchFailure {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
