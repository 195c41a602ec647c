//! Keeps the tree in step with changes made to the directory by others.
//!
//! Native watch notifications are translated into [`WatchEvent`]s, and each
//! event is reconciled in one of two ways: the fast path merges the single
//! changed file into the tree, the slow path rebuilds the whole tree from disk.
//! The slow path is taken whenever a previously known file is no longer
//! linked, since one removal can't say what else moved with it.

use std::path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use regex::Regex;

use jsontree_core::{Path, TreeStore};

use crate::config::WatchOptions;
use crate::commit::CommitQueue;
use crate::db::{lock, SharedState, State};
use crate::local_disk::{self, LocalDisk};
use crate::{loader, Error};

/// A notification from the watch service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchEvent {
    /// The watch has been established. Carries no change.
    Ready,
    File(FileEvent),
}

/// A change to one path under the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEvent {
    pub path: path::PathBuf,
    /// Whether the file was known before this event; false marks a creation.
    pub existed: bool,
    /// The current hard-link count, zero once the file is gone.
    pub links: u64,
}

impl FileEvent {
    pub fn created(path: path::PathBuf) -> Self {
        let links = local_disk::link_count(&path);
        FileEvent {
            path,
            existed: false,
            links,
        }
    }

    pub fn changed(path: path::PathBuf) -> Self {
        let links = local_disk::link_count(&path);
        FileEvent {
            path,
            existed: true,
            links,
        }
    }

    pub fn removed(path: path::PathBuf) -> Self {
        FileEvent {
            path,
            existed: true,
            links: 0,
        }
    }

    /// The file no longer exists anywhere.
    pub fn is_unlinked(&self) -> bool {
        self.links == 0
    }
}

/// What to do with the tree in response to an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reconciliation {
    Skip,
    /// A new file: merge its contents in.
    Merge(Path),
    /// A known file that still exists: drop the old value, merge the new one.
    Replace(Path),
    /// A known file that is gone: drop the old value and rebuild from disk.
    Resync(Path),
}

/// Decides and applies reconciliations for one store.
#[derive(Debug)]
pub struct Reconciler {
    disk: LocalDisk,
    ignore_dot_files: bool,
    ignore_directories: Option<Regex>,
}

impl Reconciler {
    pub fn new(disk: LocalDisk, options: &WatchOptions) -> Result<Self, Error> {
        let ignore_directories = options
            .ignore_directory_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::Config {
                message: format!("ignoreDirectoryPattern: {}", e),
            })?;

        Ok(Reconciler {
            disk,
            ignore_dot_files: options.ignore_dot_files,
            ignore_directories,
        })
    }

    pub fn reconcile(&self, event: &WatchEvent, live_ignore: bool) -> Reconciliation {
        let event = match event {
            WatchEvent::Ready => {
                log::debug!("Watching {}", self.disk.root().display());
                return Reconciliation::Skip;
            }
            WatchEvent::File(_) if live_ignore => return Reconciliation::Skip,
            WatchEvent::File(event) => event,
        };

        let Some(path) = self.disk.relative_path(&event.path) else {
            return Reconciliation::Skip;
        };

        if self.is_ignored(&path) {
            return Reconciliation::Skip;
        }

        if !event.existed {
            Reconciliation::Merge(path)
        } else if event.is_unlinked() {
            Reconciliation::Resync(path)
        } else {
            Reconciliation::Replace(path)
        }
    }

    fn is_ignored(&self, path: &Path) -> bool {
        if self.ignore_dot_files && path.iter().any(|c| c.starts_with('.')) {
            return true;
        }

        match (&self.ignore_directories, path.parent()) {
            (Some(pattern), Some(parent)) => parent.iter().any(|dir| pattern.is_match(dir)),
            _ => false,
        }
    }

    /// Bring `tree` in line with the disk, then re-apply the `pending`
    /// intents on top so unpushed edits survive.
    pub fn apply(
        &self,
        tree: &mut TreeStore,
        pending: &CommitQueue,
        reconciliation: &Reconciliation,
    ) {
        if *reconciliation == Reconciliation::Skip {
            return;
        }
        let edited = pending.snapshot(tree);

        match reconciliation {
            Reconciliation::Skip => {}
            Reconciliation::Merge(path) => self.merge_document(tree, path),
            Reconciliation::Replace(path) => {
                tree.delete(path);
                self.merge_document(tree, path);
            }
            Reconciliation::Resync(path) => {
                tree.delete(path);
                match loader::fetch(&self.disk) {
                    Ok(fresh) => *tree = fresh,
                    Err(error) => {
                        log::error!("Failed to resync after {} was removed: {}", path, error)
                    }
                }
            }
        }

        pending.replay(tree, &edited);
    }

    /// Merge the file at `path`, then the files of its same-named directory,
    /// in the order a full load would apply them.
    fn merge_document(&self, tree: &mut TreeStore, path: &Path) {
        self.merge_file(tree, path);

        let dir_path = self.disk.dir_path(path);
        if !dir_path.is_dir() {
            return;
        }
        match self.disk.scan(&dir_path) {
            Ok(files) => {
                for nested in files.keys() {
                    self.merge_file(tree, nested);
                }
            }
            Err(error) => log::warn!("Failed to rescan {}: {}", dir_path.display(), error),
        }
    }

    fn merge_file(&self, tree: &mut TreeStore, path: &Path) {
        let file_path = self.disk.file_path(path);
        match self.disk.read_json(&file_path) {
            Ok(value) => {
                if let Err(error) = tree.set(path, value) {
                    log::warn!("Ignoring {}: {}", file_path.display(), error);
                }
            }
            Err(error) => log::warn!("Ignoring {}: {}", file_path.display(), error),
        }
    }
}

/// Translate a native notification into zero or more watch events.
///
/// Renames become a removal of the old path and a creation of the new one.
pub fn translate(event: &notify::Event) -> Vec<WatchEvent> {
    let paths = event.paths.iter().cloned();
    let events: Vec<FileEvent> = match &event.kind {
        EventKind::Create(_) => paths.map(FileEvent::created).collect(),
        EventKind::Remove(_) => paths.map(FileEvent::removed).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.map(FileEvent::removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.map(FileEvent::created).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => paths
            .enumerate()
            .map(|(i, p)| {
                if i == 0 {
                    FileEvent::removed(p)
                } else {
                    FileEvent::created(p)
                }
            })
            .collect(),
        EventKind::Modify(_) => paths.map(FileEvent::changed).collect(),
        _ => Vec::new(),
    };

    events.into_iter().map(WatchEvent::File).collect()
}

#[derive(Clone)]
struct EventSink {
    reconciler: Arc<Reconciler>,
    state: SharedState,
    live_ignore: Arc<AtomicBool>,
}

impl EventSink {
    fn dispatch(&self, event: &WatchEvent) {
        let reconciliation = self
            .reconciler
            .reconcile(event, self.live_ignore.load(Ordering::SeqCst));
        log::debug!("{:?} -> {:?}", event, reconciliation);

        if reconciliation != Reconciliation::Skip {
            let mut state = lock(&self.state);
            let State { tree, commits } = &mut *state;
            self.reconciler.apply(tree, commits, &reconciliation);
        }
    }
}

/// A live subscription to changes under the store root.
///
/// Events stop being delivered when this is dropped.
pub struct ChangeListener {
    _watcher: Box<dyn Watcher + Send>,
}

impl ChangeListener {
    pub(crate) fn attach(
        reconciler: Reconciler,
        options: &WatchOptions,
        state: SharedState,
        live_ignore: Arc<AtomicBool>,
    ) -> Result<Self, Error> {
        let root = reconciler.disk.root().to_path_buf();
        let sink = EventSink {
            reconciler: Arc::new(reconciler),
            state,
            live_ignore,
        };

        let handler_sink = sink.clone();
        let handler_root = root.clone();
        let handler = move |result: notify::Result<notify::Event>| match result {
            Ok(event) => {
                for watch_event in translate(&event) {
                    handler_sink.dispatch(&watch_event);
                }
            }
            Err(error) => log::error!("Watch error under {}: {}", handler_root.display(), error),
        };

        let mut watcher: Box<dyn Watcher + Send> = match options.poll_interval() {
            Some(interval) => Box::new(PollWatcher::new(
                handler,
                notify::Config::default().with_poll_interval(interval),
            )?),
            None => Box::new(RecommendedWatcher::new(
                handler,
                notify::Config::default(),
            )?),
        };
        watcher.watch(&root, RecursiveMode::Recursive)?;

        sink.dispatch(&WatchEvent::Ready);

        Ok(ChangeListener { _watcher: watcher })
    }
}
