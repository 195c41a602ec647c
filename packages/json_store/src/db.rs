//! The public store API.

use std::path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::value::Value as JsonValue;

use jsontree_core::{KeyExpr, Path, TreeStore};

use crate::commit::{CommitIntent, CommitQueue, FlushReport};
use crate::config::Config;
use crate::listener::{ChangeListener, Reconciler};
use crate::local_disk::LocalDisk;
use crate::{loader, Error};

/// Everything the lock guards: the tree and the intents not yet on disk.
#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) tree: TreeStore,
    pub(crate) commits: CommitQueue,
}

pub(crate) type SharedState = Arc<Mutex<State>>;

pub(crate) fn lock(state: &SharedState) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A directory of JSON files, mirrored as one in-memory tree.
///
/// Reads are served from memory. `set` and `delete` change the tree at once
/// and queue the matching file operations until [`DB::push`] (or at once,
/// under `instant_push`). Unless `unwatch` is set, changes other processes
/// make to the directory flow back into the tree.
///
/// ```rust
/// use jsontree::{Config, DB};
/// use serde_json::json;
///
/// let dir = tempfile::tempdir().unwrap();
/// let db = DB::open(Config::new(dir.path()).with_unwatch(true)).unwrap();
///
/// db.set("users/carol", None, json!({ "age": 40 })).unwrap();
/// db.push().unwrap();
///
/// assert!(dir.path().join("users").join("carol.json").exists());
/// assert_eq!(db.get("users/carol", Some("age")).unwrap(), Some(json!(40)));
/// ```
pub struct DB {
    config: Config,
    disk: LocalDisk,
    state: SharedState,
    live_ignore: Arc<AtomicBool>,
    listener: Option<ChangeListener>,
}

impl DB {
    /// Load the directory into memory and, unless `unwatch` is set, start
    /// watching it.
    pub fn open(config: Config) -> Result<DB, Error> {
        config.validate()?;

        let disk = LocalDisk::new(config.root.clone())?;
        let state = Arc::new(Mutex::new(State {
            tree: loader::fetch(&disk)?,
            commits: CommitQueue::new(),
        }));
        let live_ignore = Arc::new(AtomicBool::new(config.live_ignore));

        let listener = if config.unwatch {
            None
        } else {
            Some(ChangeListener::attach(
                Reconciler::new(disk.clone(), &config.watch)?,
                &config.watch,
                state.clone(),
                live_ignore.clone(),
            )?)
        };

        log::debug!("Opened store at {}", disk.root().display());
        Ok(DB {
            config,
            disk,
            state,
            live_ignore,
            listener,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The absolute, canonical store root.
    pub fn root(&self) -> &path::Path {
        self.disk.root()
    }

    pub fn is_watching(&self) -> bool {
        self.listener.is_some()
    }

    /// Stop applying changes seen on disk, or resume doing so.
    pub fn set_live_ignore(&self, ignore: bool) {
        self.live_ignore.store(ignore, Ordering::SeqCst);
    }

    /// Stop watching the directory. Dropping the store does the same.
    pub fn unwatch(&mut self) {
        if self.listener.take().is_some() {
            log::debug!("Stopped watching {}", self.disk.root().display());
        }
    }

    /// Rebuild the tree from disk, replacing it wholesale.
    ///
    /// Queued intents are kept.
    pub fn fetch(&self) -> Result<(), Error> {
        let mut state = lock(&self.state);
        state.tree = loader::fetch(&self.disk)?;
        Ok(())
    }

    /// Read an owned copy of the value at `rel_path`, optionally drilling
    /// further by `key`.
    ///
    /// `Ok(None)` means nothing is there; errors are reserved for malformed
    /// paths and key expressions.
    pub fn get(&self, rel_path: &str, key: Option<&str>) -> Result<Option<JsonValue>, Error> {
        self.inspect(rel_path, key, |value| value.cloned())
    }

    /// Run `f` against the live value at `rel_path` without copying it.
    ///
    /// The store is locked while `f` runs.
    pub fn inspect<R>(
        &self,
        rel_path: &str,
        key: Option<&str>,
        f: impl FnOnce(Option<&JsonValue>) -> R,
    ) -> Result<R, Error> {
        let path = self.parse_path(rel_path)?;
        let key = key.map(KeyExpr::parse).transpose()?;

        let state = lock(&self.state);
        let node = state.tree.get(&path);
        let node = match &key {
            Some(key) => node.and_then(|node| key.get(node)),
            None => node,
        };
        Ok(f(node))
    }

    /// An owned copy of the whole tree.
    pub fn tree(&self) -> JsonValue {
        lock(&self.state).tree.root().clone()
    }

    /// The intents queued for the next push.
    pub fn pending(&self) -> Vec<CommitIntent> {
        lock(&self.state).commits.pending().to_vec()
    }

    /// Write `value` at `rel_path`, or into the existing document there at
    /// `key`.
    ///
    /// Without a key the value is merge-assigned into the tree and the file is
    /// queued for creation. With a key the path must name a leaf document
    /// (a file on disk, or one queued for creation); it is edited in place
    /// and queued to be rewritten. A failure here leaves both
    /// the tree and the queue untouched.
    pub fn set(&self, rel_path: &str, key: Option<&str>, value: JsonValue) -> Result<(), Error> {
        let path = self.parse_file_path(rel_path)?;
        let key = key.map(KeyExpr::parse).transpose()?;

        let mut state = lock(&self.state);
        let intent = match key {
            Some(key) => {
                self.require_document(&state.commits, &path)?;
                let node = state.tree.get_mut(&path).ok_or_else(|| missing_node(&path))?;
                key.assign(node, value)?;
                CommitIntent::FlushByPath(path)
            }
            None => {
                state.tree.set(&path, value.clone())?;
                CommitIntent::CreateFile(path, value)
            }
        };
        state.commits.enqueue(intent);

        self.push_if_instant(&mut state)
    }

    /// Delete the file or directory at `rel_path`, or `key` within the
    /// existing document there.
    ///
    /// Deleting the root path removes every JSON file in the store.
    pub fn delete(&self, rel_path: &str, key: Option<&str>) -> Result<(), Error> {
        let path = self.parse_path(rel_path)?;
        let key = key.map(KeyExpr::parse).transpose()?;

        let mut state = lock(&self.state);
        let intent = match key {
            Some(key) => {
                if path.is_empty() {
                    return Err(root_not_a_file());
                }
                self.require_document(&state.commits, &path)?;
                let node = state.tree.get_mut(&path).ok_or_else(|| missing_node(&path))?;
                key.remove(node)?;
                CommitIntent::FlushByPath(path)
            }
            None => {
                if !state.tree.delete(&path) {
                    log::debug!("{} was not in the tree", path);
                }
                CommitIntent::DeleteFile(path)
            }
        };
        state.commits.enqueue(intent);

        self.push_if_instant(&mut state)
    }

    /// Apply every queued intent to disk.
    ///
    /// The queue is empty afterwards even on failure; the error says which
    /// intents made it.
    pub fn push(&self) -> Result<FlushReport, Error> {
        let mut state = lock(&self.state);
        self.flush(&mut state)
    }

    fn flush(&self, state: &mut State) -> Result<FlushReport, Error> {
        let State { tree, commits } = state;
        Ok(commits.flush(&self.disk, tree, self.config.prettify)?)
    }

    fn push_if_instant(&self, state: &mut State) -> Result<(), Error> {
        if self.config.instant_push {
            self.flush(state)?;
        }
        Ok(())
    }

    /// Keyed edits rewrite a whole leaf file, so one must exist at `path`,
    /// on disk or queued for creation, and not be queued for deletion.
    fn require_document(&self, commits: &CommitQueue, path: &Path) -> Result<(), Error> {
        let backed = commits
            .pending_document(path)
            .unwrap_or_else(|| self.disk.file_path(path).is_file());
        if backed {
            Ok(())
        } else {
            Err(Error::Core(jsontree_core::Error::Mutation {
                path: path.to_string(),
                message: "no document file at this path".to_string(),
            }))
        }
    }

    fn parse_path(&self, rel_path: &str) -> Result<Path, Error> {
        Ok(Path::parse_with_separator(rel_path, &self.config.path_sep)?)
    }

    fn parse_file_path(&self, rel_path: &str) -> Result<Path, Error> {
        let path = self.parse_path(rel_path)?;
        if path.is_empty() {
            return Err(root_not_a_file());
        }
        Ok(path)
    }
}

fn missing_node(path: &Path) -> Error {
    Error::Core(jsontree_core::Error::Mutation {
        path: path.to_string(),
        message: "node does not exist".to_string(),
    })
}

fn root_not_a_file() -> Error {
    Error::Core(jsontree_core::Error::Mutation {
        path: String::new(),
        message: "the root is a directory, not a file".to_string(),
    })
}
