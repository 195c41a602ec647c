//! The queue of pending writes and deletes, and flushing it to disk.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::value::Value as JsonValue;

use jsontree_core::{Path, TreeStore};

use crate::local_disk::LocalDisk;
use crate::Error;

/// One pending filesystem operation.
#[derive(Clone, Debug, PartialEq)]
pub enum CommitIntent {
    /// Rewrite the leaf file at the path with the tree's current value there.
    FlushByPath(Path),
    /// Write the value to the leaf file at the path, creating parents.
    CreateFile(Path, JsonValue),
    /// Remove the leaf file at the path, and every JSON file beneath the
    /// same-named directory.
    DeleteFile(Path),
}

impl CommitIntent {
    pub fn path(&self) -> &Path {
        match self {
            CommitIntent::FlushByPath(path)
            | CommitIntent::CreateFile(path, _)
            | CommitIntent::DeleteFile(path) => path,
        }
    }

    /// Perform the intent. `Ok(false)` means its target was already gone.
    fn apply(&self, disk: &LocalDisk, tree: &TreeStore, prettify: bool) -> Result<bool, Error> {
        match self {
            CommitIntent::FlushByPath(path) => match tree.get(path) {
                Some(value) => {
                    disk.write_json(&disk.file_path(path), value, prettify)?;
                    Ok(true)
                }
                None => {
                    log::warn!("Nothing left to flush at {}", path);
                    Ok(false)
                }
            },
            CommitIntent::CreateFile(path, value) => {
                disk.write_json(&disk.file_path(path), value, prettify)?;
                Ok(true)
            }
            CommitIntent::DeleteFile(path) => {
                let dir_path = disk.dir_path(path);
                let file_path = disk.file_path(path);
                let is_dir = dir_path.is_dir();
                let is_file = !path.is_empty() && file_path.is_file();
                if !is_dir && !is_file {
                    log::warn!("Nothing to delete at {}", path);
                    return Ok(false);
                }

                let mut removed = 0;
                if is_dir {
                    removed += disk.remove_json_files(&dir_path)?;
                }
                if is_file {
                    disk.remove_file(&file_path)?;
                    removed += 1;
                }

                log::debug!("Deleted {} files for {}", removed, path);
                Ok(true)
            }
        }
    }
}

impl fmt::Display for CommitIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitIntent::FlushByPath(path) => write!(f, "flush {}", path),
            CommitIntent::CreateFile(path, _) => write!(f, "create {}", path),
            CommitIntent::DeleteFile(path) => write!(f, "delete {}", path),
        }
    }
}

/// The outcome of a successful flush, in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlushReport {
    pub applied: Vec<CommitIntent>,
    /// Intents whose target no longer existed: a flush of a node deleted
    /// since, or a delete of a path with neither file nor directory.
    pub missing: Vec<CommitIntent>,
}

/// A flush that stopped part way.
///
/// Everything in `applied` reached the disk and `missing` found nothing to
/// act on. `failed` may have partially applied, and `skipped` was never
/// attempted. None of them remain queued.
#[derive(thiserror::Error, Debug)]
#[error(
    "Flush aborted at '{failed}' after {} applied and with {} skipped: {error}",
    .applied.len(),
    .skipped.len()
)]
pub struct FlushError {
    pub applied: Vec<CommitIntent>,
    pub missing: Vec<CommitIntent>,
    pub failed: CommitIntent,
    pub skipped: Vec<CommitIntent>,
    #[source]
    pub error: Error,
}

/// An ordered list of pending intents.
#[derive(Clone, Debug, Default)]
pub struct CommitQueue {
    pending: Vec<CommitIntent>,
}

impl CommitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, intent: CommitIntent) {
        self.pending.push(intent);
    }

    pub fn pending(&self) -> &[CommitIntent] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Collapse structurally identical intents, keeping the first occurrence.
    ///
    /// Creates of the same path with different values are distinct.
    pub fn dedup(&mut self) {
        let mut unique: Vec<CommitIntent> = Vec::with_capacity(self.pending.len());
        for intent in self.pending.drain(..) {
            if !unique.contains(&intent) {
                unique.push(intent);
            }
        }
        self.pending = unique;
    }

    /// Apply every pending intent in FIFO order, then clear the queue.
    ///
    /// The first failure stops the batch. The queue is cleared whether or not
    /// every intent was applied.
    pub fn flush(
        &mut self,
        disk: &LocalDisk,
        tree: &TreeStore,
        prettify: bool,
    ) -> Result<FlushReport, FlushError> {
        self.dedup();

        let mut intents = std::mem::take(&mut self.pending).into_iter();
        let mut applied = Vec::new();
        let mut missing = Vec::new();

        while let Some(intent) = intents.next() {
            match intent.apply(disk, tree, prettify) {
                Ok(true) => applied.push(intent),
                Ok(false) => missing.push(intent),
                Err(error) => {
                    log::error!("Failed to {}: {}", intent, error);
                    return Err(FlushError {
                        applied,
                        missing,
                        failed: intent,
                        skipped: intents.collect(),
                        error,
                    });
                }
            }
        }

        if !applied.is_empty() {
            log::debug!("Flushed {} intents", applied.len());
        }
        Ok(FlushReport { applied, missing })
    }

    /// Whether the queue itself decides if a leaf document exists at `path`.
    ///
    /// `Some(true)` if the latest intent touching it creates the file,
    /// `Some(false)` if it deletes the file or an enclosing directory, `None`
    /// if nothing queued touches it.
    pub fn pending_document(&self, path: &Path) -> Option<bool> {
        self.pending.iter().rev().find_map(|intent| match intent {
            CommitIntent::CreateFile(target, _) if target == path => Some(true),
            CommitIntent::DeleteFile(target) if path.has_prefix(target) => Some(false),
            _ => None,
        })
    }

    /// The current value of every document queued for an in-place rewrite.
    pub fn snapshot(&self, tree: &TreeStore) -> BTreeMap<Path, JsonValue> {
        self.pending
            .iter()
            .filter_map(|intent| match intent {
                CommitIntent::FlushByPath(path) => {
                    tree.get(path).map(|value| (path.clone(), value.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Re-apply every queued change on top of a tree that was just refreshed
    /// from disk, so unpushed edits win over what the files still say.
    ///
    /// `edited` is the [`snapshot`](CommitQueue::snapshot) taken before the
    /// refresh.
    pub fn replay(&self, tree: &mut TreeStore, edited: &BTreeMap<Path, JsonValue>) {
        for intent in &self.pending {
            match intent {
                CommitIntent::CreateFile(path, value) => {
                    if let Err(error) = tree.set(path, value.clone()) {
                        log::warn!("Failed to replay {}: {}", intent, error);
                    }
                }
                CommitIntent::DeleteFile(path) => {
                    tree.delete(path);
                }
                CommitIntent::FlushByPath(path) => {
                    if let Some(value) = edited.get(path) {
                        tree.delete(path);
                        if let Err(error) = tree.set(path, value.clone()) {
                            log::warn!("Failed to replay {}: {}", intent, error);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod commit_queue_tests {
    use super::*;
    use jsontree_core::path;
    use serde_json::json;
    use std::fs;

    fn disk() -> (tempfile::TempDir, LocalDisk) {
        let dir = tempfile::tempdir().unwrap();
        let disk = LocalDisk::new(dir.path().to_path_buf()).unwrap();
        (dir, disk)
    }

    fn read(disk: &LocalDisk, p: &str) -> JsonValue {
        disk.read_json(&disk.file_path(&path!(p))).unwrap()
    }

    #[test]
    fn dedup_collapses_identical_intents() {
        let mut queue = CommitQueue::new();
        queue.enqueue(CommitIntent::FlushByPath(path!("a")));
        queue.enqueue(CommitIntent::CreateFile(path!("b"), json!(1)));
        queue.enqueue(CommitIntent::FlushByPath(path!("a")));
        queue.enqueue(CommitIntent::CreateFile(path!("b"), json!(1)));
        queue.enqueue(CommitIntent::CreateFile(path!("b"), json!(2)));
        queue.enqueue(CommitIntent::DeleteFile(path!("c")));
        queue.enqueue(CommitIntent::DeleteFile(path!("c")));

        queue.dedup();
        assert_eq!(
            queue.pending(),
            &[
                CommitIntent::FlushByPath(path!("a")),
                CommitIntent::CreateFile(path!("b"), json!(1)),
                CommitIntent::CreateFile(path!("b"), json!(2)),
                CommitIntent::DeleteFile(path!("c")),
            ]
        );
    }

    #[test]
    fn flushing_empty_queue_is_a_no_op() {
        let (_dir, disk) = disk();
        let mut queue = CommitQueue::new();
        let report = queue.flush(&disk, &TreeStore::new(), true).unwrap();
        assert_eq!(report, FlushReport::default());
        assert_eq!(fs::read_dir(disk.root()).unwrap().count(), 0);
    }

    #[test]
    fn identical_creates_apply_once() {
        let (_dir, disk) = disk();
        let mut queue = CommitQueue::new();
        for _ in 0..3 {
            queue.enqueue(CommitIntent::CreateFile(path!("users/carol"), json!({ "age": 40 })));
        }

        let report = queue.flush(&disk, &TreeStore::new(), false).unwrap();
        assert_eq!(report.applied.len(), 1);
        assert!(queue.is_empty());
        assert_eq!(
            fs::read_to_string(disk.root().join("users").join("carol.json")).unwrap(),
            r#"{"age":40}"#
        );
    }

    #[test]
    fn distinct_values_for_one_path_are_all_written() {
        let (_dir, disk) = disk();
        let mut queue = CommitQueue::new();
        queue.enqueue(CommitIntent::CreateFile(path!("a"), json!(1)));
        queue.enqueue(CommitIntent::CreateFile(path!("a"), json!(2)));

        let report = queue.flush(&disk, &TreeStore::new(), true).unwrap();
        assert_eq!(report.applied.len(), 2);
        assert_eq!(read(&disk, "a"), json!(2));
    }

    #[test]
    fn flush_by_path_writes_current_tree_value() {
        let (_dir, disk) = disk();
        let mut tree = TreeStore::new();
        tree.set(&path!("users/alice"), json!({ "age": 31 })).unwrap();

        let mut queue = CommitQueue::new();
        queue.enqueue(CommitIntent::FlushByPath(path!("users/alice")));
        queue.enqueue(CommitIntent::FlushByPath(path!("users/ghost")));
        let report = queue.flush(&disk, &tree, true).unwrap();

        assert_eq!(report.applied, vec![CommitIntent::FlushByPath(path!("users/alice"))]);
        assert_eq!(report.missing, vec![CommitIntent::FlushByPath(path!("users/ghost"))]);

        assert_eq!(read(&disk, "users/alice"), json!({ "age": 31 }));
        assert!(!disk.file_path(&path!("users/ghost")).exists());
    }

    #[test]
    fn delete_removes_file_or_directory_contents() {
        let (_dir, disk) = disk();
        let mut queue = CommitQueue::new();
        queue.enqueue(CommitIntent::CreateFile(path!("users/alice"), json!({})));
        queue.enqueue(CommitIntent::CreateFile(path!("users/team/bob"), json!({})));
        queue.enqueue(CommitIntent::CreateFile(path!("solo"), json!(1)));
        queue.flush(&disk, &TreeStore::new(), true).unwrap();

        queue.enqueue(CommitIntent::DeleteFile(path!("users")));
        queue.enqueue(CommitIntent::DeleteFile(path!("solo")));
        queue.enqueue(CommitIntent::DeleteFile(path!("never_existed")));
        let report = queue.flush(&disk, &TreeStore::new(), true).unwrap();

        assert_eq!(report.applied.len(), 2);
        assert_eq!(
            report.missing,
            vec![CommitIntent::DeleteFile(path!("never_existed"))]
        );
        assert!(disk.scan(disk.root()).unwrap().is_empty());
    }

    #[test]
    fn failure_reports_progress_and_clears_queue() {
        let (_dir, disk) = disk();
        // A plain file where a directory is needed makes the create fail.
        fs::write(disk.root().join("blocker"), "").unwrap();

        let mut queue = CommitQueue::new();
        queue.enqueue(CommitIntent::CreateFile(path!("first"), json!(1)));
        queue.enqueue(CommitIntent::CreateFile(path!("blocker/inner"), json!(2)));
        queue.enqueue(CommitIntent::CreateFile(path!("last"), json!(3)));

        let err = queue.flush(&disk, &TreeStore::new(), true).unwrap_err();
        assert_eq!(
            err.applied,
            vec![CommitIntent::CreateFile(path!("first"), json!(1))]
        );
        assert_eq!(
            err.failed,
            CommitIntent::CreateFile(path!("blocker/inner"), json!(2))
        );
        assert_eq!(
            err.skipped,
            vec![CommitIntent::CreateFile(path!("last"), json!(3))]
        );
        assert!(err.missing.is_empty());
        assert!(matches!(err.error, Error::Io { .. }));
        assert!(err.to_string().contains("create blocker/inner"));

        assert!(queue.is_empty());
        assert_eq!(read(&disk, "first"), json!(1));
        assert!(!disk.file_path(&path!("last")).exists());
    }

    #[test]
    fn pending_document_follows_latest_intent() {
        let mut queue = CommitQueue::new();
        assert_eq!(queue.pending_document(&path!("a/b")), None);

        queue.enqueue(CommitIntent::CreateFile(path!("a/b"), json!({})));
        assert_eq!(queue.pending_document(&path!("a/b")), Some(true));
        assert_eq!(queue.pending_document(&path!("a")), None);

        queue.enqueue(CommitIntent::DeleteFile(path!("a")));
        assert_eq!(queue.pending_document(&path!("a/b")), Some(false));

        queue.enqueue(CommitIntent::CreateFile(path!("a/b"), json!(1)));
        assert_eq!(queue.pending_document(&path!("a/b")), Some(true));
    }

    #[test]
    fn replay_reapplies_unpushed_changes() {
        let mut edited_tree = TreeStore::new();
        edited_tree.set(&path!("doc"), json!({ "n": 2, "kept": true })).unwrap();
        edited_tree.set(&path!("new"), json!({ "x": 1 })).unwrap();

        let mut queue = CommitQueue::new();
        queue.enqueue(CommitIntent::FlushByPath(path!("doc")));
        queue.enqueue(CommitIntent::CreateFile(path!("new"), json!({ "x": 1 })));
        queue.enqueue(CommitIntent::DeleteFile(path!("gone")));
        let edited = queue.snapshot(&edited_tree);
        assert_eq!(edited.len(), 1);

        // What the files on disk still say.
        let mut tree = TreeStore::new();
        tree.set(&path!("doc"), json!({ "n": 1, "stale": true })).unwrap();
        tree.set(&path!("gone"), json!(0)).unwrap();
        tree.set(&path!("other"), json!("disk")).unwrap();

        queue.replay(&mut tree, &edited);
        assert_eq!(
            tree.root(),
            &json!({
                "doc": { "n": 2, "kept": true },
                "new": { "x": 1 },
                "other": "disk",
            })
        );
    }
}
