//! # jsontree
//!
//! A directory of JSON files, kept in sync with one in-memory tree.
//!
//! Every `.json` file under the root contributes its document at the key
//! chain named by its relative path: `users/alice.json` lands at
//! `tree["users"]["alice"]`. Changes made through [`DB`] are queued as
//! [`CommitIntent`]s and written on [`DB::push`]; changes made on disk by
//! anyone else are picked up by a [`ChangeListener`].

pub mod commit;
pub mod config;
mod db;
mod error;
pub mod listener;
pub mod loader;
pub mod local_disk;

pub use commit::{CommitIntent, CommitQueue, FlushError, FlushReport};
pub use config::{Config, WatchOptions};
pub use db::DB;
pub use error::Error;
pub use listener::{ChangeListener, FileEvent, Reconciliation, Reconciler, WatchEvent};
pub use local_disk::LocalDisk;

pub use jsontree_core::{path, KeyExpr, Path, PathError, TreeStore};
