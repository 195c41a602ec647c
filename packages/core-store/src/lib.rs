//! Core jsontree: paths and the in-memory tree
//!
//! This layer has no I/O:
//! - `Path`: a relative path, one component per directory level
//! - `KeyExpr`: addressing inside a single leaf document
//! - `TreeStore`: the nested mapping mirrored from disk, with merge-assign
//!
//! # Example
//!
//! ```rust
//! use jsontree_core::{path, TreeStore};
//! use serde_json::json;
//!
//! let mut tree = TreeStore::new();
//! tree.set(&path!("users/alice"), json!({ "age": 30 })).unwrap();
//! tree.set(&path!("users/bob"), json!({ "age": 25 })).unwrap();
//! assert_eq!(
//!     tree.get(&path!("users")),
//!     Some(&json!({ "alice": { "age": 30 }, "bob": { "age": 25 } }))
//! );
//! ```

mod error;
mod key_expr;
mod path;
pub mod tree;

pub use error::Error;
pub use key_expr::{Accessor, KeyExpr};
pub use path::{Path, PathError, DEFAULT_SEPARATOR};
pub use tree::TreeStore;
