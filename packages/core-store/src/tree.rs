//! The in-memory tree and the key-path operations over it.
//!
//! The tree is a `serde_json::Value` whose root is always a mapping. Every
//! directory level is a nested mapping; every leaf file contributes its parsed
//! document at the key chain equal to its relative path.

use serde_json::map::Entry;
use serde_json::{Map, Value as JsonValue};

use crate::key_expr::kind_of;
use crate::{Error, Path};

/// Resolve `keys` against `tree`.
///
/// Sequences are traversed by numeric keys, so a path can reach into a leaf
/// document that holds an array.
pub fn lookup<'t>(tree: &'t JsonValue, keys: &[String]) -> Option<&'t JsonValue> {
    keys.iter().try_fold(tree, |cursor, key| match cursor {
        JsonValue::Object(map) => map.get(key),
        JsonValue::Array(arr) => key.parse::<usize>().ok().and_then(|i| arr.get(i)),
        _ => None,
    })
}

pub fn lookup_mut<'t>(tree: &'t mut JsonValue, keys: &[String]) -> Option<&'t mut JsonValue> {
    keys.iter().try_fold(tree, |cursor, key| match cursor {
        JsonValue::Object(map) => map.get_mut(key),
        JsonValue::Array(arr) => key.parse::<usize>().ok().and_then(|i| arr.get_mut(i)),
        _ => None,
    })
}

/// Merge-assign `value` at `keys`.
///
/// Missing intermediate mappings are created. When the target already holds a
/// mapping and `value` is a mapping too, the two are merged recursively.
/// Anything else overwrites, including an intermediate that held a
/// non-mapping value.
pub fn assign(tree: &mut JsonValue, keys: &[String], value: JsonValue) {
    let wrapped = keys.iter().rev().fold(value, |inner, key| {
        let mut map = Map::new();
        map.insert(key.clone(), inner);
        JsonValue::Object(map)
    });
    merge(tree, wrapped);
}

/// Recursively merge `incoming` into `target`.
///
/// Keys present in `incoming` overwrite or merge into `target`; keys absent
/// from it are preserved.
pub fn merge(target: &mut JsonValue, incoming: JsonValue) {
    match (target, incoming) {
        (JsonValue::Object(existing), JsonValue::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.entry(key) {
                    Entry::Occupied(mut slot) => merge(slot.get_mut(), value),
                    Entry::Vacant(slot) => {
                        slot.insert(value);
                    }
                }
            }
        }
        (target, incoming) => {
            if target.is_object() != incoming.is_object() && !target.is_null() {
                log::warn!(
                    "Overwriting a {} value with a {} value",
                    kind_of(target),
                    kind_of(&incoming)
                );
            }
            *target = incoming;
        }
    }
}

/// Remove the value at `keys`.
///
/// Returns false, changing nothing, if any intermediate key is absent or the
/// final key isn't present.
pub fn remove(tree: &mut JsonValue, keys: &[String]) -> bool {
    let Some((last, init)) = keys.split_last() else {
        return false;
    };

    match lookup_mut(tree, init) {
        Some(JsonValue::Object(map)) => map.remove(last).is_some(),
        Some(JsonValue::Array(arr)) => match last.parse::<usize>() {
            Ok(index) if index < arr.len() => {
                arr.remove(index);
                true
            }
            _ => false,
        },
        _ => false,
    }
}

/// The in-memory mirror of a store's directory hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeStore {
    root: JsonValue,
}

impl TreeStore {
    /// Create an empty tree.
    pub fn new() -> Self {
        TreeStore {
            root: JsonValue::Object(Map::new()),
        }
    }

    /// Get a reference to the root mapping.
    pub fn root(&self) -> &JsonValue {
        &self.root
    }

    pub fn into_inner(self) -> JsonValue {
        self.root
    }

    pub fn get(&self, path: &Path) -> Option<&JsonValue> {
        lookup(&self.root, &path.components)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut JsonValue> {
        lookup_mut(&mut self.root, &path.components)
    }

    /// Merge-assign `value` at `path`.
    ///
    /// Only a mapping can be assigned at the root.
    pub fn set(&mut self, path: &Path, value: JsonValue) -> Result<(), Error> {
        if path.is_empty() && !value.is_object() {
            return Err(Error::Mutation {
                path: path.to_string(),
                message: format!("the root must be a mapping, not a {}", kind_of(&value)),
            });
        }

        assign(&mut self.root, &path.components, value);
        Ok(())
    }

    /// Remove the subtree at `path`. Deleting the root empties the tree.
    pub fn delete(&mut self, path: &Path) -> bool {
        if path.is_empty() {
            self.root = JsonValue::Object(Map::new());
            return true;
        }

        remove(&mut self.root, &path.components)
    }
}

impl Default for TreeStore {
    fn default() -> Self {
        Self::new()
    }
}
