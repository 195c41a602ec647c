//! Key expressions: addressing inside a single leaf document.
//!
//! A key expression drills below the node a [`Path`](crate::Path) resolves to.
//! The vocabulary is closed: dotted keys, bracketed indices, and bracketed
//! quoted keys.
//!
//! ```text
//! name
//! .name
//! profile.address.city
//! tags[0]
//! matrix[1][2]
//! ["key.with.dots"]
//! ['single quoted'].inner
//! ```

use std::fmt;
use std::iter::Peekable;
use std::str::{Chars, FromStr};

use serde_json::Value as JsonValue;

use crate::Error;

/// One step of a key expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Accessor {
    /// A mapping key. Keys of the form `.name` or `["name"]`.
    Key(String),
    /// A sequence index, `[3]`. On a mapping this addresses the key `"3"`.
    Index(usize),
}

impl Accessor {
    fn child<'v>(&self, node: &'v JsonValue) -> Option<&'v JsonValue> {
        match (self, node) {
            (Accessor::Key(key), JsonValue::Object(map)) => map.get(key),
            (Accessor::Index(index), JsonValue::Object(map)) => map.get(&index.to_string()),
            (Accessor::Index(index), JsonValue::Array(arr)) => arr.get(*index),
            _ => None,
        }
    }

    fn child_mut<'v>(&self, node: &'v mut JsonValue) -> Option<&'v mut JsonValue> {
        match (self, node) {
            (Accessor::Key(key), JsonValue::Object(map)) => map.get_mut(key),
            (Accessor::Index(index), JsonValue::Object(map)) => map.get_mut(&index.to_string()),
            (Accessor::Index(index), JsonValue::Array(arr)) => arr.get_mut(*index),
            _ => None,
        }
    }
}

/// A parsed key expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyExpr {
    expression: String,
    accessors: Vec<Accessor>,
}

impl KeyExpr {
    pub fn parse(expression: &str) -> Result<Self, Error> {
        let invalid = |message: &str| Error::InvalidKey {
            expression: expression.to_string(),
            message: message.to_string(),
        };

        let mut accessors = Vec::new();
        let mut chars = expression.chars().peekable();

        // A leading key may omit its dot.
        if !matches!(chars.peek(), Some('.') | Some('[')) {
            let key = take_key(&mut chars);
            if !key.is_empty() {
                accessors.push(Accessor::Key(key));
            }
        }

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    let key = take_key(&mut chars);
                    if key.is_empty() {
                        return Err(invalid("empty key after '.'"));
                    }
                    accessors.push(Accessor::Key(key));
                }
                '[' => accessors.push(parse_bracket(&mut chars).map_err(invalid)?),
                other => {
                    return Err(invalid(&format!(
                        "unexpected '{}', expected '.' or '['",
                        other
                    )))
                }
            }
        }

        if accessors.is_empty() {
            return Err(invalid("expression is empty"));
        }

        Ok(KeyExpr {
            expression: expression.to_string(),
            accessors,
        })
    }

    pub fn accessors(&self) -> &[Accessor] {
        &self.accessors
    }

    /// Resolve the expression against `node`.
    pub fn get<'v>(&self, node: &'v JsonValue) -> Option<&'v JsonValue> {
        self.accessors
            .iter()
            .try_fold(node, |cursor, accessor| accessor.child(cursor))
    }

    /// Set the addressed child of `node` to `value`.
    ///
    /// Every accessor but the last must already resolve. The last one may add
    /// a new mapping key, replace an in-bounds sequence element, or append at
    /// exactly the sequence length.
    pub fn assign(&self, node: &mut JsonValue, value: JsonValue) -> Result<(), Error> {
        let (last, parent) = self.split_parent(node)?;

        match (last, parent) {
            (Accessor::Key(key), JsonValue::Object(map)) => {
                map.insert(key.clone(), value);
            }
            (Accessor::Index(index), JsonValue::Object(map)) => {
                map.insert(index.to_string(), value);
            }
            (Accessor::Index(index), JsonValue::Array(arr)) => {
                if *index < arr.len() {
                    arr[*index] = value;
                } else if *index == arr.len() {
                    arr.push(value);
                } else {
                    return Err(self.mutation(&format!(
                        "index {} is out of bounds for a sequence of length {}",
                        index,
                        arr.len()
                    )));
                }
            }
            (_, parent) => {
                return Err(self.mutation(&format!(
                    "cannot assign a child of a {} value",
                    kind_of(parent)
                )))
            }
        }

        Ok(())
    }

    /// Remove the addressed child of `node`, returning it if it was present.
    ///
    /// A missing final key is not an error; a missing parent is.
    pub fn remove(&self, node: &mut JsonValue) -> Result<Option<JsonValue>, Error> {
        let (last, parent) = self.split_parent(node)?;

        match (last, parent) {
            (Accessor::Key(key), JsonValue::Object(map)) => Ok(map.remove(key)),
            (Accessor::Index(index), JsonValue::Object(map)) => Ok(map.remove(&index.to_string())),
            (Accessor::Index(index), JsonValue::Array(arr)) => {
                if *index < arr.len() {
                    Ok(Some(arr.remove(*index)))
                } else {
                    Ok(None)
                }
            }
            (_, parent) => Err(self.mutation(&format!(
                "cannot remove a child of a {} value",
                kind_of(parent)
            ))),
        }
    }

    fn split_parent<'v>(
        &self,
        node: &'v mut JsonValue,
    ) -> Result<(&Accessor, &'v mut JsonValue), Error> {
        let (last, init) = self
            .accessors
            .split_last()
            .ok_or_else(|| self.mutation("expression is empty"))?;

        let parent = init
            .iter()
            .try_fold(node, |cursor, accessor| accessor.child_mut(cursor))
            .ok_or_else(|| self.mutation("parent node does not exist"))?;

        Ok((last, parent))
    }

    fn mutation(&self, message: &str) -> Error {
        Error::Mutation {
            path: self.expression.clone(),
            message: message.to_string(),
        }
    }
}

impl FromStr for KeyExpr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyExpr::parse(s)
    }
}

impl fmt::Display for KeyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

fn take_key(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut key = String::new();
    while let Some(&c) = chars.peek() {
        if c == '.' || c == '[' {
            break;
        }
        key.push(c);
        chars.next();
    }
    key
}

fn parse_bracket(chars: &mut Peekable<Chars<'_>>) -> Result<Accessor, &'static str> {
    if let Some(&quote) = chars.peek().filter(|c| **c == '"' || **c == '\'') {
        chars.next();
        let mut key = String::new();
        loop {
            match chars.next() {
                Some('\\') => key.push(chars.next().ok_or("unterminated quoted key")?),
                Some(c) if c == quote => break,
                Some(c) => key.push(c),
                None => return Err("unterminated quoted key"),
            }
        }
        if chars.next() != Some(']') {
            return Err("expected ']' after quoted key");
        }
        return Ok(Accessor::Key(key));
    }

    let mut digits = String::new();
    loop {
        match chars.next() {
            Some(']') => break,
            Some(c) if c.is_ascii_digit() => digits.push(c),
            Some(_) => return Err("brackets must hold an index or a quoted key"),
            None => return Err("unterminated '['"),
        }
    }
    digits
        .parse::<usize>()
        .map(Accessor::Index)
        .map_err(|_| "empty or oversized index")
}

pub(crate) fn kind_of(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "sequence",
        JsonValue::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod key_expr_tests {
    use super::*;
    use serde_json::json;

    fn keys(expression: &str) -> Vec<Accessor> {
        KeyExpr::parse(expression).unwrap().accessors().to_vec()
    }

    #[test]
    fn parses_vocabulary() {
        use Accessor::{Index, Key};

        assert_eq!(keys("name"), vec![Key("name".into())]);
        assert_eq!(keys(".name"), vec![Key("name".into())]);
        assert_eq!(
            keys("profile.address.city"),
            vec![
                Key("profile".into()),
                Key("address".into()),
                Key("city".into())
            ]
        );
        assert_eq!(keys("tags[0]"), vec![Key("tags".into()), Index(0)]);
        assert_eq!(keys("[1][2]"), vec![Index(1), Index(2)]);
        assert_eq!(keys(r#"["a.b"]"#), vec![Key("a.b".into())]);
        assert_eq!(
            keys(r#"['it\'s'].x"#),
            vec![Key("it's".into()), Key("x".into())]
        );
    }

    #[test]
    fn rejects_malformed() {
        for bad in [
            "",
            "a..b",
            "a.",
            "a[",
            "a[]",
            "a[x]",
            "a[0]b",
            r#"a["x"#,
            r#"a["x"b]"#,
            "a[-1]",
        ] {
            assert!(
                matches!(KeyExpr::parse(bad), Err(Error::InvalidKey { .. })),
                "{:?} should not parse",
                bad
            );
        }
    }

    #[test]
    fn get_drills_into_documents() {
        let doc = json!({
            "name": "alice",
            "tags": ["a", "b"],
            "profile": { "age": 30 },
            "odd.key": true,
        });

        let get = |e: &str| KeyExpr::parse(e).unwrap().get(&doc).cloned();
        assert_eq!(get("name"), Some(json!("alice")));
        assert_eq!(get("tags[1]"), Some(json!("b")));
        assert_eq!(get("profile.age"), Some(json!(30)));
        assert_eq!(get(r#"["odd.key"]"#), Some(json!(true)));
        assert_eq!(get("tags[5]"), None);
        assert_eq!(get("missing.deeper"), None);
        assert_eq!(get("name.length"), None);
    }

    #[test]
    fn assign_sets_existing_parents_only() {
        let mut doc = json!({ "profile": {}, "tags": ["a"] });

        KeyExpr::parse("profile.age")
            .unwrap()
            .assign(&mut doc, json!(31))
            .unwrap();
        KeyExpr::parse("tags[1]")
            .unwrap()
            .assign(&mut doc, json!("b"))
            .unwrap();
        KeyExpr::parse("tags[0]")
            .unwrap()
            .assign(&mut doc, json!("z"))
            .unwrap();
        assert_eq!(doc, json!({ "profile": { "age": 31 }, "tags": ["z", "b"] }));

        let before = doc.clone();
        assert!(matches!(
            KeyExpr::parse("missing.age")
                .unwrap()
                .assign(&mut doc, json!(1)),
            Err(Error::Mutation { .. })
        ));
        assert!(KeyExpr::parse("tags[9]")
            .unwrap()
            .assign(&mut doc, json!(1))
            .is_err());
        assert!(KeyExpr::parse("profile.age.x")
            .unwrap()
            .assign(&mut doc, json!(1))
            .is_err());
        assert_eq!(doc, before);
    }

    #[test]
    fn remove_tolerates_missing_leaf() {
        let mut doc = json!({ "a": { "b": 1 }, "list": [1, 2, 3] });

        let removed = KeyExpr::parse("a.b").unwrap().remove(&mut doc).unwrap();
        assert_eq!(removed, Some(json!(1)));
        assert_eq!(
            KeyExpr::parse("a.b").unwrap().remove(&mut doc).unwrap(),
            None
        );
        assert_eq!(
            KeyExpr::parse("list[0]").unwrap().remove(&mut doc).unwrap(),
            Some(json!(1))
        );
        assert_eq!(doc, json!({ "a": {}, "list": [2, 3] }));

        assert!(KeyExpr::parse("nope.b").unwrap().remove(&mut doc).is_err());
    }
}
