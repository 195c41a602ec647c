//! Relative paths addressing nodes of the tree.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The separator used when a caller does not configure one.
pub const DEFAULT_SEPARATOR: &str = "/";

/// Errors related to path parsing and validation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// A path component is empty or would escape its parent directory.
    #[error("invalid path component '{component}' at position {position}: {message}")]
    InvalidComponent {
        component: String,
        position: usize,
        message: String,
    },
    /// The path string is invalid.
    #[error("invalid path: {message}")]
    InvalidPath { message: String },
}

/// A path to a file or subtree, relative to the store root.
///
/// Each component names one directory level, the final component names a JSON
/// file without its extension (`users/alice` designates `users/alice.json`).
/// Components are never empty, and never `.`, `..`, or anything containing a
/// filesystem separator, so a path can't address anything outside the root.
///
/// Two paths are equal iff their component sequences are equal.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Path {
    pub components: Vec<String>,
}

impl Path {
    /// The root of the tree (no components).
    pub fn root() -> Self {
        Path {
            components: Vec::new(),
        }
    }

    /// Parse a `/`-separated path string.
    ///
    /// ```rust
    /// use jsontree_core::Path;
    ///
    /// let path = Path::parse("users/alice").unwrap();
    /// assert_eq!(path.len(), 2);
    /// assert!(Path::parse("users//alice").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, PathError> {
        Self::parse_with_separator(s, DEFAULT_SEPARATOR)
    }

    /// Parse a path string split on `separator`.
    ///
    /// The empty string is the root path. Any other input must split into
    /// non-empty components, so leading, trailing, and doubled separators are
    /// rejected.
    pub fn parse_with_separator(s: &str, separator: &str) -> Result<Self, PathError> {
        if separator.is_empty() {
            return Err(PathError::InvalidPath {
                message: "separator must not be empty".to_string(),
            });
        }

        if s.is_empty() {
            return Ok(Path::root());
        }

        let components: Vec<String> = s.split(separator).map(str::to_string).collect();
        Self::try_from_components(components)
    }

    /// Try to create a path from components, validating each.
    pub fn try_from_components(components: Vec<String>) -> Result<Self, PathError> {
        for (i, component) in components.iter().enumerate() {
            Self::validate_component(component, i)?;
        }
        Ok(Path { components })
    }

    fn validate_component(component: &str, position: usize) -> Result<(), PathError> {
        let message = if component.is_empty() {
            "empty component"
        } else if component == "." || component == ".." {
            "relative directory components are not allowed"
        } else if component.contains(['/', '\\', '\0']) {
            "component contains a filesystem separator or NUL"
        } else {
            return Ok(());
        };

        Err(PathError::InvalidComponent {
            component: component.to_string(),
            position,
            message: message.to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.components.iter()
    }

    /// The path with its final component removed, or `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        self.components.split_last().map(|(_, init)| Path {
            components: init.to_vec(),
        })
    }

    /// The final component, or `None` for the root.
    pub fn last(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    #[must_use]
    pub fn join(&self, other: &Path) -> Path {
        let mut components = self.components.clone();
        components.extend(other.components.iter().cloned());
        Path { components }
    }

    pub fn has_prefix(&self, prefix: &Path) -> bool {
        prefix.components.len() <= self.components.len()
            && prefix.components == self.components[..prefix.components.len()]
    }

    /// Render with a caller-chosen separator.
    pub fn to_string_with_separator(&self, separator: &str) -> String {
        self.components.join(separator)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join(DEFAULT_SEPARATOR))
    }
}

impl std::ops::Index<usize> for Path {
    type Output = String;

    fn index(&self, i: usize) -> &Self::Output {
        &self.components[i]
    }
}

impl Serialize for Path {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D>(deserializer: D) -> Result<Path, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        Path::parse(&s).map_err(D::Error::custom)
    }
}

/// Macro for creating `/`-separated paths from literals.
///
/// ```rust
/// use jsontree_core::path;
///
/// let p = path!("users/alice");
/// assert_eq!(p.len(), 2);
/// ```
#[macro_export]
macro_rules! path {
    ($s:expr) => {
        $crate::Path::parse($s).expect("invalid path literal")
    };
}
