//! Store configuration.

use std::time::Duration;
use std::{fs, path};

use serde::{Deserialize, Serialize};

use crate::Error;
use jsontree_core::DEFAULT_SEPARATOR;

/// Options passed through to the watch service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchOptions {
    /// Poll the directory at this interval instead of using native
    /// notifications.
    pub poll_interval_ms: Option<u64>,
    /// Ignore changes to any path with a component starting with `.`.
    pub ignore_dot_files: bool,
    /// Ignore changes beneath directories whose name matches this regex.
    pub ignore_directory_pattern: Option<String>,
}

impl WatchOptions {
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }
}

/// Configuration for a [`DB`](crate::DB).
///
/// Deserializes from the same camelCase keys the constructor options use:
///
/// ```rust
/// use jsontree::Config;
///
/// let config: Config = serde_json::from_str(r#"{
///     "root": "/var/lib/app/data",
///     "instantPush": true,
///     "watch": { "ignoreDotFiles": true }
/// }"#).unwrap();
/// assert!(config.instant_push);
/// assert!(config.prettify);
/// assert_eq!(config.path_sep, "/");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// The directory holding the store. Resolved to an absolute path on open.
    pub root: path::PathBuf,
    /// Flush after every `set` and `delete`.
    #[serde(default)]
    pub instant_push: bool,
    /// Observe changes on disk without applying them to the tree.
    #[serde(default)]
    pub live_ignore: bool,
    /// Separator for the relative paths callers pass in.
    #[serde(default = "default_path_sep")]
    pub path_sep: String,
    /// Don't watch the directory at all.
    #[serde(default)]
    pub unwatch: bool,
    #[serde(default)]
    pub watch: WatchOptions,
    /// Write files with two-space indentation.
    #[serde(default = "default_prettify")]
    pub prettify: bool,
}

fn default_path_sep() -> String {
    DEFAULT_SEPARATOR.to_string()
}

fn default_prettify() -> bool {
    true
}

impl Config {
    pub fn new(root: impl Into<path::PathBuf>) -> Self {
        Config {
            root: root.into(),
            instant_push: false,
            live_ignore: false,
            path_sep: default_path_sep(),
            unwatch: false,
            watch: WatchOptions::default(),
            prettify: default_prettify(),
        }
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(file_path: &path::Path) -> Result<Config, Error> {
        let contents = fs::read_to_string(file_path).map_err(|e| Error::io(file_path, e))?;
        serde_json::from_str(&contents).map_err(|error| Error::Parse {
            path: file_path.to_path_buf(),
            error,
        })
    }

    pub fn with_instant_push(mut self, instant_push: bool) -> Self {
        self.instant_push = instant_push;
        self
    }

    pub fn with_live_ignore(mut self, live_ignore: bool) -> Self {
        self.live_ignore = live_ignore;
        self
    }

    pub fn with_path_sep(mut self, path_sep: impl Into<String>) -> Self {
        self.path_sep = path_sep.into();
        self
    }

    pub fn with_unwatch(mut self, unwatch: bool) -> Self {
        self.unwatch = unwatch;
        self
    }

    pub fn with_watch(mut self, watch: WatchOptions) -> Self {
        self.watch = watch;
        self
    }

    pub fn with_prettify(mut self, prettify: bool) -> Self {
        self.prettify = prettify;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.path_sep.is_empty() {
            return Err(Error::Config {
                message: "pathSep must not be empty".to_string(),
            });
        }

        if self.watch.poll_interval_ms == Some(0) {
            return Err(Error::Config {
                message: "watch.pollIntervalMs must be positive".to_string(),
            });
        }

        Ok(())
    }
}
