//! Command execution against an open store.

use std::thread;
use std::time::Duration;

use clap::Subcommand;
use serde_json::Value as JsonValue;

use jsontree::DB;

const DEFAULT_WATCH_INTERVAL_MS: u64 = 500;

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Store(#[from] jsontree::Error),

    #[error("Value is not valid JSON ({input}): {error}")]
    InvalidJson {
        input: String,
        #[source]
        error: serde_json::Error,
    },

    #[error("Nothing at {path}")]
    NotFound { path: String },

    #[error("Either --root or --config is required")]
    MissingRoot,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the value at a path
    Get {
        path: String,
        /// Drill into the document, e.g. `profile.tags[0]`
        #[arg(long)]
        key: Option<String>,
    },
    /// Write a JSON value at a path and push it to disk
    Set {
        path: String,
        /// JSON value to write
        #[arg(default_value = "{}")]
        value: String,
        /// Set a key inside the existing document instead of replacing it
        #[arg(long)]
        key: Option<String>,
    },
    /// Delete a file, a directory of files, or a key, and push it to disk
    Delete {
        path: String,
        #[arg(long)]
        key: Option<String>,
    },
    /// Print the whole tree
    Dump,
    /// Print the tree every time it changes
    Watch {
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

impl Command {
    /// Whether the command needs a live directory watch.
    pub fn watches(&self) -> bool {
        matches!(self, Command::Watch { .. })
    }
}

/// Run a one-shot command, returning the text to print.
///
/// `watch` never returns.
pub fn execute(command: &Command, db: &DB, pretty: bool) -> Result<Option<String>, CliError> {
    match command {
        Command::Get { path, key } => match db.get(path, key.as_deref())? {
            Some(value) => Ok(Some(render(&value, pretty))),
            None => Err(CliError::NotFound { path: path.clone() }),
        },
        Command::Set { path, value, key } => {
            let value: JsonValue =
                serde_json::from_str(value).map_err(|error| CliError::InvalidJson {
                    input: value.clone(),
                    error,
                })?;
            db.set(path, key.as_deref(), value)?;
            let report = db.push()?;
            log::info!("Applied {} changes", report.applied.len());
            Ok(None)
        }
        Command::Delete { path, key } => {
            db.delete(path, key.as_deref())?;
            db.push()?;
            Ok(None)
        }
        Command::Dump => Ok(Some(render(&db.tree(), pretty))),
        Command::Watch { interval_ms } => watch(
            db,
            Duration::from_millis(interval_ms.unwrap_or(DEFAULT_WATCH_INTERVAL_MS)),
            pretty,
        ),
    }
}

/// Print the tree, then print it again whenever it differs.
pub fn watch(db: &DB, interval: Duration, pretty: bool) -> ! {
    let mut last = db.tree();
    println!("{}", render(&last, pretty));

    loop {
        thread::sleep(interval);
        let current = db.tree();
        if current != last {
            println!("{}", render(&current, pretty));
            last = current;
        }
    }
}

fn render(value: &JsonValue, pretty: bool) -> String {
    if pretty {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod commands_tests {
    use super::*;
    use jsontree::Config;
    use std::fs;

    fn open(dir: &tempfile::TempDir) -> DB {
        DB::open(Config::new(dir.path()).with_unwatch(true)).unwrap()
    }

    #[test]
    fn set_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir);

        let set = Command::Set {
            path: "users/carol".to_string(),
            value: r#"{"age": 40}"#.to_string(),
            key: None,
        };
        assert_eq!(execute(&set, &db, true).unwrap(), None);
        assert!(dir.path().join("users/carol.json").exists());

        let get = Command::Get {
            path: "users/carol".to_string(),
            key: Some("age".to_string()),
        };
        assert_eq!(execute(&get, &db, true).unwrap(), Some("40".to_string()));

        let delete = Command::Delete {
            path: "users".to_string(),
            key: None,
        };
        execute(&delete, &db, true).unwrap();
        assert!(!dir.path().join("users/carol.json").exists());
        assert!(matches!(
            execute(&get, &db, true),
            Err(CliError::NotFound { .. })
        ));
    }

    #[test]
    fn dump_renders_pretty_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), "[1]").unwrap();
        let db = open(&dir);

        assert_eq!(
            execute(&Command::Dump, &db, true).unwrap(),
            Some("{\n  \"a\": [\n    1\n  ]\n}".to_string())
        );
        assert_eq!(
            execute(&Command::Dump, &db, false).unwrap(),
            Some(r#"{"a":[1]}"#.to_string())
        );
    }

    #[test]
    fn rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir);

        let set = Command::Set {
            path: "a".to_string(),
            value: "{ nope".to_string(),
            key: None,
        };
        assert!(matches!(
            execute(&set, &db, true),
            Err(CliError::InvalidJson { .. })
        ));
        assert!(db.pending().is_empty());
    }
}
