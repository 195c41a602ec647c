use std::collections::BTreeMap;
use std::{ffi, fs, io, path};

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::value::Value as JsonValue;

use crate::Error;
use jsontree_core::Path;

/// Extension of every leaf file, without the dot.
pub const JSON_EXTENSION: &str = "json";

lazy_static! {
    static ref JSON_FILE_NAME: Regex = Regex::new(r"\.json$").unwrap();
}

/// Byte-level access to the directory backing a store.
///
/// A store path `a/b/c` maps to the leaf file `<root>/a/b/c.json` and to the
/// directory `<root>/a/b/c`.
#[derive(Clone, Debug)]
pub struct LocalDisk {
    root: path::PathBuf,
}

impl LocalDisk {
    pub fn new(root: path::PathBuf) -> Result<LocalDisk, Error> {
        let attr = fs::metadata(&root).map_err(|error| Error::RootPathInvalid {
            path: root.clone(),
            error,
        })?;

        if !attr.is_dir() {
            return Err(Error::RootPathInvalid {
                path: root,
                error: io::Error::other("Root path must be a directory."),
            });
        }

        if attr.permissions().readonly() {
            return Err(Error::RootPathInvalid {
                path: root,
                error: io::Error::other("Root directory must be writable"),
            });
        }

        match root.canonicalize() {
            Ok(root) => Ok(LocalDisk { root }),
            Err(error) => Err(Error::RootPathInvalid { path: root, error }),
        }
    }

    pub fn root(&self) -> &path::Path {
        &self.root
    }

    /// The directory a store path designates.
    pub fn dir_path(&self, path: &Path) -> path::PathBuf {
        self.root
            .components()
            .chain(
                path.iter()
                    .map(|s| path::Component::Normal(ffi::OsStr::new(s))),
            )
            .collect()
    }

    /// The leaf file a store path designates.
    pub fn file_path(&self, path: &Path) -> path::PathBuf {
        let mut file_path = self.dir_path(path);
        if let Some(last) = path.last() {
            file_path.set_file_name(format!("{}.{}", last, JSON_EXTENSION));
        }
        file_path
    }

    /// Map an absolute file path back to its store path.
    ///
    /// Returns `None` for anything outside the root, anything that isn't a
    /// JSON file name, and names that aren't valid UTF-8.
    pub fn relative_path(&self, file_path: &path::Path) -> Option<Path> {
        let relative = file_path.strip_prefix(&self.root).ok()?;

        let mut components = relative
            .components()
            .map(|c| match c {
                path::Component::Normal(s) => s.to_str().map(str::to_string),
                _ => None,
            })
            .collect::<Option<Vec<String>>>()?;

        let file_name = components.pop()?;
        if !is_json_file_name(&file_name) {
            return None;
        }
        components.push(file_name[..file_name.len() - JSON_EXTENSION.len() - 1].to_string());

        match Path::try_from_components(components) {
            Ok(path) => Some(path),
            Err(error) => {
                log::warn!("Ignoring {}: {}", file_path.display(), error);
                None
            }
        }
    }

    /// Enumerate every JSON file beneath `dir`, keyed by its store path.
    ///
    /// Entries are visited in file-name order. Failing to open `dir` itself is
    /// an error; unreadable entries below it are skipped.
    pub fn scan(&self, dir: &path::Path) -> Result<BTreeMap<Path, path::PathBuf>, Error> {
        let mut files = BTreeMap::new();

        for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) if error.depth() == 0 => {
                    return Err(Error::Scan {
                        path: dir.to_path_buf(),
                        error,
                    })
                }
                Err(error) => {
                    log::warn!("Skipping unreadable entry under {}: {}", dir.display(), error);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            if let Some(path) = self.relative_path(entry.path()) {
                files.insert(path, entry.into_path());
            }
        }

        Ok(files)
    }

    pub fn read_json(&self, file_path: &path::Path) -> Result<JsonValue, Error> {
        log::debug!("Reading {}...", file_path.display());

        let file = fs::File::open(file_path).map_err(|e| Error::io(file_path, e))?;
        let reader = io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|error| Error::Parse {
            path: file_path.to_path_buf(),
            error,
        })
    }

    /// Write `value` to `file_path`, creating parent directories as needed.
    pub fn write_json(
        &self,
        file_path: &path::Path,
        value: &JsonValue,
        prettify: bool,
    ) -> Result<(), Error> {
        log::debug!("Writing {}...", file_path.display());

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let s = encode(value, prettify).map_err(|error| Error::Encode {
            path: file_path.to_path_buf(),
            error,
        })?;
        fs::write(file_path, s).map_err(|e| Error::io(file_path, e))
    }

    pub fn remove_file(&self, file_path: &path::Path) -> Result<(), Error> {
        log::debug!("Removing {}...", file_path.display());
        fs::remove_file(file_path).map_err(|e| Error::io(file_path, e))
    }

    /// Remove every JSON file beneath `dir`, returning how many were removed.
    ///
    /// Directories and non-JSON files are left in place.
    pub fn remove_json_files(&self, dir: &path::Path) -> Result<usize, Error> {
        let files = self.scan(dir)?;
        for file_path in files.values() {
            self.remove_file(file_path)?;
        }
        Ok(files.len())
    }
}

pub fn is_json_file_name(name: &str) -> bool {
    JSON_FILE_NAME.is_match(name)
}

/// Encode a leaf document, with two-space indentation when `prettify` is set.
pub fn encode(value: &JsonValue, prettify: bool) -> Result<String, serde_json::Error> {
    if prettify {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

/// The current hard-link count of `file_path`; zero once it's gone.
pub fn link_count(file_path: &path::Path) -> u64 {
    match fs::metadata(file_path) {
        Ok(attr) => links_of(&attr),
        Err(_) => 0,
    }
}

#[cfg(unix)]
fn links_of(attr: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    attr.nlink()
}

#[cfg(not(unix))]
fn links_of(_attr: &fs::Metadata) -> u64 {
    1
}
