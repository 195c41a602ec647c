//! Full materialization of a tree from disk.

use jsontree_core::TreeStore;

use crate::local_disk::LocalDisk;
use crate::Error;

/// Rebuild a tree from every JSON file under the store root.
///
/// Files are applied in store-path order, so a file is merged before the files
/// nested in its same-named directory. A file that can't be read or parsed is
/// skipped; only failing to scan the root itself is an error.
pub fn fetch(disk: &LocalDisk) -> Result<TreeStore, Error> {
    let files = disk.scan(disk.root())?;
    let mut tree = TreeStore::new();

    for (path, file_path) in &files {
        match disk.read_json(file_path) {
            Ok(value) => tree.set(path, value)?,
            Err(error) => log::warn!("Skipping {}: {}", file_path.display(), error),
        }
    }

    log::debug!(
        "Loaded {} files from {}",
        files.len(),
        disk.root().display()
    );
    Ok(tree)
}

#[cfg(test)]
mod loader_tests {
    use super::*;
    use jsontree_core::path;
    use serde_json::json;
    use std::{fs, path as std_path};

    fn write(root: &std_path::Path, relative: &str, contents: &str) {
        let file_path = root.join(relative);
        fs::create_dir_all(file_path.parent().unwrap()).unwrap();
        fs::write(file_path, contents).unwrap();
    }

    #[test]
    fn builds_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "users/alice.json", r#"{"age":30}"#);
        write(dir.path(), "users/bob.json", r#"{"age":25}"#);
        write(dir.path(), "settings.json", r#"["dark"]"#);

        let disk = LocalDisk::new(dir.path().to_path_buf()).unwrap();
        let tree = fetch(&disk).unwrap();

        assert_eq!(
            tree.root(),
            &json!({
                "users": { "alice": { "age": 30 }, "bob": { "age": 25 } },
                "settings": ["dark"],
            })
        );
    }

    #[test]
    fn skips_unparsable_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.json", "true");
        write(dir.path(), "bad.json", "{ nope");

        let disk = LocalDisk::new(dir.path().to_path_buf()).unwrap();
        let tree = fetch(&disk).unwrap();

        assert_eq!(tree.root(), &json!({ "good": true }));
    }

    #[test]
    fn empty_root_gives_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let disk = LocalDisk::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(fetch(&disk).unwrap(), TreeStore::new());
    }

    #[test]
    fn directory_contents_override_same_named_scalar_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", "7");
        write(dir.path(), "a/b.json", "1");

        let disk = LocalDisk::new(dir.path().to_path_buf()).unwrap();
        let tree = fetch(&disk).unwrap();
        assert_eq!(tree.get(&path!("a")), Some(&json!({ "b": 1 })));
    }

    #[test]
    fn same_named_mapping_file_merges_with_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", r#"{"own":true,"b":{"from_file":1}}"#);
        write(dir.path(), "a/b.json", r#"{"from_dir":2}"#);

        let disk = LocalDisk::new(dir.path().to_path_buf()).unwrap();
        let tree = fetch(&disk).unwrap();
        assert_eq!(
            tree.get(&path!("a")),
            Some(&json!({ "own": true, "b": { "from_file": 1, "from_dir": 2 } }))
        );
    }
}
