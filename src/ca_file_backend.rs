// Directory-based node storage
//
// Each node owns one directory; every key maps to a file below it, with `/`
// in a key creating subdirectories (e.g. `certs/user_3.pem`).
//
// Layout of a run namespace (see ca_storage.rs):
// - run_<id>/centralized/node_<i>/{root_key.pem, root_cert.pem, user_<n>.pem}
// - run_<id>/distributed/authority/{root_cert.pem, root_public_key.bin}
// - run_<id>/distributed/node_<i>/{share.json, certs/user_<n>.pem}

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::ca_interface::{validate_key, NodeStore, StorageError};

/// File-backed storage for a single node
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if missing) the node directory at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, part| path.join(part)))
    }

    fn collect_keys(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<(), StorageError> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };
            if entry.file_type()?.is_dir() {
                self.collect_keys(&entry.path(), &key, out)?;
            } else {
                out.push(key);
            }
        }
        Ok(())
    }
}

impl NodeStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.path_for(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        self.collect_keys(&self.root, "", &mut keys)?;
        keys.sort();
        Ok(keys)
    }
}

/// Remove a directory tree if present and recreate it empty
pub fn reset_dir(path: impl AsRef<Path>) -> Result<(), StorageError> {
    let path = path.as_ref();
    match fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::create_dir_all(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_basic_operations() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::open(dir.path().join("node_1")).unwrap();

        assert_eq!(store.get("share.json").unwrap(), None);
        store.put("share.json", b"{\"id\":1}").unwrap();
        assert_eq!(store.get("share.json").unwrap(), Some(b"{\"id\":1}".to_vec()));

        assert!(store.remove("share.json").unwrap());
        assert!(!store.remove("share.json").unwrap());
    }

    #[test]
    fn test_nested_keys() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();

        store.put("certs/user_1.pem", b"one").unwrap();
        store.put("certs/user_0.pem", b"zero").unwrap();
        store.put("share.json", b"s").unwrap();

        assert!(dir.path().join("certs").join("user_1.pem").is_file());
        assert_eq!(
            store.keys().unwrap(),
            vec![
                "certs/user_0.pem".to_string(),
                "certs/user_1.pem".to_string(),
                "share.json".to_string()
            ]
        );
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::open(dir.path().join("node_1")).unwrap();

        assert!(store.put("../node_2/share.json", b"x").is_err());
        assert!(store.get("/etc/hostname").is_err());
        assert!(!dir.path().join("node_2").exists());
    }

    #[test]
    fn test_reset_dir_clears_contents() {
        let dir = TempDir::new().unwrap();
        let run = dir.path().join("run_30_single");
        let mut store = FileStore::open(run.join("centralized").join("node_0")).unwrap();
        store.put("root_key.pem", b"k").unwrap();

        reset_dir(&run).unwrap();
        assert!(run.is_dir());
        assert_eq!(fs::read_dir(&run).unwrap().count(), 0);

        // also works on a path that never existed
        reset_dir(dir.path().join("fresh")).unwrap();
        assert!(dir.path().join("fresh").is_dir());
    }
}
