//! Object storage
//!
//! Outputs are addressed by slash-separated keys under a root. Writes are
//! all-or-nothing: data goes to a temporary sibling which is then renamed
//! over the destination.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{CloudError, Result};

/// Key-addressed blob storage
pub trait ObjectStore: Send + Sync {
    /// Whether an object exists at `key`
    fn exists(&self, key: &str) -> Result<bool>;

    /// Read an object; `None` when it does not exist
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write an object atomically and return its URI
    fn put(&self, key: &str, data: &[u8]) -> Result<String>;

    /// URI an object at `key` has (or would have)
    fn uri(&self, key: &str) -> String;
}

/// Store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path of `key`. Leading slashes and `..` segments are ignored.
    pub fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
            .fold(self.root.clone(), |p, seg| p.join(seg))
    }
}

fn store_err(key: &str) -> impl FnOnce(std::io::Error) -> CloudError + '_ {
    move |source| CloudError::Store {
        key: key.to_string(),
        source,
    }
}

impl ObjectStore for FsStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key).is_file())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(store_err(key)(e)),
        }
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<String> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(store_err(key))?;
        }
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(format!(".tmp{}", std::process::id()));
        let tmp = path.with_file_name(tmp_name);

        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(data)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(store_err(key)(e));
        }
        Ok(self.uri(key))
    }

    fn uri(&self, key: &str) -> String {
        self.path_for(key).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        assert!(!store.exists("a/b/c.json").unwrap());
        assert_eq!(store.get("a/b/c.json").unwrap(), None);

        let uri = store.put("a/b/c.json", b"{}").unwrap();
        assert!(uri.ends_with("c.json"));
        assert!(store.exists("a/b/c.json").unwrap());
        assert_eq!(store.get("a/b/c.json").unwrap().unwrap(), b"{}");
    }

    #[test]
    fn put_overwrites_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store.put("x.txt", b"one").unwrap();
        store.put("x.txt", b"two").unwrap();
        assert_eq!(store.get("x.txt").unwrap().unwrap(), b"two");
        let names: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn keys_stay_under_root() {
        let store = FsStore::new("/data");
        assert_eq!(store.path_for("/a/../b//c"), PathBuf::from("/data/a/b/c"));
    }
}
