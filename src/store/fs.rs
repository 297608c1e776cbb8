use std::io::Write;
use std::path::{Component, Path, PathBuf};

use super::{ModelStore, StoreError};

/// Model store backed by a directory tree; each key is a relative file path.
#[derive(Debug, Clone)]
pub struct FsModelStore {
    root: PathBuf,
}

impl FsModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ModelStore for FsModelStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let io_err = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        std::fs::create_dir_all(&dir).map_err(io_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(bytes).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&path).map_err(|err| io_err(err.error))?;
        tracing::debug!("Stored {} bytes at {key}", bytes.len());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(key.to_string())
            } else {
                StoreError::Io {
                    key: key.to_string(),
                    source,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_creates_nested_directories() {
        let dir = tempdir().unwrap();
        let store = FsModelStore::new(dir.path());
        store.put("ns/online/abc.pkl", b"weights").unwrap();
        assert!(dir.path().join("ns/online/abc.pkl").is_file());
        assert_eq!(store.get("ns/online/abc.pkl").unwrap(), b"weights");
    }

    #[test]
    fn overwrite_replaces_contents() {
        let dir = tempdir().unwrap();
        let store = FsModelStore::new(dir.path());
        store.put("ns/offline/a.pkl", b"old").unwrap();
        store.put("ns/offline/a.pkl", b"new").unwrap();
        assert_eq!(store.get("ns/offline/a.pkl").unwrap(), b"new");
    }

    #[test]
    fn missing_key_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FsModelStore::new(dir.path());
        assert!(store.get("ns/online/none.pkl").unwrap_err().is_not_found());
    }

    #[test]
    fn escaping_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let store = FsModelStore::new(dir.path());
        assert!(matches!(
            store.put("../outside.pkl", b"x"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(
            store.get("/etc/passwd"),
            Err(StoreError::InvalidKey(_))
        ));
    }
}
