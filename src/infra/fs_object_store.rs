use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::app::ports::ObjectStorePort;
use crate::error::PublishError;

/// Writes each object to `<root>/<key>`, creating directories as needed.
/// Existing objects are overwritten.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStorePort for FsObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), PublishError> {
        let io_error = |error: std::io::Error| PublishError::Io {
            name: key.to_string(),
            error,
        };
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(&path, &bytes).await.map_err(io_error)?;
        debug!(path = %path.display(), bytes = bytes.len(), "wrote object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_writes_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().join("out"));
        store.put("nested/a.csv", b"x,y\n".to_vec()).await.unwrap();
        store.put("nested/a.csv", b"z\n".to_vec()).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("out/nested/a.csv")).unwrap(), b"z\n");
    }

    #[tokio::test]
    async fn test_unwritable_root_is_publish_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let store = FsObjectStore::new(&blocker);
        let err = store.put("a.csv", vec![]).await.unwrap_err();
        assert!(matches!(err, PublishError::Io { ref name, .. } if name == "a.csv"));
    }
}
