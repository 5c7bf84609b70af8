use std::path::PathBuf;

use anyhow::Result;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// On-disk blob storage for uploads.
///
/// Each blob is a flat file at `{dir}/{storage_id}`. Ids are UUIDs, so a
/// storage id can never name a path outside `dir`.
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Blob storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn path(&self, id: &Uuid) -> PathBuf {
        self.dir.join(id.to_string())
    }

    /// Write a blob and return the hex SHA-256 of its contents.
    pub async fn write(&self, id: &Uuid, data: &[u8]) -> Result<String> {
        let mut file = fs::File::create(self.path(id)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(sha256_hex(data))
    }

    /// Open a stored blob for reading, or `None` when it is not on disk.
    pub async fn open(&self, id: &Uuid) -> Result<Option<fs::File>> {
        match fs::File::open(self.path(id)).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a blob from disk. A blob that is already gone is not an error.
    pub async fn remove(&self, id: &Uuid) -> Result<()> {
        match fs::remove_file(self.path(id)).await {
            Ok(()) => {
                info!("Removed blob {}", id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Blob {} already gone", id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Public download URL of a stored blob.
pub fn storage_url(public_url: &str, storage_id: &str) -> String {
    format!("{}/storage/{}", public_url.trim_end_matches('/'), storage_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_write_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path().join("blobs")).await.unwrap();
        let id = Uuid::new_v4();

        let hash = store.write(&id, b"hello").await.unwrap();
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );

        let mut file = store.open(&id).await.unwrap().unwrap();
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"hello");

        assert!(store.open(&Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path().to_path_buf()).await.unwrap();
        let id = Uuid::new_v4();

        store.write(&id, b"bytes").await.unwrap();
        store.remove(&id).await.unwrap();
        assert!(store.open(&id).await.unwrap().is_none());

        // Removing twice is fine.
        store.remove(&id).await.unwrap();
    }

    #[test]
    fn test_storage_url() {
        assert_eq!(
            storage_url("http://localhost:3000/", "abc"),
            "http://localhost:3000/storage/abc"
        );
    }
}
