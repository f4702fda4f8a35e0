//! Artifact store
//!
//! Holds the input and output files of jobs. Names are generated by
//! [`ArtifactName`], so the store itself never interprets caller input.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parcel_core::domain::artifact::ArtifactName;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

/// Storage for job artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist the whole reader under `name`, returning the number of bytes written
    ///
    /// The artifact only becomes visible under `name` once fully written.
    async fn write_from_reader(
        &self,
        name: &ArtifactName,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64>;

    async fn write(&self, name: &ArtifactName, bytes: &[u8]) -> Result<()> {
        let mut reader = bytes;
        self.write_from_reader(name, &mut reader).await?;
        Ok(())
    }

    async fn read(&self, name: &ArtifactName) -> Result<Vec<u8>>;

    /// Remove an artifact; `Ok(false)` if it did not exist
    async fn delete(&self, name: &ArtifactName) -> Result<bool>;

    async fn exists(&self, name: &ArtifactName) -> Result<bool>;

    /// Location of an artifact, as reported in job results
    fn path(&self, name: &ArtifactName) -> PathBuf;
}

/// Directory-backed artifact store
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist yet
    pub async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        debug!(root = %self.root.display(), "Artifact root ready");
        Ok(())
    }

    fn temp_path(&self, name: &ArtifactName) -> PathBuf {
        // Valid artifact names never start with a dot
        self.root
            .join(format!(".{}.{}.part", name, Uuid::new_v4().simple()))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn write_from_reader(
        &self,
        name: &ArtifactName,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64> {
        let temp = self.temp_path(name);

        let written = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            let written = tokio::io::copy(reader, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp, self.path(name)).await?;
            Ok::<_, std::io::Error>(written)
        }
        .await;

        match written {
            Ok(written) => Ok(written),
            Err(e) => {
                match tokio::fs::remove_file(&temp).await {
                    Err(cleanup) if cleanup.kind() != ErrorKind::NotFound => {
                        warn!(
                            path = %temp.display(),
                            error = %cleanup,
                            "Failed to remove temporary artifact"
                        );
                    }
                    _ => {}
                }
                Err(e.into())
            }
        }
    }

    async fn read(&self, name: &ArtifactName) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path(name)).await?)
    }

    async fn delete(&self, name: &ArtifactName) -> Result<bool> {
        match tokio::fs::remove_file(self.path(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &ArtifactName) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path(name)).await?)
    }

    fn path(&self, name: &ArtifactName) -> PathBuf {
        self.root.join(name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, FsArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("uploads"));
        store.ensure_root().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_write_read_delete() {
        let (_dir, store) = store().await;
        let name = ArtifactName::for_upload("a.txt");

        store.write(&name, b"hello").await.unwrap();
        assert!(store.exists(&name).await.unwrap());
        assert_eq!(store.read(&name).await.unwrap(), b"hello");

        assert!(store.delete(&name).await.unwrap());
        assert!(!store.exists(&name).await.unwrap());
        assert!(!store.delete(&name).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_from_reader_counts_bytes() {
        let (_dir, store) = store().await;
        let name = ArtifactName::for_upload("b.bin");
        let payload = vec![7u8; 64 * 1024];

        let mut reader = payload.as_slice();
        let written = store.write_from_reader(&name, &mut reader).await.unwrap();

        assert_eq!(written, payload.len() as u64);
        assert_eq!(store.read(&name).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_no_temporary_files_left_behind() {
        let (_dir, store) = store().await;
        let name = ArtifactName::for_upload("c.txt");
        store.write(&name, b"data").await.unwrap();

        let mut entries = tokio::fs::read_dir(store.root()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec![name.to_string()]);
    }

    #[tokio::test]
    async fn test_write_into_missing_root_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("missing"));
        let name = ArtifactName::for_upload("d.txt");

        let err = store.write(&name, b"x").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.exists(&name).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (_dir, store) = store().await;
        let err = store
            .read(&ArtifactName::for_upload("e.txt"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
