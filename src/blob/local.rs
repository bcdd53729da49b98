use crate::prelude::*;

use std::path::{Component, Path, PathBuf};

use tokio::fs;

use super::{BlobStore, NewFile, join_locator, new_blob_key};
use crate::base::Attachment;
use crate::settings::BlobStoreSettings;

/// Stores blobs as files below a root directory.
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn from_settings(settings: &BlobStoreSettings) -> anyhow::Result<Self> {
        let root = settings
            .root
            .clone()
            .context("blob_store.root is required for the local backend")?;
        let base = settings
            .public_base_url
            .clone()
            .unwrap_or_else(|| format!("file://{}", root.display()));
        Ok(Self::new(root, base))
    }

    /// Resolves a key below the root, refusing anything that escapes it.
    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("invalid blob key `{key}`");
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, file: &NewFile, folder: &str) -> anyhow::Result<Attachment> {
        let key = new_blob_key(folder, file);
        let path = self.path_for(&key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create_dir_all({})", parent.display()))?;
        }
        fs::write(&path, &file.bytes)
            .await
            .with_context(|| format!("write({})", path.display()))?;
        debug!("Stored blob {key} ({} bytes)", file.bytes.len());
        Ok(Attachment {
            locator: join_locator(&self.public_base_url, &key),
            external_id: key,
            kind: file.kind(),
        })
    }

    async fn delete(&self, external_id: &str) -> anyhow::Result<()> {
        let path = self.path_for(external_id)?;
        fs::remove_file(&path)
            .await
            .with_context(|| format!("remove_file({})", path.display()))
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let check_dir = self.root.join(".health-check");
        let check_file = check_dir.join("check.bin");
        fs::create_dir_all(&check_dir)
            .await
            .with_context(|| format!("create_dir_all({})", check_dir.display()))?;
        fs::write(&check_file, b"casevault-health-check")
            .await
            .with_context(|| format!("write({})", check_file.display()))?;
        let read_back = fs::read(&check_file).await?;
        if read_back != b"casevault-health-check" {
            bail!("read-back mismatch in {}", check_file.display());
        }
        fs::remove_file(&check_file).await?;
        let _ = fs::remove_dir(&check_dir).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "https://files.example/blobs/");
        store.ping().await.unwrap();

        let file = NewFile::new("contract.pdf", "application/pdf", b"%PDF-1.7".to_vec());
        let att = store.upload(&file, "law-cases").await.unwrap();
        assert!(att.external_id.starts_with("law-cases/"));
        assert!(att.locator.starts_with("https://files.example/blobs/law-cases/"));
        let on_disk = dir.path().join(&att.external_id);
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"%PDF-1.7");

        store.delete(&att.external_id).await.unwrap();
        assert!(!on_disk.exists());
        assert!(store.delete(&att.external_id).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "file:///x");
        assert!(store.delete("../etc/passwd").await.is_err());
        assert!(store.delete("/etc/passwd").await.is_err());
    }
}
