//! External object storage for attachment bytes.
//!
//! Backends implement [`BlobStore`]. Callers go through [`BlobClient`], which
//! turns every call into one awaitable step with a timeout and a slow-call
//! warning.

use crate::prelude::*;

use std::time::Duration;

use bytes::Bytes;

use crate::base::{Attachment, AttachmentKind};
use crate::settings::{BlobBackend, BlobStoreSettings};
use crate::utils::slow_warn::warn_if_slow;

pub mod local;
pub mod memory;
pub mod s3;

/// A file received from a client, waiting to be uploaded.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl NewFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn kind(&self) -> AttachmentKind {
        AttachmentKind::from_content_type(&self.content_type)
    }

    /// Lower-case extension taken from the original file name, if sane.
    pub fn extension(&self) -> Option<String> {
        let (_, ext) = self.file_name.rsplit_once('.')?;
        (!ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .then(|| ext.to_ascii_lowercase())
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the bytes under `folder` and returns the new attachment reference.
    async fn upload(&self, file: &NewFile, folder: &str) -> anyhow::Result<Attachment>;

    async fn delete(&self, external_id: &str) -> anyhow::Result<()>;

    /// Verifies the store is reachable and writable.
    async fn ping(&self) -> anyhow::Result<()>;
}

/// Key for a new blob: `{folder}/{uuid}[.ext]`.
pub(crate) fn new_blob_key(folder: &str, file: &NewFile) -> String {
    let folder = folder.trim_matches('/');
    let id = Uuid::new_v4();
    match (folder.is_empty(), file.extension()) {
        (true, None) => id.to_string(),
        (true, Some(ext)) => format!("{id}.{ext}"),
        (false, None) => format!("{folder}/{id}"),
        (false, Some(ext)) => format!("{folder}/{id}.{ext}"),
    }
}

pub(crate) fn join_locator(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// Shared handle to the configured blob store. Cheap to clone.
#[derive(Clone)]
pub struct BlobClient {
    store: Arc<dyn BlobStore>,
    folder: String,
    timeout: Duration,
    slow_threshold: Duration,
}

impl BlobClient {
    pub fn new(store: Arc<dyn BlobStore>, settings: &BlobStoreSettings) -> Self {
        Self {
            store,
            folder: settings.folder.clone(),
            timeout: settings.timeout(),
            slow_threshold: settings.slow_warn_threshold(),
        }
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    async fn timed<T>(
        &self,
        what: impl Fn() -> String,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        match tokio::time::timeout(self.timeout, warn_if_slow(&what, self.slow_threshold, fut))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "{} timed out after {}s",
                what(),
                self.timeout.as_secs_f32()
            )),
        }
    }

    pub async fn upload(&self, file: &NewFile) -> anyhow::Result<Attachment> {
        self.timed(
            || format!("blob upload of `{}`", file.file_name),
            self.store.upload(file, &self.folder),
        )
        .await
    }

    pub async fn delete(&self, external_id: &str) -> anyhow::Result<()> {
        self.timed(
            || format!("blob delete of `{external_id}`"),
            self.store.delete(external_id),
        )
        .await
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        self.timed(|| "blob store ping".to_string(), self.store.ping())
            .await
    }
}

/// Builds the backend named by the settings.
pub async fn connect(settings: &BlobStoreSettings) -> anyhow::Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match settings.kind {
        BlobBackend::S3 => Arc::new(s3::S3BlobStore::connect(settings).await?),
        BlobBackend::Local => Arc::new(local::LocalBlobStore::from_settings(settings)?),
        BlobBackend::Memory => {
            warn!("Using the in-memory blob store; attachments are lost on restart");
            Arc::new(memory::MemoryBlobStore::new())
        }
    };
    Ok(store)
}
