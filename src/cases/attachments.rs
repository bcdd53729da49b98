//! Keeps a case's attachment list and the blob store in step.
//!
//! Changes go through [`AttachmentSynchronizer::stage`]: new files are uploaded
//! and the resulting list computed without touching existing blobs. Once the
//! record is persisted the caller commits the staged change, which deletes the
//! blobs that were dropped; if persisting fails it abandons it instead, which
//! deletes the blobs that were just uploaded.

use crate::prelude::*;

use futures::future::join_all;
use itertools::Itertools;

use crate::base::Attachment;
use crate::base::attachment::dedup_by_external_id;
use crate::blob::{BlobClient, NewFile};
use crate::settings::UploadLimits;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFailure {
    pub external_id: String,
    pub reason: String,
}

/// Outcome of a batch of best-effort blob deletes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    pub failed: Vec<DeleteFailure>,
}

impl CleanupReport {
    pub fn error_count(&self) -> usize {
        self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

async fn delete_all(blobs: &BlobClient, external_ids: Vec<String>) -> CleanupReport {
    let outcomes = join_all(external_ids.into_iter().map(|external_id| async move {
        let result = blobs.delete(&external_id).await;
        (external_id, result)
    }))
    .await;

    let mut report = CleanupReport::default();
    for (external_id, result) in outcomes {
        match result {
            Ok(()) => report.deleted.push(external_id),
            Err(err) => {
                warn!("Failed to delete blob `{external_id}`, leaving it orphaned: {err:#}");
                report.failed.push(DeleteFailure {
                    external_id,
                    reason: format!("{err:#}"),
                });
            }
        }
    }
    report
}

/// An attachment change whose uploads are done and whose deletes are pending.
#[must_use = "call commit() after persisting, or abandon() if persisting failed"]
pub struct StagedAttachments {
    blobs: BlobClient,
    attachments: Vec<Attachment>,
    uploaded: Vec<Attachment>,
    removed: Vec<Attachment>,
}

impl StagedAttachments {
    /// Survivors in their original order, followed by the new uploads.
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn uploaded(&self) -> &[Attachment] {
        &self.uploaded
    }

    pub fn removed(&self) -> &[Attachment] {
        &self.removed
    }

    /// Leaves the blobs of these removed attachments in place on commit.
    pub fn keep_blobs(&mut self, external_ids: &HashSet<String>) {
        self.removed.retain(|a| !external_ids.contains(&a.external_id));
    }

    /// Deletes the blobs of removed attachments. Failures are reported, never raised.
    pub async fn commit(self) -> CleanupReport {
        let ids = self.removed.into_iter().map(|a| a.external_id).collect();
        delete_all(&self.blobs, ids).await
    }

    /// Deletes the blobs uploaded for this change and keeps everything else.
    pub async fn abandon(self) -> CleanupReport {
        let ids = self.uploaded.into_iter().map(|a| a.external_id).collect();
        delete_all(&self.blobs, ids).await
    }
}

#[derive(Clone)]
pub struct AttachmentSynchronizer {
    blobs: BlobClient,
    limits: UploadLimits,
}

impl AttachmentSynchronizer {
    pub fn new(blobs: BlobClient, limits: UploadLimits) -> Self {
        Self { blobs, limits }
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    pub fn validate_files(&self, files: &[NewFile]) -> Result<()> {
        if files.len() > self.limits.max_files_per_request {
            validation_bail!(
                "at most {} files may be attached per request, got {}",
                self.limits.max_files_per_request,
                files.len()
            );
        }
        for file in files {
            if file.bytes.len() > self.limits.max_file_size_bytes {
                validation_bail!(
                    "`{}` is {} bytes, the limit is {}",
                    file.file_name,
                    file.bytes.len(),
                    self.limits.max_file_size_bytes
                );
            }
            let content_type = file.content_type.to_ascii_lowercase();
            if !self
                .limits
                .allowed_content_types
                .iter()
                .any(|prefix| content_type.starts_with(&prefix.to_ascii_lowercase()))
            {
                validation_bail!(
                    "`{}` has unsupported content type `{}`",
                    file.file_name,
                    file.content_type
                );
            }
        }
        Ok(())
    }

    /// Uploads every file concurrently. If any upload fails, the ones that
    /// succeeded are deleted again before the error is returned.
    pub async fn upload_all(&self, files: &[NewFile]) -> Result<Vec<Attachment>> {
        self.validate_files(files)?;
        if files.is_empty() {
            return Ok(vec![]);
        }
        let results = join_all(files.iter().map(|file| self.blobs.upload(file))).await;

        let mut uploaded = Vec::with_capacity(files.len());
        let mut first_failure = None;
        for (file, result) in files.iter().zip(results) {
            match result {
                Ok(attachment) => uploaded.push(attachment),
                Err(err) => {
                    error!("Upload of `{}` failed: {err:#}", file.file_name);
                    first_failure
                        .get_or_insert_with(|| format!("`{}`: {err:#}", file.file_name));
                }
            }
        }

        match first_failure {
            None => Ok(uploaded),
            Some(reason) => {
                let ids = uploaded.into_iter().map(|a| a.external_id).collect();
                let cleanup = delete_all(&self.blobs, ids).await;
                if !cleanup.is_clean() {
                    warn!(
                        "{} blob(s) from a failed upload batch could not be removed",
                        cleanup.error_count()
                    );
                }
                Err(Error::Upload(reason))
            }
        }
    }

    /// Uploads `files` and computes the new attachment list for `current`
    /// minus `deletions`. Existing blobs are left alone until commit.
    ///
    /// Deletion entries are external ids; ids not in `current` are ignored and
    /// repeated ids count once.
    pub async fn stage(
        &self,
        current: &[Attachment],
        deletions: &[String],
        files: &[NewFile],
    ) -> Result<StagedAttachments> {
        let wanted_gone: HashSet<&str> = deletions
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .collect();
        let (removed, survivors): (Vec<_>, Vec<_>) = current
            .iter()
            .cloned()
            .partition(|a| wanted_gone.contains(a.external_id.as_str()));

        let ignored = wanted_gone.len().saturating_sub(removed.len());
        if ignored > 0 {
            debug!("Ignoring {ignored} deletion request(s) for attachments not on the case");
        }

        let uploaded = self.upload_all(files).await?;
        let attachments = dedup_by_external_id(
            survivors
                .into_iter()
                .chain(uploaded.iter().cloned())
                .collect(),
        );
        Ok(StagedAttachments {
            blobs: self.blobs.clone(),
            attachments,
            uploaded,
            removed,
        })
    }

    /// Stage and commit in one step, for callers with nothing to persist in between.
    pub async fn reconcile(
        &self,
        current: &[Attachment],
        deletions: &[String],
        files: &[NewFile],
    ) -> Result<(Vec<Attachment>, CleanupReport)> {
        let staged = self.stage(current, deletions, files).await?;
        let attachments = staged.attachments().to_vec();
        let report = staged.commit().await;
        Ok((attachments, report))
    }

    /// Best-effort removal of every blob a destroyed record referenced.
    pub async fn purge(&self, attachments: &[Attachment]) -> CleanupReport {
        let ids = attachments
            .iter()
            .map(|a| a.external_id.clone())
            .unique()
            .collect();
        delete_all(&self.blobs, ids).await
    }
}
