//! Case records and the attachments they own.

use crate::prelude::*;

use crate::base::{Actor, Attachment, Case, CaseDraft, CasePatch};
use crate::blob::NewFile;

pub mod approval;
pub mod attachments;
pub mod stats;
pub mod store;

use attachments::{AttachmentSynchronizer, CleanupReport};
use stats::CaseStats;
use store::{CasePage, CaseStore, ListParams};

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub case: Case,
    /// Blobs of removed attachments that could not be deleted.
    pub cleanup: CleanupReport,
}

/// Case operations that touch both the record store and the blob store.
///
/// Attachment changes are ordered upload, persist, delete: a failed upload
/// leaves the record as it was, and a failed persist removes what was just
/// uploaded. A blob another case still lists is never deleted.
#[derive(Clone)]
pub struct CaseService {
    store: CaseStore,
    attachments: AttachmentSynchronizer,
}

impl CaseService {
    pub fn new(store: CaseStore, attachments: AttachmentSynchronizer) -> Self {
        Self { store, attachments }
    }

    pub fn store(&self) -> &CaseStore {
        &self.store
    }

    pub fn attachments(&self) -> &AttachmentSynchronizer {
        &self.attachments
    }

    pub async fn create(
        &self,
        draft: CaseDraft,
        files: Vec<NewFile>,
        actor: &Actor,
    ) -> Result<Case> {
        let images = self.attachments.upload_all(&files).await?;
        match self.store.create(draft, images.clone(), actor).await {
            Ok(case) => Ok(case),
            Err(err) => {
                error!("Persisting new case failed, removing its uploads: {err}");
                let cleanup = self.attachments.purge(&images).await;
                if !cleanup.is_clean() {
                    warn!(
                        "{} upload(s) of the unsaved case could not be removed",
                        cleanup.error_count()
                    );
                }
                Err(err)
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Case> {
        self.store.get(id).await
    }

    pub async fn list(&self, params: &ListParams) -> Result<CasePage> {
        self.store.list(params).await
    }

    pub async fn pending(&self) -> Result<Vec<Case>> {
        self.store.pending().await
    }

    pub async fn upcoming(&self, day: Option<NaiveDate>) -> Result<Vec<Case>> {
        self.store.upcoming(day).await
    }

    pub async fn stats(&self) -> Result<CaseStats> {
        self.store.stats(Utc::now()).await
    }

    /// External ids among `attachments` that some stored case still lists.
    /// When that cannot be determined, all of them count as shared.
    async fn shared_blobs(&self, attachments: &[Attachment]) -> HashSet<String> {
        if attachments.is_empty() {
            return HashSet::new();
        }
        let ids: Vec<String> = attachments.iter().map(|a| a.external_id.clone()).collect();
        match self.store.referenced(&ids).await {
            Ok(shared) => {
                if !shared.is_empty() {
                    info!("Keeping {} blob(s) other cases still reference", shared.len());
                }
                shared
            }
            Err(err) => {
                warn!("Could not check blob references, keeping {} blob(s): {err}", ids.len());
                ids.into_iter().collect()
            }
        }
    }

    pub async fn update(
        &self,
        id: Uuid,
        patch: &CasePatch,
        deletions: &[String],
        files: Vec<NewFile>,
    ) -> Result<UpdateOutcome> {
        let current = self.store.get(id).await?;
        CaseStore::check_base_version(&current, patch)?;

        let staged = self
            .attachments
            .stage(&current.images, deletions, &files)
            .await?;
        let images = staged.attachments().to_vec();
        match self.store.apply_update(&current, patch, images).await {
            Ok(case) => {
                let mut staged = staged;
                let shared = self.shared_blobs(staged.removed()).await;
                staged.keep_blobs(&shared);
                let cleanup = staged.commit().await;
                if !cleanup.is_clean() {
                    warn!(
                        "Case {id} updated; {} removed attachment(s) could not be deleted",
                        cleanup.error_count()
                    );
                }
                Ok(UpdateOutcome { case, cleanup })
            }
            Err(err) => {
                debug!("Update of case {id} not persisted, dropping staged uploads: {err}");
                let cleanup = staged.abandon().await;
                if !cleanup.is_clean() {
                    warn!(
                        "{} staged upload(s) for case {id} could not be removed",
                        cleanup.error_count()
                    );
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::base::Role;
    use crate::blob::BlobClient;
    use crate::blob::memory::MemoryBlobStore;
    use crate::persistence::memory::MemoryRecordStore;
    use crate::settings::{BlobStoreSettings, UploadLimits};

    pub(crate) fn service_with_memory_stores() -> (Arc<MemoryBlobStore>, CaseService) {
        let blobs = Arc::new(MemoryBlobStore::new());
        let client = BlobClient::new(blobs.clone(), &BlobStoreSettings::default());
        let service = CaseService::new(
            CaseStore::new(Arc::new(MemoryRecordStore::new())),
            AttachmentSynchronizer::new(client, UploadLimits::default()),
        );
        (blobs, service)
    }

    fn image(name: &str) -> NewFile {
        NewFile::new(name, "image/png", name.as_bytes().to_vec())
    }

    fn admin() -> Actor {
        Actor::new(Uuid::new_v4(), Role::Admin)
    }

    #[tokio::test]
    async fn test_create_with_files() {
        let (blobs, service) = service_with_memory_stores();
        let case = service
            .create(
                CaseDraft::default(),
                vec![image("1.png"), image("2.png"), image("3.png")],
                &admin(),
            )
            .await
            .unwrap();
        assert_eq!(case.images.len(), 3);
        let ids: HashSet<_> = case.images.iter().map(|a| &a.external_id).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(blobs.stored_ids().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_upload_creates_nothing() {
        let (blobs, service) = service_with_memory_stores();
        blobs.fail_uploads_named("2.png");
        let err = service
            .create(
                CaseDraft::default(),
                vec![image("1.png"), image("2.png")],
                &admin(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upload);
        assert!(service.store().records().all_cases().await.unwrap().is_empty());
        assert!(blobs.stored_ids().is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_attachments() {
        let (blobs, service) = service_with_memory_stores();
        let case = service
            .create(
                CaseDraft::default(),
                vec![image("a.png"), image("b.png")],
                &admin(),
            )
            .await
            .unwrap();
        let (a, b) = (case.images[0].clone(), case.images[1].clone());

        let outcome = service
            .update(
                case.id,
                &CasePatch::default(),
                &[a.external_id.clone()],
                vec![image("c.png")],
            )
            .await
            .unwrap();
        assert_eq!(outcome.case.images.len(), 2);
        assert_eq!(outcome.case.images[0], b);
        assert_eq!(outcome.case.version, 2);
        assert!(outcome.cleanup.is_clean());
        assert_eq!(blobs.delete_calls(), vec![a.external_id]);
    }

    #[tokio::test]
    async fn test_conflicting_update_keeps_blobs() {
        let (blobs, service) = service_with_memory_stores();
        let case = service
            .create(CaseDraft::default(), vec![image("a.png")], &admin())
            .await
            .unwrap();
        service
            .update(case.id, &CasePatch::default(), &[], vec![])
            .await
            .unwrap();

        let stale = CasePatch {
            version: Some(1),
            ..Default::default()
        };
        let err = service
            .update(
                case.id,
                &stale,
                &[case.images[0].external_id.clone()],
                vec![image("b.png")],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(blobs.stored_ids(), vec![case.images[0].external_id.clone()]);
        assert!(blobs.upload_calls().iter().all(|name| name != "b.png"));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_blobs() {
        let (blobs, service) = service_with_memory_stores();
        let case = service
            .create(CaseDraft::default(), vec![image("a.png")], &admin())
            .await
            .unwrap();
        blobs.fail_deletes_of(case.images[0].external_id.clone());

        let (_, cleanup) = service.delete(case.id).await.unwrap();
        assert_eq!(cleanup.error_count(), 1);
        assert_eq!(
            service.get(case.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            service.delete(case.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_shared_blobs_outlive_one_owner() {
        let (blobs, service) = service_with_memory_stores();
        let case = service
            .create(
                CaseDraft::default(),
                vec![image("a.png"), image("b.png")],
                &admin(),
            )
            .await
            .unwrap();
        let (a, b) = (case.images[0].external_id.clone(), case.images[1].external_id.clone());
        let mut copy = case.clone();
        copy.id = Uuid::new_v4();
        service.store().records().insert_case(&copy).await.unwrap();

        let outcome = service
            .update(case.id, &CasePatch::default(), &[a.clone()], vec![])
            .await
            .unwrap();
        assert!(outcome.cleanup.deleted.is_empty());
        assert!(blobs.contains(&a));

        let (_, cleanup) = service.delete(case.id).await.unwrap();
        assert!(cleanup.deleted.is_empty());
        assert!(blobs.contains(&b));

        let (_, cleanup) = service.delete(copy.id).await.unwrap();
        assert_eq!(cleanup.deleted.len(), 2);
        assert!(blobs.stored_ids().is_empty());
    }
}
