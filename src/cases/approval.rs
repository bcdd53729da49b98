use crate::prelude::*;

use super::CaseService;
use super::attachments::CleanupReport;
use crate::base::{ApprovalStatus, Case};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalAction {
    Approve,
    Reject,
}

/// What an approval action does to a case in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Approve,
    /// Already approved; nothing to write.
    Unchanged,
    /// The record and its attachments go away.
    Remove,
}

pub fn transition(status: ApprovalStatus, action: ApprovalAction) -> Result<Transition> {
    match (status, action) {
        (ApprovalStatus::Pending, ApprovalAction::Approve) => Ok(Transition::Approve),
        (ApprovalStatus::Approved, ApprovalAction::Approve) => Ok(Transition::Unchanged),
        (ApprovalStatus::Pending, ApprovalAction::Reject) => Ok(Transition::Remove),
        (ApprovalStatus::Approved, ApprovalAction::Reject) => Err(Error::validation(
            "only pending cases can be rejected; delete approved cases instead",
        )),
    }
}

#[derive(Debug, Clone)]
pub enum ApprovalOutcome {
    Approved(Case),
    Removed { case: Case, cleanup: CleanupReport },
}

impl CaseService {
    pub async fn review(&self, id: Uuid, action: ApprovalAction) -> Result<ApprovalOutcome> {
        let current = self.store.get(id).await?;
        match transition(current.approval_status, action)? {
            Transition::Unchanged => Ok(ApprovalOutcome::Approved(current)),
            Transition::Approve => {
                let approved = self
                    .store
                    .set_status(&current, ApprovalStatus::Approved)
                    .await?;
                info!("Approved case {id}");
                Ok(ApprovalOutcome::Approved(approved))
            }
            Transition::Remove => {
                let (case, cleanup) = self.remove(current).await?;
                info!("Rejected case {id}");
                Ok(ApprovalOutcome::Removed { case, cleanup })
            }
        }
    }

    /// Removes the record, then deletes every blob it referenced that no
    /// other case lists. Blob failures are logged and reported; the record
    /// stays gone.
    pub async fn delete(&self, id: Uuid) -> Result<(Case, CleanupReport)> {
        let current = self.store.get(id).await?;
        self.remove(current).await
    }

    /// Fails with `Conflict` if the case changed since `current` was read.
    async fn remove(&self, current: Case) -> Result<(Case, CleanupReport)> {
        self.store.delete(&current).await?;
        let shared = self.shared_blobs(&current.images).await;
        let orphaned: Vec<_> = current
            .images
            .iter()
            .filter(|a| !shared.contains(&a.external_id))
            .cloned()
            .collect();
        let cleanup = self.attachments.purge(&orphaned).await;
        if !cleanup.is_clean() {
            warn!(
                "Case {} removed with {} attachment(s) left in the blob store",
                current.id,
                cleanup.error_count()
            );
        }
        Ok((current, cleanup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Actor, CaseDraft, Role};
    use crate::blob::NewFile;
    use crate::cases::tests::service_with_memory_stores;

    #[test]
    fn test_transition_table() {
        use ApprovalAction::*;
        use ApprovalStatus::*;
        assert_eq!(transition(Pending, Approve).unwrap(), Transition::Approve);
        assert_eq!(transition(Approved, Approve).unwrap(), Transition::Unchanged);
        assert_eq!(transition(Pending, Reject).unwrap(), Transition::Remove);
        assert_eq!(
            transition(Approved, Reject).unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[tokio::test]
    async fn test_reject_removes_record_and_blobs() {
        let (blobs, service) = service_with_memory_stores();
        let lawyer = Actor::new(Uuid::new_v4(), Role::Lawyer);
        let files: Vec<_> = ["a.jpg", "b.jpg", "c.jpg"]
            .iter()
            .map(|n| NewFile::new(*n, "image/jpeg", n.as_bytes().to_vec()))
            .collect();
        let case = service
            .create(CaseDraft::default(), files, &lawyer)
            .await
            .unwrap();
        assert_eq!(case.approval_status, ApprovalStatus::Pending);

        let outcome = service.review(case.id, ApprovalAction::Reject).await.unwrap();
        let ApprovalOutcome::Removed { cleanup, .. } = outcome else {
            panic!("expected removal");
        };
        assert_eq!(cleanup.deleted.len(), 3);
        assert_eq!(blobs.delete_calls().len(), 3);
        assert!(blobs.stored_ids().is_empty());

        let err = service
            .review(case.id, ApprovalAction::Reject)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(blobs.delete_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_approve_is_idempotent() {
        let (_, service) = service_with_memory_stores();
        let lawyer = Actor::new(Uuid::new_v4(), Role::Lawyer);
        let case = service
            .create(CaseDraft::default(), vec![], &lawyer)
            .await
            .unwrap();

        let ApprovalOutcome::Approved(first) =
            service.review(case.id, ApprovalAction::Approve).await.unwrap()
        else {
            panic!("expected approval");
        };
        assert_eq!(first.approval_status, ApprovalStatus::Approved);
        assert_eq!(first.version, 2);

        let ApprovalOutcome::Approved(second) =
            service.review(case.id, ApprovalAction::Approve).await.unwrap()
        else {
            panic!("expected approval");
        };
        assert_eq!(second.version, 2);

        let err = service
            .review(case.id, ApprovalAction::Reject)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
