use crate::prelude::*;

use chrono::Datelike;

use crate::base::{
    Actor, ApprovalStatus, Attachment, Case, CaseDraft, CaseFilter, CasePatch, StatusScope,
};
use crate::persistence::{CaseOrder, CaseQuery, RecordStore, WriteOutcome};

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub filter: CaseFilter,
    pub scope: StatusScope,
    /// 1-based.
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub approved: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CasePage {
    pub items: Vec<Case>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
    /// Pending and approved counts under the same filter, ignoring the scope.
    pub stats: StatusCounts,
}

/// Case records over the primary store. Attachments are opaque here; callers
/// pass in the final list.
#[derive(Clone)]
pub struct CaseStore {
    records: Arc<dyn RecordStore>,
}

impl CaseStore {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    pub async fn create(
        &self,
        draft: CaseDraft,
        images: Vec<Attachment>,
        actor: &Actor,
    ) -> Result<Case> {
        let now = Utc::now();
        let approval_status = if actor.role.is_privileged() {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Pending
        };
        let case = Case {
            id: Uuid::new_v4(),
            case_number: draft.case_number,
            year: draft.year.unwrap_or_else(|| now.year()),
            case_type: draft.case_type,
            jurisdiction: draft.jurisdiction,
            client_name: draft.client_name,
            opponent_name: draft.opponent_name,
            previous_session: draft.previous_session,
            current_session: draft.current_session,
            postponed_to: draft.postponed_to,
            session_date: draft.session_date,
            decision: draft.decision,
            request: draft.request,
            notes: draft.notes,
            admin: draft.admin,
            expenses: draft.expenses,
            paid: draft.paid.unwrap_or(0.0),
            remaining: draft.remaining.unwrap_or(0.0),
            created_by: actor.id,
            approval_status,
            images,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.records.insert_case(&case).await?;
        info!(
            "Created case {} ({}) by {}",
            case.id,
            case.approval_status.as_str(),
            actor.id
        );
        Ok(case)
    }

    pub async fn get(&self, id: Uuid) -> Result<Case> {
        self.records
            .get_case(id)
            .await?
            .ok_or_else(|| Error::case_not_found(id))
    }

    /// Fails with `Conflict` when the patch was based on another version than `current`.
    pub fn check_base_version(current: &Case, patch: &CasePatch) -> Result<()> {
        match patch.version {
            Some(expected) if expected != current.version => Err(Error::Conflict {
                id: current.id,
                expected,
                found: current.version,
            }),
            _ => Ok(()),
        }
    }

    /// Writes `current` with `patch` and `images` applied, provided nobody
    /// else wrote it since it was read.
    pub async fn apply_update(
        &self,
        current: &Case,
        patch: &CasePatch,
        images: Vec<Attachment>,
    ) -> Result<Case> {
        Self::check_base_version(current, patch)?;
        let mut updated = current.clone();
        patch.apply_to(&mut updated);
        updated.images = images;
        self.write_next_version(current, updated).await
    }

    pub async fn update(&self, id: Uuid, patch: &CasePatch) -> Result<Case> {
        let current = self.get(id).await?;
        let images = current.images.clone();
        self.apply_update(&current, patch, images).await
    }

    pub async fn set_status(&self, current: &Case, status: ApprovalStatus) -> Result<Case> {
        let mut updated = current.clone();
        updated.approval_status = status;
        self.write_next_version(current, updated).await
    }

    async fn write_next_version(&self, current: &Case, mut updated: Case) -> Result<Case> {
        updated.version = current.version + 1;
        updated.updated_at = Utc::now();
        let outcome = self.records.replace_case(&updated, current.version).await?;
        Self::check_outcome(current, outcome)?;
        Ok(updated)
    }

    fn check_outcome(current: &Case, outcome: WriteOutcome) -> Result<()> {
        match outcome {
            WriteOutcome::Applied => Ok(()),
            WriteOutcome::Missing => Err(Error::case_not_found(current.id)),
            WriteOutcome::VersionMismatch { found } => Err(Error::Conflict {
                id: current.id,
                expected: current.version,
                found,
            }),
        }
    }

    /// Removes `current`, provided nobody wrote it since it was read.
    pub async fn delete(&self, current: &Case) -> Result<()> {
        let outcome = self.records.remove_case(current.id, current.version).await?;
        Self::check_outcome(current, outcome)
    }

    /// Which of `external_ids` some stored case still references.
    pub async fn referenced(&self, external_ids: &[String]) -> Result<HashSet<String>> {
        self.records.referenced_external_ids(external_ids).await
    }

    pub async fn list(&self, params: &ListParams) -> Result<CasePage> {
        let limit = params
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let page = params.page.unwrap_or(1).max(1);

        let items = self
            .records
            .query_cases(&CaseQuery {
                filter: params.filter.clone(),
                scope: params.scope,
                order: CaseOrder::NewestFirst,
                offset: (page - 1).saturating_mul(limit),
                limit: Some(limit),
            })
            .await?;
        let total = self.records.count_cases(&params.filter, params.scope).await?;
        let stats = StatusCounts {
            pending: self
                .records
                .count_cases(&params.filter, StatusScope::Pending)
                .await?,
            approved: self
                .records
                .count_cases(&params.filter, StatusScope::Approved)
                .await?,
        };

        Ok(CasePage {
            items,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
            stats,
        })
    }

    /// Every pending case, newest first.
    pub async fn pending(&self) -> Result<Vec<Case>> {
        self.records
            .query_cases(&CaseQuery {
                scope: StatusScope::Pending,
                ..Default::default()
            })
            .await
    }

    /// Cases postponed to `day` (tomorrow if `None`), earliest first.
    pub async fn upcoming(&self, day: Option<NaiveDate>) -> Result<Vec<Case>> {
        let day = match day {
            Some(day) => day,
            None => Utc::now()
                .date_naive()
                .succ_opt()
                .ok_or_else(|| anyhow!("calendar overflow computing tomorrow"))?,
        };
        self.records
            .query_cases(&CaseQuery {
                filter: CaseFilter {
                    postponed_to: Some(day),
                    ..Default::default()
                },
                scope: StatusScope::All,
                order: CaseOrder::PostponedToAscending,
                ..Default::default()
            })
            .await
    }
}
