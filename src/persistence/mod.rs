use crate::prelude::*;

use std::ops::Range;

use crate::base::{Case, CaseFilter, OfficeSettings, StaffMember, StatusScope};
use crate::settings::DatabaseConnectionSpec;

pub mod memory;
pub mod postgres;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseOrder {
    #[default]
    NewestFirst,
    /// Earliest postponed-to date first; cases without one go last.
    PostponedToAscending,
}

#[derive(Debug, Clone, Default)]
pub struct CaseQuery {
    pub filter: CaseFilter,
    pub scope: StatusScope,
    pub order: CaseOrder,
    pub offset: u64,
    pub limit: Option<u64>,
}

/// Result of a compare-and-swap write or removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    Missing,
    /// The stored version differs from the expected one.
    VersionMismatch { found: u64 },
}

/// What `RecordStore::sum_cases` groups on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseGrouping {
    ApprovalStatus,
    CaseType,
}

/// Count and money sums of one group of cases. Missing amounts count as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupTotals {
    /// Status name or case type; `None` for cases without a case type.
    pub key: Option<String>,
    pub count: u64,
    pub expenses: f64,
    pub paid: f64,
    pub remaining: f64,
}

/// The primary record store: cases, staff members and the settings singleton.
///
/// Writes for one record are atomic; nothing spans records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_case(&self, case: &Case) -> Result<()>;

    async fn get_case(&self, id: Uuid) -> Result<Option<Case>>;

    /// Replaces the stored case only if its version still equals `expected_version`.
    async fn replace_case(&self, case: &Case, expected_version: u64) -> Result<WriteOutcome>;

    /// Removes the case only if its version still equals `expected_version`.
    async fn remove_case(&self, id: Uuid, expected_version: u64) -> Result<WriteOutcome>;

    async fn query_cases(&self, query: &CaseQuery) -> Result<Vec<Case>>;

    async fn count_cases(&self, filter: &CaseFilter, scope: StatusScope) -> Result<u64>;

    async fn all_cases(&self) -> Result<Vec<Case>>;

    /// The subset of `external_ids` that some stored case still lists as an attachment.
    async fn referenced_external_ids(&self, external_ids: &[String]) -> Result<HashSet<String>>;

    /// Per-group totals over every case, or only those created inside `created`.
    /// Groups come largest first.
    async fn sum_cases(
        &self,
        grouping: CaseGrouping,
        created: Option<Range<DateTime<Utc>>>,
    ) -> Result<Vec<GroupTotals>>;

    /// Fails with `Error::Duplicate` when the registration code or national id is taken.
    async fn insert_staff(&self, staff: &StaffMember) -> Result<()>;

    async fn all_staff(&self) -> Result<Vec<StaffMember>>;

    async fn get_settings(&self) -> Result<Option<OfficeSettings>>;

    async fn put_settings(&self, settings: &OfficeSettings) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

/// Opens the store named by `spec.url`: `memory` or a Postgres URL.
pub async fn connect(spec: &DatabaseConnectionSpec) -> anyhow::Result<Arc<dyn RecordStore>> {
    if spec.url == "memory" {
        warn!("Using the in-memory record store; data is lost on restart");
        return Ok(Arc::new(memory::MemoryRecordStore::new()));
    }
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(spec.max_connections)
        .connect(&spec.url)
        .await
        .context("Failed to connect to Postgres")?;
    let store = postgres::PostgresRecordStore::new(pool);
    store.apply_schema().await?;
    Ok(Arc::new(store))
}
