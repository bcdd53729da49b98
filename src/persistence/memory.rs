use crate::prelude::*;

use std::ops::Range;

use indexmap::IndexMap;
use itertools::Itertools;
use tokio::sync::RwLock;

use super::{CaseGrouping, CaseOrder, CaseQuery, GroupTotals, RecordStore, WriteOutcome};
use crate::base::{Case, CaseFilter, OfficeSettings, StaffMember, StatusScope};

#[derive(Default)]
struct State {
    cases: IndexMap<Uuid, Case>,
    staff: IndexMap<Uuid, StaffMember>,
    settings: Option<OfficeSettings>,
}

/// In-process store with the same semantics as the Postgres backend.
#[derive(Default)]
pub struct MemoryRecordStore {
    state: RwLock<State>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sort_cases(cases: &mut [Case], order: CaseOrder) {
    match order {
        CaseOrder::NewestFirst => cases.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        CaseOrder::PostponedToAscending => {
            cases.sort_by_key(|c| (c.postponed_to.is_none(), c.postponed_to))
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_case(&self, case: &Case) -> Result<()> {
        let mut state = self.state.write().await;
        if state.cases.contains_key(&case.id) {
            return Err(Error::Duplicate {
                field: "id",
                value: case.id.to_string(),
            });
        }
        state.cases.insert(case.id, case.clone());
        Ok(())
    }

    async fn get_case(&self, id: Uuid) -> Result<Option<Case>> {
        Ok(self.state.read().await.cases.get(&id).cloned())
    }

    async fn replace_case(&self, case: &Case, expected_version: u64) -> Result<WriteOutcome> {
        let mut state = self.state.write().await;
        let Some(stored) = state.cases.get_mut(&case.id) else {
            return Ok(WriteOutcome::Missing);
        };
        if stored.version != expected_version {
            return Ok(WriteOutcome::VersionMismatch {
                found: stored.version,
            });
        }
        *stored = case.clone();
        Ok(WriteOutcome::Applied)
    }

    async fn remove_case(&self, id: Uuid, expected_version: u64) -> Result<WriteOutcome> {
        let mut state = self.state.write().await;
        let Some(stored) = state.cases.get(&id) else {
            return Ok(WriteOutcome::Missing);
        };
        if stored.version != expected_version {
            return Ok(WriteOutcome::VersionMismatch {
                found: stored.version,
            });
        }
        state.cases.shift_remove(&id);
        Ok(WriteOutcome::Applied)
    }

    async fn query_cases(&self, query: &CaseQuery) -> Result<Vec<Case>> {
        let state = self.state.read().await;
        let mut matched: Vec<Case> = state
            .cases
            .values()
            .filter(|c| query.scope.admits(c.approval_status) && query.filter.matches(c))
            .cloned()
            .collect();
        sort_cases(&mut matched, query.order);
        let page = matched
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit.map_or(usize::MAX, |l| l as usize))
            .collect();
        Ok(page)
    }

    async fn count_cases(&self, filter: &CaseFilter, scope: StatusScope) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .cases
            .values()
            .filter(|c| scope.admits(c.approval_status) && filter.matches(c))
            .count() as u64)
    }

    async fn all_cases(&self) -> Result<Vec<Case>> {
        Ok(self.state.read().await.cases.values().cloned().collect())
    }

    async fn referenced_external_ids(&self, external_ids: &[String]) -> Result<HashSet<String>> {
        let wanted: HashSet<&str> = external_ids.iter().map(String::as_str).collect();
        let state = self.state.read().await;
        Ok(state
            .cases
            .values()
            .flat_map(|c| c.images.iter())
            .filter(|a| wanted.contains(a.external_id.as_str()))
            .map(|a| a.external_id.clone())
            .collect())
    }

    async fn sum_cases(
        &self,
        grouping: CaseGrouping,
        created: Option<Range<DateTime<Utc>>>,
    ) -> Result<Vec<GroupTotals>> {
        let state = self.state.read().await;
        let mut groups: IndexMap<Option<String>, GroupTotals> = IndexMap::new();
        for case in state.cases.values() {
            if created.as_ref().is_some_and(|r| !r.contains(&case.created_at)) {
                continue;
            }
            let key = match grouping {
                CaseGrouping::ApprovalStatus => Some(case.approval_status.as_str().to_string()),
                CaseGrouping::CaseType => case.case_type.clone(),
            };
            let totals = groups.entry(key.clone()).or_insert_with(|| GroupTotals {
                key,
                ..Default::default()
            });
            totals.count += 1;
            totals.expenses += case.expenses.unwrap_or(0.0);
            totals.paid += case.paid;
            totals.remaining += case.remaining;
        }
        Ok(groups
            .into_values()
            .sorted_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)))
            .collect())
    }

    async fn insert_staff(&self, staff: &StaffMember) -> Result<()> {
        let mut state = self.state.write().await;
        for existing in state.staff.values() {
            if existing.registration_code == staff.registration_code {
                return Err(Error::Duplicate {
                    field: "registrationCode",
                    value: staff.registration_code.clone(),
                });
            }
            if staff.national_id.is_some() && existing.national_id == staff.national_id {
                return Err(Error::Duplicate {
                    field: "nationalId",
                    value: staff.national_id.clone().unwrap_or_default(),
                });
            }
        }
        if state.staff.contains_key(&staff.id) {
            return Err(Error::Duplicate {
                field: "id",
                value: staff.id.to_string(),
            });
        }
        state.staff.insert(staff.id, staff.clone());
        Ok(())
    }

    async fn all_staff(&self) -> Result<Vec<StaffMember>> {
        Ok(self.state.read().await.staff.values().cloned().collect())
    }

    async fn get_settings(&self) -> Result<Option<OfficeSettings>> {
        Ok(self.state.read().await.settings.clone())
    }

    async fn put_settings(&self, settings: &OfficeSettings) -> Result<()> {
        self.state.write().await.settings = Some(settings.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{ApprovalStatus, Attachment, AttachmentKind, Role};
    use chrono::TimeZone;

    fn case_at(day: u32, status: ApprovalStatus, client: &str) -> Case {
        let at = Utc.with_ymd_and_hms(2024, 5, day, 8, 0, 0).unwrap();
        Case {
            id: Uuid::new_v4(),
            case_number: Some(format!("{day}/2024")),
            year: 2024,
            case_type: None,
            jurisdiction: None,
            client_name: Some(client.to_string()),
            opponent_name: None,
            previous_session: None,
            current_session: None,
            postponed_to: Some(Utc.with_ymd_and_hms(2024, 6, 10 - day, 9, 0, 0).unwrap()),
            session_date: None,
            decision: None,
            request: None,
            notes: None,
            admin: None,
            expenses: None,
            paid: 0.0,
            remaining: 0.0,
            created_by: Uuid::nil(),
            approval_status: status,
            images: vec![],
            version: 1,
            created_at: at,
            updated_at: at,
        }
    }

    fn staff(code: &str, national_id: Option<&str>) -> StaffMember {
        StaffMember {
            id: Uuid::new_v4(),
            name: "Staff".into(),
            registration_number: None,
            registration_level: None,
            national_id: national_id.map(str::to_string),
            address: None,
            phone: None,
            image: None,
            registration_code: code.into(),
            password_hash: None,
            role: Role::Lawyer,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_replace_checks_version() {
        let store = MemoryRecordStore::new();
        let mut case = case_at(1, ApprovalStatus::Approved, "Ali");
        store.insert_case(&case).await.unwrap();

        case.version = 2;
        case.notes = Some("edited".into());
        assert_eq!(
            store.replace_case(&case, 1).await.unwrap(),
            WriteOutcome::Applied
        );
        assert_eq!(
            store.replace_case(&case, 1).await.unwrap(),
            WriteOutcome::VersionMismatch { found: 2 }
        );

        let other = case_at(2, ApprovalStatus::Approved, "Omar");
        assert_eq!(
            store.replace_case(&other, 1).await.unwrap(),
            WriteOutcome::Missing
        );
    }

    #[tokio::test]
    async fn test_remove_checks_version() {
        let store = MemoryRecordStore::new();
        let mut case = case_at(1, ApprovalStatus::Pending, "Ali");
        store.insert_case(&case).await.unwrap();
        case.version = 2;
        store.replace_case(&case, 1).await.unwrap();

        assert_eq!(
            store.remove_case(case.id, 1).await.unwrap(),
            WriteOutcome::VersionMismatch { found: 2 }
        );
        assert!(store.get_case(case.id).await.unwrap().is_some());

        assert_eq!(
            store.remove_case(case.id, 2).await.unwrap(),
            WriteOutcome::Applied
        );
        assert_eq!(
            store.remove_case(case.id, 2).await.unwrap(),
            WriteOutcome::Missing
        );
    }

    #[tokio::test]
    async fn test_referenced_external_ids() {
        let store = MemoryRecordStore::new();
        let mut case = case_at(1, ApprovalStatus::Approved, "Ali");
        case.images = ["a", "b"]
            .iter()
            .map(|name| Attachment {
                locator: format!("https://blobs/law-cases/{name}"),
                external_id: format!("law-cases/{name}"),
                kind: AttachmentKind::Image,
            })
            .collect();
        store.insert_case(&case).await.unwrap();

        let asked = vec!["law-cases/b".to_string(), "law-cases/z".to_string()];
        let found = store.referenced_external_ids(&asked).await.unwrap();
        assert_eq!(found, HashSet::from(["law-cases/b".to_string()]));
        assert!(store.referenced_external_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sum_cases_groups_and_windows() {
        let store = MemoryRecordStore::new();
        for (day, status, case_type, paid) in [
            (1, ApprovalStatus::Approved, Some("civil"), 100.0),
            (2, ApprovalStatus::Approved, Some("civil"), 50.0),
            (3, ApprovalStatus::Pending, None, 10.0),
        ] {
            let mut case = case_at(day, status, "client");
            case.case_type = case_type.map(str::to_string);
            case.paid = paid;
            case.expenses = Some(5.0);
            store.insert_case(&case).await.unwrap();
        }

        let by_type = store.sum_cases(CaseGrouping::CaseType, None).await.unwrap();
        assert_eq!(by_type.len(), 2);
        assert_eq!(by_type[0].key.as_deref(), Some("civil"));
        assert_eq!(by_type[0].count, 2);
        assert_eq!(by_type[0].paid, 150.0);
        assert_eq!(by_type[0].expenses, 10.0);
        assert_eq!(by_type[1].key, None);

        let window = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()
            ..Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let by_status = store
            .sum_cases(CaseGrouping::ApprovalStatus, Some(window))
            .await
            .unwrap();
        let counts: Vec<_> = by_status
            .iter()
            .map(|g| (g.key.as_deref().unwrap(), g.count))
            .collect();
        assert_eq!(counts, vec![("approved", 1), ("pending", 1)]);
    }

    #[tokio::test]
    async fn test_query_orders_and_pages() {
        let store = MemoryRecordStore::new();
        for day in 1..=5 {
            let status = if day % 2 == 0 {
                ApprovalStatus::Pending
            } else {
                ApprovalStatus::Approved
            };
            store
                .insert_case(&case_at(day, status, &format!("client {day}")))
                .await
                .unwrap();
        }

        let approved = store
            .query_cases(&CaseQuery {
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        let numbers: Vec<_> = approved.iter().filter_map(|c| c.case_number.as_deref()).collect();
        assert_eq!(numbers, vec!["5/2024", "3/2024"]);

        let by_postponed = store
            .query_cases(&CaseQuery {
                scope: StatusScope::All,
                order: CaseOrder::PostponedToAscending,
                offset: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_postponed.len(), 4);
        assert_eq!(by_postponed[0].case_number.as_deref(), Some("4/2024"));

        let pending = store
            .count_cases(&CaseFilter::default(), StatusScope::Pending)
            .await
            .unwrap();
        assert_eq!(pending, 2);
    }

    #[tokio::test]
    async fn test_staff_unique_keys() {
        let store = MemoryRecordStore::new();
        store.insert_staff(&staff("123456", Some("N1"))).await.unwrap();
        store.insert_staff(&staff("654321", None)).await.unwrap();
        store.insert_staff(&staff("111111", None)).await.unwrap();

        let err = store.insert_staff(&staff("123456", None)).await.unwrap_err();
        assert!(matches!(err, Error::Duplicate { field: "registrationCode", .. }));
        let err = store
            .insert_staff(&staff("222222", Some("N1")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Duplicate { field: "nationalId", .. }));
        assert_eq!(store.all_staff().await.unwrap().len(), 3);
    }
}
