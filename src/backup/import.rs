//! Restores a snapshot into the live store.
//!
//! Every record gets a fresh id. Staff go first so the old-to-new id map can
//! rewrite the owners of cases and settings. Records are inserted one by one;
//! a record that fails is counted and skipped.

use crate::prelude::*;

use futures::StreamExt;
use futures::stream;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::snapshot::{CaseRecord, SNAPSHOT_FORMAT_VERSION, StaffRecord, record_key};
use crate::base::attachment::dedup_by_external_id;
use crate::base::staff::generate_registration_code;
use crate::base::{Actor, ApprovalStatus, Case, OfficeSettings, StaffMember};
use crate::persistence::RecordStore;

const INSERT_CONCURRENCY: usize = 8;
const MAX_REPORTED_ERRORS: usize = 5;
const REGISTRATION_CODE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRestoreStats {
    pub attempted: usize,
    pub inserted: usize,
    pub failed: usize,
    /// The first few failure reasons.
    pub errors: Vec<String>,
}

impl EntityRestoreStats {
    fn record_failure(&mut self, index: usize, reason: impl std::fmt::Display) {
        self.failed += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(format!("#{index}: {reason}"));
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub lawyers: EntityRestoreStats,
    pub cases: EntityRestoreStats,
    pub settings: EntityRestoreStats,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.lawyers.failed == 0 && self.cases.failed == 0 && self.settings.failed == 0
    }
}

/// The recognized parts of a snapshot's `data` object.
#[derive(Debug, Default)]
struct SnapshotPayload {
    lawyers: Vec<Value>,
    cases: Vec<Value>,
    settings: Option<Value>,
}

fn check_version(metadata: &Map<String, Value>) -> Result<()> {
    let supported = match metadata.get("version") {
        Some(Value::String(v)) => v.trim() == SNAPSHOT_FORMAT_VERSION,
        Some(Value::Number(n)) => n.as_f64() == SNAPSHOT_FORMAT_VERSION.parse::<f64>().ok(),
        _ => false,
    };
    if supported {
        return Ok(());
    }
    Err(Error::UnsupportedSnapshotVersion {
        found: metadata
            .get("version")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "<missing>".to_string()),
        supported: SNAPSHOT_FORMAT_VERSION,
    })
}

fn take_array(data: &mut Map<String, Value>, key: &str) -> Result<Option<Vec<Value>>> {
    match data.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(Error::MalformedSnapshot(format!(
            "`data.{key}` must be an array"
        ))),
    }
}

fn parse_payload(bytes: &[u8]) -> Result<SnapshotPayload> {
    let root: Value = serde_json::from_slice(bytes)
        .map_err(|err| Error::MalformedSnapshot(format!("not valid JSON: {err}")))?;
    let Value::Object(mut root) = root else {
        return Err(Error::MalformedSnapshot(
            "expected a JSON object at the top level".into(),
        ));
    };
    let Some(Value::Object(metadata)) = root.remove("metadata") else {
        return Err(Error::MalformedSnapshot("missing `metadata` object".into()));
    };
    let Some(Value::Object(mut data)) = root.remove("data") else {
        return Err(Error::MalformedSnapshot("missing `data` object".into()));
    };

    let lawyers = take_array(&mut data, "lawyers")?;
    let cases = take_array(&mut data, "cases")?;
    let settings = match data.remove("settings") {
        None | Some(Value::Null) => None,
        Some(v @ Value::Object(_)) => Some(v),
        Some(_) => {
            return Err(Error::MalformedSnapshot(
                "`data.settings` must be an object".into(),
            ));
        }
    };
    if lawyers.is_none() && cases.is_none() && settings.is_none() {
        return Err(Error::MalformedSnapshot(
            "`data` holds no lawyers, cases or settings".into(),
        ));
    }
    check_version(&metadata)?;

    Ok(SnapshotPayload {
        lawyers: lawyers.unwrap_or_default(),
        cases: cases.unwrap_or_default(),
        settings,
    })
}

/// Decodes one record, naming the offending field on failure.
fn decode<T: DeserializeOwned>(value: Value) -> std::result::Result<T, String> {
    serde_path_to_error::deserialize(value).map_err(|err| {
        let path = err.path().to_string();
        if path == "." {
            err.into_inner().to_string()
        } else {
            format!("{path}: {}", err.into_inner())
        }
    })
}

fn staff_from_record(record: StaffRecord, registration_code: String) -> StaffMember {
    StaffMember {
        id: Uuid::new_v4(),
        name: record.name,
        registration_number: record.registration_number,
        registration_level: record.registration_level,
        national_id: record.national_id.filter(|n| !n.trim().is_empty()),
        address: record.address,
        phone: record.phone,
        image: record.image,
        registration_code,
        password_hash: None,
        role: record.role.unwrap_or_default(),
        is_active: record.is_active.unwrap_or(true),
        created_at: record.created_at.unwrap_or_else(Utc::now),
    }
}

/// Inserts one staff record, regenerating a generated registration code if it
/// happens to collide.
async fn insert_staff(
    records: &dyn RecordStore,
    record: StaffRecord,
) -> std::result::Result<Uuid, String> {
    let given_code = record
        .registration_code
        .clone()
        .filter(|c| !c.trim().is_empty());
    let attempts = if given_code.is_some() {
        1
    } else {
        REGISTRATION_CODE_ATTEMPTS
    };
    let mut last_error = String::new();
    for _ in 0..attempts {
        let code = given_code.clone().unwrap_or_else(generate_registration_code);
        let staff = staff_from_record(record.clone(), code);
        match records.insert_staff(&staff).await {
            Ok(()) => return Ok(staff.id),
            Err(Error::Duplicate {
                field: "registrationCode",
                value,
            }) if given_code.is_none() => {
                debug!("Generated registration code {value} already taken, retrying");
                last_error = format!("duplicate registrationCode: `{value}`");
            }
            Err(err) => return Err(err.to_string()),
        }
    }
    Err(last_error)
}

fn case_from_record(record: CaseRecord, owner: Uuid) -> Case {
    let now = Utc::now();
    let created_at = record.created_at.unwrap_or(now);
    Case {
        id: Uuid::new_v4(),
        case_number: record.case_number,
        year: record.year.unwrap_or_else(|| chrono::Datelike::year(&created_at)),
        case_type: record.case_type,
        jurisdiction: record.jurisdiction,
        client_name: record.client_name,
        opponent_name: record.opponent_name,
        previous_session: record.previous_session,
        current_session: record.current_session,
        postponed_to: record.postponed_to,
        session_date: record.session_date,
        decision: record.decision,
        request: record.request,
        notes: record.notes,
        admin: record.admin,
        expenses: record.expenses,
        paid: record.paid.unwrap_or(0.0),
        remaining: record.remaining.unwrap_or(0.0),
        created_by: owner,
        approval_status: record.approval_status.unwrap_or(ApprovalStatus::Pending),
        images: dedup_by_external_id(record.images),
        version: 1,
        created_at,
        updated_at: record.updated_at.unwrap_or(created_at),
    }
}

/// Drops store bookkeeping carried by exported settings documents.
fn settings_from_value(
    value: Value,
    id_map: &HashMap<String, Uuid>,
    actor: &Actor,
) -> std::result::Result<OfficeSettings, String> {
    let Value::Object(mut map) = value else {
        return Err("settings must be an object".to_string());
    };
    let owner = map
        .remove("createdBy")
        .as_ref()
        .and_then(record_key)
        .and_then(|key| id_map.get(&key).copied())
        .unwrap_or(actor.id);
    for key in ["_id", "id", "__v", "createdAt", "updatedAt"] {
        map.remove(key);
    }
    let mut settings: OfficeSettings = decode(Value::Object(map))?;
    settings.created_by = Some(owner);
    Ok(settings)
}

/// Parses `bytes` as a snapshot and inserts its records into `records`.
///
/// Fails only when the document itself is unusable; per-record failures are
/// reported in the returned counts.
pub async fn import_all(
    records: &dyn RecordStore,
    bytes: &[u8],
    actor: &Actor,
) -> Result<RestoreReport> {
    let payload = parse_payload(bytes)?;
    let mut report = RestoreReport::default();

    // Staff
    report.lawyers.attempted = payload.lawyers.len();
    let outcomes: Vec<(usize, Option<String>, std::result::Result<Uuid, String>)> =
        stream::iter(payload.lawyers.into_iter().enumerate())
            .map(|(index, value)| async move {
                match decode::<StaffRecord>(value) {
                    Ok(record) => {
                        let key = record.key();
                        (index, key, insert_staff(records, record).await)
                    }
                    Err(reason) => (index, None, Err(reason)),
                }
            })
            .buffer_unordered(INSERT_CONCURRENCY)
            .collect()
            .await;

    let mut id_map: HashMap<String, Uuid> = HashMap::new();
    let mut staff_failures: Vec<(usize, String)> = Vec::new();
    for (index, key, outcome) in outcomes {
        match outcome {
            Ok(new_id) => {
                report.lawyers.inserted += 1;
                if let Some(key) = key {
                    id_map.insert(key, new_id);
                }
            }
            Err(reason) => staff_failures.push((index, reason)),
        }
    }
    staff_failures.sort_by_key(|(index, _)| *index);
    for (index, reason) in staff_failures {
        report.lawyers.record_failure(index, reason);
    }

    // Cases
    report.cases.attempted = payload.cases.len();
    for (index, value) in payload.cases.into_iter().enumerate() {
        let record = match decode::<CaseRecord>(value) {
            Ok(record) => record,
            Err(reason) => {
                report.cases.record_failure(index, reason);
                continue;
            }
        };
        let owner = record
            .owner_key()
            .and_then(|key| id_map.get(&key).copied())
            .unwrap_or(actor.id);
        let case = case_from_record(record, owner);
        match records.insert_case(&case).await {
            Ok(()) => report.cases.inserted += 1,
            Err(err) => report.cases.record_failure(index, err),
        }
    }

    // Settings
    if let Some(value) = payload.settings {
        report.settings.attempted = 1;
        match settings_from_value(value, &id_map, actor) {
            Ok(settings) => match records.put_settings(&settings).await {
                Ok(()) => report.settings.inserted = 1,
                Err(err) => report.settings.record_failure(0, err),
            },
            Err(reason) => report.settings.record_failure(0, reason),
        }
    }

    info!(
        "Restored snapshot: staff {}/{}, cases {}/{}, settings {}/{}",
        report.lawyers.inserted,
        report.lawyers.attempted,
        report.cases.inserted,
        report.cases.attempted,
        report.settings.inserted,
        report.settings.attempted
    );
    if !report.is_complete() {
        warn!(
            "Snapshot restore skipped {} staff, {} cases, {} settings",
            report.lawyers.failed, report.cases.failed, report.settings.failed
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Role;
    use crate::persistence::memory::MemoryRecordStore;
    use serde_json::json;

    fn actor() -> Actor {
        Actor::new(Uuid::new_v4(), Role::Admin)
    }

    fn bytes(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_unusable_documents() {
        let records = MemoryRecordStore::new();
        let cases = [
            (b"not json".to_vec(), ErrorKind::MalformedSnapshot),
            (bytes(json!([1, 2])), ErrorKind::MalformedSnapshot),
            (bytes(json!({"data": {"cases": []}})), ErrorKind::MalformedSnapshot),
            (
                bytes(json!({"metadata": {"version": "1.0"}, "data": {"posts": []}})),
                ErrorKind::MalformedSnapshot,
            ),
            (
                bytes(json!({"metadata": {"version": "0.9"}, "data": {"cases": []}})),
                ErrorKind::UnsupportedSnapshotVersion,
            ),
            (
                bytes(json!({"metadata": {}, "data": {"cases": []}})),
                ErrorKind::UnsupportedSnapshotVersion,
            ),
        ];
        for (input, kind) in cases {
            let err = import_all(&records, &input, &actor()).await.unwrap_err();
            assert_eq!(err.kind(), kind, "{err}");
        }
        assert!(records.all_cases().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_numeric_version_is_accepted() {
        let records = MemoryRecordStore::new();
        let input = bytes(json!({"metadata": {"version": 1.0}, "data": {"cases": [{}]}}));
        let report = import_all(&records, &input, &actor()).await.unwrap();
        assert_eq!(report.cases.inserted, 1);
    }

    #[tokio::test]
    async fn test_owners_are_remapped() {
        let records = MemoryRecordStore::new();
        let importer = actor();
        let input = bytes(json!({
            "metadata": {"version": "1.0"},
            "data": {
                "lawyers": [
                    {"_id": "old-mona", "name": "Mona", "registrationCode": "111111"},
                    {"_id": "old-sami", "name": "Sami"}
                ],
                "cases": [
                    {"_id": "c1", "clientName": "Ali", "createdBy": "old-mona"},
                    {"_id": "c2", "clientName": "Omar", "createdBy": {"_id": "old-sami"}},
                    {"_id": "c3", "clientName": "Huda", "createdBy": "someone-gone"},
                    {"_id": "c4", "clientName": "Bad", "paid": "lots"}
                ],
                "settings": {"_id": "s", "siteName": "Office", "createdBy": "old-mona"}
            }
        }));
        let report = import_all(&records, &input, &importer).await.unwrap();
        assert_eq!(report.lawyers.inserted, 2);
        assert_eq!(report.cases.attempted, 4);
        assert_eq!(report.cases.inserted, 3);
        assert_eq!(report.cases.failed, 1);
        assert!(report.cases.errors[0].contains("paid"), "{:?}", report.cases.errors);
        assert_eq!(report.settings.inserted, 1);

        let staff = records.all_staff().await.unwrap();
        let id_of = |name: &str| staff.iter().find(|s| s.name == name).unwrap().id;
        let sami = staff.iter().find(|s| s.name == "Sami").unwrap();
        assert_eq!(sami.registration_code.len(), 6);
        assert!(sami.password_hash.is_none());

        let cases = records.all_cases().await.unwrap();
        let owner_of = |client: &str| {
            cases
                .iter()
                .find(|c| c.client_name.as_deref() == Some(client))
                .unwrap()
                .created_by
        };
        assert_eq!(owner_of("Ali"), id_of("Mona"));
        assert_eq!(owner_of("Omar"), id_of("Sami"));
        assert_eq!(owner_of("Huda"), importer.id);

        let settings = records.get_settings().await.unwrap().unwrap();
        assert_eq!(settings.site_name, "Office");
        assert_eq!(settings.created_by, Some(id_of("Mona")));
        assert!(!settings.extra.contains_key("_id"));
    }

    #[tokio::test]
    async fn test_colliding_staff_fail_individually() {
        let records = MemoryRecordStore::new();
        let input = bytes(json!({
            "metadata": {"version": "1.0"},
            "data": {"lawyers": [
                {"name": "A", "registrationCode": "222222", "nationalId": "N-1"},
                {"name": "B", "registrationCode": "333333", "nationalId": "N-1"}
            ]}
        }));
        let first = import_all(&records, &input, &actor()).await.unwrap();
        assert_eq!(first.lawyers.inserted, 1);
        assert_eq!(first.lawyers.failed, 1);

        let second = import_all(&records, &input, &actor()).await.unwrap();
        assert_eq!(second.lawyers.inserted, 0);
        assert_eq!(second.lawyers.failed, 2);
        assert!(!second.is_complete());
    }
}
