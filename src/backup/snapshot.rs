//! The portable snapshot document and lenient decoders for its records.
//!
//! Exports are written with the typed structs below. Imports go through the
//! `*Record` types instead, which also accept snapshots produced by older
//! deployments: string ids, `_id` keys, numbers stored as strings.

use crate::prelude::*;

use serde::Deserializer;
use serde_json::Value;

use crate::base::{ApprovalStatus, Attachment, Case, OfficeSettings, Role, StaffMember};

pub const SNAPSHOT_FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTotals {
    pub lawyers: usize,
    pub cases: usize,
    pub settings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub total_records: RecordTotals,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotData {
    pub lawyers: Vec<StaffMember>,
    pub cases: Vec<Case>,
    pub settings: Option<OfficeSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub data: SnapshotData,
}

impl Snapshot {
    pub fn new(data: SnapshotData) -> Self {
        let total_records = RecordTotals {
            lawyers: data.lawyers.len(),
            cases: data.cases.len(),
            settings: usize::from(data.settings.is_some()),
        };
        Self {
            metadata: SnapshotMetadata {
                version: SNAPSHOT_FORMAT_VERSION.to_string(),
                created_at: Utc::now(),
                total_records,
            },
            data,
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "casevault-backup-{}.json",
            self.metadata.created_at.format("%Y%m%dT%H%M%SZ")
        )
    }
}

/// The identity a snapshot record had in the store it was exported from.
///
/// Accepts a plain string, a number, or an object carrying `_id`, `id` or `$oid`.
pub fn record_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => ["_id", "id", "$oid"]
            .iter()
            .find_map(|k| map.get(*k))
            .and_then(record_key),
        _ => None,
    }
}

fn opt_text<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn opt_number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<f64>, D::Error> {
    use serde::de::Error as _;
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("`{s}` is not a number"))),
        Some(other) => Err(D::Error::custom(format!("expected a number, got {other}"))),
    }
}

fn opt_year<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<i32>, D::Error> {
    use serde::de::Error as _;
    match opt_number(d)? {
        None => Ok(None),
        Some(y) if y.fract() == 0.0 && (0.0..=9999.0).contains(&y) => Ok(Some(y as i32)),
        Some(y) => Err(D::Error::custom(format!("`{y}` is not a year"))),
    }
}

/// A case as found in a snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRecord {
    #[serde(default, alias = "_id")]
    pub id: Option<Value>,
    #[serde(default, deserialize_with = "opt_text")]
    pub case_number: Option<String>,
    #[serde(default, deserialize_with = "opt_year")]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "opt_text")]
    pub case_type: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub jurisdiction: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub client_name: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub opponent_name: Option<String>,
    #[serde(default)]
    pub previous_session: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_session: Option<DateTime<Utc>>,
    #[serde(default)]
    pub postponed_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub session_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "opt_text")]
    pub decision: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub request: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub admin: Option<String>,
    #[serde(default, deserialize_with = "opt_number")]
    pub expenses: Option<f64>,
    #[serde(default, deserialize_with = "opt_number")]
    pub paid: Option<f64>,
    #[serde(default, deserialize_with = "opt_number")]
    pub remaining: Option<f64>,
    #[serde(default)]
    pub created_by: Option<Value>,
    #[serde(default)]
    pub approval_status: Option<ApprovalStatus>,
    #[serde(default)]
    pub images: Vec<Attachment>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A staff member as found in a snapshot. Credentials are never read.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffRecord {
    #[serde(default, alias = "_id")]
    pub id: Option<Value>,
    pub name: String,
    #[serde(default, deserialize_with = "opt_text")]
    pub registration_number: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub registration_level: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub national_id: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub phone: Option<String>,
    #[serde(default)]
    pub image: Option<Attachment>,
    #[serde(default, deserialize_with = "opt_text")]
    pub registration_code: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl StaffRecord {
    pub fn key(&self) -> Option<String> {
        self.id.as_ref().and_then(record_key)
    }
}

impl CaseRecord {
    pub fn owner_key(&self) -> Option<String> {
        self.created_by.as_ref().and_then(record_key)
    }
}
