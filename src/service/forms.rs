//! Multipart case forms.
//!
//! Browsers send every field as text, so empty strings stand for "not given".
//! Dates may be RFC 3339, `datetime-local` (`YYYY-MM-DDTHH:MM`) or plain
//! `YYYY-MM-DD`; the latter two are read as UTC.

use crate::prelude::*;

use axum::extract::Multipart;
use chrono::NaiveDateTime;
use serde_json::Value;

use super::error::ApiError;
use crate::base::{CaseDraft, CasePatch};
use crate::blob::NewFile;
use crate::settings::UploadLimits;

const FILE_FIELDS: &[&str] = &["attachments", "attachments[]", "images", "images[]"];
const DELETED_FIELDS: &[&str] = &["deletedImages", "deletedImages[]"];

#[derive(Debug, Default)]
pub struct CaseForm {
    fields: HashMap<String, String>,
    deleted: Vec<String>,
    pub files: Vec<NewFile>,
}

impl CaseForm {
    pub async fn read(
        mut multipart: Multipart,
        limits: &UploadLimits,
    ) -> std::result::Result<Self, ApiError> {
        let mut form = CaseForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if FILE_FIELDS.contains(&name.as_str()) {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;
                if bytes.is_empty() {
                    continue;
                }
                if form.files.len() >= limits.max_files_per_request {
                    api_bail!(
                        "at most {} files may be attached per request",
                        limits.max_files_per_request
                    );
                }
                form.files.push(NewFile::new(file_name, content_type, bytes));
            } else if DELETED_FIELDS.contains(&name.as_str()) {
                let text = field.text().await?;
                form.deleted.extend(parse_deleted(&text)?);
            } else if !name.is_empty() {
                let text = field.text().await?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    fn raw(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|v| v.trim())
    }

    /// Present and non-empty.
    fn text(&self, name: &str) -> Option<String> {
        self.raw(name).filter(|v| !v.is_empty()).map(str::to_string)
    }

    /// Present, possibly empty (which clears the field on update).
    fn text_update(&self, name: &str) -> Option<String> {
        self.raw(name).map(str::to_string)
    }

    fn date(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        self.text(name)
            .map(|v| {
                parse_date(&v)
                    .ok_or_else(|| Error::validation(format!("`{name}`: `{v}` is not a date")))
            })
            .transpose()
    }

    fn number(&self, name: &str) -> Result<Option<f64>> {
        self.text(name)
            .map(|v| {
                v.parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .ok_or_else(|| Error::validation(format!("`{name}`: `{v}` is not a number")))
            })
            .transpose()
    }

    fn year(&self) -> Result<Option<i32>> {
        self.text("year")
            .map(|v| {
                v.parse::<i32>()
                    .map_err(|_| Error::validation(format!("`year`: `{v}` is not a year")))
            })
            .transpose()
    }

    pub fn draft(&self) -> Result<CaseDraft> {
        Ok(CaseDraft {
            case_number: self.text("caseNumber"),
            year: self.year()?,
            case_type: self.text("caseType"),
            jurisdiction: self.text("jurisdiction"),
            client_name: self.text("clientName"),
            opponent_name: self.text("opponentName"),
            previous_session: self.date("previousSession")?,
            current_session: self.date("currentSession")?,
            postponed_to: self.date("postponedTo")?,
            session_date: self.date("sessionDate")?,
            decision: self.text("decision"),
            request: self.text("request"),
            notes: self.text("notes"),
            admin: self.text("admin"),
            expenses: self.number("expenses")?,
            paid: self.number("paid")?,
            remaining: self.number("remaining")?,
        })
    }

    pub fn patch(&self) -> Result<CasePatch> {
        let version = self
            .text("version")
            .map(|v| {
                v.parse::<u64>()
                    .map_err(|_| Error::validation(format!("`version`: `{v}` is not a version")))
            })
            .transpose()?;
        Ok(CasePatch {
            case_number: self.text_update("caseNumber"),
            year: self.year()?,
            case_type: self.text_update("caseType"),
            jurisdiction: self.text_update("jurisdiction"),
            client_name: self.text_update("clientName"),
            opponent_name: self.text_update("opponentName"),
            previous_session: self.date("previousSession")?,
            current_session: self.date("currentSession")?,
            postponed_to: self.date("postponedTo")?,
            session_date: self.date("sessionDate")?,
            decision: self.text_update("decision"),
            request: self.text_update("request"),
            notes: self.text_update("notes"),
            admin: self.text_update("admin"),
            expenses: self.number("expenses")?,
            paid: self.number("paid")?,
            remaining: self.number("remaining")?,
            version,
        })
    }

    /// External ids the client asked to remove.
    pub fn deleted(&self) -> &[String] {
        &self.deleted
    }
}

pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn deleted_entry(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ["externalId", "public_id", "publicId"]
            .iter()
            .find_map(|k| map.get(*k))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// `deletedImages` is a JSON list of external ids or attachment objects; a
/// bare string that is not JSON is taken as a single external id.
pub fn parse_deleted(text: &str) -> std::result::Result<Vec<String>, ApiError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(vec![]);
    }
    let entries: Vec<String> = match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => items.iter().filter_map(deleted_entry).collect(),
        Ok(value @ (Value::String(_) | Value::Object(_))) => {
            deleted_entry(&value).into_iter().collect()
        }
        Ok(other) => api_bail!("`deletedImages` must be a list, got {other}"),
        Err(_) if !text.starts_with(['[', '{']) => vec![text.to_string()],
        Err(err) => api_bail!("`deletedImages` is not valid JSON: {err}"),
    };
    Ok(entries
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect())
}
