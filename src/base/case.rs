use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attachment::Attachment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
        }
    }
}

/// A case file. `images` never holds two attachments with the same external id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: Uuid,
    pub case_number: Option<String>,
    pub year: i32,
    pub case_type: Option<String>,
    pub jurisdiction: Option<String>,
    pub client_name: Option<String>,
    pub opponent_name: Option<String>,

    pub previous_session: Option<DateTime<Utc>>,
    pub current_session: Option<DateTime<Utc>>,
    pub postponed_to: Option<DateTime<Utc>>,
    pub session_date: Option<DateTime<Utc>>,

    pub decision: Option<String>,
    pub request: Option<String>,
    pub notes: Option<String>,
    pub admin: Option<String>,

    pub expenses: Option<f64>,
    pub paid: f64,
    pub remaining: f64,

    /// Staff member who created the case.
    pub created_by: Uuid,
    pub approval_status: ApprovalStatus,
    #[serde(default)]
    pub images: Vec<Attachment>,

    /// Bumped on every successful write; updates compare against it.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a new case. Missing year defaults to the current year, missing
/// paid/remaining to zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseDraft {
    pub case_number: Option<String>,
    pub year: Option<i32>,
    pub case_type: Option<String>,
    pub jurisdiction: Option<String>,
    pub client_name: Option<String>,
    pub opponent_name: Option<String>,
    pub previous_session: Option<DateTime<Utc>>,
    pub current_session: Option<DateTime<Utc>>,
    pub postponed_to: Option<DateTime<Utc>>,
    pub session_date: Option<DateTime<Utc>>,
    pub decision: Option<String>,
    pub request: Option<String>,
    pub notes: Option<String>,
    pub admin: Option<String>,
    pub expenses: Option<f64>,
    pub paid: Option<f64>,
    pub remaining: Option<f64>,
}

/// A partial update. `None` means "leave unchanged" for every field. For text
/// fields `Some("")` clears the value; empty dates and numbers never reach a
/// patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CasePatch {
    pub case_number: Option<String>,
    pub year: Option<i32>,
    pub case_type: Option<String>,
    pub jurisdiction: Option<String>,
    pub client_name: Option<String>,
    pub opponent_name: Option<String>,
    pub previous_session: Option<DateTime<Utc>>,
    pub current_session: Option<DateTime<Utc>>,
    pub postponed_to: Option<DateTime<Utc>>,
    pub session_date: Option<DateTime<Utc>>,
    pub decision: Option<String>,
    pub request: Option<String>,
    pub notes: Option<String>,
    pub admin: Option<String>,
    pub expenses: Option<f64>,
    pub paid: Option<f64>,
    pub remaining: Option<f64>,
    /// Version the client based its edit on.
    pub version: Option<u64>,
}

fn patch_text(target: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value {
        let v = v.trim();
        *target = if v.is_empty() { None } else { Some(v.to_string()) };
    }
}

fn patch_value<T: Copy>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

impl CasePatch {
    pub fn apply_to(&self, case: &mut Case) {
        patch_text(&mut case.case_number, &self.case_number);
        patch_text(&mut case.case_type, &self.case_type);
        patch_text(&mut case.jurisdiction, &self.jurisdiction);
        patch_text(&mut case.client_name, &self.client_name);
        patch_text(&mut case.opponent_name, &self.opponent_name);
        patch_text(&mut case.decision, &self.decision);
        patch_text(&mut case.request, &self.request);
        patch_text(&mut case.notes, &self.notes);
        patch_text(&mut case.admin, &self.admin);

        patch_value(&mut case.previous_session, self.previous_session);
        patch_value(&mut case.current_session, self.current_session);
        patch_value(&mut case.postponed_to, self.postponed_to);
        patch_value(&mut case.session_date, self.session_date);
        patch_value(&mut case.expenses, self.expenses);

        if let Some(year) = self.year {
            case.year = year;
        }
        if let Some(paid) = self.paid {
            case.paid = paid;
        }
        if let Some(remaining) = self.remaining {
            case.remaining = remaining;
        }
    }
}

/// Which approval states a listing shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusScope {
    #[default]
    Approved,
    Pending,
    All,
}

impl StatusScope {
    pub fn admits(self, status: ApprovalStatus) -> bool {
        match self {
            StatusScope::All => true,
            StatusScope::Approved => status == ApprovalStatus::Approved,
            StatusScope::Pending => status == ApprovalStatus::Pending,
        }
    }

    pub fn status(self) -> Option<ApprovalStatus> {
        match self {
            StatusScope::All => None,
            StatusScope::Approved => Some(ApprovalStatus::Approved),
            StatusScope::Pending => Some(ApprovalStatus::Pending),
        }
    }
}

/// Search criteria for case listings. Text terms match case-insensitive
/// substrings; dates match the whole UTC day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseFilter {
    pub case_number: Option<String>,
    pub client_name: Option<String>,
    pub opponent_name: Option<String>,
    pub case_type: Option<String>,
    pub jurisdiction: Option<String>,
    pub year: Option<i32>,
    pub session_date: Option<NaiveDate>,
    pub postponed_to: Option<NaiveDate>,
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

fn on_day(value: Option<DateTime<Utc>>, day: NaiveDate) -> bool {
    value.is_some_and(|v| v.date_naive() == day)
}

impl CaseFilter {
    /// Non-empty text terms paired with the JSON field they apply to.
    pub fn text_terms(&self) -> Vec<(&'static str, &str)> {
        [
            ("caseNumber", &self.case_number),
            ("clientName", &self.client_name),
            ("opponentName", &self.opponent_name),
            ("caseType", &self.case_type),
            ("jurisdiction", &self.jurisdiction),
        ]
        .into_iter()
        .filter_map(|(field, term)| {
            let term = term.as_deref()?.trim();
            (!term.is_empty()).then_some((field, term))
        })
        .collect()
    }

    pub fn matches(&self, case: &Case) -> bool {
        let text_ok = self.text_terms().into_iter().all(|(field, term)| {
            let value = match field {
                "caseNumber" => case.case_number.as_deref(),
                "clientName" => case.client_name.as_deref(),
                "opponentName" => case.opponent_name.as_deref(),
                "caseType" => case.case_type.as_deref(),
                _ => case.jurisdiction.as_deref(),
            };
            contains_ci(value, term)
        });
        text_ok
            && self.year.is_none_or(|y| case.year == y)
            && self.session_date.is_none_or(|d| on_day(case.session_date, d))
            && self.postponed_to.is_none_or(|d| on_day(case.postponed_to, d))
    }
}
