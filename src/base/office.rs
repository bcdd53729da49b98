use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attachment::Attachment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupFrequency {
    Daily,
    #[default]
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactInfo {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub working_hours: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupSettings {
    pub auto_backup: bool,
    pub backup_frequency: BackupFrequency,
    pub last_backup: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaseSettings {
    pub case_number_prefix: String,
    pub auto_generate_case_number: bool,
    pub case_categories: Vec<String>,
}

impl Default for CaseSettings {
    fn default() -> Self {
        Self {
            case_number_prefix: "CASE".to_string(),
            auto_generate_case_number: true,
            case_categories: Vec::new(),
        }
    }
}

/// The singleton office-wide settings document.
///
/// Fields this service does not interpret are kept in `extra` so a restore
/// does not drop them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OfficeSettings {
    pub site_name: String,
    pub site_logo: Option<Attachment>,
    pub contact_info: ContactInfo,
    pub backup_settings: BackupSettings,
    pub case_settings: CaseSettings,
    pub created_by: Option<Uuid>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for OfficeSettings {
    fn default() -> Self {
        Self {
            site_name: "نظام إدارة المكاتب القانونية".to_string(),
            site_logo: None,
            contact_info: ContactInfo::default(),
            backup_settings: BackupSettings::default(),
            case_settings: CaseSettings::default(),
            created_by: None,
            extra: serde_json::Map::new(),
        }
    }
}
