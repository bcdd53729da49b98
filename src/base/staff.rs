use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attachment::Attachment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Subadmin,
    #[default]
    Lawyer,
    Secretary,
}

impl Role {
    /// Cases created by privileged roles skip the approval queue.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Subadmin => "subadmin",
            Role::Lawyer => "lawyer",
            Role::Secretary => "secretary",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "subadmin" => Ok(Role::Subadmin),
            "lawyer" => Ok(Role::Lawyer),
            "secretary" => Ok(Role::Secretary),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

/// The authenticated caller, as identified by the upstream gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    /// Fails with `Forbidden` unless the actor holds one of `roles`.
    pub fn require(&self, roles: &[Role]) -> crate::error::Result<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(crate::error::Error::Forbidden(self.role))
        }
    }
}

/// A lawyer, admin or office staff account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
    pub id: Uuid,
    pub name: String,
    pub registration_number: Option<String>,
    pub registration_level: Option<String>,
    pub national_id: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub image: Option<Attachment>,
    /// Six digits, unique across the store.
    pub registration_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl StaffMember {
    /// Copy suitable for leaving the service: credentials removed.
    pub fn without_secrets(&self) -> StaffMember {
        StaffMember {
            password_hash: None,
            ..self.clone()
        }
    }
}

pub fn generate_registration_code() -> String {
    rand::rng().random_range(100_000..1_000_000u32).to_string()
}
