use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::messages::Locale;

const DEFAULT_CONFIG_FILE: &str = "casevault.toml";
const CONFIG_FILE_ENV: &str = "CASEVAULT_CONFIG";
const ENV_PREFIX: &str = "CASEVAULT";

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub address: String,
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:4300".to_string(),
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DatabaseConnectionSpec {
    /// Postgres URL, or `memory` for the in-process store.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConnectionSpec {
    fn default() -> Self {
        Self {
            url: "memory".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    S3,
    Local,
    #[default]
    Memory,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BlobStoreSettings {
    pub kind: BlobBackend,
    /// Folder (key prefix) case attachments are uploaded under.
    pub folder: String,
    pub timeout_secs: u64,
    pub slow_warn_secs: u64,

    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores.
    pub endpoint: Option<String>,
    pub root: Option<PathBuf>,
    /// Prefix used to build the retrievable locator of an uploaded blob.
    pub public_base_url: Option<String>,
}

impl Default for BlobStoreSettings {
    fn default() -> Self {
        Self {
            kind: BlobBackend::Memory,
            folder: "law-cases".to_string(),
            timeout_secs: 60,
            slow_warn_secs: 10,
            bucket: None,
            region: None,
            endpoint: None,
            root: None,
            public_base_url: None,
        }
    }
}

impl BlobStoreSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn slow_warn_threshold(&self) -> Duration {
        Duration::from_secs(self.slow_warn_secs.max(1))
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct UploadLimits {
    pub max_files_per_request: usize,
    pub max_file_size_bytes: usize,
    /// Content-type prefixes accepted for attachments.
    pub allowed_content_types: Vec<String>,
    pub max_backup_size_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_files_per_request: 5,
            max_file_size_bytes: 7 * 1024 * 1024,
            allowed_content_types: vec!["image/".to_string(), "application/pdf".to_string()],
            max_backup_size_bytes: 50 * 1024 * 1024,
        }
    }
}

impl UploadLimits {
    /// Upper bound for a multipart case request body.
    pub fn max_case_body_bytes(&self) -> usize {
        self.max_files_per_request
            .saturating_mul(self.max_file_size_bytes)
            .saturating_add(1024 * 1024)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseConnectionSpec,
    pub blob_store: BlobStoreSettings,
    pub uploads: UploadLimits,
    pub locale: Locale,
}

impl Settings {
    /// Loads `$CASEVAULT_CONFIG` (or `casevault.toml`) if present, overlaid with
    /// `CASEVAULT__SECTION__KEY` environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::load_from(Some(Path::new(&path)))
    }

    pub fn load_from(file: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file).required(false));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .with_list_parse_key("uploads.allowed_content_types"),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }
}
