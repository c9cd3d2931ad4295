//! Service configuration.
//!
//! Loaded from an optional YAML file, then overridden by environment variables.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::application::{
    batch_upsert::BatchUpsertEngine,
    comparator::ComparatorSettings,
    conflict_checker::ConflictChecker,
    ingestion_service::IngestionSettings,
};
use crate::domain::{dates::DateContext, headers::SheetRule, models::Role};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    FileRead(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid sheet pattern for {role}: {message}")]
    SheetPattern { role: String, message: String },

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[default]
    Mongodb,
    Sqlite,
}

impl FromStr for DatabaseType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(DatabaseType::Mongodb),
            "sqlite" => Ok(DatabaseType::Sqlite),
            other => Err(ConfigError::InvalidValue("DATABASE_TYPE", other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_type: DatabaseType,
    pub mongodb: MongoConfig,
    pub sqlite: SqliteConfig,
    pub server: ServerConfig,
    pub ingestion: IngestionConfig,
    pub sheets: SheetPatterns,
    pub admins: Vec<AdminCredential>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "ingestion_db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    pub url: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/ingestion.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub max_file_bytes: usize,
    /// Identifiers per lookup query.
    pub lookup_chunk_size: usize,
    pub transaction_timeout_secs: u64,
    pub preview_rows: usize,
    /// Offset that textual instants are shifted into before taking the date.
    pub date_utc_offset_minutes: i32,
    pub max_master_files: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            lookup_chunk_size: 500,
            transaction_timeout_secs: 60,
            preview_rows: 10,
            date_utc_offset_minutes: 0,
            max_master_files: 31,
        }
    }
}

/// Case-insensitive sheet name patterns per sheet role.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SheetPatterns {
    pub bookings: String,
    pub refunds: String,
    pub master: String,
    pub company: String,
}

impl Default for SheetPatterns {
    fn default() -> Self {
        Self {
            bookings: "booking".to_string(),
            refunds: "refund".to_string(),
            master: "^booking$".to_string(),
            company: "^bookings$".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdminCredential {
    pub token: String,
    pub admin_id: i64,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Admin
}

impl AppConfig {
    /// Priority: environment, then `INGESTION_CONFIG` (default `config.yaml`), then defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("INGESTION_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            info!("Loading configuration from {}", config_path);
            Self::from_file(&config_path)?
        } else {
            debug!("No config file at {}, using defaults", config_path);
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Applies overrides from `lookup`, normally the process environment.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(db_type) = lookup("DATABASE_TYPE") {
            self.database_type = db_type.parse()?;
        }
        if let Some(uri) = lookup("MONGODB_URI") {
            self.mongodb.uri = uri;
        }
        if let Some(database) = lookup("MONGODB_DATABASE") {
            self.mongodb.database = database;
        }
        if let Some(url) = lookup("SQLITE_URL") {
            self.sqlite.url = url;
        }
        if let Some(addr) = lookup("BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        // `<token>` or `<token>:<admin_id>`
        if let Some(value) = lookup("ADMIN_TOKEN") {
            let (token, admin_id) = match value.rsplit_once(':') {
                Some((token, id)) => (
                    token.to_string(),
                    id.parse()
                        .map_err(|_| ConfigError::InvalidValue("ADMIN_TOKEN", value.clone()))?,
                ),
                None => (value.clone(), 1),
            };
            self.admins.retain(|admin| admin.token != token);
            self.admins.push(AdminCredential {
                token,
                admin_id,
                role: Role::Admin,
            });
        }
        Ok(())
    }

    pub fn date_context(&self) -> DateContext {
        DateContext::with_offset_minutes(self.ingestion.date_utc_offset_minutes)
    }

    pub fn ingestion_settings(&self) -> Result<IngestionSettings, ConfigError> {
        Ok(IngestionSettings {
            bookings_sheet: sheet_rule("bookings", &self.sheets.bookings)?,
            refunds_sheet: sheet_rule("refunds", &self.sheets.refunds)?,
            preview_rows: self.ingestion.preview_rows,
            dates: self.date_context(),
        })
    }

    pub fn comparator_settings(&self) -> Result<ComparatorSettings, ConfigError> {
        Ok(ComparatorSettings {
            master_sheet: sheet_rule("BOOKING", &self.sheets.master)?,
            company_sheet: sheet_rule("Bookings", &self.sheets.company)?,
            max_master_files: self.ingestion.max_master_files,
            max_file_bytes: self.ingestion.max_file_bytes,
        })
    }

    pub fn upsert_engine(&self) -> BatchUpsertEngine {
        BatchUpsertEngine::new(
            ConflictChecker::new(self.ingestion.lookup_chunk_size),
            Duration::from_secs(self.ingestion.transaction_timeout_secs),
        )
    }
}

fn sheet_rule(role: &str, pattern: &str) -> Result<SheetRule, ConfigError> {
    SheetRule::new(role, pattern).map_err(|e| ConfigError::SheetPattern {
        role: role.to_string(),
        message: e.to_string(),
    })
}
