//! Service configuration: defaults, then an optional TOML file, then
//! `PROCESS_FILE_*` environment variables.
use crate::error::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "PROCESS_FILE_";
pub const DEFAULT_MAX_SIGNATURE_BYTES: usize = 2 * 1024 * 1024;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub database_path: PathBuf,
    /// Root of the document store (artifacts, signatures, seals).
    pub upload_root: PathBuf,
    /// Printed in the card's title block.
    pub company_name: String,
    pub max_signature_bytes: usize,
    /// Limit for uploaded spreadsheets.
    pub max_upload_bytes: usize,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/process-files.db"),
            upload_root: PathBuf::from("uploads"),
            company_name: "注塑车间".to_string(),
            max_signature_bytes: DEFAULT_MAX_SIGNATURE_BYTES,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl ServiceConfig {
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(ServiceConfig::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn load(file: Option<&Path>) -> Result<Self> {
        Ok(Self::figment(file).extract()?)
    }

    pub fn set_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn set_upload_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.upload_root = path.into();
        self
    }

    pub fn set_company_name(mut self, name: &str) -> Self {
        self.company_name = name.to_string();
        self
    }

    /// Installs the tracing subscriber this configuration asks for.
    pub fn init_tracing(&self) {
        if self.log_json {
            crate::telemetry::init_tracing_json(&self.log_level);
        } else {
            crate::telemetry::init_tracing(&self.log_level);
        }
    }
}
