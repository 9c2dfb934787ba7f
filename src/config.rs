use crate::errors::{AppError, AppResult};
use std::path::PathBuf;

const API_KEY_VARS: [&str; 2] = ["API_KEY", "GEMINI_API_KEY"];
const DATA_DIR_VAR: &str = "DASHBOARD_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "./.financial-dashboard";
const DB_FILE_NAME: &str = "financial_data.sqlite";

/// Startup configuration. Missing credentials are fatal here rather than at first use.
#[derive(Clone)]
pub struct DashboardConfig {
    pub api_key: String,
    pub data_dir: PathBuf,
}

impl std::fmt::Debug for DashboardConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardConfig")
            .field("api_key", &"[REDACTED]")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl DashboardConfig {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let api_key = API_KEY_VARS
            .iter()
            .filter_map(|key| lookup(key))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
            .ok_or_else(|| AppError::Config("API_KEY environment variable not set".to_string()))?;

        let data_dir = lookup(DATA_DIR_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        Ok(Self { api_key, data_dir })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}
