use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::reconciler::ReconcileConfig;
use crate::similarity::DESCRIPTION_MATCH_THRESHOLD;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    /// Append logs here instead of stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceSettings>,
}

/// One bank feed: the scraper command that prints its batch as JSON, and the
/// balance the account held before its first recorded transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSettings {
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub opening_balance: i64,
    /// Only reconcile the last N days of history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cutoff_days: Option<i64>,
}

fn default_match_threshold() -> f64 {
    DESCRIPTION_MATCH_THRESHOLD
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            log_file: None,
            match_threshold: default_match_threshold(),
            sources: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("tally.db")
    }

    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            match_threshold: self.match_threshold,
        }
    }

    pub fn source(&self, name: &str) -> Result<&SourceSettings> {
        self.sources
            .get(name)
            .ok_or_else(|| TallyError::UnknownSource(name.to_string()))
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("tally")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("share")
        .join("tally")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| TallyError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
