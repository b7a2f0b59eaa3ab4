//! Workbench configuration
//!
//! Loaded from an optional JSON file, then overridden by `MODELBENCH_*`
//! environment variables. CLI flags override both.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, WorkbenchError};
use crate::state::{MAX_SIDEBAR_WIDTH, MIN_SIDEBAR_WIDTH};

pub const ENV_SETTINGS_DIR: &str = "MODELBENCH_SETTINGS_DIR";
pub const ENV_MANIFESTS_DIR: &str = "MODELBENCH_MANIFESTS_DIR";
pub const ENV_MODELS_DIR: &str = "MODELBENCH_MODELS_DIR";
pub const ENV_HUB_URL: &str = "MODELBENCH_HUB_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbenchConfig {
    /// Where the settings record is stored
    pub settings_dir: PathBuf,
    /// Directory of module manifest JSON files
    pub manifests_dir: PathBuf,
    /// Models folder to connect at startup
    pub models_dir: Option<PathBuf>,
    /// Remote registry base URL
    pub hub_url: String,
    /// (min, max) sidebar width
    pub sidebar_width_bounds: (u32, u32),
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            settings_dir: PathBuf::from(".modelbench"),
            manifests_dir: PathBuf::from("manifests"),
            models_dir: None,
            hub_url: "https://huggingface.co".to_string(),
            sidebar_width_bounds: (MIN_SIDEBAR_WIDTH, MAX_SIDEBAR_WIDTH),
        }
    }
}

impl WorkbenchConfig {
    /// Read `path` if given (missing file = defaults), then apply the
    /// environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let content = fs::read_to_string(path).map_err(|e| WorkbenchError::FileReadError {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                serde_json::from_str(&content)?
            }
            _ => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok());
        debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Apply overrides from a variable lookup; empty values are ignored
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(dir) = get(ENV_SETTINGS_DIR) {
            self.settings_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get(ENV_MANIFESTS_DIR) {
            self.manifests_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get(ENV_MODELS_DIR) {
            self.models_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = get(ENV_HUB_URL) {
            self.hub_url = url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_absent_fields_get_defaults() {
        let mut config = WorkbenchConfig::default();
        config.apply_env(|_| None);
        assert_eq!(config.manifests_dir, PathBuf::from("manifests"));

        let loaded: WorkbenchConfig =
            serde_json::from_str(r#"{"hub_url": "http://mirror.local"}"#).unwrap();
        assert_eq!(loaded.hub_url, "http://mirror.local");
        assert_eq!(loaded.sidebar_width_bounds, (MIN_SIDEBAR_WIDTH, MAX_SIDEBAR_WIDTH));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_MODELS_DIR, "/data/models"),
            (ENV_HUB_URL, "http://localhost:9000"),
            (ENV_SETTINGS_DIR, "  "),
        ]
        .into_iter()
        .collect();
        let mut config = WorkbenchConfig::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.models_dir, Some(PathBuf::from("/data/models")));
        assert_eq!(config.hub_url, "http://localhost:9000");
        assert_eq!(config.settings_dir, PathBuf::from(".modelbench"));
    }

    #[test]
    fn test_load_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("modelbench.json");
        let body = r#"{"manifests_dir": "mods", "sidebar_width_bounds": [200, 500]}"#;
        fs::write(&path, body).unwrap();

        let config = WorkbenchConfig::load(Some(&path)).unwrap();
        assert_eq!(config.sidebar_width_bounds, (200, 500));
        assert!(WorkbenchConfig::load(Some(&temp_dir.path().join("absent.json"))).is_ok());
    }
}
