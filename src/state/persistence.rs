//! Settings persistence
//!
//! A subset of the state tree is stored as one JSON record under a fixed
//! key. The record is loaded once at startup and rewritten wholesale
//! whenever one of the persisted fields changes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::app_state::{AppState, ProcessingMode, Theme, DEFAULT_SIDEBAR_WIDTH};
use super::bus::Topic;
use super::store::StateStore;
use crate::error::{Result, WorkbenchError};

/// Key of the settings record
pub const SETTINGS_KEY: &str = "modelbench-settings";

/// Topics whose changes rewrite the settings record
pub const PERSISTED_TOPICS: &[Topic] = &[
    Topic::ThemeChanged,
    Topic::SidebarWidthChanged,
    Topic::UseGpuChanged,
    Topic::ProcessingModeChanged,
    Topic::StarredModelsChanged,
    Topic::ModelOrderChanged,
    Topic::CollapsedModelsChanged,
];

/// Durable key-value store
pub trait SettingsBackend: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// Stores each key as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl SettingsBackend for JsonFileBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| WorkbenchError::FileReadError { path, source: e })
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|e| WorkbenchError::DirectoryCreateError {
                path: self.dir.clone(),
                source: e,
            })?;
        }
        let path = self.path_for(key);
        fs::write(&path, value).map_err(|e| WorkbenchError::FileWriteError { path, source: e })
    }
}

/// The persisted settings record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistedSettings {
    pub theme: Theme,
    pub sidebar_width: u32,
    pub use_gpu: bool,
    pub processing_mode: ProcessingMode,
    pub starred_models: Vec<String>,
    pub model_order: Vec<String>,
    pub collapsed_models: Vec<String>,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            sidebar_width: DEFAULT_SIDEBAR_WIDTH,
            use_gpu: true,
            processing_mode: ProcessingMode::default(),
            starred_models: Vec::new(),
            model_order: Vec::new(),
            collapsed_models: Vec::new(),
        }
    }
}

impl PersistedSettings {
    /// Snapshot the persisted subset of `state`
    pub fn from_state(state: &AppState) -> Self {
        Self {
            theme: state.system.theme,
            sidebar_width: state.ui.sidebar_width,
            use_gpu: state.system.use_gpu,
            processing_mode: state.workbench.processing_mode,
            starred_models: state.models.starred_models.iter().cloned().collect(),
            model_order: state.models.model_order.clone(),
            collapsed_models: state.models.collapsed_models.iter().cloned().collect(),
        }
    }
}

/// Loads and saves the settings record around a `StateStore`
#[derive(Clone)]
pub struct PersistenceService {
    backend: Arc<dyn SettingsBackend>,
}

impl PersistenceService {
    pub fn new(backend: Arc<dyn SettingsBackend>) -> Self {
        Self { backend }
    }

    /// Read the stored record; unreadable records count as absent
    pub fn load(&self) -> Option<PersistedSettings> {
        let raw = match self.backend.load(SETTINGS_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "failed to read settings");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!(error = %e, "ignoring malformed settings record");
                None
            }
        }
    }

    /// Apply the stored record to `store`.
    ///
    /// Without a record, defaults apply and every loaded module starts
    /// collapsed. Returns whether a record was found.
    pub fn hydrate(&self, store: &mut StateStore) -> bool {
        let (settings, found) = match self.load() {
            Some(settings) => (settings, true),
            None => {
                let mut settings = PersistedSettings::default();
                settings.collapsed_models = store
                    .state()
                    .models
                    .modules
                    .iter()
                    .map(|m| m.id.clone())
                    .collect();
                (settings, false)
            }
        };
        info!(found, "restoring settings");
        store.restore_settings(settings);
        found
    }

    /// Rewrite the record from `state`
    pub fn save(&self, state: &AppState) -> Result<()> {
        let settings = PersistedSettings::from_state(state);
        let raw = serde_json::to_string_pretty(&settings)?;
        self.backend.save(SETTINGS_KEY, &raw)
    }

    /// Subscribe to every persisted topic so changes are written through
    pub fn attach(&self, store: &StateStore) {
        for topic in PERSISTED_TOPICS {
            let service = self.clone();
            store.subscribe(*topic, move |state, event| {
                debug!(topic = %event.topic, "persisting settings");
                if let Err(e) = service.save(state) {
                    warn!(error = %e, "failed to persist settings");
                }
            });
        }
    }
}
