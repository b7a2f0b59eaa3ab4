//! Application state tree
//!
//! Four sections: `system`, `ui`, `models`, `workbench`. The tree is owned
//! by the `StateStore`; everything else only ever sees `&AppState`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::directory::DirectoryHandle;
use crate::inference::{OutputPayload, PromptPoint};
use crate::models::{ModuleManifest, Variant};
use crate::view::ComparisonMode;

/// Default sidebar width in CSS pixels
pub const DEFAULT_SIDEBAR_WIDTH: u32 = 280;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// How staged images are sent to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Every staged image in one run, output is a raster sequence
    Batch,
    /// The first staged image only, output is a single raster
    #[default]
    Iterative,
}

/// Availability of a module's weights on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelAvailability {
    #[default]
    Checking,
    Missing,
    Found,
    Downloading,
}

impl ModelAvailability {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelAvailability::Checking => "checking",
            ModelAvailability::Missing => "missing",
            ModelAvailability::Found => "found",
            ModelAvailability::Downloading => "downloading",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelStatus {
    pub status: ModelAvailability,
    pub discovered_variants: Vec<Variant>,
    pub selected_variant: Option<String>,
}

impl ModelStatus {
    pub fn missing() -> Self {
        Self {
            status: ModelAvailability::Missing,
            ..Self::default()
        }
    }

    pub fn found(variants: Vec<Variant>, selected: Option<String>) -> Self {
        Self {
            status: ModelAvailability::Found,
            discovered_variants: variants,
            selected_variant: selected,
        }
    }

    pub fn is_found(&self) -> bool {
        self.status == ModelAvailability::Found
    }

    pub fn selected(&self) -> Option<&Variant> {
        let name = self.selected_variant.as_deref()?;
        self.discovered_variants.iter().find(|v| v.name == name)
    }
}

/// Download progress for the module currently being fetched
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub module_id: Option<String>,
    /// 1-based index of the file being processed, 0 before the first
    pub current: usize,
    /// 0 until the remote manifest is known
    pub total: usize,
    pub filename: Option<String>,
}

impl DownloadProgress {
    pub fn is_active(&self) -> bool {
        self.module_id.is_some()
    }

    /// Determinate fraction once the total is known
    pub fn fraction(&self) -> Option<f64> {
        (self.total > 0).then(|| self.current as f64 / self.total as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioInput {
    pub url: String,
    pub filename: String,
}

#[derive(Debug, Clone, Default)]
pub struct SystemState {
    pub directory: Option<Arc<dyn DirectoryHandle>>,
    pub gpu_supported: bool,
    pub use_gpu: bool,
    pub theme: Theme,
}

#[derive(Debug, Clone)]
pub struct UiState {
    pub sidebar_width: u32,
    pub is_rendering_workbench: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            sidebar_width: DEFAULT_SIDEBAR_WIDTH,
            is_rendering_workbench: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelsState {
    pub modules: Vec<ModuleManifest>,
    pub model_statuses: HashMap<String, ModelStatus>,
    pub active_module_id: Option<String>,
    pub starred_models: BTreeSet<String>,
    pub model_order: Vec<String>,
    pub collapsed_models: BTreeSet<String>,
    pub download_progress: DownloadProgress,
}

#[derive(Debug, Clone, Default)]
pub struct WorkbenchInput {
    pub image_urls: Vec<String>,
    pub audio: Option<AudioInput>,
    pub points: Vec<PromptPoint>,
}

impl WorkbenchInput {
    pub fn is_empty(&self) -> bool {
        self.image_urls.is_empty() && self.audio.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkbenchOutput {
    pub data: Option<OutputPayload>,
    pub comparison_mode: ComparisonMode,
}

#[derive(Debug, Clone, Default)]
pub struct WorkbenchState {
    pub is_processing: bool,
    pub inference_start_time: Option<DateTime<Utc>>,
    pub inference_duration: Option<Duration>,
    pub runtime_configs: HashMap<String, Map<String, Value>>,
    pub processing_mode: ProcessingMode,
    pub input: WorkbenchInput,
    pub output: WorkbenchOutput,
}

/// Root of the state tree
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub system: SystemState,
    pub ui: UiState,
    pub models: ModelsState,
    pub workbench: WorkbenchState,
}

impl AppState {
    pub fn module(&self, id: &str) -> Option<&ModuleManifest> {
        self.models.modules.iter().find(|m| m.id == id)
    }

    pub fn active_module(&self) -> Option<&ModuleManifest> {
        self.module(self.models.active_module_id.as_deref()?)
    }

    pub fn status_of(&self, id: &str) -> Option<&ModelStatus> {
        self.models.model_statuses.get(id)
    }

    pub fn is_connected(&self) -> bool {
        self.system.directory.is_some()
    }

    /// Device the worker should run on
    pub fn device(&self) -> &'static str {
        if self.system.use_gpu && self.system.gpu_supported {
            "gpu"
        } else {
            "cpu"
        }
    }
}
