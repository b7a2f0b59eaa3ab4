//! Module manifests
//!
//! A manifest describes one selectable task/model family. Manifests are
//! loaded once at startup from a directory of JSON files.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, WorkbenchError};

/// Task a module performs; selects the worker's postprocessing handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    DepthEstimation,
    BackgroundRemoval,
    ImageSegmentation,
    PromptSegmentation,
    Upscaling,
    SpeechRecognition,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DepthEstimation => "depth-estimation",
            Self::BackgroundRemoval => "background-removal",
            Self::ImageSegmentation => "image-segmentation",
            Self::PromptSegmentation => "prompt-segmentation",
            Self::Upscaling => "upscaling",
            Self::SpeechRecognition => "speech-recognition",
        }
    }

    /// Whether the task consumes audio rather than images
    pub fn takes_audio(&self) -> bool {
        matches!(self, Self::SpeechRecognition)
    }

    /// Maximum number of staged images, if limited
    pub fn max_images(&self) -> Option<usize> {
        match self {
            Self::PromptSegmentation => Some(1),
            Self::SpeechRecognition => Some(0),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-adjustable runtime parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub kind: ParamKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamKind {
    Slider {
        min: f64,
        max: f64,
        #[serde(default)]
        step: Option<f64>,
        default: f64,
    },
    Checkbox {
        default: bool,
    },
    Select {
        options: Vec<Value>,
        default: Value,
    },
}

impl ParamSpec {
    pub fn default_value(&self) -> Value {
        match &self.kind {
            ParamKind::Slider { default, .. } => Value::from(*default),
            ParamKind::Checkbox { default } => Value::Bool(*default),
            ParamKind::Select { default, .. } => default.clone(),
        }
    }

    /// Validate and normalize a user value (sliders are clamped and snapped)
    pub fn normalize(&self, value: &Value) -> Result<Value> {
        let invalid = |reason: &str| WorkbenchError::InvalidParam {
            param: self.id.clone(),
            reason: reason.to_string(),
        };

        match &self.kind {
            ParamKind::Slider { min, max, step, .. } => {
                let v = value.as_f64().ok_or_else(|| invalid("expected a number"))?;
                let mut v = v.clamp(*min, *max);
                if let Some(step) = step.filter(|s| *s > 0.0) {
                    v = (min + ((v - min) / step).round() * step).clamp(*min, *max);
                }
                Ok(Value::from(v))
            }
            ParamKind::Checkbox { .. } => value
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| invalid("expected true or false")),
            ParamKind::Select { options, .. } => {
                if options.contains(value) {
                    Ok(value.clone())
                } else {
                    Err(invalid("not one of the allowed options"))
                }
            }
        }
    }
}

/// Declarative description of one selectable model module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Model identifier, `<namespace>/<repository>`
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub task: TaskKind,
    #[serde(default)]
    pub configurable_params: Vec<ParamSpec>,
    /// Non-binary files the pipeline needs besides the weights
    #[serde(default)]
    pub config_files: Vec<String>,
    /// Named UI component references (input panel, output panel, ...)
    #[serde(default)]
    pub ui_components: BTreeMap<String, String>,
    #[serde(default = "default_output_filename")]
    pub default_output_filename: String,
}

fn default_output_filename() -> String {
    "output.png".to_string()
}

impl ModuleManifest {
    /// Repository segment of the id (the part after the namespace separator)
    pub fn repo_segment(&self) -> &str {
        self.id
            .split_once('/')
            .map(|(_, repo)| repo)
            .unwrap_or(&self.id)
    }

    pub fn param(&self, id: &str) -> Option<&ParamSpec> {
        self.configurable_params.iter().find(|p| p.id == id)
    }
}

/// Load every `*.json` manifest in `dir`, ordered by file name
pub fn load_manifests(dir: &Path) -> Result<Vec<ModuleManifest>> {
    let mut paths: Vec<_> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    paths.sort();

    let mut manifests = Vec::with_capacity(paths.len());
    for path in paths {
        let content = fs::read_to_string(&path).map_err(|e| WorkbenchError::FileReadError {
            path: path.clone(),
            source: e,
        })?;
        match serde_json::from_str::<ModuleManifest>(&content) {
            Ok(manifest) => {
                debug!(module = %manifest.id, "loaded manifest");
                manifests.push(manifest);
            }
            Err(e) => warn!(file = %path.display(), error = %e, "skipping invalid manifest"),
        }
    }
    Ok(manifests)
}
