//! Host/worker message protocol
//!
//! Messages are plain serde types so they can cross a process boundary as
//! JSON; in-process they travel over channels unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{Result, WorkbenchError};
use crate::media::{AudioClip, Raster};
use crate::models::TaskKind;

/// Virtual path -> file content
pub type ModelFiles = BTreeMap<String, Vec<u8>>;

/// A segmentation hint in normalized image coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptPoint {
    pub point: [f64; 2],
    /// 1 = foreground, 0 = background
    pub label: u8,
}

impl PromptPoint {
    /// Coordinates are clamped to `0..=1`; the label must be 0 or 1
    pub fn new(x: f64, y: f64, label: u8) -> Result<Self> {
        if label > 1 {
            return Err(WorkbenchError::InvalidParam {
                param: "label".to_string(),
                reason: format!("expected 0 or 1, got {}", label),
            });
        }
        Ok(Self {
            point: [x.clamp(0.0, 1.0), y.clamp(0.0, 1.0)],
            label,
        })
    }
}

/// What a run operates on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InputPayload {
    Images {
        urls: Vec<String>,
        #[serde(default)]
        points: Vec<PromptPoint>,
    },
    Audio {
        clip: AudioClip,
        filename: String,
    },
}

/// What a run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum OutputPayload {
    Text(String),
    Image(Raster),
    Batch(Vec<Raster>),
}

impl OutputPayload {
    /// Collapse outputs with nothing to show to `None`
    pub fn normalized(self) -> Option<Self> {
        match self {
            OutputPayload::Batch(rasters) if rasters.is_empty() => None,
            other => Some(other),
        }
    }

    /// Wrap handler rasters according to the processing mode
    pub fn from_rasters(mut rasters: Vec<Raster>, batch: bool) -> Option<Self> {
        if batch {
            OutputPayload::Batch(rasters).normalized()
        } else if rasters.is_empty() {
            None
        } else {
            Some(OutputPayload::Image(rasters.swap_remove(0)))
        }
    }

    /// Event-sized description, without pixel data
    pub fn summary(&self) -> Value {
        match self {
            OutputPayload::Text(text) => json!({ "kind": "text", "length": text.chars().count() }),
            OutputPayload::Image(raster) => {
                json!({ "kind": "image", "width": raster.width, "height": raster.height })
            }
            OutputPayload::Batch(rasters) => json!({ "kind": "batch", "count": rasters.len() }),
        }
    }
}

/// Host -> worker `run` request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub run_id: Uuid,
    pub task: TaskKind,
    pub model_id: String,
    pub model_files: ModelFiles,
    pub pipeline_options: Map<String, Value>,
    /// Runtime parameters from the module's configurable params
    pub params: Map<String, Value>,
    pub data: InputPayload,
    /// Whether every input image should produce an output
    pub batch: bool,
}

/// Messages the host sends to the worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HostMessage {
    Run(RunRequest),
    Shutdown,
}

/// Worker reply body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum WorkerReply {
    /// Progress text, informational only
    Status(String),
    Result(Option<OutputPayload>),
    Error(String),
}

/// A reply tagged with the run it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerMessage {
    pub run_id: Uuid,
    #[serde(flatten)]
    pub reply: WorkerReply,
}

impl WorkerMessage {
    pub fn status(run_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            run_id,
            reply: WorkerReply::Status(text.into()),
        }
    }

    pub fn result(run_id: Uuid, output: Option<OutputPayload>) -> Self {
        Self {
            run_id,
            reply: WorkerReply::Result(output),
        }
    }

    pub fn error(run_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            run_id,
            reply: WorkerReply::Error(message.into()),
        }
    }
}
