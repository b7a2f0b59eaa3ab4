//! Per-task postprocessing
//!
//! Engines return raw tensors, rasters or text. A `TaskHandler` registered
//! for the module's task turns that into something the workbench can show.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, ensure};
use serde_json::{Map, Value};

use super::protocol::OutputPayload;
use crate::media::Raster;
use crate::models::TaskKind;

/// A dense f32 tensor
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub dims: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(dims: Vec<usize>, data: Vec<f32>) -> Self {
        Self { dims, data }
    }

    /// Trailing (height, width) of the tensor
    fn plane(&self) -> anyhow::Result<(usize, usize)> {
        let n = self.dims.len();
        ensure!(n >= 2, "tensor of rank {} has no spatial plane", n);
        let (h, w) = (self.dims[n - 2], self.dims[n - 1]);
        ensure!(
            h * w > 0 && self.data.len() % (h * w) == 0,
            "tensor data does not match dims {:?}",
            self.dims
        );
        Ok((h, w))
    }
}

/// Raw output of a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutput {
    Text(String),
    Tensors(Vec<Tensor>),
    Rasters(Vec<Raster>),
}

/// Postprocessed output, before batch/iterative wrapping
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    Text(String),
    Rasters(Vec<Raster>),
}

impl Processed {
    pub fn into_payload(self, batch: bool) -> Option<OutputPayload> {
        match self {
            Processed::Text(text) => Some(OutputPayload::Text(text)),
            Processed::Rasters(rasters) => OutputPayload::from_rasters(rasters, batch),
        }
    }
}

/// Postprocessing for one task
pub trait TaskHandler: Send + Sync {
    fn task(&self) -> TaskKind;

    fn postprocess(
        &self,
        output: EngineOutput,
        params: &Map<String, Value>,
    ) -> anyhow::Result<Processed>;
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn rasters_only(output: EngineOutput, task: TaskKind) -> anyhow::Result<Vec<Raster>> {
    match output {
        EngineOutput::Rasters(rasters) => Ok(rasters),
        other => bail!("{} expects image output, got {}", task, kind_of(&other)),
    }
}

fn kind_of(output: &EngineOutput) -> &'static str {
    match output {
        EngineOutput::Text(_) => "text",
        EngineOutput::Tensors(_) => "tensors",
        EngineOutput::Rasters(_) => "rasters",
    }
}

/// Depth maps, min-max normalized to grayscale (near = bright)
#[derive(Debug, Default)]
pub struct DepthHandler;

impl TaskHandler for DepthHandler {
    fn task(&self) -> TaskKind {
        TaskKind::DepthEstimation
    }

    fn postprocess(
        &self,
        output: EngineOutput,
        params: &Map<String, Value>,
    ) -> anyhow::Result<Processed> {
        let tensors = match output {
            EngineOutput::Tensors(tensors) => tensors,
            other => return rasters_only(other, self.task()).map(Processed::Rasters),
        };
        let invert = params.get("invert").and_then(Value::as_bool).unwrap_or(false);

        let mut rasters = Vec::new();
        for tensor in &tensors {
            let (h, w) = tensor.plane()?;
            for plane in tensor.data.chunks(h * w) {
                let (min, max) = plane
                    .iter()
                    .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                        (lo.min(*v), hi.max(*v))
                    });
                let range = if max > min { max - min } else { 1.0 };
                let mut raster = Raster::new(w as u32, h as u32);
                for (i, v) in plane.iter().enumerate() {
                    let mut level = (v - min) / range;
                    if invert {
                        level = 1.0 - level;
                    }
                    let g = to_byte(level);
                    raster.set_pixel((i % w) as u32, (i / w) as u32, [g, g, g, 255]);
                }
                rasters.push(raster);
            }
        }
        Ok(Processed::Rasters(rasters))
    }
}

fn mask_raster(plane: &[f32], w: usize, h: usize, threshold: Option<f32>) -> Raster {
    let mut raster = Raster::new(w as u32, h as u32);
    for (i, v) in plane.iter().enumerate() {
        let alpha = match threshold {
            Some(t) => {
                if *v >= t {
                    255
                } else {
                    0
                }
            }
            None => to_byte(*v),
        };
        raster.set_pixel((i % w) as u32, (i / w) as u32, [255, 255, 255, alpha]);
    }
    raster
}

fn threshold_param(params: &Map<String, Value>) -> Option<f32> {
    params.get("threshold").and_then(Value::as_f64).map(|t| t as f32)
}

/// Foreground masks as RGBA alpha, one raster per mask plane
#[derive(Debug)]
pub struct MaskHandler {
    task: TaskKind,
}

impl MaskHandler {
    pub fn new(task: TaskKind) -> Self {
        Self { task }
    }
}

impl TaskHandler for MaskHandler {
    fn task(&self) -> TaskKind {
        self.task
    }

    fn postprocess(
        &self,
        output: EngineOutput,
        params: &Map<String, Value>,
    ) -> anyhow::Result<Processed> {
        let tensors = match output {
            EngineOutput::Tensors(tensors) => tensors,
            other => return rasters_only(other, self.task).map(Processed::Rasters),
        };
        let threshold = threshold_param(params);

        let mut rasters = Vec::new();
        for tensor in &tensors {
            let (h, w) = tensor.plane()?;
            rasters.extend(
                tensor
                    .data
                    .chunks(h * w)
                    .map(|plane| mask_raster(plane, w, h, threshold)),
            );
        }
        Ok(Processed::Rasters(rasters))
    }
}

/// Point-prompted segmentation: the best-scoring mask of the first tensor.
///
/// An optional second tensor carries one score per mask plane.
#[derive(Debug, Default)]
pub struct PromptMaskHandler;

impl TaskHandler for PromptMaskHandler {
    fn task(&self) -> TaskKind {
        TaskKind::PromptSegmentation
    }

    fn postprocess(
        &self,
        output: EngineOutput,
        params: &Map<String, Value>,
    ) -> anyhow::Result<Processed> {
        let tensors = match output {
            EngineOutput::Tensors(tensors) => tensors,
            other => return rasters_only(other, self.task()).map(Processed::Rasters),
        };
        let masks = tensors.first().ok_or_else(|| anyhow!("no mask tensor"))?;
        let (h, w) = masks.plane()?;
        let planes: Vec<&[f32]> = masks.data.chunks(h * w).collect();
        ensure!(!planes.is_empty(), "mask tensor has no planes: dims {:?}", masks.dims);

        let best = match tensors.get(1) {
            Some(scores) if scores.data.len() == planes.len() => scores
                .data
                .iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(bi, bs), (i, s)| {
                    if *s > bs {
                        (i, *s)
                    } else {
                        (bi, bs)
                    }
                })
                .0,
            _ => 0,
        };

        let threshold = threshold_param(params).or(Some(0.0));
        Ok(Processed::Rasters(vec![mask_raster(planes[best], w, h, threshold)]))
    }
}

/// Super-resolution: CHW float tensors in `0..=1` become RGB rasters
#[derive(Debug, Default)]
pub struct UpscaleHandler;

impl TaskHandler for UpscaleHandler {
    fn task(&self) -> TaskKind {
        TaskKind::Upscaling
    }

    fn postprocess(
        &self,
        output: EngineOutput,
        _params: &Map<String, Value>,
    ) -> anyhow::Result<Processed> {
        let tensors = match output {
            EngineOutput::Tensors(tensors) => tensors,
            other => return rasters_only(other, self.task()).map(Processed::Rasters),
        };

        let mut rasters = Vec::new();
        for tensor in &tensors {
            let (h, w) = tensor.plane()?;
            let plane = h * w;
            ensure!(
                tensor.data.len() % (3 * plane) == 0,
                "upscaler output is not 3-channel: dims {:?}",
                tensor.dims
            );
            for image in tensor.data.chunks(3 * plane) {
                let mut raster = Raster::new(w as u32, h as u32);
                for i in 0..plane {
                    let rgb = [
                        to_byte(image[i]),
                        to_byte(image[plane + i]),
                        to_byte(image[2 * plane + i]),
                    ];
                    raster.set_pixel((i % w) as u32, (i / w) as u32, [rgb[0], rgb[1], rgb[2], 255]);
                }
                rasters.push(raster);
            }
        }
        Ok(Processed::Rasters(rasters))
    }
}

/// Speech recognition: the transcript, trimmed
#[derive(Debug, Default)]
pub struct TranscriptHandler;

impl TaskHandler for TranscriptHandler {
    fn task(&self) -> TaskKind {
        TaskKind::SpeechRecognition
    }

    fn postprocess(
        &self,
        output: EngineOutput,
        _params: &Map<String, Value>,
    ) -> anyhow::Result<Processed> {
        match output {
            EngineOutput::Text(text) => Ok(Processed::Text(text.trim().to_string())),
            other => bail!("speech recognition expects text output, got {}", kind_of(&other)),
        }
    }
}

/// Task -> handler table
pub struct TaskRegistry {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with a handler for every built-in task
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DepthHandler));
        registry.register(Arc::new(MaskHandler::new(TaskKind::BackgroundRemoval)));
        registry.register(Arc::new(MaskHandler::new(TaskKind::ImageSegmentation)));
        registry.register(Arc::new(PromptMaskHandler));
        registry.register(Arc::new(UpscaleHandler));
        registry.register(Arc::new(TranscriptHandler));
        registry
    }

    /// Register a handler, replacing any previous one for its task
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.task(), handler);
    }

    pub fn get(&self, task: TaskKind) -> anyhow::Result<Arc<dyn TaskHandler>> {
        self.handlers
            .get(&task)
            .cloned()
            .ok_or_else(|| anyhow!("no handler registered for task {}", task))
    }

    pub fn has_handler(&self, task: TaskKind) -> bool {
        self.handlers.contains_key(&task)
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
