//! State store
//!
//! Owns the `AppState` tree. Every change goes through a named operation
//! that validates, mutates, then publishes exactly one event. Operations
//! that would not change anything return early without publishing.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::app_state::{
    AppState, AudioInput, DownloadProgress, ModelAvailability, ModelStatus, ProcessingMode, Theme,
};
use super::bus::{Event, EventBus, Topic};
use super::persistence::PersistedSettings;
use crate::directory::DirectoryHandle;
use crate::error::{Result, WorkbenchError};
use crate::inference::{OutputPayload, PromptPoint};
use crate::models::{choose_selected, ModuleManifest};
use crate::view::ComparisonMode;

/// Narrowest sidebar the layout allows
pub const MIN_SIDEBAR_WIDTH: u32 = 180;

/// Widest sidebar the layout allows
pub const MAX_SIDEBAR_WIDTH: u32 = 640;

/// Single owner of the application state
#[derive(Debug)]
pub struct StateStore {
    state: AppState,
    bus: Arc<EventBus<AppState>>,
    sidebar_bounds: (u32, u32),
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            state: AppState::default(),
            bus: Arc::new(EventBus::new()),
            sidebar_bounds: (MIN_SIDEBAR_WIDTH, MAX_SIDEBAR_WIDTH),
        }
    }

    /// Override the sidebar clamp range
    pub fn with_sidebar_bounds(mut self, min: u32, max: u32) -> Self {
        self.sidebar_bounds = (min.min(max), max.max(min));
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn bus(&self) -> Arc<EventBus<AppState>> {
        Arc::clone(&self.bus)
    }

    pub fn subscribe<F>(&self, topic: Topic, listener: F)
    where
        F: Fn(&AppState, &Event) + Send + Sync + 'static,
    {
        self.bus.subscribe(topic, listener);
    }

    fn emit(&self, topic: Topic, payload: Value) {
        debug!(%topic, "publish");
        self.bus.publish(&self.state, &Event::new(topic, payload));
    }

    fn emit_keyed(&self, topic: Topic, key: &str, value: Value) {
        debug!(%topic, key, "publish");
        self.bus.publish(&self.state, &Event::keyed(topic, key, value));
    }

    fn require_module(&self, id: &str) -> Result<&ModuleManifest> {
        self.state
            .module(id)
            .ok_or_else(|| WorkbenchError::UnknownModule { id: id.to_string() })
    }

    // ========================================================================
    // System
    // ========================================================================

    pub fn connect_directory(&mut self, handle: Arc<dyn DirectoryHandle>) {
        let name = handle.name().to_string();
        self.state.system.directory = Some(handle);
        self.emit(Topic::DirectoryChanged, json!({ "connected": true, "name": name }));
    }

    pub fn disconnect_directory(&mut self) {
        if self.state.system.directory.take().is_none() {
            return;
        }
        self.emit(Topic::DirectoryChanged, json!({ "connected": false }));
    }

    pub fn set_gpu_supported(&mut self, supported: bool) {
        if self.state.system.gpu_supported == supported {
            return;
        }
        self.state.system.gpu_supported = supported;
        self.emit(Topic::GpuSupportChanged, Value::Bool(supported));
    }

    pub fn set_use_gpu(&mut self, use_gpu: bool) {
        if self.state.system.use_gpu == use_gpu {
            return;
        }
        self.state.system.use_gpu = use_gpu;
        self.emit(Topic::UseGpuChanged, Value::Bool(use_gpu));
    }

    pub fn set_theme(&mut self, theme: Theme) {
        if self.state.system.theme == theme {
            return;
        }
        self.state.system.theme = theme;
        self.emit(Topic::ThemeChanged, json!(theme));
    }

    pub fn toggle_theme(&mut self) -> Theme {
        let theme = self.state.system.theme.toggled();
        self.set_theme(theme);
        theme
    }

    // ========================================================================
    // UI
    // ========================================================================

    /// Set the sidebar width, clamped to the configured bounds
    pub fn set_sidebar_width(&mut self, width: u32) -> u32 {
        let (min, max) = self.sidebar_bounds;
        let width = width.clamp(min, max);
        if self.state.ui.sidebar_width != width {
            self.state.ui.sidebar_width = width;
            self.emit(Topic::SidebarWidthChanged, Value::from(width));
        }
        width
    }

    pub fn set_rendering_workbench(&mut self, rendering: bool) {
        if self.state.ui.is_rendering_workbench == rendering {
            return;
        }
        self.state.ui.is_rendering_workbench = rendering;
        self.emit(Topic::WorkbenchRenderingChanged, Value::Bool(rendering));
    }

    // ========================================================================
    // Models
    // ========================================================================

    /// Install the module manifests. An active module that is no longer
    /// present is cleared.
    pub fn load_modules(&mut self, modules: Vec<ModuleManifest>) {
        let ids: Vec<String> = modules.iter().map(|m| m.id.clone()).collect();
        self.state.models.modules = modules;
        if let Some(active) = &self.state.models.active_module_id {
            if !ids.contains(active) {
                self.state.models.active_module_id = None;
            }
        }
        self.emit(Topic::ModulesLoaded, json!(ids));
    }

    /// Replace a module's availability record.
    ///
    /// A `found` status always carries a selection that names one of its
    /// variants (the first one if the given selection is stale).
    pub fn update_model_status(&mut self, module_id: &str, mut status: ModelStatus) -> Result<()> {
        self.require_module(module_id)?;
        if status.status == ModelAvailability::Found {
            status.selected_variant =
                choose_selected(status.selected_variant.as_deref(), &status.discovered_variants);
        }
        let value = serde_json::to_value(&status)?;
        self.state
            .models
            .model_statuses
            .insert(module_id.to_string(), status);
        self.emit_keyed(Topic::ModelStatusChanged, module_id, value);
        Ok(())
    }

    /// Select a discovered variant by name
    pub fn select_variant(&mut self, module_id: &str, variant: &str) -> Result<bool> {
        let status = self
            .state
            .models
            .model_statuses
            .get_mut(module_id)
            .ok_or_else(|| WorkbenchError::UnknownModule {
                id: module_id.to_string(),
            })?;
        if !status.discovered_variants.iter().any(|v| v.name == variant) {
            return Err(WorkbenchError::UnknownVariant {
                module: module_id.to_string(),
                variant: variant.to_string(),
            });
        }
        if status.selected_variant.as_deref() == Some(variant) {
            return Ok(false);
        }
        status.selected_variant = Some(variant.to_string());
        let value = serde_json::to_value(&*status)?;
        self.emit_keyed(Topic::ModelStatusChanged, module_id, value);
        Ok(true)
    }

    /// Change the active module and reset the workbench.
    ///
    /// Returns `false` when the module was already active.
    pub fn set_active_module(&mut self, module_id: Option<&str>) -> Result<bool> {
        if let Some(id) = module_id {
            self.require_module(id)?;
        }
        if self.state.models.active_module_id.as_deref() == module_id {
            return Ok(false);
        }

        self.state.models.active_module_id = module_id.map(str::to_string);
        let workbench = &mut self.state.workbench;
        workbench.input = Default::default();
        workbench.output = Default::default();
        self.emit(Topic::ActiveModuleChanged, json!(module_id));
        Ok(true)
    }

    /// Toggle a star; returns whether the module is now starred
    pub fn toggle_starred(&mut self, module_id: &str) -> bool {
        let starred = &mut self.state.models.starred_models;
        let now_starred = if starred.remove(module_id) {
            false
        } else {
            starred.insert(module_id.to_string());
            true
        };
        self.emit_keyed(Topic::StarredModelsChanged, module_id, Value::Bool(now_starred));
        now_starred
    }

    /// Toggle collapse; returns whether the module is now collapsed
    pub fn toggle_collapsed(&mut self, module_id: &str) -> bool {
        let collapsed = &mut self.state.models.collapsed_models;
        let now_collapsed = if collapsed.remove(module_id) {
            false
        } else {
            collapsed.insert(module_id.to_string());
            true
        };
        self.emit_keyed(
            Topic::CollapsedModelsChanged,
            module_id,
            Value::Bool(now_collapsed),
        );
        now_collapsed
    }

    /// Replace the sidebar ordering; duplicate ids keep their first position
    pub fn set_model_order(&mut self, order: Vec<String>) {
        let mut deduped: Vec<String> = Vec::with_capacity(order.len());
        for id in order {
            if !deduped.contains(&id) {
                deduped.push(id);
            }
        }
        if self.state.models.model_order == deduped {
            return;
        }
        self.state.models.model_order = deduped;
        self.emit(Topic::ModelOrderChanged, json!(self.state.models.model_order));
    }

    /// Move one module to `index` within the displayed order
    pub fn move_model(&mut self, module_id: &str, index: usize) -> Result<()> {
        self.require_module(module_id)?;
        let mut order: Vec<String> = self
            .ordered_modules()
            .into_iter()
            .map(|m| m.id.clone())
            .filter(|id| id != module_id)
            .collect();
        order.insert(index.min(order.len()), module_id.to_string());
        self.set_model_order(order);
        Ok(())
    }

    /// Modules in display order: `model_order` first, then the rest in
    /// manifest order
    pub fn ordered_modules(&self) -> Vec<&ModuleManifest> {
        let models = &self.state.models;
        let mut ordered: Vec<&ModuleManifest> = models
            .model_order
            .iter()
            .filter_map(|id| self.state.module(id))
            .collect();
        for module in &models.modules {
            if !models.model_order.contains(&module.id) {
                ordered.push(module);
            }
        }
        ordered
    }

    pub fn set_download_progress(&mut self, progress: DownloadProgress) {
        let value = json!(progress);
        self.state.models.download_progress = progress;
        self.emit(Topic::DownloadProgressChanged, value);
    }

    // ========================================================================
    // Workbench
    // ========================================================================

    pub fn set_processing(&mut self, processing: bool) {
        if self.state.workbench.is_processing == processing {
            return;
        }
        self.state.workbench.is_processing = processing;
        self.emit(Topic::ProcessingChanged, Value::Bool(processing));
    }

    /// Record the dispatch time of a run
    pub fn begin_inference_timer(&mut self) {
        let now = Utc::now();
        self.state.workbench.inference_start_time = Some(now);
        self.state.workbench.inference_duration = None;
        self.emit(
            Topic::InferenceTimingChanged,
            json!({ "start": now.to_rfc3339(), "durationMs": null }),
        );
    }

    /// Record the elapsed time since `begin_inference_timer`
    pub fn finish_inference_timer(&mut self) {
        let Some(start) = self.state.workbench.inference_start_time else {
            return;
        };
        let elapsed = (Utc::now() - start).to_std().unwrap_or_default();
        self.state.workbench.inference_duration = Some(elapsed);
        self.emit(
            Topic::InferenceTimingChanged,
            json!({ "start": start.to_rfc3339(), "durationMs": elapsed.as_millis() as u64 }),
        );
    }

    /// Set one runtime parameter after validating it against the manifest
    pub fn set_runtime_param(
        &mut self,
        module_id: &str,
        param_id: &str,
        value: Value,
    ) -> Result<Value> {
        let spec = self
            .require_module(module_id)?
            .param(param_id)
            .ok_or_else(|| WorkbenchError::InvalidParam {
                param: param_id.to_string(),
                reason: "unknown parameter".to_string(),
            })?;
        let value = spec.normalize(&value)?;

        let config = self
            .state
            .workbench
            .runtime_configs
            .entry(module_id.to_string())
            .or_default();
        if config.get(param_id) == Some(&value) {
            return Ok(value);
        }
        config.insert(param_id.to_string(), value.clone());
        self.emit(
            Topic::RuntimeConfigChanged,
            json!({ "module": module_id, "key": param_id, "value": value }),
        );
        Ok(value)
    }

    /// Manifest defaults overlaid with the user's values
    pub fn runtime_config_for(&self, module_id: &str) -> Map<String, Value> {
        let mut config = Map::new();
        if let Some(module) = self.state.module(module_id) {
            for param in &module.configurable_params {
                config.insert(param.id.clone(), param.default_value());
            }
        }
        if let Some(overrides) = self.state.workbench.runtime_configs.get(module_id) {
            for (key, value) in overrides {
                config.insert(key.clone(), value.clone());
            }
        }
        config
    }

    pub fn set_processing_mode(&mut self, mode: ProcessingMode) {
        if self.state.workbench.processing_mode == mode {
            return;
        }
        self.state.workbench.processing_mode = mode;
        self.emit(Topic::ProcessingModeChanged, json!(mode));
    }

    /// Stage image inputs. Clears prompt points; clearing every image also
    /// drops comparison mode back to `None`.
    ///
    /// Rejected with an alert when the active module accepts fewer images.
    pub fn set_image_inputs(&mut self, urls: Vec<String>) -> Result<()> {
        if let Some(max) = self.state.active_module().and_then(|m| m.task.max_images()) {
            if urls.len() > max {
                let err = WorkbenchError::TooManyInputs { max };
                self.alert(&err.friendly_message());
                return Err(err);
            }
        }
        let value = json!(urls);
        if urls.is_empty() {
            self.state.workbench.output.comparison_mode = ComparisonMode::None;
        }
        let input = &mut self.state.workbench.input;
        input.image_urls = urls;
        input.points.clear();
        self.emit(Topic::ImageInputsChanged, value);
        Ok(())
    }

    /// Stage (or clear) the audio input. Clears prompt points.
    pub fn set_audio_input(&mut self, audio: Option<AudioInput>) {
        let value = json!(audio);
        let input = &mut self.state.workbench.input;
        input.audio = audio;
        input.points.clear();
        self.emit(Topic::AudioInputChanged, value);
    }

    /// Add a segmentation hint at normalized `(x, y)`; label 1 is positive
    pub fn add_prompt_point(&mut self, x: f64, y: f64, label: u8) -> Result<PromptPoint> {
        let point = PromptPoint::new(x, y, label)?;
        self.state.workbench.input.points.push(point.clone());
        self.emit(Topic::PromptPointsChanged, json!(self.state.workbench.input.points));
        Ok(point)
    }

    pub fn remove_prompt_point(&mut self, index: usize) -> Option<PromptPoint> {
        let points = &mut self.state.workbench.input.points;
        if index >= points.len() {
            return None;
        }
        let removed = points.remove(index);
        self.emit(Topic::PromptPointsChanged, json!(self.state.workbench.input.points));
        Some(removed)
    }

    pub fn clear_prompt_points(&mut self) {
        if self.state.workbench.input.points.is_empty() {
            return;
        }
        self.state.workbench.input.points.clear();
        self.emit(Topic::PromptPointsChanged, json!([]));
    }

    /// Store a run's output. Empty batches become `None`; anything other
    /// than a single raster forces comparison mode back to `None`.
    pub fn set_output(&mut self, output: Option<OutputPayload>) {
        let output = output.and_then(OutputPayload::normalized);
        let summary = output.as_ref().map(OutputPayload::summary);
        let comparable = matches!(output, Some(OutputPayload::Image(_)));

        let slot = &mut self.state.workbench.output;
        slot.data = output;
        if !comparable {
            slot.comparison_mode = ComparisonMode::None;
        }
        self.emit(Topic::OutputChanged, json!(summary));
    }

    /// Change comparison mode; slide/hold require a single-raster output
    /// and a staged input image
    pub fn set_comparison_mode(&mut self, mode: ComparisonMode) -> Result<bool> {
        if mode != ComparisonMode::None {
            let workbench = &self.state.workbench;
            let reason = if !matches!(workbench.output.data, Some(OutputPayload::Image(_))) {
                Some("no single-image output")
            } else if workbench.input.image_urls.is_empty() {
                Some("no input image staged")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(WorkbenchError::ComparisonUnavailable {
                    reason: reason.to_string(),
                });
            }
        }
        if self.state.workbench.output.comparison_mode == mode {
            return Ok(false);
        }
        self.state.workbench.output.comparison_mode = mode;
        self.emit(Topic::ComparisonModeChanged, json!(mode));
        Ok(true)
    }

    /// Apply a loaded settings record in one step
    pub fn restore_settings(&mut self, settings: PersistedSettings) {
        let (min, max) = self.sidebar_bounds;
        self.state.system.theme = settings.theme;
        self.state.system.use_gpu = settings.use_gpu;
        self.state.ui.sidebar_width = settings.sidebar_width.clamp(min, max);
        self.state.workbench.processing_mode = settings.processing_mode;
        self.state.models.starred_models = settings.starred_models.iter().cloned().collect();
        self.state.models.model_order = settings.model_order.clone();
        self.state.models.collapsed_models = settings.collapsed_models.iter().cloned().collect();
        self.emit(Topic::SettingsRestored, json!(settings));
    }

    /// Surface a message to the user
    pub fn alert(&self, message: &str) {
        warn!(message, "alert");
        self.emit(Topic::Alert, Value::from(message));
    }

    /// Relay worker progress text
    pub fn announce_worker_status(&self, message: &str) {
        self.emit(Topic::WorkerStatus, Value::from(message));
    }

    /// File name to offer when saving the current output
    pub fn suggested_output_filename(&self) -> Option<String> {
        let module = self.state.active_module()?;
        match self.state.workbench.output.data.as_ref()? {
            OutputPayload::Text(_) => {
                let stem = module
                    .default_output_filename
                    .rsplit_once('.')
                    .map(|(stem, _)| stem)
                    .unwrap_or(&module.default_output_filename);
                Some(format!("{}.txt", stem))
            }
            _ => Some(module.default_output_filename.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Raster;
    use crate::models::Variant;
    use std::sync::Mutex;

    fn manifest(id: &str, task: &str) -> ModuleManifest {
        serde_json::from_value(json!({
            "id": id,
            "name": id,
            "task": task,
            "configurable_params": [
                {"id": "scale", "type": "slider", "min": 1.0, "max": 4.0, "default": 2.0}
            ],
            "default_output_filename": "result.png"
        }))
        .unwrap()
    }

    fn store() -> StateStore {
        let mut store = StateStore::new();
        store.load_modules(vec![
            manifest("Xenova/depth", "depth-estimation"),
            manifest("Xenova/sam", "prompt-segmentation"),
            manifest("Xenova/whisper", "speech-recognition"),
        ]);
        store
    }

    fn recorder(store: &StateStore) -> Arc<Mutex<Vec<Topic>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        for topic in [
            Topic::ActiveModuleChanged,
            Topic::StarredModelsChanged,
            Topic::ThemeChanged,
            Topic::ModelStatusChanged,
            Topic::OutputChanged,
            Topic::ImageInputsChanged,
            Topic::Alert,
            Topic::PromptPointsChanged,
        ] {
            let log = Arc::clone(&log);
            store.subscribe(topic, move |_, event| log.lock().unwrap().push(event.topic));
        }
        log
    }

    fn variant(name: &str) -> Variant {
        Variant {
            suffix: String::new(),
            name: name.to_string(),
            pipeline_options: Map::new(),
            files: vec!["onnx/model.onnx".to_string()],
        }
    }

    #[test]
    fn test_reselecting_active_module_is_silent() {
        let mut store = store();
        let log = recorder(&store);

        assert!(store.set_active_module(Some("Xenova/depth")).unwrap());
        assert!(!store.set_active_module(Some("Xenova/depth")).unwrap());
        assert_eq!(*log.lock().unwrap(), vec![Topic::ActiveModuleChanged]);
    }

    #[test]
    fn test_unknown_active_module_is_rejected() {
        let mut store = store();
        assert!(store.set_active_module(Some("nope/nope")).is_err());
        assert_eq!(store.state().models.active_module_id, None);
    }

    #[test]
    fn test_active_module_change_resets_workbench() {
        let mut store = store();
        store.set_active_module(Some("Xenova/depth")).unwrap();
        store.set_image_inputs(vec!["a.png".into(), "b.png".into()]).unwrap();
        store.set_output(Some(OutputPayload::Image(Raster::new(2, 2))));
        store.set_comparison_mode(ComparisonMode::Slide).unwrap();

        store.set_active_module(Some("Xenova/sam")).unwrap();
        let workbench = &store.state().workbench;
        assert!(workbench.input.image_urls.is_empty());
        assert!(workbench.output.data.is_none());
        assert_eq!(workbench.output.comparison_mode, ComparisonMode::None);
    }

    #[test]
    fn test_toggle_starred_twice_restores_set() {
        let mut store = store();
        let log = recorder(&store);

        assert!(store.toggle_starred("Xenova/depth"));
        assert!(!store.toggle_starred("Xenova/depth"));
        assert!(store.state().models.starred_models.is_empty());
        assert_eq!(
            *log.lock().unwrap(),
            vec![Topic::StarredModelsChanged, Topic::StarredModelsChanged]
        );
    }

    #[test]
    fn test_prompt_segmentation_accepts_one_image() {
        let mut store = store();
        store.set_active_module(Some("Xenova/sam")).unwrap();
        let log = recorder(&store);

        let err = store
            .set_image_inputs(vec!["a.png".into(), "b.png".into()])
            .unwrap_err();
        assert_eq!(err.error_code(), "TOO_MANY_INPUTS");
        assert!(store.state().workbench.input.image_urls.is_empty());
        assert_eq!(*log.lock().unwrap(), vec![Topic::Alert]);

        store.set_image_inputs(vec!["a.png".into()]).unwrap();
        assert_eq!(store.state().workbench.input.image_urls.len(), 1);
    }

    #[test]
    fn test_staging_images_publishes_once() {
        let mut store = store();
        store.set_active_module(Some("Xenova/depth")).unwrap();
        let log = recorder(&store);

        store.set_image_inputs(vec!["a.png".into(), "b.png".into()]).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![Topic::ImageInputsChanged]);
        assert_eq!(store.state().workbench.input.image_urls, vec!["a.png", "b.png"]);
    }

    #[test]
    fn test_comparison_needs_staged_input() {
        let mut store = store();
        store.set_output(Some(OutputPayload::Image(Raster::new(2, 2))));

        let err = store.set_comparison_mode(ComparisonMode::Slide).unwrap_err();
        assert_eq!(err.error_code(), "COMPARISON_UNAVAILABLE");
        assert!(!store.set_comparison_mode(ComparisonMode::None).unwrap());

        store.set_image_inputs(vec!["a.png".into()]).unwrap();
        assert!(store.set_comparison_mode(ComparisonMode::Slide).unwrap());

        store.set_image_inputs(Vec::new()).unwrap();
        assert_eq!(store.state().workbench.output.comparison_mode, ComparisonMode::None);
    }

    #[test]
    fn test_input_change_clears_points() {
        let mut store = store();
        store.set_active_module(Some("Xenova/sam")).unwrap();
        store.set_image_inputs(vec!["a.png".into()]).unwrap();
        store.add_prompt_point(0.25, 1.5, 1).unwrap();
        store.add_prompt_point(0.5, 0.5, 0).unwrap();

        assert_eq!(store.state().workbench.input.points[0].point, [0.25, 1.0]);
        assert!(store.add_prompt_point(0.5, 0.5, 2).is_err());
        assert_eq!(store.remove_prompt_point(1).unwrap().label, 0);
        assert!(store.remove_prompt_point(5).is_none());

        store.set_image_inputs(vec!["b.png".into()]).unwrap();
        assert!(store.state().workbench.input.points.is_empty());
    }

    #[test]
    fn test_found_status_always_has_valid_selection() {
        let mut store = store();
        let status = ModelStatus::found(
            vec![variant("Full Precision (fp32)"), variant("Half Precision (fp16)")],
            Some("gone".to_string()),
        );
        store.update_model_status("Xenova/depth", status).unwrap();

        let status = store.state().status_of("Xenova/depth").unwrap();
        assert_eq!(status.selected_variant.as_deref(), Some("Full Precision (fp32)"));
    }

    #[test]
    fn test_select_variant() {
        let mut store = store();
        store
            .update_model_status(
                "Xenova/depth",
                ModelStatus::found(
                    vec![variant("Full Precision (fp32)"), variant("Half Precision (fp16)")],
                    None,
                ),
            )
            .unwrap();
        let log = recorder(&store);

        assert!(store.select_variant("Xenova/depth", "Half Precision (fp16)").unwrap());
        assert!(!store.select_variant("Xenova/depth", "Half Precision (fp16)").unwrap());
        assert!(store.select_variant("Xenova/depth", "4-bit").is_err());
        assert_eq!(*log.lock().unwrap(), vec![Topic::ModelStatusChanged]);
    }

    #[test]
    fn test_empty_batch_output_is_none() {
        let mut store = store();
        store.set_output(Some(OutputPayload::Batch(Vec::new())));
        assert!(store.state().workbench.output.data.is_none());
    }

    #[test]
    fn test_batch_output_resets_comparison() {
        let mut store = store();
        store.set_image_inputs(vec!["a.png".into()]).unwrap();
        store.set_output(Some(OutputPayload::Image(Raster::new(2, 2))));
        store.set_comparison_mode(ComparisonMode::Hold).unwrap();

        store.set_output(Some(OutputPayload::Batch(vec![Raster::new(2, 2), Raster::new(2, 2)])));
        assert_eq!(store.state().workbench.output.comparison_mode, ComparisonMode::None);
        assert!(store.set_comparison_mode(ComparisonMode::Slide).is_err());
    }

    #[test]
    fn test_runtime_config_merges_defaults() {
        let mut store = store();
        assert_eq!(store.runtime_config_for("Xenova/depth")["scale"], json!(2.0));

        let value = store.set_runtime_param("Xenova/depth", "scale", json!(9)).unwrap();
        assert_eq!(value, json!(4.0));
        assert_eq!(store.runtime_config_for("Xenova/depth")["scale"], json!(4.0));
        assert!(store.set_runtime_param("Xenova/depth", "missing", json!(1)).is_err());
    }

    #[test]
    fn test_sidebar_width_is_clamped() {
        let mut store = store();
        assert_eq!(store.set_sidebar_width(10), MIN_SIDEBAR_WIDTH);
        assert_eq!(store.set_sidebar_width(5000), MAX_SIDEBAR_WIDTH);
    }

    #[test]
    fn test_move_model() {
        let mut store = store();
        store.move_model("Xenova/whisper", 0).unwrap();
        let ids: Vec<&str> = store.ordered_modules().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["Xenova/whisper", "Xenova/depth", "Xenova/sam"]);
    }

    #[test]
    fn test_theme_toggle_publishes_once_each() {
        let mut store = store();
        let log = recorder(&store);
        store.set_theme(Theme::Light);
        assert_eq!(store.toggle_theme(), Theme::Dark);
        assert_eq!(*log.lock().unwrap(), vec![Topic::ThemeChanged]);
    }

    #[test]
    fn test_suggested_output_filename() {
        let mut store = store();
        store.set_active_module(Some("Xenova/whisper")).unwrap();
        store.set_output(Some(OutputPayload::Text("hello".into())));
        assert_eq!(store.suggested_output_filename().as_deref(), Some("result.txt"));
    }
}
