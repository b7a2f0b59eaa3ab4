//! Inference orchestration
//!
//! Guards and dispatches runs to the single worker, then folds the
//! worker's replies back into the state store. At most one run is in
//! flight; a second request while one is running is rejected, not queued.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::protocol::{HostMessage, InputPayload, RunRequest, WorkerMessage, WorkerReply};
use super::tasks::TaskRegistry;
use super::worker::{InferenceEngine, WorkerHandle};
use crate::error::{Result, WorkbenchError};
use crate::media::{FileMediaLoader, MediaLoader};
use crate::models::{assemble_model_files, ModuleManifest, Variant};
use crate::state::{ProcessingMode, StateStore};

/// Lifecycle of the current (or last) run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    #[default]
    Idle,
    Preparing,
    Running,
    Done,
    Failed,
}

impl RunPhase {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RunPhase::Preparing | RunPhase::Running)
    }
}

pub struct InferenceOrchestrator {
    worker: WorkerHandle,
    media: Arc<dyn MediaLoader>,
    phase: RunPhase,
    current_run: Option<Uuid>,
}

impl std::fmt::Debug for InferenceOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceOrchestrator")
            .field("phase", &self.phase)
            .field("current_run", &self.current_run)
            .finish_non_exhaustive()
    }
}

impl InferenceOrchestrator {
    /// Start the worker with the built-in task handlers
    pub fn new(engine: Box<dyn InferenceEngine>) -> Result<Self> {
        Self::with_parts(engine, TaskRegistry::with_defaults(), Arc::new(FileMediaLoader))
    }

    pub fn with_parts(
        engine: Box<dyn InferenceEngine>,
        registry: TaskRegistry,
        media: Arc<dyn MediaLoader>,
    ) -> Result<Self> {
        Ok(Self {
            worker: WorkerHandle::spawn(engine, Arc::new(registry))?,
            media,
            phase: RunPhase::Idle,
            current_run: None,
        })
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn current_run(&self) -> Option<Uuid> {
        self.current_run
    }

    fn check_runnable(&self, store: &StateStore) -> Result<(ModuleManifest, Variant)> {
        let state = store.state();
        if self.phase.is_in_flight() || state.workbench.is_processing {
            return Err(WorkbenchError::RunInFlight);
        }
        let manifest = state.active_module().ok_or(WorkbenchError::NoActiveModule)?;
        let unavailable = || WorkbenchError::ModelUnavailable {
            module: manifest.id.clone(),
        };
        let variant = state
            .status_of(&manifest.id)
            .filter(|status| status.is_found())
            .and_then(|status| status.selected())
            .ok_or_else(unavailable)?;
        let input = &state.workbench.input;
        let staged = if manifest.task.takes_audio() {
            input.audio.is_some()
        } else {
            !input.image_urls.is_empty()
        };
        if !staged {
            return Err(WorkbenchError::NoInputStaged);
        }
        Ok((manifest.clone(), variant.clone()))
    }

    /// Start a run for the active module and staged input.
    ///
    /// Rejections and preparation failures are alerted and returned; on
    /// success the run id is returned and replies arrive via `poll`/`wait`.
    pub fn run(&mut self, store: &mut StateStore) -> Result<Uuid> {
        let (manifest, variant) = match self.check_runnable(store) {
            Ok(runnable) => runnable,
            Err(e) => {
                warn!(error = %e, "run rejected");
                store.alert(&e.friendly_message());
                return Err(e);
            }
        };

        self.phase = RunPhase::Preparing;
        store.set_processing(true);
        let run_id = Uuid::new_v4();

        let request = match self.prepare(store, &manifest, &variant, run_id) {
            Ok(request) => request,
            Err(e) => {
                self.fail(store, &e.friendly_message());
                return Err(e);
            }
        };

        if let Err(e) = self.worker.send(HostMessage::Run(request)) {
            self.fail(store, &e.friendly_message());
            return Err(e);
        }

        info!(%run_id, module = %manifest.id, variant = %variant.name, "run dispatched");
        self.phase = RunPhase::Running;
        self.current_run = Some(run_id);
        store.begin_inference_timer();
        Ok(run_id)
    }

    fn prepare(
        &self,
        store: &StateStore,
        manifest: &ModuleManifest,
        variant: &Variant,
        run_id: Uuid,
    ) -> Result<RunRequest> {
        let state = store.state();
        let root = state
            .system
            .directory
            .clone()
            .ok_or(WorkbenchError::DirectoryNotConnected)?;
        let model_files = assemble_model_files(&root, manifest, variant)?;

        let mut pipeline_options: Map<String, Value> = variant.pipeline_options.clone();
        pipeline_options.insert("device".to_string(), Value::from(state.device()));

        let input = &state.workbench.input;
        let batch = state.workbench.processing_mode == ProcessingMode::Batch;
        let (data, batch) = if manifest.task.takes_audio() {
            let audio = input.audio.as_ref().ok_or(WorkbenchError::NoInputStaged)?;
            let clip = self.media.load_audio(&audio.url)?;
            debug!(seconds = clip.duration_secs(), "audio decoded");
            (
                InputPayload::Audio {
                    clip,
                    filename: audio.filename.clone(),
                },
                false,
            )
        } else {
            let urls = if batch {
                input.image_urls.clone()
            } else {
                input.image_urls.iter().take(1).cloned().collect()
            };
            (
                InputPayload::Images {
                    urls,
                    points: input.points.clone(),
                },
                batch,
            )
        };

        Ok(RunRequest {
            run_id,
            task: manifest.task,
            model_id: manifest.id.clone(),
            model_files,
            pipeline_options,
            params: store.runtime_config_for(&manifest.id),
            data,
            batch,
        })
    }

    fn fail(&mut self, store: &mut StateStore, message: &str) {
        self.phase = RunPhase::Failed;
        self.current_run = None;
        store.set_processing(false);
        store.alert(message);
    }

    /// Apply one worker reply. Replies for other runs are ignored.
    pub fn handle_message(&mut self, store: &mut StateStore, message: WorkerMessage) {
        if self.current_run != Some(message.run_id) {
            debug!(run_id = %message.run_id, "ignoring reply for stale run");
            return;
        }

        match message.reply {
            WorkerReply::Status(text) => store.announce_worker_status(&text),
            WorkerReply::Result(output) => {
                store.finish_inference_timer();
                store.set_output(output);
                store.set_processing(false);
                self.phase = RunPhase::Done;
                self.current_run = None;
                info!(run_id = %message.run_id, "run finished");
            }
            WorkerReply::Error(text) => {
                store.finish_inference_timer();
                let e = WorkbenchError::Worker { message: text };
                warn!(run_id = %message.run_id, error = %e, "run failed");
                self.fail(store, &e.friendly_message());
            }
        }
    }

    fn on_disconnect(&mut self, store: &mut StateStore, e: &WorkbenchError) {
        if self.phase.is_in_flight() {
            self.fail(store, &e.friendly_message());
        }
    }

    /// Apply every reply already waiting, without blocking
    pub fn poll(&mut self, store: &mut StateStore) -> Result<RunPhase> {
        loop {
            match self.worker.try_recv() {
                Ok(Some(message)) => self.handle_message(store, message),
                Ok(None) => return Ok(self.phase),
                Err(e) => {
                    self.on_disconnect(store, &e);
                    return Err(e);
                }
            }
        }
    }

    /// Block until the current run finishes or `timeout` elapses
    pub fn wait(&mut self, store: &mut StateStore, timeout: Duration) -> Result<RunPhase> {
        let deadline = Instant::now() + timeout;
        while self.phase == RunPhase::Running {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.worker.recv_timeout(remaining) {
                Ok(message) => self.handle_message(store, message),
                Err(WorkbenchError::WorkerTimeout) => return Err(WorkbenchError::WorkerTimeout),
                Err(e) => {
                    self.on_disconnect(store, &e);
                    return Err(e);
                }
            }
        }
        Ok(self.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{write_path, DirectoryHandle, LocalDirectory};
    use crate::inference::{EngineOutput, OutputPayload, Pipeline, PipelineSpec};
    use crate::media::Raster;
    use crate::models::ModelStatusService;
    use crate::state::Topic;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Echoes one raster per staged image, after an optional delay
    struct EchoEngine {
        seen_options: Arc<Mutex<Vec<Map<String, Value>>>>,
        delay: Duration,
        fail: bool,
    }

    struct EchoPipeline {
        delay: Duration,
        fail: bool,
    }

    impl Pipeline for EchoPipeline {
        fn run(
            &mut self,
            input: &InputPayload,
            _params: &Map<String, Value>,
        ) -> anyhow::Result<EngineOutput> {
            std::thread::sleep(self.delay);
            if self.fail {
                anyhow::bail!("session creation failed");
            }
            match input {
                InputPayload::Images { urls, .. } => Ok(EngineOutput::Rasters(
                    urls.iter().map(|_| Raster::filled(4, 4, [0, 0, 255, 255])).collect(),
                )),
                InputPayload::Audio { .. } => Ok(EngineOutput::Text("hello".into())),
            }
        }
    }

    impl InferenceEngine for EchoEngine {
        fn load(&mut self, spec: &PipelineSpec<'_>) -> anyhow::Result<Box<dyn Pipeline>> {
            self.seen_options.lock().unwrap().push(spec.options.clone());
            Ok(Box::new(EchoPipeline {
                delay: self.delay,
                fail: self.fail,
            }))
        }
    }

    struct Fixture {
        _temp: TempDir,
        store: StateStore,
        orchestrator: InferenceOrchestrator,
        seen_options: Arc<Mutex<Vec<Map<String, Value>>>>,
    }

    fn fixture(delay: Duration, fail: bool) -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let root: Arc<dyn DirectoryHandle> =
            LocalDirectory::open(temp.path()).unwrap().into_handle();
        write_path(&root, "swin2SR/onnx/model.onnx", b"w").unwrap();

        let mut store = StateStore::new();
        store.load_modules(vec![serde_json::from_value(
            json!({"id": "Xenova/swin2SR", "name": "Swin2SR", "task": "upscaling"}),
        )
        .unwrap()]);
        ModelStatusService::new()
            .connect_directory(&mut store, root)
            .unwrap();
        store.set_active_module(Some("Xenova/swin2SR")).unwrap();

        let seen_options = Arc::new(Mutex::new(Vec::new()));
        let engine = EchoEngine {
            seen_options: Arc::clone(&seen_options),
            delay,
            fail,
        };
        Fixture {
            _temp: temp,
            store,
            orchestrator: InferenceOrchestrator::new(Box::new(engine)).unwrap(),
            seen_options,
        }
    }

    #[test]
    fn test_rejects_without_input() {
        let mut f = fixture(Duration::ZERO, false);
        let err = f.orchestrator.run(&mut f.store).unwrap_err();
        assert_eq!(err.error_code(), "NO_INPUT_STAGED");
        assert_eq!(f.orchestrator.phase(), RunPhase::Idle);
        assert!(!f.store.state().workbench.is_processing);
    }

    #[test]
    fn test_iterative_run_yields_single_raster() {
        let mut f = fixture(Duration::ZERO, false);
        f.store
            .set_image_inputs(vec!["a.png".into(), "b.png".into()])
            .unwrap();

        f.orchestrator.run(&mut f.store).unwrap();
        assert_eq!(
            f.orchestrator.wait(&mut f.store, Duration::from_secs(5)).unwrap(),
            RunPhase::Done
        );

        let workbench = &f.store.state().workbench;
        assert!(!workbench.is_processing);
        assert!(workbench.inference_duration.is_some());
        assert!(matches!(workbench.output.data, Some(OutputPayload::Image(_))));
        assert_eq!(f.seen_options.lock().unwrap()[0]["device"], "cpu");
    }

    #[test]
    fn test_batch_run_yields_sequence() {
        let mut f = fixture(Duration::ZERO, false);
        f.store.set_processing_mode(ProcessingMode::Batch);
        f.store
            .set_image_inputs(vec!["a.png".into(), "b.png".into()])
            .unwrap();

        f.orchestrator.run(&mut f.store).unwrap();
        f.orchestrator.wait(&mut f.store, Duration::from_secs(5)).unwrap();

        assert!(matches!(
            &f.store.state().workbench.output.data,
            Some(OutputPayload::Batch(rasters)) if rasters.len() == 2
        ));
    }

    #[test]
    fn test_second_run_rejected_while_in_flight() {
        let mut f = fixture(Duration::from_millis(200), false);
        f.store.set_image_inputs(vec!["a.png".into()]).unwrap();

        let first = f.orchestrator.run(&mut f.store).unwrap();
        let err = f.orchestrator.run(&mut f.store).unwrap_err();
        assert_eq!(err.error_code(), "RUN_IN_FLIGHT");
        assert_eq!(f.orchestrator.current_run(), Some(first));
        assert!(f.store.state().workbench.is_processing);

        f.orchestrator.wait(&mut f.store, Duration::from_secs(5)).unwrap();
        assert!(!f.store.state().workbench.is_processing);
    }

    #[test]
    fn test_worker_error_resets_processing_and_alerts() {
        let mut f = fixture(Duration::ZERO, true);
        f.store.set_image_inputs(vec!["a.png".into()]).unwrap();
        let alerts = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&alerts);
        f.store.subscribe(Topic::Alert, move |_, event| {
            sink.lock().unwrap().push(event.payload.clone());
        });

        f.orchestrator.run(&mut f.store).unwrap();
        assert_eq!(
            f.orchestrator.wait(&mut f.store, Duration::from_secs(5)).unwrap(),
            RunPhase::Failed
        );
        assert!(!f.store.state().workbench.is_processing);
        assert_eq!(
            *alerts.lock().unwrap(),
            vec![json!("Inference failed: session creation failed")]
        );
    }

    #[test]
    fn test_poll_drives_run_to_completion() {
        let mut f = fixture(Duration::from_millis(20), false);
        f.store.set_image_inputs(vec!["a.png".into()]).unwrap();
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&statuses);
        f.store.subscribe(Topic::WorkerStatus, move |_, event| {
            sink.lock().unwrap().push(event.payload.clone());
        });

        f.orchestrator.run(&mut f.store).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while f.orchestrator.poll(&mut f.store).unwrap() != RunPhase::Done {
            assert!(Instant::now() < deadline, "run did not finish");
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(!f.store.state().workbench.is_processing);
        assert!(matches!(f.store.state().workbench.output.data, Some(OutputPayload::Image(_))));
        assert_eq!(
            *statuses.lock().unwrap(),
            vec![json!("Loading Xenova/swin2SR"), json!("Running inference")]
        );
        assert_eq!(f.orchestrator.poll(&mut f.store).unwrap(), RunPhase::Done);
    }

    #[test]
    fn test_lost_worker_fails_run() {
        let mut f = fixture(Duration::ZERO, false);
        f.store.set_image_inputs(vec!["a.png".into()]).unwrap();
        let alerts = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&alerts);
        f.store.subscribe(Topic::Alert, move |_, event| {
            sink.lock().unwrap().push(event.payload.clone());
        });

        f.orchestrator.worker.send(HostMessage::Shutdown).unwrap();
        // the worker may exit before or after the run is queued
        if f.orchestrator.run(&mut f.store).is_ok() {
            let err = f
                .orchestrator
                .wait(&mut f.store, Duration::from_secs(5))
                .unwrap_err();
            assert_eq!(err.error_code(), "WORKER_DISCONNECTED");
        }

        assert_eq!(f.orchestrator.phase(), RunPhase::Failed);
        assert!(!f.store.state().workbench.is_processing);
        assert_eq!(alerts.lock().unwrap().len(), 1);
        assert!(f.orchestrator.current_run().is_none());
    }

    #[test]
    fn test_stale_reply_is_ignored() {
        let mut f = fixture(Duration::ZERO, false);
        f.orchestrator
            .handle_message(&mut f.store, WorkerMessage::result(Uuid::new_v4(), None));
        assert_eq!(f.orchestrator.phase(), RunPhase::Idle);
    }
}
