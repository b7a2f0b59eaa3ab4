//! Inference worker
//!
//! One long-lived thread owns the engine and runs requests one at a time.
//! The last built pipeline is cached and reused while the model id and
//! pipeline options stay the same; any failure drops it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::anyhow;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use super::protocol::{
    HostMessage, InputPayload, ModelFiles, OutputPayload, RunRequest, WorkerMessage,
};
use super::tasks::{EngineOutput, TaskRegistry};
use crate::error::{Result, WorkbenchError};
use crate::models::TaskKind;

/// Everything an engine needs to build a pipeline
#[derive(Debug, Clone, Copy)]
pub struct PipelineSpec<'a> {
    pub task: TaskKind,
    pub model_id: &'a str,
    pub model_files: &'a ModelFiles,
    pub options: &'a Map<String, Value>,
}

/// A loaded, runnable model
pub trait Pipeline: Send {
    fn run(
        &mut self,
        input: &InputPayload,
        params: &Map<String, Value>,
    ) -> anyhow::Result<EngineOutput>;
}

/// Builds pipelines from model files
pub trait InferenceEngine: Send {
    fn load(&mut self, spec: &PipelineSpec<'_>) -> anyhow::Result<Box<dyn Pipeline>>;
}

#[derive(Debug, Clone, PartialEq)]
struct PipelineKey {
    model_id: String,
    options: Map<String, Value>,
}

struct Worker {
    engine: Box<dyn InferenceEngine>,
    registry: Arc<TaskRegistry>,
    cached: Option<(PipelineKey, Box<dyn Pipeline>)>,
    replies: Sender<WorkerMessage>,
}

impl Worker {
    fn serve(mut self, requests: Receiver<HostMessage>) {
        while let Ok(message) = requests.recv() {
            match message {
                HostMessage::Shutdown => break,
                HostMessage::Run(request) => {
                    let reply = self.handle(&request);
                    if self.replies.send(reply).is_err() {
                        break;
                    }
                }
            }
        }
        debug!("inference worker stopped");
    }

    fn handle(&mut self, request: &RunRequest) -> WorkerMessage {
        let run_id = request.run_id;
        match catch_unwind(AssertUnwindSafe(|| self.execute(request))) {
            Ok(Ok(output)) => WorkerMessage::result(run_id, output),
            Ok(Err(e)) => {
                self.cached = None;
                error!(%run_id, error = %e, "inference failed");
                WorkerMessage::error(run_id, format!("{:#}", e))
            }
            Err(panic) => {
                self.cached = None;
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "engine panicked".to_string());
                error!(%run_id, %message, "inference engine panicked");
                WorkerMessage::error(run_id, message)
            }
        }
    }

    fn status(&self, request: &RunRequest, text: &str) {
        let _ = self.replies.send(WorkerMessage::status(request.run_id, text));
    }

    fn execute(&mut self, request: &RunRequest) -> anyhow::Result<Option<OutputPayload>> {
        let key = PipelineKey {
            model_id: request.model_id.clone(),
            options: request.pipeline_options.clone(),
        };

        if self.cached.as_ref().map_or(true, |(cached, _)| *cached != key) {
            self.cached = None;
            self.status(request, &format!("Loading {}", request.model_id));
            info!(model = %request.model_id, "building pipeline");
            let pipeline = self.engine.load(&PipelineSpec {
                task: request.task,
                model_id: &request.model_id,
                model_files: &request.model_files,
                options: &request.pipeline_options,
            })?;
            self.cached = Some((key, pipeline));
        }

        self.status(request, "Running inference");
        let (_, pipeline) = self
            .cached
            .as_mut()
            .ok_or_else(|| anyhow!("pipeline was not built"))?;
        let raw = pipeline.run(&request.data, &request.params)?;
        let handler = self.registry.get(request.task)?;
        let processed = handler.postprocess(raw, &request.params)?;
        Ok(processed.into_payload(request.batch))
    }
}

/// Host side of the worker thread
pub struct WorkerHandle {
    requests: Sender<HostMessage>,
    replies: Receiver<WorkerMessage>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl WorkerHandle {
    /// Start the worker thread
    pub fn spawn(engine: Box<dyn InferenceEngine>, registry: Arc<TaskRegistry>) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<HostMessage>();
        let (reply_tx, reply_rx) = mpsc::channel::<WorkerMessage>();
        let worker = Worker {
            engine,
            registry,
            cached: None,
            replies: reply_tx,
        };
        let thread = thread::Builder::new()
            .name("inference-worker".into())
            .spawn(move || worker.serve(request_rx))?;

        Ok(Self {
            requests: request_tx,
            replies: reply_rx,
            thread: Some(thread),
        })
    }

    pub fn send(&self, message: HostMessage) -> Result<()> {
        self.requests
            .send(message)
            .map_err(|_| WorkbenchError::WorkerDisconnected)
    }

    /// Next reply if one is already waiting
    pub fn try_recv(&self) -> Result<Option<WorkerMessage>> {
        match self.replies.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(WorkbenchError::WorkerDisconnected),
        }
    }

    /// Block until a reply arrives or `timeout` elapses
    pub fn recv_timeout(&self, timeout: Duration) -> Result<WorkerMessage> {
        self.replies.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => WorkbenchError::WorkerTimeout,
            RecvTimeoutError::Disconnected => WorkbenchError::WorkerDisconnected,
        })
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.requests.send(HostMessage::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("inference worker thread panicked");
            }
        }
    }
}
