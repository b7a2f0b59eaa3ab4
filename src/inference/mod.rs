//! Inference
//!
//! The worker protocol, per-task postprocessing, the worker thread and the
//! orchestrator that connects it to the state store.

pub mod orchestrator;
pub mod protocol;
pub mod tasks;
pub mod worker;

pub use orchestrator::{InferenceOrchestrator, RunPhase};
pub use protocol::{
    HostMessage, InputPayload, ModelFiles, OutputPayload, PromptPoint, RunRequest, WorkerMessage,
    WorkerReply,
};
pub use tasks::{EngineOutput, Processed, TaskHandler, TaskRegistry, Tensor};
pub use worker::{InferenceEngine, Pipeline, PipelineSpec, WorkerHandle};
