//! Modelbench - local ML model workbench core
//!
//! Everything below the UI of a desktop model workbench:
//! - A state store that owns the application state and announces every
//!   change on a synchronous event bus
//! - Settings persistence for the user's preferences
//! - Variant discovery over a connected models folder
//! - An inference worker thread with per-task postprocessing
//! - An input/output comparison view
//! - Sequential model downloads from a remote registry
//!
//! # Flow
//!
//! Manifests are loaded into the `StateStore`, the models folder is
//! connected through `ModelStatusService`, and the `InferenceOrchestrator`
//! assembles the selected variant's files and hands them to the worker.

pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod inference;
pub mod media;
pub mod models;
pub mod state;
pub mod view;

pub use error::{Result, WorkbenchError};
