//! Model modules
//!
//! Manifests, variant discovery, on-disk status, file assembly for the
//! worker and downloads from a remote registry.

pub mod assembler;
pub mod download;
#[cfg(feature = "hub")]
pub mod hub;
pub mod manifest;
pub mod status;
pub mod variant;

pub use assembler::{assemble_model_files, virtual_path};
pub use download::{
    is_required_file, sha256_hex, DownloadPhase, ModelDownloadOrchestrator, RemoteFile,
    RemoteRegistry,
};
#[cfg(feature = "hub")]
pub use hub::{HubRegistry, DEFAULT_HUB_URL};
pub use manifest::{load_manifests, ModuleManifest, ParamKind, ParamSpec, TaskKind};
pub use status::{ModelStatusService, WEIGHTS_DIR};
pub use variant::{choose_selected, discover_variants, Variant};
