//! Model downloads
//!
//! Fetches a module's files from a remote registry into the connected
//! models directory, one file at a time, then rescans the module.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::status::{ModelStatusService, WEIGHTS_DIR};
use super::variant::is_weight_file;
use crate::directory::{resolve_dir, split_path, DirectoryHandle};
use crate::error::{Result, WorkbenchError};
use crate::state::{DownloadProgress, ModelAvailability, ModelStatus, StateStore};

/// A file offered by the remote registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Path relative to the repository root
    pub path: String,
    #[serde(default)]
    pub size: Option<u64>,
    /// Hex SHA-256 of the content, when the registry knows it
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Remote model registry
pub trait RemoteRegistry: Send + Sync {
    /// Every file of the model's repository
    fn list_files(&self, model_id: &str) -> Result<Vec<RemoteFile>>;

    /// Full content of one file
    fn fetch(&self, model_id: &str, path: &str) -> Result<Vec<u8>>;
}

/// Where the orchestrator is in a download sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadPhase {
    #[default]
    Idle,
    FetchingManifest,
    CreatingDirectories,
    FetchingBytes,
    Writing,
}

/// Whether a remote file is needed to run the model.
///
/// Weights under `onnx/` and top-level JSON/text configuration qualify.
pub fn is_required_file(path: &str) -> bool {
    match split_path(path) {
        (WEIGHTS_DIR, name) => is_weight_file(name),
        ("", name) => name.ends_with(".json") || name.ends_with(".txt"),
        _ => false,
    }
}

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Sequential downloader for one module at a time
pub struct ModelDownloadOrchestrator {
    registry: Arc<dyn RemoteRegistry>,
    status: ModelStatusService,
    phase: DownloadPhase,
}

impl ModelDownloadOrchestrator {
    pub fn new(registry: Arc<dyn RemoteRegistry>, status: ModelStatusService) -> Self {
        Self {
            registry,
            status,
            phase: DownloadPhase::Idle,
        }
    }

    pub fn phase(&self) -> DownloadPhase {
        self.phase
    }

    fn enter(&mut self, phase: DownloadPhase) {
        debug!(?phase, "download phase");
        self.phase = phase;
    }

    /// Download every required file of `module_id`.
    ///
    /// Any failure aborts the remaining files, marks the module missing and
    /// alerts the user. Files written before the failure stay on disk.
    /// Returns the number of files written.
    pub fn download(&mut self, store: &mut StateStore, module_id: &str) -> Result<usize> {
        let manifest = store
            .state()
            .module(module_id)
            .cloned()
            .ok_or_else(|| WorkbenchError::UnknownModule {
                id: module_id.to_string(),
            })?;
        let root = store
            .state()
            .system
            .directory
            .clone()
            .ok_or(WorkbenchError::DirectoryNotConnected)?;

        store.update_model_status(
            module_id,
            ModelStatus {
                status: ModelAvailability::Downloading,
                ..ModelStatus::default()
            },
        )?;
        store.set_download_progress(DownloadProgress {
            module_id: Some(module_id.to_string()),
            ..DownloadProgress::default()
        });

        let result = self.fetch_all(store, &root, module_id, manifest.repo_segment());
        self.enter(DownloadPhase::Idle);
        store.set_download_progress(DownloadProgress::default());

        match result {
            Ok(written) => {
                info!(module = module_id, files = written, "download complete");
                self.status.check_module(store, module_id);
                Ok(written)
            }
            Err(e) => {
                warn!(module = module_id, error = %e, "download failed");
                store.update_model_status(module_id, ModelStatus::missing())?;
                store.alert(&e.friendly_message());
                Err(e)
            }
        }
    }

    fn fetch_all(
        &mut self,
        store: &mut StateStore,
        root: &Arc<dyn DirectoryHandle>,
        module_id: &str,
        repo: &str,
    ) -> Result<usize> {
        self.enter(DownloadPhase::FetchingManifest);
        let files: Vec<RemoteFile> = self
            .registry
            .list_files(module_id)?
            .into_iter()
            .filter(|f| is_required_file(&f.path))
            .collect();
        if files.is_empty() {
            return Err(WorkbenchError::Download {
                file: module_id.to_string(),
                reason: "registry lists no model files".to_string(),
            });
        }

        let total = files.len();
        store.set_download_progress(DownloadProgress {
            module_id: Some(module_id.to_string()),
            current: 0,
            total,
            filename: None,
        });

        for (index, file) in files.iter().enumerate() {
            let (dir, name) = split_path(&file.path);

            self.enter(DownloadPhase::CreatingDirectories);
            let target = resolve_dir(root, repo, true)
                .and_then(|repo_dir| resolve_dir(&repo_dir, dir, true))?;

            self.enter(DownloadPhase::FetchingBytes);
            let bytes = self.registry.fetch(module_id, &file.path)?;
            if let Some(expected) = &file.sha256 {
                let actual = sha256_hex(&bytes);
                if !actual.eq_ignore_ascii_case(expected) {
                    return Err(WorkbenchError::ChecksumMismatch {
                        file: file.path.clone(),
                        expected: expected.clone(),
                        actual,
                    });
                }
            }

            self.enter(DownloadPhase::Writing);
            target.write_file(name, &bytes)?;
            debug!(module = module_id, file = %file.path, bytes = bytes.len(), "file written");

            store.set_download_progress(DownloadProgress {
                module_id: Some(module_id.to_string()),
                current: index + 1,
                total,
                filename: Some(file.path.clone()),
            });
        }
        Ok(total)
    }
}
