//! Model status service
//!
//! Scans the connected models directory and keeps each module's
//! availability record current. Scans run one module at a time.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::manifest::ModuleManifest;
use super::variant::{choose_selected, discover_variants, is_weight_file, Variant};
use crate::directory::{DirectoryHandle, EntryKind};
use crate::error::{Result, WorkbenchError};
use crate::state::{ModelAvailability, ModelStatus, StateStore};

/// Conventional subdirectory holding the weight files
pub const WEIGHTS_DIR: &str = "onnx";

#[derive(Debug, Clone)]
pub struct ModelStatusService {
    weights_dir: String,
}

impl Default for ModelStatusService {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelStatusService {
    pub fn new() -> Self {
        Self {
            weights_dir: WEIGHTS_DIR.to_string(),
        }
    }

    /// Connect `handle` as the models root and rescan every module.
    ///
    /// A handle whose permission check fails leaves the store disconnected.
    pub fn connect_directory(
        &self,
        store: &mut StateStore,
        handle: Arc<dyn DirectoryHandle>,
    ) -> Result<()> {
        if !handle.query_permission() {
            warn!(directory = handle.name(), "permission check failed");
            store.disconnect_directory();
            self.refresh_all(store);
            return Err(WorkbenchError::PermissionDenied {
                path: handle.name().to_string(),
            });
        }
        info!(directory = handle.name(), "models directory connected");
        store.connect_directory(handle);
        self.refresh_all(store);
        Ok(())
    }

    /// Check every loaded module, sequentially
    pub fn refresh_all(&self, store: &mut StateStore) {
        let ids: Vec<String> = store
            .state()
            .models
            .modules
            .iter()
            .map(|m| m.id.clone())
            .collect();
        for id in ids {
            self.check_module(store, &id);
        }
    }

    /// Recompute one module's availability and publish it
    pub fn check_module(&self, store: &mut StateStore, module_id: &str) -> ModelAvailability {
        let Some(manifest) = store.state().module(module_id).cloned() else {
            warn!(module = module_id, "status check for unknown module");
            return ModelAvailability::Missing;
        };

        let Some(root) = store.state().system.directory.clone() else {
            self.publish(store, module_id, ModelStatus::missing());
            return ModelAvailability::Missing;
        };
        if !root.query_permission() {
            warn!(directory = root.name(), "permission lost, disconnecting");
            store.disconnect_directory();
            self.publish(store, module_id, ModelStatus::missing());
            return ModelAvailability::Missing;
        }

        // The transitional record drops the selection, so capture it first
        let previous = store
            .state()
            .status_of(module_id)
            .and_then(|s| s.selected_variant.clone());
        self.publish(
            store,
            module_id,
            ModelStatus {
                status: ModelAvailability::Checking,
                ..ModelStatus::default()
            },
        );

        let status = match self.scan_variants(&root, &manifest) {
            Ok(variants) => {
                let selected = choose_selected(previous.as_deref(), &variants);
                debug!(module = module_id, variants = variants.len(), "model found");
                ModelStatus::found(variants, selected)
            }
            Err(e) => {
                warn!(module = module_id, error = %e, "model not available");
                ModelStatus::missing()
            }
        };
        let availability = status.status;
        self.publish(store, module_id, status);
        availability
    }

    fn publish(&self, store: &mut StateStore, module_id: &str, status: ModelStatus) {
        if let Err(e) = store.update_model_status(module_id, status) {
            warn!(module = module_id, error = %e, "failed to update model status");
        }
    }

    /// List and group the weight files of one module.
    ///
    /// Prefers the `onnx/` subdirectory when present, else the module root.
    pub fn scan_variants(
        &self,
        root: &Arc<dyn DirectoryHandle>,
        manifest: &ModuleManifest,
    ) -> Result<Vec<Variant>> {
        let module_dir = root.get_directory(manifest.repo_segment(), false)?;
        let (prefix, dir) = match module_dir.get_directory(&self.weights_dir, false) {
            Ok(dir) => (format!("{}/", self.weights_dir), dir),
            Err(_) => (String::new(), module_dir),
        };

        let mut files: Vec<String> = dir
            .entries()?
            .into_iter()
            .filter(|entry| entry.kind == EntryKind::File && is_weight_file(&entry.name))
            .map(|entry| format!("{}{}", prefix, entry.name))
            .collect();
        files.sort();

        let variants = discover_variants(&files);
        if variants.is_empty() {
            return Err(WorkbenchError::NoModelFiles {
                module: manifest.id.clone(),
            });
        }
        Ok(variants)
    }
}
