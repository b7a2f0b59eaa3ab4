//! Model file assembly
//!
//! Collects the bytes of everything the worker needs to build a pipeline
//! for one variant, keyed by virtual path `/models/<moduleId>/<relative>`.

use std::sync::Arc;

use tracing::{debug, warn};

use super::manifest::ModuleManifest;
use super::variant::Variant;
use crate::directory::{read_path, DirectoryHandle};
use crate::error::{Result, WorkbenchError};
use crate::inference::ModelFiles;

/// Virtual path of a module file as seen by the worker
pub fn virtual_path(module_id: &str, relative: &str) -> String {
    format!("/models/{}/{}", module_id, relative)
}

/// Read the variant's weights and the manifest's config files.
///
/// A missing weight file fails the whole assembly. A missing config file
/// is skipped with a warning.
pub fn assemble_model_files(
    root: &Arc<dyn DirectoryHandle>,
    manifest: &ModuleManifest,
    variant: &Variant,
) -> Result<ModelFiles> {
    let module_dir = root.get_directory(manifest.repo_segment(), false)?;
    let mut files = ModelFiles::new();

    for relative in &variant.files {
        let bytes = read_path(&module_dir, relative).map_err(|e| WorkbenchError::MissingWeightFile {
            path: relative.clone(),
            source: Box::new(e),
        })?;
        debug!(module = %manifest.id, file = %relative, bytes = bytes.len(), "weights read");
        files.insert(virtual_path(&manifest.id, relative), bytes);
    }

    for relative in &manifest.config_files {
        match read_path(&module_dir, relative) {
            Ok(bytes) => {
                files.insert(virtual_path(&manifest.id, relative), bytes);
            }
            Err(e) => {
                warn!(module = %manifest.id, file = %relative, error = %e, "config file missing")
            }
        }
    }

    Ok(files)
}
