//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::WorkbenchConfig;
use crate::directory::LocalDirectory;
use crate::error::{Result, WorkbenchError};
use crate::models::{discover_variants, load_manifests, ModelStatusService};
use crate::state::{JsonFileBackend, PersistedSettings, PersistenceService, StateStore};
use crate::view::{contain_fit, Size};

fn persistence(config: &WorkbenchConfig) -> PersistenceService {
    PersistenceService::new(Arc::new(JsonFileBackend::new(&config.settings_dir)))
}

/// Build a store with manifests loaded and settings restored
fn open_store(config: &WorkbenchConfig) -> Result<StateStore> {
    let (min, max) = config.sidebar_width_bounds;
    let mut store = StateStore::new().with_sidebar_bounds(min, max);
    let modules = load_manifests(&config.manifests_dir)?;
    info!(modules = modules.len(), "manifests loaded");
    store.load_modules(modules);
    persistence(config).hydrate(&mut store);
    Ok(store)
}

fn models_root(config: &WorkbenchConfig, override_dir: Option<&Path>) -> Result<LocalDirectory> {
    let dir = override_dir
        .or(config.models_dir.as_deref())
        .ok_or(WorkbenchError::DirectoryNotConnected)?;
    LocalDirectory::open(dir)
}

/// Connect the models folder and print every module's status.
pub fn scan(config: &WorkbenchConfig, models_dir: Option<&Path>) -> Result<()> {
    let mut store = open_store(config)?;
    let root = models_root(config, models_dir)?;
    println!("Models folder: {}", root.path().display());

    ModelStatusService::new().connect_directory(&mut store, root.into_handle())?;

    let state = store.state();
    if state.models.modules.is_empty() {
        println!("No module manifests in {}", config.manifests_dir.display());
        return Ok(());
    }

    for module in store.ordered_modules() {
        let starred = if state.models.starred_models.contains(&module.id) {
            "*"
        } else {
            " "
        };
        let status = state.status_of(&module.id);
        let label = status.map(|s| s.status.as_str()).unwrap_or("unknown");
        println!("{} {:<45} {:<10} {}", starred, module.id, label, module.task);

        if let Some(status) = status {
            for variant in &status.discovered_variants {
                let marker = if status.selected_variant.as_deref() == Some(variant.name.as_str()) {
                    ">"
                } else {
                    " "
                };
                println!("    {} {} ({} files)", marker, variant.name, variant.files.len());
            }
        }
    }
    Ok(())
}

/// Group file names into variants and print them in priority order.
pub fn variants(files: &[String]) -> Result<()> {
    let mut files = files.to_vec();
    files.sort();
    let variants = discover_variants(&files);
    if variants.is_empty() {
        println!("No recognized weight files.");
        return Ok(());
    }
    for variant in variants {
        let options = serde_json::to_string(&variant.pipeline_options)?;
        println!("{} {}", variant.name, options);
        for file in &variant.files {
            println!("    {}", file);
        }
    }
    Ok(())
}

/// Print the contain-fit of `native` inside `display`.
pub fn fit(display: Size, native: Size) -> Result<()> {
    let rect = contain_fit(display, native);
    println!(
        "x={:.2} y={:.2} width={:.2} height={:.2}",
        rect.x, rect.y, rect.width, rect.height
    );
    Ok(())
}

/// Print the stored settings record, or the defaults.
pub fn settings(config: &WorkbenchConfig) -> Result<()> {
    let record = match persistence(config).load() {
        Some(record) => record,
        None => {
            warn!(dir = %config.settings_dir.display(), "no settings record, showing defaults");
            PersistedSettings::default()
        }
    };
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// Download a module into the models folder.
#[cfg(feature = "hub")]
pub fn download(config: &WorkbenchConfig, module: &str, models_dir: Option<&Path>) -> Result<()> {
    use crate::models::{HubRegistry, ModelDownloadOrchestrator};

    let mut store = open_store(config)?;
    let root = models_root(config, models_dir)?;
    store.connect_directory(root.into_handle());

    let registry = Arc::new(HubRegistry::new(config.hub_url.clone()));
    let mut downloader = ModelDownloadOrchestrator::new(registry, ModelStatusService::new());
    store.subscribe(crate::state::Topic::DownloadProgressChanged, |state, _| {
        let progress = &state.models.download_progress;
        if let (Some(file), Some(fraction)) = (&progress.filename, progress.fraction()) {
            println!(
                "[{}/{}] {:>3.0}% {}",
                progress.current,
                progress.total,
                fraction * 100.0,
                file
            );
        }
    });

    let written = downloader.download(&mut store, module)?;
    println!("Downloaded {} files for {}", written, module);
    Ok(())
}

/// Download a module into the models folder.
#[cfg(not(feature = "hub"))]
pub fn download(_config: &WorkbenchConfig, module: &str, _models_dir: Option<&Path>) -> Result<()> {
    Err(WorkbenchError::Download {
        file: module.to_string(),
        reason: "hub support not compiled. Build with --features hub".to_string(),
    })
}
