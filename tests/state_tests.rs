//! State Store Integration Tests
//!
//! Event semantics of the store and the settings record round trip.

use std::sync::{Arc, Mutex};

use modelbench::models::ModuleManifest;
use modelbench::state::{
    JsonFileBackend, PersistenceService, ProcessingMode, StateStore, Theme, Topic,
};
use serde_json::json;

fn manifest(id: &str, task: &str) -> ModuleManifest {
    serde_json::from_value(json!({ "id": id, "name": id, "task": task })).unwrap()
}

fn store() -> StateStore {
    let mut store = StateStore::new();
    store.load_modules(vec![
        manifest("Xenova/modnet", "background-removal"),
        manifest("Xenova/depth-anything", "depth-estimation"),
        manifest("Xenova/whisper-tiny", "speech-recognition"),
    ]);
    store
}

/// Record every event published on `topics`
fn record(store: &StateStore, topics: &[Topic]) -> Arc<Mutex<Vec<Topic>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for topic in topics {
        let sink = Arc::clone(&seen);
        store.subscribe(*topic, move |_, event| sink.lock().unwrap().push(event.topic));
    }
    seen
}

// === Event Semantics ===

#[test]
fn test_each_change_publishes_once() {
    let mut store = store();
    let seen = record(
        &store,
        &[
            Topic::ThemeChanged,
            Topic::SidebarWidthChanged,
            Topic::ProcessingModeChanged,
            Topic::ActiveModuleChanged,
        ],
    );

    store.set_theme(Theme::Dark);
    store.set_sidebar_width(300);
    store.set_processing_mode(ProcessingMode::Batch);
    store.set_active_module(Some("Xenova/modnet")).unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Topic::ThemeChanged,
            Topic::SidebarWidthChanged,
            Topic::ProcessingModeChanged,
            Topic::ActiveModuleChanged,
        ]
    );
}

#[test]
fn test_unchanged_values_publish_nothing() {
    let mut store = store();
    store.set_theme(Theme::Dark);
    store.set_active_module(Some("Xenova/modnet")).unwrap();
    let seen = record(&store, &[Topic::ThemeChanged, Topic::ActiveModuleChanged]);

    store.set_theme(Theme::Dark);
    assert!(!store.set_active_module(Some("Xenova/modnet")).unwrap());

    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_panicking_listener_does_not_block_others() {
    let mut store = store();
    store.subscribe(Topic::ThemeChanged, |_, _| panic!("listener failure"));
    let seen = record(&store, &[Topic::ThemeChanged]);

    store.toggle_theme();
    store.toggle_theme();

    assert_eq!(seen.lock().unwrap().len(), 2);
    assert_eq!(store.state().system.theme, Theme::Light);
}

#[test]
fn test_listener_sees_updated_state() {
    let mut store = store();
    let widths = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&widths);
    store.subscribe(Topic::SidebarWidthChanged, move |state, event| {
        sink.lock()
            .unwrap()
            .push((state.ui.sidebar_width, event.payload.clone()));
    });

    assert_eq!(store.set_sidebar_width(10_000), 640);
    assert_eq!(*widths.lock().unwrap(), vec![(640, json!(640))]);
}

#[test]
fn test_switching_module_clears_workbench() {
    let mut store = store();
    store.set_active_module(Some("Xenova/modnet")).unwrap();
    store.set_image_inputs(vec!["photo.png".into()]).unwrap();

    store.set_active_module(Some("Xenova/depth-anything")).unwrap();

    let workbench = &store.state().workbench;
    assert!(workbench.input.is_empty());
    assert!(workbench.output.data.is_none());
}

#[test]
fn test_unknown_module_rejected() {
    let mut store = store();
    let err = store.set_active_module(Some("Xenova/absent")).unwrap_err();
    assert_eq!(err.error_code(), "UNKNOWN_MODULE");
    assert!(store.state().models.active_module_id.is_none());
}

#[test]
fn test_move_model_reorders_display() {
    let mut store = store();
    store.move_model("Xenova/whisper-tiny", 0).unwrap();

    let ids: Vec<&str> = store.ordered_modules().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["Xenova/whisper-tiny", "Xenova/modnet", "Xenova/depth-anything"]
    );
}

// === Persistence ===

#[test]
fn test_settings_survive_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    let persistence = PersistenceService::new(Arc::new(JsonFileBackend::new(temp_dir.path())));

    {
        let mut store = store();
        assert!(!persistence.hydrate(&mut store));
        persistence.attach(&store);

        store.set_theme(Theme::Dark);
        store.set_use_gpu(false);
        store.toggle_starred("Xenova/depth-anything");
        store.toggle_collapsed("Xenova/modnet");
        store.move_model("Xenova/depth-anything", 0).unwrap();
    }

    let mut restored = store();
    assert!(persistence.hydrate(&mut restored));
    let state = restored.state();
    assert_eq!(state.system.theme, Theme::Dark);
    assert!(!state.system.use_gpu);
    assert!(state.models.starred_models.contains("Xenova/depth-anything"));
    // every module started collapsed; modnet was toggled open
    assert!(!state.models.collapsed_models.contains("Xenova/modnet"));
    assert!(state.models.collapsed_models.contains("Xenova/whisper-tiny"));
    assert_eq!(
        restored.ordered_modules()[0].id,
        "Xenova/depth-anything".to_string()
    );
}

#[test]
fn test_unpersisted_changes_do_not_write() {
    let temp_dir = tempfile::tempdir().unwrap();
    let persistence = PersistenceService::new(Arc::new(JsonFileBackend::new(temp_dir.path())));
    let mut store = store();
    persistence.attach(&store);

    store.set_active_module(Some("Xenova/modnet")).unwrap();
    store.set_rendering_workbench(true);

    assert!(persistence.load().is_none());
}
