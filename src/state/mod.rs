//! Application state
//!
//! The state tree, the store that mutates it, the event bus that announces
//! each mutation, and settings persistence.

pub mod app_state;
pub mod bus;
pub mod persistence;
pub mod store;

pub use app_state::{
    AppState, AudioInput, DownloadProgress, ModelAvailability, ModelStatus, ProcessingMode, Theme,
    DEFAULT_SIDEBAR_WIDTH,
};
pub use bus::{Event, EventBus, Listener, Topic};
pub use persistence::{
    JsonFileBackend, PersistedSettings, PersistenceService, SettingsBackend, SETTINGS_KEY,
};
pub use store::{StateStore, MAX_SIDEBAR_WIDTH, MIN_SIDEBAR_WIDTH};
