//! Synchronous publish/subscribe event bus
//!
//! Listeners run on the publisher's thread, in registration order, against a
//! snapshot of the listener list taken when `publish` starts. Each listener
//! runs inside its own panic boundary so one failing subscriber cannot stop
//! delivery to the rest.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tracing::error;

/// Event names published by the state store
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Topic {
    DirectoryChanged,
    GpuSupportChanged,
    UseGpuChanged,
    ThemeChanged,
    SidebarWidthChanged,
    WorkbenchRenderingChanged,
    ModulesLoaded,
    ModelStatusChanged,
    ActiveModuleChanged,
    StarredModelsChanged,
    ModelOrderChanged,
    CollapsedModelsChanged,
    DownloadProgressChanged,
    ProcessingChanged,
    InferenceTimingChanged,
    RuntimeConfigChanged,
    ProcessingModeChanged,
    ImageInputsChanged,
    AudioInputChanged,
    PromptPointsChanged,
    OutputChanged,
    ComparisonModeChanged,
    SettingsRestored,
    Alert,
    WorkerStatus,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::DirectoryChanged => "directoryChanged",
            Topic::GpuSupportChanged => "gpuSupportChanged",
            Topic::UseGpuChanged => "useGpuChanged",
            Topic::ThemeChanged => "themeChanged",
            Topic::SidebarWidthChanged => "sidebarWidthChanged",
            Topic::WorkbenchRenderingChanged => "workbenchRenderingChanged",
            Topic::ModulesLoaded => "modulesLoaded",
            Topic::ModelStatusChanged => "modelStatusChanged",
            Topic::ActiveModuleChanged => "activeModuleChanged",
            Topic::StarredModelsChanged => "starredModelsChanged",
            Topic::ModelOrderChanged => "modelOrderChanged",
            Topic::CollapsedModelsChanged => "collapsedModelsChanged",
            Topic::DownloadProgressChanged => "downloadProgressChanged",
            Topic::ProcessingChanged => "processingChanged",
            Topic::InferenceTimingChanged => "inferenceTimingChanged",
            Topic::RuntimeConfigChanged => "runtimeConfigChanged",
            Topic::ProcessingModeChanged => "processingModeChanged",
            Topic::ImageInputsChanged => "imageInputsChanged",
            Topic::AudioInputChanged => "audioInputChanged",
            Topic::PromptPointsChanged => "promptPointsChanged",
            Topic::OutputChanged => "outputChanged",
            Topic::ComparisonModeChanged => "comparisonModeChanged",
            Topic::SettingsRestored => "settingsRestored",
            Topic::Alert => "alert",
            Topic::WorkerStatus => "workerStatus",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub topic: Topic,
    pub payload: Value,
}

impl Event {
    pub fn new(topic: Topic, payload: Value) -> Self {
        Self { topic, payload }
    }

    /// `{key, value}` payload for keyed updates
    pub fn keyed(topic: Topic, key: &str, value: Value) -> Self {
        Self::new(topic, serde_json::json!({ "key": key, "value": value }))
    }
}

/// Listener receiving a read-only view of the published-over state
pub type Listener<S> = Arc<dyn Fn(&S, &Event) + Send + Sync>;

/// Publish/subscribe dispatcher over a state type `S`
pub struct EventBus<S> {
    listeners: Mutex<HashMap<Topic, Vec<Listener<S>>>>,
}

impl<S> Default for EventBus<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for EventBus<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl<S> EventBus<S> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Register a listener for `topic`
    pub fn subscribe<F>(&self, topic: Topic, listener: F)
    where
        F: Fn(&S, &Event) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.entry(topic).or_default().push(Arc::new(listener));
    }

    /// Number of listeners registered for `topic`
    pub fn listener_count(&self, topic: Topic) -> usize {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.get(&topic).map(Vec::len).unwrap_or(0)
    }

    /// Deliver `event` to every listener of its topic.
    ///
    /// Returns the number of listeners that completed without panicking.
    pub fn publish(&self, state: &S, event: &Event) -> usize {
        let snapshot: Vec<Listener<S>> = {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.get(&event.topic).cloned().unwrap_or_default()
        };

        let mut delivered = 0;
        for listener in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(state, event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(topic = %event.topic, %message, "event listener panicked");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publish_to_no_subscribers_succeeds() {
        let bus: EventBus<()> = EventBus::new();
        assert_eq!(bus.publish(&(), &Event::new(Topic::Alert, Value::Null)), 0);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let bus: EventBus<()> = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            bus.subscribe(Topic::ThemeChanged, move |_, _| log.lock().unwrap().push(i));
        }

        bus.publish(&(), &Event::new(Topic::ThemeChanged, Value::Null));
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn different_topics_no_crosstalk() {
        let bus: EventBus<()> = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        bus.subscribe(Topic::ThemeChanged, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&(), &Event::new(Topic::OutputChanged, Value::Null));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn subscribe_during_dispatch_does_not_join_current_pass() {
        let bus: Arc<EventBus<()>> = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let inner_bus = Arc::clone(&bus);
        let inner_hits = Arc::clone(&hits);
        bus.subscribe(Topic::Alert, move |_, _| {
            let late_hits = Arc::clone(&inner_hits);
            inner_bus.subscribe(Topic::Alert, move |_, _| {
                late_hits.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert_eq!(bus.publish(&(), &Event::new(Topic::Alert, Value::Null)), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.listener_count(Topic::Alert), 2);
    }

    #[test]
    fn panicking_listener_does_not_stop_dispatch() {
        let bus: EventBus<()> = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Topic::Alert, |_, _| panic!("listener failure"));
        let counter = Arc::clone(&hits);
        bus.subscribe(Topic::Alert, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let delivered = bus.publish(&(), &Event::new(Topic::Alert, Value::Null));
        assert_eq!(delivered, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_sees_state() {
        let bus: EventBus<u32> = EventBus::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        bus.subscribe(Topic::SidebarWidthChanged, move |state, event| {
            *sink.lock().unwrap() = Some((*state, event.payload.clone()));
        });

        bus.publish(&320, &Event::new(Topic::SidebarWidthChanged, Value::from(320)));
        assert_eq!(*seen.lock().unwrap(), Some((320, Value::from(320))));
    }
}
