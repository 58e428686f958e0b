//! Fire-and-forget analytics sink.
//!
//! Methods return `()`: an implementation that talks to a vendor must handle
//! its own failures, nothing comes back into assignment or recording.

use std::sync::Mutex;

use serde_json::{Map, Value};

pub trait AnalyticsSink: Send + Sync {
    /// A visitor was newly assigned `variant_id` of `test_name` on `path`.
    fn track_assignment(&self, test_name: &str, variant_id: &str, path: &str);

    /// A named interaction (impression, click, conversion) with free-form
    /// properties.
    fn track_event(&self, event_name: &str, properties: &Map<String, Value>);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl AnalyticsSink for NoopSink {
    fn track_assignment(&self, _test_name: &str, _variant_id: &str, _path: &str) {}

    fn track_event(&self, _event_name: &str, _properties: &Map<String, Value>) {}
}

/// Emits every call as a structured `tracing` event under the
/// `ironsplit::analytics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AnalyticsSink for TracingSink {
    fn track_assignment(&self, test_name: &str, variant_id: &str, path: &str) {
        tracing::info!(
            target: "ironsplit::analytics",
            test_name,
            variant_id,
            path,
            "ab_test_assignment"
        );
    }

    fn track_event(&self, event_name: &str, properties: &Map<String, Value>) {
        // `Value` inside the macro would name tracing's trait
        let props = serde_json::Value::Object(properties.clone());
        tracing::info!(
            target: "ironsplit::analytics",
            event = event_name,
            properties = %props,
            "ab_test_event"
        );
    }
}

/// Keeps every call in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    assignments: Mutex<Vec<(String, String, String)>>,
    events: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(test_name, variant_id, path)` per assignment, oldest first.
    pub fn assignments(&self) -> Vec<(String, String, String)> {
        self.assignments
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<(String, Map<String, Value>)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AnalyticsSink for RecordingSink {
    fn track_assignment(&self, test_name: &str, variant_id: &str, path: &str) {
        if let Ok(mut assignments) = self.assignments.lock() {
            assignments.push((
                test_name.to_string(),
                variant_id.to_string(),
                path.to_string(),
            ));
        }
    }

    fn track_event(&self, event_name: &str, properties: &Map<String, Value>) {
        if let Ok(mut events) = self.events.lock() {
            events.push((event_name.to_string(), properties.clone()));
        }
    }
}
