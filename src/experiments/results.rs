//! Session-scoped, append-only log of result events.
//!
//! All events live in one JSON array under [`RESULTS_KEY`]. Reads that fail or
//! find garbage behave as an empty log; writes that fail drop the event. This
//! is a client-side analytics cache, not a durable store.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::config::TestDefinition;
use super::storage::SessionStorage;

pub const RESULTS_KEY: &str = "ab_test_results";

/// Metric name recorded when a variant is shown.
pub const IMPRESSION: &str = "impression";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultEvent {
    pub test_name: String,
    pub variant_id: String,
    pub metric: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

impl ResultEvent {
    pub fn new(
        test_name: impl Into<String>,
        variant_id: impl Into<String>,
        metric: impl Into<String>,
        value: Option<f64>,
        timestamp: i64,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            variant_id: variant_id.into(),
            metric: metric.into(),
            value,
            timestamp,
        }
    }
}

fn read_log(storage: &dyn SessionStorage) -> Vec<ResultEvent> {
    let raw = match storage.get_item(RESULTS_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::debug!(error = %e, "result log read failed");
            return Vec::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(events) => events,
        Err(e) => {
            tracing::debug!(error = %e, "result log is malformed; treating as empty");
            Vec::new()
        }
    }
}

/// Appends `event` to the session's result log. Never fails; on a storage
/// error the event is lost.
pub fn record_test_result(storage: &dyn SessionStorage, event: ResultEvent) {
    let mut events = read_log(storage);
    events.push(event);
    let data = match serde_json::to_string(&events) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(error = %e, "could not serialize result log");
            return;
        }
    };
    if let Err(e) = storage.set_item(RESULTS_KEY, &data) {
        tracing::warn!(error = %e, events = events.len(), "result event dropped");
    }
}

/// Events recorded for `test_name`, in insertion order. Empty on any failure.
pub fn get_test_results(storage: &dyn SessionStorage, test_name: &str) -> Vec<ResultEvent> {
    let mut events = read_log(storage);
    events.retain(|e| e.test_name == test_name);
    events
}

/// Per-variant aggregation of a test's results.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
    pub test_name: String,
    pub total_events: usize,
    pub variants: Vec<VariantSummary>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VariantSummary {
    pub variant_id: String,
    pub impressions: u64,
    /// Event count per non-impression metric.
    pub metric_counts: BTreeMap<String, u64>,
    /// Sum of `value` per metric, for events that carried one.
    pub metric_values: BTreeMap<String, f64>,
    /// Non-impression events per impression; 0.0 with no impressions.
    pub conversion_rate: f64,
}

impl TestSummary {
    pub fn variant(&self, variant_id: &str) -> Option<&VariantSummary> {
        self.variants.iter().find(|v| v.variant_id == variant_id)
    }
}

/// Aggregates `events` (already filtered to one test). Variants appear in
/// the definition's order when one is given, then unknown ids in first-seen
/// order.
pub fn summarize(
    test_name: &str,
    definition: Option<&TestDefinition>,
    events: &[ResultEvent],
) -> TestSummary {
    let mut by_variant: IndexMap<String, VariantSummary> = IndexMap::new();
    if let Some(definition) = definition {
        for variant in &definition.variants {
            by_variant.insert(
                variant.id.clone(),
                VariantSummary {
                    variant_id: variant.id.clone(),
                    ..Default::default()
                },
            );
        }
    }

    for event in events {
        let summary = by_variant
            .entry(event.variant_id.clone())
            .or_insert_with(|| VariantSummary {
                variant_id: event.variant_id.clone(),
                ..Default::default()
            });
        if event.metric == IMPRESSION {
            summary.impressions += 1;
        } else {
            *summary.metric_counts.entry(event.metric.clone()).or_insert(0) += 1;
        }
        if let Some(value) = event.value {
            *summary
                .metric_values
                .entry(event.metric.clone())
                .or_insert(0.0) += value;
        }
    }

    let variants = by_variant
        .into_values()
        .map(|mut summary| {
            let actions: u64 = summary.metric_counts.values().sum();
            summary.conversion_rate = if summary.impressions == 0 {
                0.0
            } else {
                actions as f64 / summary.impressions as f64
            };
            summary
        })
        .collect();

    TestSummary {
        test_name: test_name.to_string(),
        total_events: events.len(),
        variants,
    }
}
