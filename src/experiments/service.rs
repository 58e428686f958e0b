use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::analytics::{AnalyticsSink, NoopSink};
use super::assignment::{self, RandomSource, ThreadRandom};
use super::config::{TestDefinition, Variant};
use super::eligibility::{self, Clock, SystemClock};
use super::registry::TestRegistry;
use super::results::{self, ResultEvent, TestSummary, IMPRESSION};
use super::storage::{SessionStorage, UnavailableStorage};

/// The public surface consumed by page components and the admin dashboard.
///
/// Holds the registry by value and every outside collaborator behind a trait
/// object, so one instance can be built per visitor session (browser) or per
/// request (server rendering) with different storage.
pub struct AbTesting {
    registry: TestRegistry,
    storage: Arc<dyn SessionStorage>,
    sink: Arc<dyn AnalyticsSink>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl AbTesting {
    /// No storage, no analytics, the system clock and thread-local randomness.
    pub fn new(registry: TestRegistry) -> Self {
        Self {
            registry,
            storage: Arc::new(UnavailableStorage),
            sink: Arc::new(NoopSink),
            clock: Arc::new(SystemClock),
            random: Arc::new(ThreadRandom),
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn registry(&self) -> &TestRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TestRegistry {
        &mut self.registry
    }

    pub fn storage(&self) -> &dyn SessionStorage {
        self.storage.as_ref()
    }

    pub fn get_active_test(&self, test_name: &str) -> Option<&TestDefinition> {
        eligibility::get_active_test(&self.registry, test_name, self.clock.today())
    }

    pub fn get_tests_for_page(&self, path: &str) -> Vec<&TestDefinition> {
        eligibility::get_tests_for_page(&self.registry, path, self.clock.today())
    }

    pub fn resolve_variant<'a>(&self, test: &'a TestDefinition, path: &str) -> Option<&'a Variant> {
        assignment::resolve_variant(
            test,
            path,
            self.storage.as_ref(),
            self.random.as_ref(),
            self.sink.as_ref(),
        )
    }

    pub fn initial_variant<'a>(&self, test: &'a TestDefinition) -> Option<&'a Variant> {
        assignment::initial_variant(test)
    }

    /// The variant to render for `test_name` on `path`, or `None` when the test
    /// is unknown or not currently active. Callers render their default
    /// markup on `None`.
    pub fn variant_for(&self, test_name: &str, path: &str) -> Option<&Variant> {
        let test = self.get_active_test(test_name)?;
        self.resolve_variant(test, path)
    }

    pub fn stored_assignment(&self, test_name: &str) -> Option<&Variant> {
        let test = self.registry.lookup(test_name)?;
        assignment::stored_assignment(test, self.storage.as_ref())
    }

    pub fn clear_assignment(&self, test_name: &str) {
        if let Some(test) = self.registry.lookup(test_name) {
            assignment::clear_assignment(test, self.storage.as_ref());
        }
    }

    pub fn record_test_result(&self, event: ResultEvent) {
        results::record_test_result(self.storage.as_ref(), event);
    }

    pub fn get_test_results(&self, test_name: &str) -> Vec<ResultEvent> {
        results::get_test_results(self.storage.as_ref(), test_name)
    }

    /// Records that `variant_id` of `test_name` was shown.
    pub fn record_impression(&self, test_name: &str, variant_id: &str) {
        self.record_metric(test_name, variant_id, IMPRESSION, None);
    }

    /// Records an interaction such as `cta_click` or `quote_submitted`.
    pub fn record_conversion(
        &self,
        test_name: &str,
        variant_id: &str,
        metric: &str,
        value: Option<f64>,
    ) {
        self.record_metric(test_name, variant_id, metric, value);
    }

    fn record_metric(&self, test_name: &str, variant_id: &str, metric: &str, value: Option<f64>) {
        let event = ResultEvent::new(test_name, variant_id, metric, value, self.clock.now_ms());
        let mut properties = Map::new();
        properties.insert("test_name".to_string(), json!(test_name));
        properties.insert("variant_id".to_string(), json!(variant_id));
        if let Some(value) = value {
            properties.insert("value".to_string(), json!(value));
        }
        self.record_test_result(event);
        self.sink.track_event(metric, &properties);
    }

    pub fn summarize_results(&self, test_name: &str) -> TestSummary {
        let events = self.get_test_results(test_name);
        results::summarize(test_name, self.registry.lookup(test_name), &events)
    }

    /// Every stored assignment for tests in the registry, as
    /// `{testName: variantId}`.
    pub fn assignments(&self) -> Value {
        let mut out = Map::new();
        for test in self.registry.iter() {
            if let Some(variant) = assignment::stored_assignment(test, self.storage.as_ref()) {
                out.insert(test.test_name.clone(), json!(variant.id));
            }
        }
        Value::Object(out)
    }
}
