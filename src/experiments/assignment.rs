use std::sync::Mutex;

use rand::Rng;

use super::analytics::AnalyticsSink;
use super::config::{TestDefinition, Variant, TOTAL_WEIGHT};
use super::results::RESULTS_KEY;
use super::storage::SessionStorage;

/// Uniform draws in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    fn next_unit(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_unit(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Replays a fixed sequence of draws, repeating the last one once exhausted.
#[derive(Debug)]
pub struct FixedDraw {
    draws: Mutex<Vec<f64>>,
    last: f64,
}

impl FixedDraw {
    pub fn new(draw: f64) -> Self {
        Self::sequence(vec![draw])
    }

    pub fn sequence(mut draws: Vec<f64>) -> Self {
        let last = draws.last().copied().unwrap_or(0.0);
        draws.reverse();
        Self {
            draws: Mutex::new(draws),
            last,
        }
    }
}

impl RandomSource for FixedDraw {
    fn next_unit(&self) -> f64 {
        match self.draws.lock() {
            Ok(mut draws) => draws.pop().unwrap_or(self.last),
            Err(_) => self.last,
        }
    }
}

/// Walks `variants` in order accumulating their integer weights and returns
/// the first whose cumulative weight exceeds `draw * 100`. Falls back to the
/// first variant when the weights leave the draw uncovered.
pub fn select_variant(variants: &[Variant], draw: f64) -> Option<&Variant> {
    let point = draw * f64::from(TOTAL_WEIGHT);
    let mut cumulative: u32 = 0;
    for variant in variants {
        cumulative = cumulative.saturating_add(variant.weight);
        if point < f64::from(cumulative) {
            return Some(variant);
        }
    }
    variants.first()
}

/// Storage key for the assignment, or `None` when the test's key would
/// clobber the shared result log.
fn assignment_key(test: &TestDefinition) -> Option<String> {
    let key = test.storage_key();
    if key == RESULTS_KEY {
        tracing::warn!(
            test = %test.test_name,
            "assignment key collides with the result log; not persisting"
        );
        return None;
    }
    Some(key)
}

/// The assignment persisted for `test`, if storage is readable and holds an
/// id that is still one of the test's variants.
pub fn stored_assignment<'a>(
    test: &'a TestDefinition,
    storage: &dyn SessionStorage,
) -> Option<&'a Variant> {
    let key = assignment_key(test)?;
    match storage.get_item(&key) {
        Ok(Some(id)) => {
            let found = test.variant(&id);
            if found.is_none() {
                tracing::debug!(
                    test = %test.test_name,
                    stored = %id,
                    "stored assignment no longer matches a variant"
                );
            }
            found
        }
        Ok(None) => None,
        Err(e) => {
            tracing::debug!(test = %test.test_name, error = %e, "assignment read failed");
            None
        }
    }
}

/// Returns the visitor's variant for `test`, drawing and persisting one on
/// first use.
///
/// A stored assignment is returned as is, with no draw and no tracking call.
/// A fresh assignment is written back (write failures only cost stickiness)
/// and reported to `sink` with the page `path`. `None` only for a test with no
/// variants.
pub fn resolve_variant<'a>(
    test: &'a TestDefinition,
    path: &str,
    storage: &dyn SessionStorage,
    random: &dyn RandomSource,
    sink: &dyn AnalyticsSink,
) -> Option<&'a Variant> {
    if let Some(existing) = stored_assignment(test, storage) {
        return Some(existing);
    }

    let draw = random.next_unit();
    let chosen = select_variant(&test.variants, draw)?;

    if let Some(key) = assignment_key(test) {
        if let Err(e) = storage.set_item(&key, &chosen.id) {
            tracing::warn!(
                test = %test.test_name,
                variant = %chosen.id,
                error = %e,
                "could not persist assignment; it will not be sticky"
            );
        }
    }

    tracing::info!(
        test = %test.test_name,
        variant = %chosen.id,
        path,
        draw,
        "assigned variant"
    );
    sink.track_assignment(&test.test_name, &chosen.id, path);
    Some(chosen)
}

/// Storage-independent variant for server rendering and first paint: always
/// the first listed variant.
pub fn initial_variant(test: &TestDefinition) -> Option<&Variant> {
    test.control()
}

/// Forgets the persisted assignment for `test`. Best effort.
pub fn clear_assignment(test: &TestDefinition, storage: &dyn SessionStorage) {
    let Some(key) = assignment_key(test) else {
        return;
    };
    if let Err(e) = storage.remove_item(&key) {
        tracing::debug!(test = %test.test_name, error = %e, "assignment clear failed");
    }
}
