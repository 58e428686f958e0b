use chrono::{DateTime, NaiveDate, Utc};

use super::config::TestDefinition;
use super::registry::TestRegistry;

/// Source of the current date for eligibility and of event timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Midnight UTC on the given day.
    pub fn on(date: NaiveDate) -> Self {
        FixedClock(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Returns the definition when it exists, is `active` and `today` is inside
/// its date window.
pub fn get_active_test<'a>(
    registry: &'a TestRegistry,
    test_name: &str,
    today: NaiveDate,
) -> Option<&'a TestDefinition> {
    registry
        .lookup(test_name)
        .filter(|test| test.is_live(today))
}

/// Every live test with at least one target pattern matching `path`, in
/// registry order.
pub fn get_tests_for_page<'a>(
    registry: &'a TestRegistry,
    path: &str,
    today: NaiveDate,
) -> Vec<&'a TestDefinition> {
    registry
        .iter()
        .filter(|test| test.is_live(today) && test.targets(path))
        .collect()
}
