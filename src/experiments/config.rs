use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::results::RESULTS_KEY;
use super::targeting::PagePattern;
use crate::error::AbTestError;

/// Total traffic a test's variant weights must add up to.
pub const TOTAL_WEIGHT: u32 = 100;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestDefinition {
    pub test_name: String,
    #[serde(default)]
    pub description: String,
    pub status: TestStatus,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub target_pages: Vec<String>,
    pub variants: Vec<Variant>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Active,
    Inactive,
    Complete,
}

/// One arm of a test. `payload` is whatever the rendering layer needs (copy,
/// component key, styling props) and is never interpreted here.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: String,
    pub weight: u32,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl Variant {
    pub fn new(id: impl Into<String>, weight: u32) -> Self {
        Self {
            id: id.into(),
            weight,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

impl TestDefinition {
    /// Storage key the visitor's assignment for this test is persisted under.
    pub fn storage_key(&self) -> String {
        format!("ab_test_{}", self.test_name)
    }

    pub fn variant(&self, id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == id)
    }

    /// The first listed variant, used as the control and as the
    /// storage-independent default before any assignment can be read.
    pub fn control(&self) -> Option<&Variant> {
        self.variants.first()
    }

    /// True when `today` falls inside `[start_date, end_date]`.
    pub fn in_date_window(&self, today: NaiveDate) -> bool {
        if today < self.start_date {
            return false;
        }
        match self.end_date {
            Some(end) => today <= end,
            None => true,
        }
    }

    pub fn is_live(&self, today: NaiveDate) -> bool {
        self.status == TestStatus::Active && self.in_date_window(today)
    }

    pub fn targets(&self, path: &str) -> bool {
        self.target_pages
            .iter()
            .filter_map(|raw| PagePattern::parse(raw).ok())
            .any(|pattern| pattern.matches(path))
    }

    pub fn validate(&self) -> Result<(), AbTestError> {
        let name = self.test_name.as_str();
        if name.trim().is_empty() {
            return Err(AbTestError::invalid_config(name, "testName must not be empty"));
        }
        if self.storage_key() == RESULTS_KEY {
            return Err(AbTestError::invalid_config(
                name,
                format!("testName would share the {RESULTS_KEY} storage key"),
            ));
        }
        if self.variants.is_empty() {
            return Err(AbTestError::invalid_config(name, "at least one variant is required"));
        }

        let mut seen = HashSet::new();
        for variant in &self.variants {
            if variant.id.is_empty() {
                return Err(AbTestError::invalid_config(name, "variant id must not be empty"));
            }
            if !seen.insert(variant.id.as_str()) {
                return Err(AbTestError::invalid_config(
                    name,
                    format!("duplicate variant id {:?}", variant.id),
                ));
            }
            if variant.weight == 0 || variant.weight > TOTAL_WEIGHT {
                return Err(AbTestError::invalid_config(
                    name,
                    format!(
                        "variant {:?} weight {} must be in 1..={}",
                        variant.id, variant.weight, TOTAL_WEIGHT
                    ),
                ));
            }
        }

        let total: u32 = self.variants.iter().map(|v| v.weight).sum();
        if total != TOTAL_WEIGHT {
            return Err(AbTestError::invalid_config(
                name,
                format!("weights sum to {}, expected {}", total, TOTAL_WEIGHT),
            ));
        }

        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(AbTestError::invalid_config(
                    name,
                    "endDate is earlier than startDate",
                ));
            }
        }

        for raw in &self.target_pages {
            PagePattern::parse(raw)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn valid_test() -> TestDefinition {
        TestDefinition {
            test_name: "hero_cta".to_string(),
            description: "Hero button copy".to_string(),
            status: TestStatus::Active,
            start_date: date("2024-01-01"),
            end_date: Some(date("2024-12-31")),
            target_pages: vec!["/".to_string(), "/industries/[industry]".to_string()],
            variants: vec![Variant::new("control", 50), Variant::new("variant", 50)],
        }
    }

    #[test]
    fn validate_valid_test_succeeds() {
        assert!(valid_test().validate().is_ok());
    }

    #[test]
    fn validate_weights_not_summing_to_100_fails() {
        let mut t = valid_test();
        t.variants[1].weight = 40;
        let err = t.validate().unwrap_err();
        assert!(err.to_string().contains("weights sum to 90"));
    }

    #[test]
    fn validate_zero_weight_fails() {
        let mut t = valid_test();
        t.variants = vec![Variant::new("control", 100), Variant::new("variant", 0)];
        assert!(t.validate().is_err());
    }

    #[test]
    fn validate_empty_variants_fails() {
        let mut t = valid_test();
        t.variants.clear();
        assert!(t.validate().is_err());
    }

    #[test]
    fn validate_duplicate_variant_ids_fails() {
        let mut t = valid_test();
        t.variants[1].id = "control".to_string();
        let err = t.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate variant id"));
    }

    #[test]
    fn validate_end_before_start_fails() {
        let mut t = valid_test();
        t.end_date = Some(date("2023-06-01"));
        assert!(t.validate().is_err());
    }

    #[test]
    fn validate_bad_pattern_fails() {
        let mut t = valid_test();
        t.target_pages.push("quote".to_string());
        assert!(matches!(
            t.validate(),
            Err(AbTestError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn validate_rejects_name_colliding_with_results_log() {
        let mut t = valid_test();
        t.test_name = "results".to_string();
        let err = t.validate().unwrap_err();
        assert!(err.to_string().contains("ab_test_results"));

        t.test_name = "results_v2".to_string();
        assert!(t.validate().is_ok());
    }

    #[test]
    fn date_window_bounds_are_inclusive() {
        let t = valid_test();
        assert!(t.in_date_window(date("2024-01-01")));
        assert!(t.in_date_window(date("2024-12-31")));
        assert!(!t.in_date_window(date("2023-12-31")));
        assert!(!t.in_date_window(date("2025-01-01")));
    }

    #[test]
    fn open_ended_test_stays_in_window() {
        let mut t = valid_test();
        t.end_date = None;
        assert!(t.in_date_window(date("2031-07-04")));
    }

    #[test]
    fn storage_key_is_namespaced_by_test_name() {
        assert_eq!(valid_test().storage_key(), "ab_test_hero_cta");
    }

    #[test]
    fn definition_serializes_to_camel_case() {
        let json = serde_json::to_string(&valid_test()).unwrap();
        assert!(json.contains("testName"));
        assert!(json.contains("startDate"));
        assert!(json.contains("\"2024-01-01\""));
        assert!(json.contains("targetPages"));
        assert!(!json.contains("test_name"));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TestStatus::Active).unwrap(),
            "\"active\""
        );
        assert_eq!(
            serde_json::to_string(&TestStatus::Complete).unwrap(),
            "\"complete\""
        );
    }

    #[test]
    fn definition_parses_without_optional_fields() {
        let json = r#"{
            "testName": "quote_form",
            "status": "inactive",
            "startDate": "2024-03-01",
            "variants": [{"id": "a", "weight": 100}]
        }"#;
        let t: TestDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(t.end_date, None);
        assert!(t.target_pages.is_empty());
        assert!(t.variants[0].payload.is_null());
    }

    #[test]
    fn payload_is_carried_untouched() {
        let v = Variant::new("b", 50).with_payload(serde_json::json!({"text": "Get a Quote"}));
        let back: Variant = serde_json::from_str(&serde_json::to_string(&v).unwrap()).unwrap();
        assert_eq!(back.payload["text"], "Get a Quote");
    }
}
