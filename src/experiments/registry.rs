use std::path::Path;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde_json::json;

use super::config::{TestDefinition, TestStatus, Variant};
use crate::error::AbTestError;

/// The table of test definitions, keyed by `testName` in insertion order.
///
/// Owned by whoever drives the tests and passed in explicitly; nothing in the
/// crate keeps a copy, so mutations are visible to the very next lookup.
#[derive(Debug, Clone, Default)]
pub struct TestRegistry {
    tests: IndexMap<String, TestDefinition>,
}

/// The previous state of one entry, returned by [`TestRegistry::patch`].
#[derive(Debug, Clone)]
#[must_use = "pass the patch back to TestRegistry::restore to undo it"]
pub struct RegistryPatch {
    previous: TestDefinition,
}

impl RegistryPatch {
    pub fn test_name(&self) -> &str {
        &self.previous.test_name
    }
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from definitions, validating each one.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = TestDefinition>,
    ) -> Result<Self, AbTestError> {
        let mut registry = Self::new();
        for definition in definitions {
            definition.validate()?;
            registry.insert(definition)?;
        }
        Ok(registry)
    }

    pub fn from_json_str(data: &str) -> Result<Self, AbTestError> {
        let definitions: Vec<TestDefinition> = serde_json::from_str(data)?;
        Self::from_definitions(definitions)
    }

    /// Loads a registry file (a JSON array of definitions) or a directory of
    /// them, validating every definition.
    pub fn load(path: &Path) -> Result<Self, AbTestError> {
        Self::from_definitions(Self::read_definitions(path)?)
    }

    /// Reads definitions from a registry file or directory as they are, with
    /// no validation. Directory entries are read in file-name order; `*.tmp`
    /// files are skipped.
    pub fn read_definitions(path: &Path) -> Result<Vec<TestDefinition>, AbTestError> {
        if !path.is_dir() {
            let data = std::fs::read_to_string(path)?;
            return Ok(serde_json::from_str(&data)?);
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let file = entry?.path();
            if file.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(file);
            }
        }
        files.sort();

        let mut definitions = Vec::new();
        for file in files {
            let data = std::fs::read_to_string(&file)?;
            let batch: Vec<TestDefinition> = serde_json::from_str(&data)?;
            tracing::debug!(file = %file.display(), tests = batch.len(), "read test definitions");
            definitions.extend(batch);
        }
        Ok(definitions)
    }

    /// Writes the registry as one JSON array, via a temp file and rename.
    pub fn save(&self, path: &Path) -> Result<(), AbTestError> {
        let tmp_path = path.with_extension("json.tmp");
        let definitions: Vec<&TestDefinition> = self.tests.values().collect();
        let data = serde_json::to_string_pretty(&definitions)?;
        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn lookup(&self, test_name: &str) -> Option<&TestDefinition> {
        self.tests.get(test_name)
    }

    pub fn get_mut(&mut self, test_name: &str) -> Option<&mut TestDefinition> {
        self.tests.get_mut(test_name)
    }

    pub fn insert(&mut self, definition: TestDefinition) -> Result<(), AbTestError> {
        if self.tests.contains_key(&definition.test_name) {
            return Err(AbTestError::AlreadyExists(definition.test_name));
        }
        self.tests.insert(definition.test_name.clone(), definition);
        Ok(())
    }

    /// Inserts or replaces, keeping the original position of a replaced entry.
    pub fn upsert(&mut self, definition: TestDefinition) -> Option<TestDefinition> {
        self.tests.insert(definition.test_name.clone(), definition)
    }

    pub fn remove(&mut self, test_name: &str) -> Option<TestDefinition> {
        self.tests.shift_remove(test_name)
    }

    /// Applies `f` to one entry and hands back what it looked like before.
    ///
    /// `testName` is the registry key; a patch that renames the test is
    /// reverted to the original name.
    pub fn patch(
        &mut self,
        test_name: &str,
        f: impl FnOnce(&mut TestDefinition),
    ) -> Option<RegistryPatch> {
        let entry = self.tests.get_mut(test_name)?;
        let previous = entry.clone();
        f(entry);
        entry.test_name = previous.test_name.clone();
        Some(RegistryPatch { previous })
    }

    pub fn restore(&mut self, patch: RegistryPatch) {
        self.upsert(patch.previous);
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestDefinition> {
        self.tests.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tests.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// First invalid definition, if any.
    pub fn validate(&self) -> Result<(), AbTestError> {
        self.tests.values().try_for_each(TestDefinition::validate)
    }

    /// Every invalid definition with its error, in registry order.
    pub fn problems(&self) -> Vec<(&str, AbTestError)> {
        self.tests
            .values()
            .filter_map(|t| t.validate().err().map(|e| (t.test_name.as_str(), e)))
            .collect()
    }

    /// The site's built-in tests.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for definition in builtin_definitions() {
            registry.upsert(definition);
        }
        registry
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

fn builtin_definitions() -> Vec<TestDefinition> {
    vec![
        TestDefinition {
            test_name: "hero_cta_text".to_string(),
            description: "Homepage hero call-to-action copy".to_string(),
            status: TestStatus::Active,
            start_date: ymd(2024, 1, 15),
            end_date: None,
            target_pages: vec!["/".to_string()],
            variants: vec![
                Variant::new("control", 50).with_payload(json!({ "text": "Get a Free Quote" })),
                Variant::new("variant", 50)
                    .with_payload(json!({ "text": "Get Pricing in 24 Hours" })),
            ],
        },
        TestDefinition {
            test_name: "quote_form_layout".to_string(),
            description: "Single-page quote form vs. stepped wizard".to_string(),
            status: TestStatus::Active,
            start_date: ymd(2024, 2, 1),
            end_date: None,
            target_pages: vec!["/quote".to_string(), "/contact".to_string()],
            variants: vec![
                Variant::new("single_page", 50).with_payload(json!({ "layout": "single" })),
                Variant::new("multi_step", 50)
                    .with_payload(json!({ "layout": "wizard", "steps": 3 })),
            ],
        },
        TestDefinition {
            test_name: "industry_page_headline".to_string(),
            description: "Headline framing on industry landing pages".to_string(),
            status: TestStatus::Active,
            start_date: ymd(2024, 3, 1),
            end_date: None,
            target_pages: vec!["/industries/[industry]".to_string()],
            variants: vec![
                Variant::new("control", 34)
                    .with_payload(json!({ "headline": "Precision Metal Fabrication" })),
                Variant::new("capability", 33)
                    .with_payload(json!({ "headline": "Laser Cutting, Forming & Welding" })),
                Variant::new("speed", 33)
                    .with_payload(json!({ "headline": "Parts Shipped in Days, Not Weeks" })),
            ],
        },
        TestDefinition {
            test_name: "location_trust_badges".to_string(),
            description: "Certification badges above the fold on location pages".to_string(),
            status: TestStatus::Inactive,
            start_date: ymd(2024, 4, 1),
            end_date: None,
            target_pages: vec!["/locations/[city]".to_string()],
            variants: vec![
                Variant::new("control", 50),
                Variant::new("badges", 50)
                    .with_payload(json!({ "badges": ["ISO 9001", "AWS D1.1"] })),
            ],
        },
        TestDefinition {
            test_name: "sitewide_phone_cta".to_string(),
            description: "Sticky click-to-call button on every page".to_string(),
            status: TestStatus::Active,
            start_date: ymd(2024, 1, 1),
            end_date: None,
            target_pages: vec!["/*".to_string()],
            variants: vec![
                Variant::new("control", 70),
                Variant::new("sticky_call", 30).with_payload(json!({ "position": "bottom" })),
            ],
        },
        TestDefinition {
            test_name: "services_pricing_table".to_string(),
            description: "Indicative price ranges on service pages".to_string(),
            status: TestStatus::Complete,
            start_date: ymd(2023, 9, 1),
            end_date: Some(ymd(2023, 12, 31)),
            target_pages: vec!["/services/[service]".to_string()],
            variants: vec![
                Variant::new("control", 50),
                Variant::new("price_ranges", 50),
            ],
        },
    ]
}
