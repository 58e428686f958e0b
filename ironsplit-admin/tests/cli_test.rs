#![allow(deprecated)] // Command::cargo_bin

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

fn ironsplit_cmd(session: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ironsplit").unwrap();
    cmd.env_remove("IRONSPLIT_REGISTRY")
        .env("IRONSPLIT_SESSION_DIR", session.path())
        .env("RUST_LOG", "warn")
        .args(["--date", "2024-06-01"]);
    cmd
}

#[test]
fn validate_builtin_registry_succeeds() {
    let session = TempDir::new().unwrap();
    ironsplit_cmd(&session)
        .arg("validate")
        .assert()
        .success()
        .stdout(contains("hero_cta_text"))
        .stdout(contains("location_trust_badges\tInactive\tidle"));
}

#[test]
fn validate_reports_bad_weights() {
    let session = TempDir::new().unwrap();
    let registry = session.path().join("bad.json");
    std::fs::write(
        &registry,
        r#"[{"testName":"broken","status":"active","startDate":"2024-01-01",
            "variants":[{"id":"a","weight":30},{"id":"b","weight":30}]}]"#,
    )
    .unwrap();
    ironsplit_cmd(&session)
        .arg("--registry")
        .arg(&registry)
        .arg("validate")
        .assert()
        .failure()
        .stderr(contains("weights sum to 60"));
}

#[test]
fn validate_reports_every_invalid_test() {
    let session = TempDir::new().unwrap();
    let registry = session.path().join("mixed.json");
    std::fs::write(
        &registry,
        r#"[{"testName":"fine","status":"active","startDate":"2024-01-01",
             "variants":[{"id":"a","weight":100}]},
            {"testName":"short","status":"active","startDate":"2024-01-01",
             "variants":[{"id":"a","weight":30},{"id":"b","weight":30}]},
            {"testName":"backwards","status":"active","startDate":"2024-06-01",
             "endDate":"2024-01-01","variants":[{"id":"a","weight":100}]}]"#,
    )
    .unwrap();
    ironsplit_cmd(&session)
        .arg("--registry")
        .arg(&registry)
        .arg("validate")
        .assert()
        .failure()
        .stdout(contains("fine\tActive\tlive"))
        .stderr(contains("short"))
        .stderr(contains("weights sum to 60"))
        .stderr(contains("backwards"))
        .stderr(contains("endDate is earlier than startDate"));
}

#[test]
fn page_lists_matching_tests() {
    let session = TempDir::new().unwrap();
    ironsplit_cmd(&session)
        .args(["page", "/industries/automotive"])
        .assert()
        .success()
        .stdout(contains("industry_page_headline\tcontrol,capability,speed"))
        .stdout(contains("sitewide_phone_cta"));
}

#[test]
fn assign_is_sticky_across_invocations() {
    let session = TempDir::new().unwrap();
    let first = ironsplit_cmd(&session)
        .args(["assign", "hero_cta_text", "/"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    for _ in 0..5 {
        ironsplit_cmd(&session)
            .args(["assign", "hero_cta_text", "/"])
            .assert()
            .success()
            .stdout(String::from_utf8(first.clone()).unwrap());
    }
}

#[test]
fn assign_inactive_test_fails() {
    let session = TempDir::new().unwrap();
    ironsplit_cmd(&session)
        .args(["assign", "location_trust_badges", "/locations/dayton"])
        .assert()
        .failure()
        .stderr(contains("not active"));
}

#[test]
fn recorded_events_show_up_in_summary() {
    let session = TempDir::new().unwrap();
    for metric in ["impression", "impression", "cta_click"] {
        ironsplit_cmd(&session)
            .args(["record", "hero_cta_text", "control", metric])
            .assert()
            .success();
    }
    let out = ironsplit_cmd(&session)
        .args(["results", "hero_cta_text"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(summary["totalEvents"], 3);
    assert_eq!(summary["variants"][0]["variantId"], "control");
    assert_eq!(summary["variants"][0]["impressions"], 2);
    assert_eq!(summary["variants"][0]["conversionRate"], 0.5);
}
