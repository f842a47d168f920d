// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;

fn claims(value: serde_json::Value) -> Claims {
    match value {
        serde_json::Value::Object(map) => Claims::from_map(map),
        _ => Claims::default(),
    }
}

#[test]
fn save_then_get_round_trips_fields() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = MonitoringStore::new(dir.path());
    let exp = Utc::now().timestamp() + 7200;

    store.save("id.tok.en", Some("rt-1"), &claims(json!({"email": "a@b.c", "exp": exp})), "p")?;

    let record = store.load("p").ok_or_else(|| anyhow::anyhow!("missing record"))?;
    assert_eq!(record.expires, exp);
    assert_eq!(record.profile, "p");
    assert_eq!(store.get_token("p").as_deref(), Some("id.tok.en"));
    assert_eq!(store.get_refresh_token("p").as_deref(), Some("rt-1"));
    assert_eq!(
        store.get_claims_subset("p"),
        Some(ClaimsSubset { email: Some("a@b.c".to_owned()) })
    );
    Ok(())
}

#[test]
fn file_shape_matches_consumers() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = MonitoringStore::new(dir.path());
    store.save("t", Some("r"), &claims(json!({"email": "e@x", "exp": 10})), "prof")?;

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("prof-monitoring.json"))?)?;
    assert_eq!(
        raw,
        json!({"token": "t", "refresh_token": "r", "expires": 10, "email": "e@x", "profile": "prof"})
    );
    Ok(())
}

#[test]
fn missing_exp_defaults_to_an_hour() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = MonitoringStore::new(dir.path());
    let before = Utc::now().timestamp();
    store.save("t", None, &Claims::default(), "p")?;

    let record = store.load("p").ok_or_else(|| anyhow::anyhow!("missing record"))?;
    assert!(record.expires >= before + DEFAULT_LIFETIME_SECS);
    assert!(record.expires <= Utc::now().timestamp() + DEFAULT_LIFETIME_SECS);
    assert_eq!(store.get_refresh_token("p"), None);
    Ok(())
}

#[yare::parameterized(
    ten_minutes_left = { 600, false },
    eleven_minutes_left = { 660, true },
    expired = { -1, false },
)]
fn token_needs_ten_minutes_of_life(remaining: i64, usable: bool) -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = MonitoringStore::new(dir.path());
    let exp = Utc::now().timestamp() + remaining;
    store.save("t", Some("r"), &claims(json!({"exp": exp})), "p")?;

    assert_eq!(store.get_token("p").is_some(), usable);
    // The refresh token stays available after the identity token expires.
    assert_eq!(store.get_refresh_token("p").as_deref(), Some("r"));
    Ok(())
}

#[test]
fn env_shortcut_wins_without_touching_disk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = MonitoringStore::new(dir.path().join("absent"))
        .with_env_token(Some("from-env".to_owned()));
    assert_eq!(store.get_token("p").as_deref(), Some("from-env"));
    assert!(!dir.path().join("absent").exists());

    let blank = MonitoringStore::new(dir.path()).with_env_token(Some(String::new()));
    assert_eq!(blank.get_token("p"), None);
    Ok(())
}

#[test]
fn corrupt_file_is_a_miss() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("p-monitoring.json"), "not json")?;
    let store = MonitoringStore::new(dir.path());
    assert_eq!(store.get_token("p"), None);
    assert_eq!(store.get_claims_subset("p"), None);
    Ok(())
}

#[test]
fn claims_subset_rebuilds_email_claim() {
    let subset = ClaimsSubset { email: Some("x@y".to_owned()) };
    assert_eq!(subset.to_claims().email(), Some("x@y"));
    assert_eq!(ClaimsSubset { email: None }.to_claims().email(), None);
}
