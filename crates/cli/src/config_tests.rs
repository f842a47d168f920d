// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use serde_json::json;

use super::*;

fn parse(args: &[&str]) -> Config {
    Config::parse_from(args)
}

fn profile_from(value: serde_json::Value) -> anyhow::Result<ProfileConfig> {
    Ok(serde_json::from_value(value)?)
}

#[yare::parameterized(
    default_mode = { &["credential-process"], Mode::Credentials },
    clear = { &["credential-process", "--clear-cache"], Mode::ClearCache },
    check = { &["credential-process", "--check-expiration"], Mode::CheckExpiration },
    refresh = { &["credential-process", "--refresh-if-needed"], Mode::RefreshIfNeeded },
    monitoring = { &["credential-process", "--get-monitoring-token"], Mode::MonitoringToken },
)]
fn flags_select_mode(args: &[&str], expected: Mode) -> anyhow::Result<()> {
    let config = parse(args);
    config.validate()?;
    assert_eq!(config.mode(), expected);
    Ok(())
}

#[yare::parameterized(
    two_modes = { &["credential-process", "--clear-cache", "--check-expiration"], "mutually exclusive" },
    bad_format = { &["credential-process", "--log-format", "yaml"], "invalid log format" },
    blank_profile = { &["credential-process", "--profile", " "], "must not be empty" },
    parent_profile = { &["credential-process", "--profile", "../x"], "path separators" },
    nested_profile = { &["credential-process", "--profile", "team/dev"], "path separators" },
    windows_profile = { &["credential-process", "--profile", "team\\dev"], "path separators" },
)]
fn invalid_config(args: &[&str], expected_substr: &str) {
    let config = parse(args);
    crate::assert_err_contains!(config.validate(), expected_substr);
}

#[test]
fn short_profile_flag() {
    let config = parse(&["credential-process", "-p", "Dev"]);
    assert_eq!(config.profile, "Dev");
}

#[test]
fn explicit_config_path_is_the_only_candidate() {
    let mut config = Config::test();
    assert_eq!(
        config.config_candidates(Some(Path::new("/opt/bin")), Some(Path::new("/home/u"))),
        vec![
            PathBuf::from("/opt/bin/config.json"),
            PathBuf::from("/home/u/claude-code-with-bedrock/config.json"),
        ]
    );

    config.config = Some(PathBuf::from("/etc/cp.json"));
    assert_eq!(
        config.config_candidates(Some(Path::new("/opt/bin")), None),
        vec![PathBuf::from("/etc/cp.json")]
    );
}

#[test]
fn profile_defaults() -> anyhow::Result<()> {
    let profile = profile_from(json!({
        "provider_domain": "acme.okta.com",
        "client_id": "abc",
        "identity_pool_id": "us-east-1:pool",
    }))?;
    profile.validate()?;

    assert_eq!(profile.provider_type()?, "okta");
    assert_eq!(profile.aws_region, "us-east-1");
    assert_eq!(profile.federation_type, FederationType::Cognito);
    assert_eq!(profile.redirect_port, 8400);
    assert_eq!(profile.redirect_uri(), "http://localhost:8400/callback");
    assert_eq!(profile.quota_check_interval, 30);
    assert_eq!(profile.quota_fail_mode, FailMode::Open);
    assert_eq!(profile.quota_timeout(), Duration::from_secs(5));
    assert_eq!(profile.max_session_duration, None);
    Ok(())
}

#[yare::parameterized(
    direct = { "direct", FederationType::Direct },
    upper_direct = { "DIRECT", FederationType::Direct },
    cognito = { "cognito", FederationType::Cognito },
    unknown = { "saml", FederationType::Cognito },
)]
fn federation_type_is_permissive(raw: &str, expected: FederationType) {
    assert_eq!(FederationType::from(raw.to_owned()), expected);
}

#[test]
fn fail_mode_deserializes_permissively() -> anyhow::Result<()> {
    let base = json!({"provider_domain": "a.auth0.com", "client_id": "c"});
    let mut closed = base.clone();
    closed["quota_fail_mode"] = json!("closed");
    let mut other = base;
    other["quota_fail_mode"] = json!("deny");

    assert_eq!(profile_from(closed)?.quota_fail_mode, FailMode::Closed);
    assert_eq!(profile_from(other)?.quota_fail_mode, FailMode::Open);
    Ok(())
}

#[yare::parameterized(
    direct_without_role = {
        json!({"provider_domain": "a.okta.com", "client_id": "c", "federation_type": "direct"}),
        "federated_role_arn"
    },
    cognito_without_pool = {
        json!({"provider_domain": "a.okta.com", "client_id": "c"}),
        "identity_pool_id"
    },
    empty_client = {
        json!({"provider_domain": "a.okta.com", "client_id": "", "identity_pool_id": "p"}),
        "client_id"
    },
    undetectable = {
        json!({"provider_domain": "idp.example.com", "client_id": "c", "identity_pool_id": "p"}),
        "cannot detect provider type"
    },
    unknown_type = {
        json!({"provider_domain": "idp.example.com", "provider_type": "ping", "client_id": "c", "identity_pool_id": "p"}),
        "unsupported provider type"
    },
    keyring_storage = {
        json!({"provider_domain": "a.okta.com", "client_id": "c", "identity_pool_id": "p", "credential_storage": "keyring"}),
        "credential_storage"
    },
    ephemeral_port = {
        json!({"provider_domain": "a.okta.com", "client_id": "c", "identity_pool_id": "p", "redirect_port": 0}),
        "redirect_port"
    },
    short_session = {
        json!({"provider_domain": "a.okta.com", "client_id": "c", "identity_pool_id": "p", "max_session_duration": 60}),
        "max_session_duration"
    },
)]
fn invalid_profile(value: serde_json::Value, expected_substr: &str) -> anyhow::Result<()> {
    let profile = profile_from(value)?;
    crate::assert_err_contains!(profile.validate(), expected_substr);
    Ok(())
}

#[test]
fn load_profile_from_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        json!({"profiles": {
            "ClaudeCode": {
                "provider_domain": "login.microsoftonline.com/tenant/v2.0",
                "client_id": "app",
                "federation_type": "direct",
                "federated_role_arn": "arn:aws:iam::1:role/r",
                "aws_region": "eu-west-1",
            }
        }})
        .to_string(),
    )?;

    let mut config = Config::test();
    let profile = config.load_profile(Some(dir.path()), None)?;
    assert_eq!(profile.provider_type()?, "azure");
    assert_eq!(profile.aws_region, "eu-west-1");

    config.profile = "Missing".into();
    crate::assert_err_contains!(config.load_profile(Some(dir.path()), None), "available: ClaudeCode");
    Ok(())
}

#[test]
fn missing_config_file_names_searched_paths() {
    let config = Config::test();
    let result = config.load_profile(Some(Path::new("/nonexistent/bin")), None);
    crate::assert_err_contains!(result, "/nonexistent/bin/config.json");
}
