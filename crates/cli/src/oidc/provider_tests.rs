// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn every_provider_uses_code_flow() {
    for p in PROVIDERS {
        assert_eq!(p.response_type, "code", "{}", p.name);
        assert!(p.scopes.contains("openid"), "{}", p.name);
    }
}

#[test]
fn only_azure_has_quirks() {
    for p in PROVIDERS {
        let quirky = p.response_mode.is_some() || p.prompt.is_some();
        assert_eq!(quirky, p.name == "azure", "{}", p.name);
    }
}

#[test]
fn endpoint_lookup_is_case_insensitive() {
    assert_eq!(endpoint_for("Okta").map(|p| p.token_path), Some("/oauth2/v1/token"));
    assert!(endpoint_for("keycloak").is_none());
}

#[yare::parameterized(
    okta = { "mycompany.okta.com", Some("okta") },
    auth0 = { "tenant.us.auth0.com", Some("auth0") },
    azure = { "login.microsoftonline.com/tenant/v2.0", Some("azure") },
    jumpcloud = { "oauth.id.jumpcloud.com", Some("jumpcloud") },
    cognito = { "pool.auth.us-east-1.amazoncognito.com", Some("cognito") },
    unknown = { "sso.example.com", None },
)]
fn detects_provider(domain: &str, expected: Option<&str>) {
    assert_eq!(detect_provider(domain), expected);
}

#[yare::parameterized(
    plain = { "mycompany.okta.com", "okta", "https://mycompany.okta.com" },
    azure_suffix = { "login.microsoftonline.com/tenant/v2.0", "azure", "https://login.microsoftonline.com/tenant" },
    non_azure_keeps_suffix = { "idp.example.com/v2.0", "okta", "https://idp.example.com/v2.0" },
    trailing_slash = { "mycompany.okta.com/", "okta", "https://mycompany.okta.com" },
    explicit_scheme = { "http://127.0.0.1:9000", "okta", "http://127.0.0.1:9000" },
)]
fn resolves_origin(domain: &str, provider: &str, expected: &str) {
    assert_eq!(resolve_origin(domain, provider), expected);
}
