// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static OIDC provider endpoint table.

/// Authorize/token endpoints and quirks for one identity provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderEndpoint {
    pub name: &'static str,
    pub authorize_path: &'static str,
    pub token_path: &'static str,
    pub scopes: &'static str,
    pub response_type: &'static str,
    /// Forced `response_mode` query parameter, if any.
    pub response_mode: Option<&'static str>,
    /// Forced `prompt` query parameter, if any.
    pub prompt: Option<&'static str>,
}

const DEFAULT_SCOPES: &str = "openid profile email offline_access";

pub const PROVIDERS: &[ProviderEndpoint] = &[
    ProviderEndpoint {
        name: "okta",
        authorize_path: "/oauth2/v1/authorize",
        token_path: "/oauth2/v1/token",
        scopes: DEFAULT_SCOPES,
        response_type: "code",
        response_mode: None,
        prompt: None,
    },
    ProviderEndpoint {
        name: "auth0",
        authorize_path: "/authorize",
        token_path: "/oauth/token",
        scopes: DEFAULT_SCOPES,
        response_type: "code",
        response_mode: None,
        prompt: None,
    },
    ProviderEndpoint {
        name: "azure",
        authorize_path: "/oauth2/v2.0/authorize",
        token_path: "/oauth2/v2.0/token",
        scopes: DEFAULT_SCOPES,
        response_type: "code",
        response_mode: Some("query"),
        // Without an explicit picker a previously chosen account re-authenticates
        // silently, which is wrong on shared machines.
        prompt: Some("select_account"),
    },
    ProviderEndpoint {
        name: "jumpcloud",
        authorize_path: "/oauth2/auth",
        token_path: "/oauth2/token",
        scopes: DEFAULT_SCOPES,
        response_type: "code",
        response_mode: None,
        prompt: None,
    },
    ProviderEndpoint {
        name: "cognito",
        authorize_path: "/oauth2/authorize",
        token_path: "/oauth2/token",
        scopes: "openid email profile",
        response_type: "code",
        response_mode: None,
        prompt: None,
    },
];

/// Look up the endpoint table entry for a provider type.
pub fn endpoint_for(provider_type: &str) -> Option<&'static ProviderEndpoint> {
    let wanted = provider_type.to_lowercase();
    PROVIDERS.iter().find(|p| p.name == wanted)
}

/// Guess the provider type from the configured domain.
pub fn detect_provider(domain: &str) -> Option<&'static str> {
    let domain = domain.to_lowercase();
    if domain.contains("okta.com") || domain.contains("oktapreview.com") {
        Some("okta")
    } else if domain.contains("auth0.com") {
        Some("auth0")
    } else if domain.contains("microsoftonline.com") || domain.contains("windows.net") {
        Some("azure")
    } else if domain.contains("jumpcloud") {
        Some("jumpcloud")
    } else if domain.contains("amazoncognito.com") {
        Some("cognito")
    } else {
        None
    }
}

/// Resolve the base origin for a provider domain.
///
/// Azure tenant domains carry a `/v2.0` suffix that must not be repeated in
/// front of the `/oauth2/v2.0/...` paths. A domain that already includes a
/// scheme is used as-is, which lets tests point at plain-HTTP mock servers.
pub fn resolve_origin(domain: &str, provider_type: &str) -> String {
    let mut domain = domain.trim_end_matches('/');
    if provider_type.eq_ignore_ascii_case("azure") {
        domain = domain.strip_suffix("/v2.0").unwrap_or(domain);
    }
    if domain.starts_with("https://") || domain.starts_with("http://") {
        domain.to_owned()
    } else {
        format!("https://{domain}")
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
