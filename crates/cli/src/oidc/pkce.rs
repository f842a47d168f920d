// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth authorization code + PKCE (RFC 7636) helpers.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::TryRngCore;
use sha2::{Digest, Sha256};

use crate::error::ErrorCode;
use crate::oidc::provider::{resolve_origin, ProviderEndpoint};
use crate::oidc::urlencoding;

/// PKCE verifier/challenge pair for one browser-flow attempt.
#[derive(Debug, Clone)]
pub struct PkceParams {
    pub verifier: String,
    pub challenge: String,
}

/// Caller-supplied parameters for [`build_auth_url`].
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    pub domain: &'a str,
    pub provider_type: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub state: &'a str,
    pub nonce: &'a str,
    pub code_challenge: &'a str,
}

/// Fill `N` bytes from the OS random source. A failing source aborts the run.
fn random_bytes<const N: usize>() -> anyhow::Result<[u8; N]> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| ErrorCode::RandomSource.with_message(format!("random source failed: {e}")))?;
    Ok(bytes)
}

/// Generate a verifier (32 random bytes, base64url) and its S256 challenge.
pub fn generate_pkce() -> anyhow::Result<PkceParams> {
    let verifier = URL_SAFE_NO_PAD.encode(random_bytes::<32>()?);
    let challenge = compute_code_challenge(&verifier);
    Ok(PkceParams { verifier, challenge })
}

/// Compute code_challenge = base64url_nopad(sha256(verifier)).
pub fn compute_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate a random `state` parameter (16 bytes, base64url).
pub fn generate_state() -> anyhow::Result<String> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes::<16>()?))
}

/// Generate a random `nonce` parameter (16 bytes, base64url).
pub fn generate_nonce() -> anyhow::Result<String> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes::<16>()?))
}

/// Build the full authorization URL with PKCE parameters.
pub fn build_auth_url(endpoint: &ProviderEndpoint, req: &AuthRequest<'_>) -> String {
    let origin = resolve_origin(req.domain, req.provider_type);
    let mut params: Vec<(&str, &str)> = vec![
        ("client_id", req.client_id),
        ("response_type", endpoint.response_type),
        ("scope", endpoint.scopes),
        ("redirect_uri", req.redirect_uri),
        ("state", req.state),
        ("nonce", req.nonce),
        ("code_challenge_method", "S256"),
        ("code_challenge", req.code_challenge),
    ];

    if req.provider_type.eq_ignore_ascii_case("azure") {
        params.push(("prompt", endpoint.prompt.unwrap_or("select_account")));
        params.push(("response_mode", endpoint.response_mode.unwrap_or("query")));
    }

    let query = params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{origin}{}?{query}", endpoint.authorize_path)
}

#[cfg(test)]
#[path = "pkce_tests.rs"]
mod tests;
