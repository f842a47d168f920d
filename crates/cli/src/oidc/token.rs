// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token endpoint client: authorization code exchange and refresh.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::ErrorCode;
use crate::oidc::claims::Claims;
use crate::oidc::provider::{resolve_origin, ProviderEndpoint};

/// Timeout for token endpoint requests.
pub const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Identity token plus optional refresh token and its decoded claims.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub claims: Claims,
}

impl TokenSet {
    /// Keep `previous` when the provider did not rotate the refresh token.
    pub fn retain_refresh_token(mut self, previous: &str) -> Self {
        if self.refresh_token.as_deref().is_none_or(str::is_empty) {
            self.refresh_token = Some(previous.to_owned());
        }
        self
    }
}

/// Provider identity used for every token endpoint call.
#[derive(Debug, Clone, Copy)]
pub struct TokenTarget<'a> {
    pub domain: &'a str,
    pub provider_type: &'a str,
    pub endpoint: &'a ProviderEndpoint,
    pub client_id: &'a str,
}

impl TokenTarget<'_> {
    pub fn token_url(&self) -> String {
        format!("{}{}", resolve_origin(self.domain, self.provider_type), self.endpoint.token_path)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Client for a provider's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
}

impl TokenClient {
    pub fn new() -> anyhow::Result<Self> {
        crate::ensure_crypto();
        let http = reqwest::Client::builder().timeout(TOKEN_TIMEOUT).build()?;
        Ok(Self { http })
    }

    /// Exchange an authorization code (with its PKCE verifier) for tokens.
    pub async fn exchange_code(
        &self,
        target: &TokenTarget<'_>,
        redirect_uri: &str,
        code: &str,
        verifier: &str,
    ) -> anyhow::Result<TokenSet> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", target.client_id),
            ("code_verifier", verifier),
        ];
        self.post(target, &form, "token exchange").await
    }

    /// Redeem a refresh token. The returned set may lack a refresh token;
    /// callers keep the previous one via [`TokenSet::retain_refresh_token`].
    pub async fn refresh(
        &self,
        target: &TokenTarget<'_>,
        refresh_token: &str,
    ) -> anyhow::Result<TokenSet> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", target.client_id),
        ];
        self.post(target, &form, "token refresh").await
    }

    async fn post(
        &self,
        target: &TokenTarget<'_>,
        form: &[(&str, &str)],
        what: &str,
    ) -> anyhow::Result<TokenSet> {
        let url = target.token_url();
        debug!(url = %url, "{what} request");

        let resp = self
            .http
            .post(&url)
            .form(form)
            .send()
            .await
            .map_err(|e| ErrorCode::Network.with_message(format!("{what} failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ErrorCode::Network.with_message(format!("{what} read body: {e}")))?;

        if status != reqwest::StatusCode::OK {
            return Err(ErrorCode::Network
                .with_message(format!("{what} failed ({status}): {body}"))
                .into());
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ErrorCode::Protocol.with_message(format!("{what} bad response: {e}")))?;
        let id_token = token.id_token.filter(|t| !t.is_empty()).ok_or_else(|| {
            ErrorCode::Protocol.with_message(format!("{what} response has no id_token"))
        })?;
        let claims = Claims::from_jwt(&id_token)?;

        Ok(TokenSet {
            id_token,
            refresh_token: token.refresh_token.filter(|t| !t.is_empty()),
            claims,
        })
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
