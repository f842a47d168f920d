// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-invocation credential state machine.
//!
//! Cache hit (with an occasional quota re-check) short-circuits everything.
//! On a miss the redirect port serializes logins across processes and stays
//! held until the result is cached. The winner tries a silent refresh before
//! opening a browser, consults the quota gate, federates, and caches.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::browser::{self, Browser, SystemBrowser};
use crate::cache::credentials::{CloudCredential, CredentialCache};
use crate::cache::monitoring::MonitoringStore;
use crate::cache::CachePaths;
use crate::config::ProfileConfig;
use crate::error::ErrorCode;
use crate::federation::{Federation, FederationClientConfig};
use crate::lock::{self, PortGuard};
use crate::oidc::callback::{CallbackListener, CALLBACK_TIMEOUT};
use crate::oidc::claims::Claims;
use crate::oidc::pkce::{build_auth_url, generate_nonce, generate_pkce, generate_state, AuthRequest};
use crate::oidc::token::{TokenClient, TokenSet, TokenTarget};
use crate::quota::{QuotaGate, QuotaResult};

/// Waits used by one run.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub callback_timeout: Duration,
    pub port_wait: Duration,
    pub port_poll: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            callback_timeout: CALLBACK_TIMEOUT,
            port_wait: lock::WAIT_TIMEOUT,
            port_poll: lock::POLL_INTERVAL,
        }
    }
}

pub struct CredentialPipeline {
    profile: String,
    config: ProfileConfig,
    cache: CredentialCache,
    monitoring: MonitoringStore,
    quota: QuotaGate,
    tokens: TokenClient,
    federation: Federation,
    browser: Box<dyn Browser>,
    timing: Timing,
}

impl CredentialPipeline {
    pub fn new(
        profile: impl Into<String>,
        config: ProfileConfig,
        paths: &CachePaths,
    ) -> anyhow::Result<Self> {
        let federation = Federation::new(FederationClientConfig::from(&config));
        Ok(Self {
            profile: profile.into(),
            cache: CredentialCache::new(&paths.credentials, &paths.session_dir),
            monitoring: MonitoringStore::new(&paths.session_dir),
            quota: QuotaGate::new(&paths.session_dir)?,
            tokens: TokenClient::new()?,
            federation,
            browser: Box::new(SystemBrowser),
            timing: Timing::default(),
            config,
        })
    }

    pub fn with_browser(mut self, browser: Box<dyn Browser>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Monitoring token supplied by the environment, if any.
    pub fn with_env_token(mut self, token: Option<String>) -> Self {
        self.monitoring = self.monitoring.with_env_token(token);
        self
    }

    /// Valid credentials for the profile, authenticating if necessary.
    pub async fn run(&self) -> anyhow::Result<CloudCredential> {
        if let Some(credential) = self.cache.get_valid(&self.profile) {
            debug!(profile = %self.profile, "using cached credentials");
            self.recheck_quota().await?;
            return Ok(credential);
        }
        self.acquire().await
    }

    /// Whether cached credentials are still valid.
    pub fn check_expiration(&self) -> bool {
        !self.cache.is_expired(&self.profile)
    }

    /// Authenticate only when the cache cannot serve the profile.
    pub async fn refresh_if_needed(&self) -> anyhow::Result<()> {
        if self.check_expiration() {
            debug!(profile = %self.profile, "credentials still valid");
            return Ok(());
        }
        self.acquire().await.map(|_| ())
    }

    /// Identity token for telemetry, authenticating if none is usable.
    pub async fn monitoring_token(&self) -> anyhow::Result<Option<String>> {
        if let Some(token) = self.monitoring.get_token(&self.profile) {
            return Ok(Some(token));
        }
        self.acquire().await?;
        Ok(self.monitoring.get_token(&self.profile))
    }

    pub fn clear_cache(&self) -> anyhow::Result<Vec<String>> {
        self.cache.clear(&self.profile)
    }

    async fn acquire(&self) -> anyhow::Result<CloudCredential> {
        let port = self.config.redirect_port;
        let Some(guard) = lock::acquire(port) else {
            info!(port, "authentication in progress elsewhere, waiting");
            eprintln!("Another authentication is in progress, waiting for it to finish...");
            let freed =
                lock::wait_with_interval(port, self.timing.port_wait, self.timing.port_poll).await;
            if let Some(credential) = self.cache.get_valid(&self.profile) {
                debug!(profile = %self.profile, "credentials cached by the other login");
                return Ok(credential);
            }
            let detail = if freed {
                "the other authentication finished without caching credentials"
            } else {
                "timed out waiting for the other authentication"
            };
            return Err(ErrorCode::LockTimeout
                .with_message(format!("authentication timed out: {detail}"))
                .into());
        };

        // The port stays held until the credentials are cached.
        let tokens = self.authenticate(&guard).await?;
        let issued = self.issue(&tokens).await;
        drop(guard);
        issued
    }

    async fn authenticate(&self, guard: &PortGuard) -> anyhow::Result<TokenSet> {
        let provider_type = self.config.provider_type()?;
        let target = TokenTarget {
            domain: &self.config.provider_domain,
            provider_type: &provider_type,
            endpoint: self.config.endpoint()?,
            client_id: &self.config.client_id,
        };

        if let Some(tokens) = self.silent_refresh(&target).await {
            return Ok(tokens);
        }
        self.browser_flow(&target, guard).await
    }

    async fn silent_refresh(&self, target: &TokenTarget<'_>) -> Option<TokenSet> {
        let refresh_token = self.monitoring.get_refresh_token(&self.profile)?;
        match self.tokens.refresh(target, &refresh_token).await {
            Ok(tokens) => {
                info!(profile = %self.profile, "refreshed tokens without browser");
                Some(tokens.retain_refresh_token(&refresh_token))
            }
            Err(e) => {
                debug!(err = %format!("{e:#}"), "silent refresh failed, falling back to browser");
                None
            }
        }
    }

    async fn browser_flow(
        &self,
        target: &TokenTarget<'_>,
        guard: &PortGuard,
    ) -> anyhow::Result<TokenSet> {
        let pkce = generate_pkce()?;
        let state = generate_state()?;
        let nonce = generate_nonce()?;
        let redirect_uri = self.config.redirect_uri();

        let url = build_auth_url(
            target.endpoint,
            &AuthRequest {
                domain: target.domain,
                provider_type: target.provider_type,
                client_id: target.client_id,
                redirect_uri: &redirect_uri,
                state: &state,
                nonce: &nonce,
                code_challenge: &pkce.challenge,
            },
        );
        debug!(url = %url, "authorization url");

        let socket = guard.share().map_err(|e| {
            ErrorCode::Network.with_message(format!("callback port unavailable: {e}"))
        })?;
        let listener = CallbackListener::from_std(socket, state)?;
        browser::open_or_prompt(self.browser.as_ref(), &url);
        let code = listener.wait(self.timing.callback_timeout).await?;

        let tokens = self.tokens.exchange_code(target, &redirect_uri, &code, &pkce.verifier).await?;
        if tokens.claims.nonce() != Some(nonce.as_str()) {
            return Err(ErrorCode::Protocol
                .with_message("identity token nonce does not match the request")
                .into());
        }
        info!(profile = %self.profile, "browser authentication complete");
        Ok(tokens)
    }

    /// Quota gate, federation, then best-effort caching.
    async fn issue(&self, tokens: &TokenSet) -> anyhow::Result<CloudCredential> {
        if let Some(endpoint) = self.quota_endpoint() {
            let result = self
                .quota
                .check(
                    endpoint,
                    &tokens.id_token,
                    &tokens.claims,
                    self.config.quota_fail_mode,
                    self.config.quota_timeout(),
                )
                .await;
            self.settle_quota(&result)?;
        }

        let credential =
            self.federation.resolve(&self.config, &tokens.id_token, &tokens.claims).await?;

        if let Err(e) = self.cache.write(&credential, &self.profile) {
            warn!(profile = %self.profile, err = %format!("{e:#}"), "failed to cache credentials");
        }
        if let Err(e) = self.monitoring.save(
            &tokens.id_token,
            tokens.refresh_token.as_deref(),
            &tokens.claims,
            &self.profile,
        ) {
            warn!(profile = %self.profile, err = %format!("{e:#}"), "failed to save monitoring token");
        }
        Ok(credential)
    }

    /// Periodic re-check while serving cached credentials.
    async fn recheck_quota(&self) -> anyhow::Result<()> {
        let Some(endpoint) = self.quota_endpoint() else {
            return Ok(());
        };
        if !self.quota.should_recheck(Some(endpoint), self.config.quota_check_interval, &self.profile)
        {
            return Ok(());
        }
        let Some(token) = self.monitoring.get_token(&self.profile) else {
            debug!("no usable monitoring token, skipping quota re-check");
            return Ok(());
        };
        let claims = match self.monitoring.get_claims_subset(&self.profile) {
            Some(subset) => subset.to_claims(),
            None => Claims::from_jwt(&token).unwrap_or_default(),
        };

        let result = self
            .quota
            .check(
                endpoint,
                &token,
                &claims,
                self.config.quota_fail_mode,
                self.config.quota_timeout(),
            )
            .await;
        self.settle_quota(&result)
    }

    /// Record an allowing decision, or turn a denial into an error. Denials
    /// are not recorded so the next invocation asks again.
    fn settle_quota(&self, result: &QuotaResult) -> anyhow::Result<()> {
        if !result.allowed {
            warn!(profile = %self.profile, reason = %result.reason, "quota blocked credentials");
            return Err(ErrorCode::QuotaBlocked.with_message(result.block_message()).into());
        }
        if let Err(e) = self.quota.record_check_time(&self.profile) {
            warn!(err = %format!("{e:#}"), "failed to record quota check time");
        }
        Ok(())
    }

    fn quota_endpoint(&self) -> Option<&str> {
        self.config.quota_api_endpoint.as_deref().filter(|e| QuotaGate::should_check(Some(e)))
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
