// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

use crate::error::ErrorCode;
use crate::oidc::provider::{detect_provider, endpoint_for, ProviderEndpoint};
use crate::quota::FailMode;

/// Name of the profile config file looked up next to the binary.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// How a verified identity becomes cloud credentials.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum FederationType {
    /// `AssumeRoleWithWebIdentity` against a configured role.
    Direct,
    /// Cognito identity pool exchange.
    #[default]
    Cognito,
}

impl From<String> for FederationType {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("direct") {
            Self::Direct
        } else {
            Self::Cognito
        }
    }
}

impl std::fmt::Display for FederationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Cognito => f.write_str("cognito"),
        }
    }
}

/// AWS `credential_process` helper backed by an OIDC browser login.
#[derive(Debug, Parser)]
#[command(name = "credential-process", version, about)]
pub struct Config {
    /// Profile to use from the config file.
    #[arg(short, long, env = "CCWB_PROFILE", default_value = "ClaudeCode")]
    pub profile: String,

    /// Path to the profile config file.
    #[arg(long, env = "CCWB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Invalidate cached credentials for the profile and exit.
    #[arg(long)]
    pub clear_cache: bool,

    /// Exit 0 if cached credentials are valid, 1 otherwise.
    #[arg(long)]
    pub check_expiration: bool,

    /// Authenticate only if cached credentials are expired. Prints nothing.
    #[arg(long)]
    pub refresh_if_needed: bool,

    /// Print the identity token for telemetry, authenticating if needed.
    #[arg(long)]
    pub get_monitoring_token: bool,

    /// Enable debug logging on stderr.
    #[arg(long, env = "CREDPROC_DEBUG")]
    pub debug: bool,

    /// Log format (json or text).
    #[arg(long, env = "CREDPROC_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

/// What one invocation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Credentials,
    ClearCache,
    CheckExpiration,
    RefreshIfNeeded,
    MonitoringToken,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        let selected = [
            self.clear_cache,
            self.check_expiration,
            self.refresh_if_needed,
            self.get_monitoring_token,
        ]
        .iter()
        .filter(|f| **f)
        .count();
        if selected > 1 {
            anyhow::bail!(
                "--clear-cache, --check-expiration, --refresh-if-needed and \
                 --get-monitoring-token are mutually exclusive"
            );
        }
        if self.profile.trim().is_empty() {
            anyhow::bail!("--profile must not be empty");
        }
        // Profile names become session file names.
        if self.profile.contains(['/', '\\']) || self.profile.contains("..") {
            anyhow::bail!("--profile must not contain path separators or '..'");
        }
        match self.log_format.as_str() {
            "json" | "text" => Ok(()),
            other => anyhow::bail!("invalid log format: {other}"),
        }
    }

    pub fn mode(&self) -> Mode {
        if self.clear_cache {
            Mode::ClearCache
        } else if self.check_expiration {
            Mode::CheckExpiration
        } else if self.refresh_if_needed {
            Mode::RefreshIfNeeded
        } else if self.get_monitoring_token {
            Mode::MonitoringToken
        } else {
            Mode::Credentials
        }
    }

    /// Config file locations in lookup order.
    pub fn config_candidates(&self, exe_dir: Option<&Path>, home: Option<&Path>) -> Vec<PathBuf> {
        if let Some(path) = &self.config {
            return vec![path.clone()];
        }
        let mut out = Vec::new();
        if let Some(dir) = exe_dir {
            out.push(dir.join(CONFIG_FILE_NAME));
        }
        if let Some(home) = home {
            out.push(home.join("claude-code-with-bedrock").join(CONFIG_FILE_NAME));
        }
        out
    }

    /// Load the selected profile from the first existing candidate.
    pub fn load_profile(
        &self,
        exe_dir: Option<&Path>,
        home: Option<&Path>,
    ) -> anyhow::Result<ProfileConfig> {
        let candidates = self.config_candidates(exe_dir, home);
        let path = candidates.iter().find(|p| p.is_file()).ok_or_else(|| {
            let searched: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
            ErrorCode::Config
                .with_message(format!("no config file found (searched: {})", searched.join(", ")))
        })?;
        let profile = load_profile_file(path, &self.profile)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Build a minimal `Config` for tests.
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            profile: "ClaudeCode".into(),
            config: None,
            clear_cache: false,
            check_expiration: false,
            refresh_if_needed: false,
            get_monitoring_token: false,
            debug: true,
            log_format: "text".into(),
        }
    }
}

/// Top-level shape of the profile config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileFile {
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

/// Load `profile` from the config file at `path`.
pub fn load_profile_file(path: &Path, profile: &str) -> anyhow::Result<ProfileConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let file: ProfileFile = serde_json::from_str(&contents).map_err(|e| {
        ErrorCode::Config.with_message(format!("invalid config {}: {e}", path.display()))
    })?;
    file.profiles.get(profile).cloned().ok_or_else(|| {
        let known: Vec<&str> = file.profiles.keys().map(String::as_str).collect();
        ErrorCode::Config
            .with_message(format!(
                "profile {profile:?} not found in {} (available: {})",
                path.display(),
                known.join(", ")
            ))
            .into()
    })
}

fn default_region() -> String {
    "us-east-1".to_owned()
}
fn default_redirect_port() -> u16 {
    8400
}
fn default_quota_interval() -> u64 {
    30
}
fn default_quota_timeout() -> u64 {
    5
}
fn default_storage() -> String {
    "session".to_owned()
}

/// One named profile: identity provider, federation target, quota policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    pub provider_domain: String,
    pub client_id: String,
    /// Detected from `provider_domain` when absent.
    #[serde(default)]
    pub provider_type: Option<String>,
    #[serde(default = "default_region")]
    pub aws_region: String,
    #[serde(default)]
    pub federation_type: FederationType,
    #[serde(default)]
    pub identity_pool_id: Option<String>,
    #[serde(default)]
    pub federated_role_arn: Option<String>,
    #[serde(default)]
    pub cognito_user_pool_id: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub max_session_duration: Option<i32>,
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,
    #[serde(default)]
    pub quota_api_endpoint: Option<String>,
    /// Minutes between re-checks on cached credentials; 0 checks every time.
    #[serde(default = "default_quota_interval")]
    pub quota_check_interval: u64,
    #[serde(default)]
    pub quota_fail_mode: FailMode,
    /// Seconds.
    #[serde(default = "default_quota_timeout")]
    pub quota_check_timeout: u64,
    #[serde(default = "default_storage")]
    pub credential_storage: String,
    /// Override for the STS endpoint (VPC endpoints, testing).
    #[serde(default)]
    pub sts_endpoint_url: Option<String>,
    /// Override for the Cognito Identity endpoint.
    #[serde(default)]
    pub cognito_endpoint_url: Option<String>,
}

impl ProfileConfig {
    /// Configured provider type, lowercased, or the one implied by the domain.
    pub fn provider_type(&self) -> anyhow::Result<String> {
        if let Some(configured) = self.provider_type.as_deref().filter(|s| !s.trim().is_empty()) {
            return Ok(configured.trim().to_lowercase());
        }
        detect_provider(&self.provider_domain).map(str::to_owned).ok_or_else(|| {
            ErrorCode::Config
                .with_message(format!(
                    "cannot detect provider type from domain {:?}; set provider_type",
                    self.provider_domain
                ))
                .into()
        })
    }

    pub fn endpoint(&self) -> anyhow::Result<&'static ProviderEndpoint> {
        let provider_type = self.provider_type()?;
        endpoint_for(&provider_type).ok_or_else(|| {
            ErrorCode::Config
                .with_message(format!("unsupported provider type: {provider_type}"))
                .into()
        })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.redirect_port)
    }

    pub fn quota_timeout(&self) -> Duration {
        Duration::from_secs(self.quota_check_timeout)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let fail = |msg: String| -> anyhow::Result<()> {
            Err(ErrorCode::Config.with_message(msg).into())
        };
        if self.provider_domain.trim().is_empty() {
            return fail("provider_domain is required".into());
        }
        if self.client_id.trim().is_empty() {
            return fail("client_id is required".into());
        }
        self.endpoint()?;
        if self.redirect_port == 0 {
            return fail("redirect_port must be a fixed port, not 0".into());
        }
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        match self.federation_type {
            FederationType::Direct if !present(&self.federated_role_arn) => {
                return fail("federation_type direct requires federated_role_arn".into());
            }
            FederationType::Cognito if !present(&self.identity_pool_id) => {
                return fail("federation_type cognito requires identity_pool_id".into());
            }
            _ => {}
        }
        if let Some(duration) = self.max_session_duration {
            if !(900..=43_200).contains(&duration) {
                return fail(format!("max_session_duration {duration} outside 900..=43200"));
            }
        }
        if self.credential_storage != "session" {
            return fail(format!(
                "credential_storage {:?} is not supported; use \"session\"",
                self.credential_storage
            ));
        }
        Ok(())
    }

    /// Build a minimal direct-federation profile for tests.
    #[doc(hidden)]
    pub fn test(provider_domain: &str) -> Self {
        Self {
            provider_domain: provider_domain.into(),
            client_id: "test-client".into(),
            provider_type: Some("okta".into()),
            aws_region: default_region(),
            federation_type: FederationType::Direct,
            identity_pool_id: None,
            federated_role_arn: Some("arn:aws:iam::123456789012:role/ClaudeCode".into()),
            cognito_user_pool_id: None,
            max_session_duration: None,
            redirect_port: default_redirect_port(),
            quota_api_endpoint: None,
            quota_check_interval: default_quota_interval(),
            quota_fail_mode: FailMode::Open,
            quota_check_timeout: default_quota_timeout(),
            credential_storage: default_storage(),
            sts_endpoint_url: None,
            cognito_endpoint_url: None,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
