// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exchange an identity token for temporary cloud credentials.
//!
//! Both exchanges are unauthenticated calls. The SDK clients are built from
//! explicit config with no credentials provider, so neither the process
//! environment nor shared credential files are consulted, including the
//! cache file this program itself writes.

use std::time::Duration;

use aws_sdk_cognitoidentity as cognito;
use aws_sdk_sts as sts;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::cache::credentials::CloudCredential;
use crate::config::{FederationType, ProfileConfig};
use crate::error::ErrorCode;
use crate::oidc::claims::Claims;

/// Role session duration when the profile does not set one.
pub const DEFAULT_SESSION_DURATION: i32 = 43_200;

/// Upper bound on a single federation call, retries included.
pub const FEDERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Session name used when the token identifies no one.
pub const DEFAULT_SESSION_NAME: &str = "claude-code-user";

const SESSION_PREFIX: &str = "claude-code-";
const SESSION_RAW_MAX: usize = 32;

/// Where and how the SDK clients connect.
#[derive(Debug, Clone, Default)]
pub struct FederationClientConfig {
    pub region: String,
    pub sts_endpoint: Option<String>,
    pub cognito_endpoint: Option<String>,
}

impl From<&ProfileConfig> for FederationClientConfig {
    fn from(config: &ProfileConfig) -> Self {
        Self {
            region: config.aws_region.clone(),
            sts_endpoint: config.sts_endpoint_url.clone(),
            cognito_endpoint: config.cognito_endpoint_url.clone(),
        }
    }
}

/// Anonymous STS and Cognito Identity clients.
#[derive(Debug, Clone)]
pub struct Federation {
    sts: sts::Client,
    cognito: cognito::Client,
}

impl Federation {
    pub fn new(config: FederationClientConfig) -> Self {
        let timeouts = sts::config::timeout::TimeoutConfig::builder()
            .operation_timeout(FEDERATION_TIMEOUT)
            .build();

        let mut sts_conf = sts::Config::builder()
            .behavior_version(sts::config::BehaviorVersion::latest())
            .region(sts::config::Region::new(config.region.clone()))
            .timeout_config(timeouts.clone());
        sts_conf.set_endpoint_url(config.sts_endpoint);

        let mut cognito_conf = cognito::Config::builder()
            .behavior_version(cognito::config::BehaviorVersion::latest())
            .region(cognito::config::Region::new(config.region))
            .timeout_config(timeouts);
        cognito_conf.set_endpoint_url(config.cognito_endpoint);

        Self {
            sts: sts::Client::from_conf(sts_conf.build()),
            cognito: cognito::Client::from_conf(cognito_conf.build()),
        }
    }

    pub async fn resolve(
        &self,
        config: &ProfileConfig,
        id_token: &str,
        claims: &Claims,
    ) -> anyhow::Result<CloudCredential> {
        match config.federation_type {
            FederationType::Direct => self.assume_role(config, id_token, claims).await,
            FederationType::Cognito => self.identity_pool(config, id_token, claims).await,
        }
    }

    async fn assume_role(
        &self,
        config: &ProfileConfig,
        id_token: &str,
        claims: &Claims,
    ) -> anyhow::Result<CloudCredential> {
        let role_arn = config.federated_role_arn.as_deref().ok_or_else(|| {
            ErrorCode::Config.with_message("direct federation requires federated_role_arn")
        })?;
        let session_name = session_name(claims);
        let duration = config.max_session_duration.unwrap_or(DEFAULT_SESSION_DURATION);
        debug!(role_arn, session_name = %session_name, duration, "assuming role with web identity");

        let out = self
            .sts
            .assume_role_with_web_identity()
            .role_arn(role_arn)
            .role_session_name(&session_name)
            .web_identity_token(id_token)
            .duration_seconds(duration)
            .send()
            .await
            .map_err(|e| {
                ErrorCode::Network.with_message(format!(
                    "AssumeRoleWithWebIdentity failed: {}",
                    sts::error::DisplayErrorContext(&e)
                ))
            })?;

        let creds = out.credentials().ok_or_else(|| {
            ErrorCode::Protocol.with_message("AssumeRoleWithWebIdentity returned no credentials")
        })?;
        let expiration = to_utc(creds.expiration().secs())?;
        info!(role_arn, "obtained role credentials");
        Ok(CloudCredential::new(
            creds.access_key_id(),
            creds.secret_access_key(),
            creds.session_token(),
            expiration,
        ))
    }

    async fn identity_pool(
        &self,
        config: &ProfileConfig,
        id_token: &str,
        claims: &Claims,
    ) -> anyhow::Result<CloudCredential> {
        let pool_id = config.identity_pool_id.as_deref().ok_or_else(|| {
            ErrorCode::Config.with_message("cognito federation requires identity_pool_id")
        })?;
        let login_key = cognito_login_key(config, claims)?;
        debug!(pool_id, login_key = %login_key, "resolving identity pool identity");

        let cognito_error = |op: &str, detail: String| {
            ErrorCode::Network.with_message(format!("{op} failed: {detail}"))
        };

        let id = self
            .cognito
            .get_id()
            .identity_pool_id(pool_id)
            .logins(&login_key, id_token)
            .send()
            .await
            .map_err(|e| cognito_error("GetId", cognito::error::DisplayErrorContext(&e).to_string()))?;
        let identity_id = id
            .identity_id()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ErrorCode::Protocol.with_message("GetId returned no identity id"))?;

        let out = self
            .cognito
            .get_credentials_for_identity()
            .identity_id(identity_id)
            .logins(&login_key, id_token)
            .send()
            .await
            .map_err(|e| {
                cognito_error(
                    "GetCredentialsForIdentity",
                    cognito::error::DisplayErrorContext(&e).to_string(),
                )
            })?;

        let missing = |field: &str| {
            ErrorCode::Protocol.with_message(format!("GetCredentialsForIdentity missing {field}"))
        };
        let creds = out.credentials().ok_or_else(|| missing("credentials"))?;
        let access_key_id = creds.access_key_id().ok_or_else(|| missing("AccessKeyId"))?;
        let secret_key = creds.secret_key().ok_or_else(|| missing("SecretKey"))?;
        let session_token = creds.session_token().ok_or_else(|| missing("SessionToken"))?;
        let expiration = creds.expiration().ok_or_else(|| missing("Expiration"))?;

        info!(identity_id, "obtained identity pool credentials");
        Ok(CloudCredential::new(access_key_id, secret_key, session_token, to_utc(expiration.secs())?))
    }
}

fn to_utc(secs: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        ErrorCode::Protocol.with_message(format!("credential expiration out of range: {secs}")).into()
    })
}

/// Role session name derived from the token's subject or email.
pub fn session_name(claims: &Claims) -> String {
    let raw = claims
        .subject()
        .or_else(|| claims.email().and_then(|e| e.split('@').next()).filter(|s| !s.is_empty()));
    let Some(raw) = raw else {
        return DEFAULT_SESSION_NAME.to_owned();
    };
    let sanitized: String = raw
        .chars()
        .take(SESSION_RAW_MAX)
        .map(|c| if c.is_ascii_alphanumeric() || "_+=,.@-".contains(c) { c } else { '-' })
        .collect();
    format!("{SESSION_PREFIX}{sanitized}")
}

/// Key of the identity pool login map for this profile's provider.
pub fn cognito_login_key(config: &ProfileConfig, claims: &Claims) -> anyhow::Result<String> {
    if config.provider_type()? == "cognito" {
        let issuer = claims.issuer().ok_or_else(|| {
            ErrorCode::Protocol.with_message("identity token has no iss claim")
        })?;
        return Ok(issuer.strip_prefix("https://").unwrap_or(issuer).to_owned());
    }
    if let Some(pool) = config.cognito_user_pool_id.as_deref().filter(|p| !p.is_empty()) {
        return Ok(format!("cognito-idp.{}.amazonaws.com/{pool}", config.aws_region));
    }
    Ok(config.provider_domain.clone())
}

#[cfg(test)]
#[path = "federation_tests.rs"]
mod tests;
