// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity token cache for telemetry and quota calls.
//!
//! Kept apart from the cloud credential cache: its consumers need the OIDC
//! identity token itself, and they need it with a longer validity margin.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ErrorCode;
use crate::oidc::claims::Claims;

/// Tokens expiring within this many seconds are not handed out.
pub const USABLE_BUFFER_SECS: i64 = 600;

/// Assumed lifetime when the token carries no `exp` claim.
pub const DEFAULT_LIFETIME_SECS: i64 = 3600;

/// Environment shortcut consulted before the on-disk token.
pub const TOKEN_ENV: &str = "CLAUDE_CODE_MONITORING_TOKEN";

/// On-disk record, one file per profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringToken {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    pub expires: i64,
    #[serde(default)]
    pub email: Option<String>,
    pub profile: String,
}

impl MonitoringToken {
    pub fn is_usable_at(&self, now: i64) -> bool {
        self.expires - now > USABLE_BUFFER_SECS
    }
}

/// The claims a later invocation needs without re-decoding a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimsSubset {
    pub email: Option<String>,
}

impl ClaimsSubset {
    pub fn to_claims(&self) -> Claims {
        let mut map = serde_json::Map::new();
        if let Some(email) = &self.email {
            map.insert("email".to_owned(), email.clone().into());
        }
        Claims::from_map(map)
    }
}

#[derive(Debug, Clone)]
pub struct MonitoringStore {
    session_dir: PathBuf,
    env_token: Option<String>,
}

impl MonitoringStore {
    pub fn new(session_dir: impl Into<PathBuf>) -> Self {
        Self { session_dir: session_dir.into(), env_token: None }
    }

    /// Token taken from [`TOKEN_ENV`], preferred over the stored one.
    pub fn with_env_token(mut self, token: Option<String>) -> Self {
        self.env_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn save(
        &self,
        id_token: &str,
        refresh_token: Option<&str>,
        claims: &Claims,
        profile: &str,
    ) -> anyhow::Result<()> {
        let record = MonitoringToken {
            token: id_token.to_owned(),
            refresh_token: refresh_token.filter(|t| !t.is_empty()).map(str::to_owned),
            expires: claims
                .expires_at()
                .unwrap_or_else(|| Utc::now().timestamp() + DEFAULT_LIFETIME_SECS),
            email: claims.email().map(str::to_owned),
            profile: profile.to_owned(),
        };
        let path = super::monitoring_file(&self.session_dir, profile);
        let json = serde_json::to_vec_pretty(&record)?;
        super::write_private(&path, &json).map_err(|e| {
            ErrorCode::Cache.with_message(format!("writing {}: {e:#}", path.display()))
        })?;
        debug!(profile, expires = record.expires, "saved monitoring token");
        Ok(())
    }

    /// Stored record regardless of expiry. Unreadable files are a miss.
    pub fn load(&self, profile: &str) -> Option<MonitoringToken> {
        let path = super::monitoring_file(&self.session_dir, profile);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), err = %e, "unreadable monitoring token");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), err = %e, "corrupt monitoring token");
                None
            }
        }
    }

    pub fn get_token(&self, profile: &str) -> Option<String> {
        if let Some(token) = &self.env_token {
            return Some(token.clone());
        }
        self.load(profile).filter(|r| r.is_usable_at(Utc::now().timestamp())).map(|r| r.token)
    }

    pub fn get_refresh_token(&self, profile: &str) -> Option<String> {
        self.load(profile)?.refresh_token.filter(|t| !t.is_empty())
    }

    pub fn get_claims_subset(&self, profile: &str) -> Option<ClaimsSubset> {
        self.load(profile).map(|r| ClaimsSubset { email: r.email })
    }
}

#[cfg(test)]
#[path = "monitoring_tests.rs"]
mod tests;
