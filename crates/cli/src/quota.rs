// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Quota gate: asks a policy service whether the user may receive
//! credentials, resolving service failures through a fail mode.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::credentials::{format_timestamp, parse_timestamp};
use crate::oidc::claims::Claims;

/// Default bound on a single quota check.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How to treat an unreachable or misbehaving policy service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum FailMode {
    /// Allow access, recording why the check failed.
    #[default]
    Open,
    /// Deny access.
    Closed,
}

impl From<String> for FailMode {
    /// Only the literal `closed` fails closed.
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl FailMode {
    pub fn parse(value: &str) -> Self {
        if value == "closed" {
            Self::Closed
        } else {
            Self::Open
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// Failure reasons recorded when the service could not give an answer.
pub mod reason {
    pub const NO_EMAIL: &str = "no_email";
    pub const AUTH_ERROR: &str = "auth_error";
    pub const TIMEOUT: &str = "timeout";
    pub const CONNECTION_ERROR: &str = "connection_error";
    pub const API_ERROR: &str = "api_error";
    pub const PARSE_ERROR: &str = "parse_error";
}

/// Policy decision for one check.
///
/// Only `allowed` must be well-formed. The descriptive fields are read
/// leniently so an oddly shaped detail never overturns the decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaResult {
    pub allowed: bool,
    #[serde(default, deserialize_with = "lenient_text")]
    pub reason: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub message: String,
    #[serde(default, deserialize_with = "numeric_entries", skip_serializing_if = "Option::is_none")]
    pub usage: Option<BTreeMap<String, f64>>,
    #[serde(default, deserialize_with = "display_entries", skip_serializing_if = "Option::is_none")]
    pub policy: Option<BTreeMap<String, String>>,
}

fn lenient_text<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Keep the numeric entries of an object; anything else is dropped.
fn numeric_entries<'de, D: Deserializer<'de>>(
    de: D,
) -> Result<Option<BTreeMap<String, f64>>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Object(map) => {
            Some(map.into_iter().filter_map(|(k, v)| v.as_f64().map(|n| (k, n))).collect())
        }
        _ => None,
    })
}

/// Render the non-null entries of an object as text.
fn display_entries<'de, D: Deserializer<'de>>(
    de: D,
) -> Result<Option<BTreeMap<String, String>>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Object(map) => Some(
            map.into_iter()
                .filter_map(|(k, v)| match v {
                    Value::Null => None,
                    Value::String(s) => Some((k, s)),
                    other => Some((k, other.to_string())),
                })
                .collect(),
        ),
        _ => None,
    })
}

impl QuotaResult {
    fn allow(reason: &str, message: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.to_owned(),
            message: message.into(),
            usage: None,
            policy: None,
        }
    }

    fn failed(reason: &str, detail: &str, fail_mode: FailMode) -> Self {
        let allowed = fail_mode == FailMode::Open;
        let outcome = if allowed { "allowing access" } else { "access denied" };
        warn!(reason, fail_mode = fail_mode.as_str(), detail, "quota check failed");
        Self {
            allowed,
            reason: reason.to_owned(),
            message: format!("Quota check failed ({detail}); {outcome}"),
            usage: None,
            policy: None,
        }
    }

    /// User-facing banner shown when access is blocked.
    pub fn block_message(&self) -> String {
        let rule = "=".repeat(60);
        let mut out = format!("{rule}\nACCESS BLOCKED: quota check denied credentials\n");
        if !self.reason.is_empty() {
            let _ = writeln!(out, "Reason: {}", self.reason);
        }
        if !self.message.is_empty() {
            let _ = writeln!(out, "\n{}", self.message);
        }
        if let Some(usage) = self.usage.as_ref().filter(|u| !u.is_empty()) {
            out.push_str("\nCurrent usage:\n");
            for (key, value) in usage {
                let _ = writeln!(out, "  {key}: {value}");
            }
        }
        if let Some(policy) = self.policy.as_ref().filter(|p| !p.is_empty()) {
            out.push_str("\nPolicy:\n");
            for (key, value) in policy {
                let _ = writeln!(out, "  {key}: {value}");
            }
        }
        out.push_str("\nContact your administrator if you believe this is an error.\n");
        out.push_str(&rule);
        out
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LastCheck {
    last_check: String,
}

/// Quota service client plus the per-profile last-check record.
#[derive(Debug, Clone)]
pub struct QuotaGate {
    http: reqwest::Client,
    session_dir: PathBuf,
}

impl QuotaGate {
    pub fn new(session_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        crate::ensure_crypto();
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, session_dir: session_dir.into() })
    }

    pub fn should_check(endpoint: Option<&str>) -> bool {
        endpoint.is_some_and(|e| !e.trim().is_empty())
    }

    /// Whether a cached-credential invocation is due for another check.
    pub fn should_recheck(
        &self,
        endpoint: Option<&str>,
        interval_minutes: u64,
        profile: &str,
    ) -> bool {
        if !Self::should_check(endpoint) {
            return false;
        }
        if interval_minutes == 0 {
            return true;
        }
        let Some(last) = self.last_check(profile) else {
            return true;
        };
        let elapsed = Utc::now() - last;
        elapsed.num_seconds() >= (interval_minutes as i64).saturating_mul(60)
    }

    pub async fn check(
        &self,
        endpoint: &str,
        id_token: &str,
        claims: &Claims,
        fail_mode: FailMode,
        timeout: Duration,
    ) -> QuotaResult {
        if claims.email().is_none() {
            debug!("no email claim, skipping quota check");
            return QuotaResult::allow(reason::NO_EMAIL, "No email claim to check quota against");
        }

        let url = format!("{}/check", endpoint.trim_end_matches('/'));
        debug!(url = %url, "quota check");
        let resp = match self.http.get(&url).bearer_auth(id_token).timeout(timeout).send().await
        {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                return QuotaResult::failed(reason::TIMEOUT, &e.to_string(), fail_mode)
            }
            Err(e) => {
                return QuotaResult::failed(reason::CONNECTION_ERROR, &e.to_string(), fail_mode)
            }
        };

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return QuotaResult::failed(reason::AUTH_ERROR, "token rejected", fail_mode);
        }
        if status != reqwest::StatusCode::OK {
            return QuotaResult::failed(reason::API_ERROR, &format!("HTTP {status}"), fail_mode);
        }

        let body = match resp.bytes().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => {
                return QuotaResult::failed(reason::TIMEOUT, &e.to_string(), fail_mode)
            }
            Err(e) => return QuotaResult::failed(reason::PARSE_ERROR, &e.to_string(), fail_mode),
        };
        match serde_json::from_slice::<QuotaResult>(&body) {
            Ok(result) => {
                debug!(allowed = result.allowed, reason = %result.reason, "quota decision");
                result
            }
            Err(e) => QuotaResult::failed(reason::PARSE_ERROR, &e.to_string(), fail_mode),
        }
    }

    /// Persist "now" as the profile's most recent check.
    pub fn record_check_time(&self, profile: &str) -> anyhow::Result<()> {
        let record = LastCheck { last_check: format_timestamp(Utc::now()) };
        let path = crate::cache::quota_check_file(&self.session_dir, profile);
        crate::cache::write_private(&path, &serde_json::to_vec(&record)?)
    }

    fn last_check(&self, profile: &str) -> Option<DateTime<Utc>> {
        let path = crate::cache::quota_check_file(&self.session_dir, profile);
        let bytes = std::fs::read(path).ok()?;
        let record: LastCheck = serde_json::from_slice(&bytes).ok()?;
        parse_timestamp(&record.last_check)
    }
}

#[cfg(test)]
#[path = "quota_tests.rs"]
mod tests;
