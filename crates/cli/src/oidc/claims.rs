// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed access to identity token claims.
//!
//! Claims are decoded from the token payload without signature verification;
//! the issuer is trusted and verification happens at its token endpoint.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorCode;

/// Claim names that may carry group membership, in lookup order.
const GROUP_CLAIMS: &[&str] = &["groups", "cognito:groups", "custom:groups", "roles"];

const DEPARTMENT_CLAIM: &str = "custom:department";

/// Decoded identity token payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Decode the unverified middle segment of a JWT.
    pub fn from_jwt(token: &str) -> anyhow::Result<Self> {
        let mut parts = token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_)) if !payload.is_empty() => payload,
            _ => {
                return Err(ErrorCode::Protocol
                    .with_message("identity token is not a three-part JWT")
                    .into())
            }
        };
        // Some providers pad the segment even though JWTs should not.
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| ErrorCode::Protocol.with_message(format!("bad token payload: {e}")))?;
        let map: Map<String, Value> = serde_json::from_slice(&bytes)
            .map_err(|e| ErrorCode::Protocol.with_message(format!("bad token claims: {e}")))?;
        Ok(Self(map))
    }

    /// A non-empty string claim.
    pub fn string_claim(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// A list-of-strings claim. A bare string counts as a one-element list.
    pub fn string_list_claim(&self, name: &str) -> Option<Vec<String>> {
        match self.0.get(name)? {
            Value::Array(items) => {
                Some(items.iter().filter_map(Value::as_str).map(str::to_owned).collect())
            }
            Value::String(s) if !s.is_empty() => Some(vec![s.clone()]),
            _ => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.string_claim("email")
    }

    pub fn subject(&self) -> Option<&str> {
        self.string_claim("sub")
    }

    pub fn issuer(&self) -> Option<&str> {
        self.string_claim("iss")
    }

    pub fn nonce(&self) -> Option<&str> {
        self.string_claim("nonce")
    }

    /// `exp` as unix seconds.
    pub fn expires_at(&self) -> Option<i64> {
        self.0.get("exp").and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
    }

    /// Union of all group claims, deduplicated in first-seen order, plus a
    /// synthetic `department:<value>` entry.
    pub fn groups(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for name in GROUP_CLAIMS {
            for group in self.string_list_claim(name).unwrap_or_default() {
                if !out.contains(&group) {
                    out.push(group);
                }
            }
        }
        if let Some(dept) = self.string_claim(DEPARTMENT_CLAIM) {
            let entry = format!("department:{dept}");
            if !out.contains(&entry) {
                out.push(entry);
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "claims_tests.rs"]
mod tests;
