// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure classes surfaced by the credential pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    RandomSource,
    Network,
    Protocol,
    Cache,
    QuotaBlocked,
    LockTimeout,
    Config,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RandomSource => "RANDOM_SOURCE",
            Self::Network => "NETWORK",
            Self::Protocol => "PROTOCOL",
            Self::Cache => "CACHE",
            Self::QuotaBlocked => "QUOTA_BLOCKED",
            Self::LockTimeout => "LOCK_TIMEOUT",
            Self::Config => "CONFIG",
        }
    }

    pub fn with_message(self, message: impl Into<String>) -> CredError {
        CredError { code: self, message: message.into() }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified error carried through `anyhow` so the entry point can
/// `downcast_ref` it.
#[derive(Debug, Clone)]
pub struct CredError {
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for CredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CredError {}

/// Extract the [`ErrorCode`] of an `anyhow` error, if it was classified.
pub fn code_of(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain().find_map(|e| e.downcast_ref::<CredError>()).map(|e| e.code)
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
