// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod federation;
pub mod lock;
pub mod oidc;
pub mod pipeline;
pub mod quota;
pub mod test_support;

static CRYPTO_INIT: std::sync::Once = std::sync::Once::new();

/// Install the rustls crypto provider (needed by reqwest even on plain HTTP).
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
