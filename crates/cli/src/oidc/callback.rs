// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-use local HTTP listener capturing the OIDC redirect.
//!
//! The listener binds `127.0.0.1:<port>` up front so a busy port is reported
//! immediately, separate from a timeout, or serves on a socket the login
//! mutex already holds. The first request on `/callback`
//! produces exactly one [`CallbackOutcome`]; the server then shuts down after
//! a short grace period so the browser receives its page.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ErrorCode;

/// Time allowed for the response to flush to the browser before shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Interactive login timeout.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Result delivered by the redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Code(String),
    Error(String),
}

struct HandlerState {
    expected_state: String,
    result_tx: mpsc::Sender<CallbackOutcome>,
    delivered: AtomicBool,
    shutdown: CancellationToken,
}

/// A bound, running callback server.
pub struct CallbackListener {
    port: u16,
    result_rx: mpsc::Receiver<CallbackOutcome>,
    shutdown: CancellationToken,
    server: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Bind `127.0.0.1:<port>` and start serving. Fails immediately if the
    /// port is taken.
    pub async fn bind(port: u16, expected_state: impl Into<String>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.map_err(|e| {
            ErrorCode::Network.with_message(format!("callback port {port} unavailable: {e}"))
        })?;
        Self::start(listener, expected_state.into())
    }

    /// Serve on a socket the caller already holds, e.g. a
    /// [`PortGuard`](crate::lock::PortGuard) handle.
    pub fn from_std(
        listener: std::net::TcpListener,
        expected_state: impl Into<String>,
    ) -> anyhow::Result<Self> {
        listener.set_nonblocking(true)?;
        Self::start(TcpListener::from_std(listener)?, expected_state.into())
    }

    fn start(listener: TcpListener, expected_state: String) -> anyhow::Result<Self> {
        let port = listener.local_addr()?.port();

        let (result_tx, result_rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let state = Arc::new(HandlerState {
            expected_state,
            result_tx,
            delivered: AtomicBool::new(false),
            shutdown: shutdown.clone(),
        });

        let router = Router::new().route("/callback", get(handle_callback)).with_state(state);
        let signal = shutdown.clone().cancelled_owned();
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(signal).await {
                debug!(err = %e, "callback server stopped with error");
            }
        });

        debug!(port, "callback listener started");
        Ok(Self { port, result_rx, shutdown, server: Some(server) })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Block until the redirect arrives or `timeout` elapses, then stop the
    /// server. Returns the authorization code.
    pub async fn wait(mut self, timeout: Duration) -> anyhow::Result<String> {
        let outcome = tokio::time::timeout(timeout, self.result_rx.recv()).await;
        self.stop().await;

        match outcome {
            Ok(Some(CallbackOutcome::Code(code))) => Ok(code),
            Ok(Some(CallbackOutcome::Error(msg))) => {
                Err(ErrorCode::Protocol.with_message(format!("authentication failed: {msg}")).into())
            }
            Ok(None) => Err(ErrorCode::Protocol.with_message("callback listener closed").into()),
            Err(_) => Err(ErrorCode::Protocol
                .with_message(format!(
                    "timed out after {}s waiting for authentication",
                    timeout.as_secs()
                ))
                .into()),
        }
    }

    async fn stop(&mut self) {
        let Some(mut server) = self.server.take() else {
            return;
        };
        // A delivered result already scheduled shutdown after the grace period.
        if tokio::time::timeout(SHUTDOWN_GRACE * 5, &mut server).await.is_err() {
            self.shutdown.cancel();
            let _ = server.await;
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Classify the redirect query parameters.
pub fn classify(params: &HashMap<String, String>, expected_state: &str) -> CallbackOutcome {
    if params.contains_key("error") {
        let description = params
            .get("error_description")
            .filter(|d| !d.is_empty())
            .cloned()
            .unwrap_or_else(|| "Unknown error".to_owned());
        return CallbackOutcome::Error(description);
    }
    match (params.get("state"), params.get("code")) {
        (Some(state), Some(code)) if state == expected_state && !code.is_empty() => {
            CallbackOutcome::Code(code.clone())
        }
        _ => CallbackOutcome::Error("invalid state or missing code".to_owned()),
    }
}

async fn handle_callback(
    State(state): State<Arc<HandlerState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    if state.delivered.swap(true, Ordering::SeqCst) {
        return Html(page("Already handled", "This login request was already completed."));
    }

    let outcome = classify(&params, &state.expected_state);
    let html = match &outcome {
        CallbackOutcome::Code(_) => {
            page("Authentication successful", "You can close this window and return to the terminal.")
        }
        CallbackOutcome::Error(msg) => page("Authentication failed", msg),
    };

    let _ = state.result_tx.try_send(outcome);

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        shutdown.cancel();
    });

    Html(html)
}

fn page(title: &str, message: &str) -> String {
    let message = message.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;");
    format!(
        "<!DOCTYPE html><html><head><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{message}</p></body></html>"
    )
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
