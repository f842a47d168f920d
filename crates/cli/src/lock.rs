// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process login mutex built on the redirect port.
//!
//! Only one process can bind a TCP port at a time. The winner keeps the port
//! bound in a [`PortGuard`] from the probe until its credentials are cached,
//! and serves the redirect on a second handle to the same socket, so a
//! waiter that sees the port free always finds the winner's result. A
//! crashed holder frees the port when the OS reclaims its sockets.

use std::net::TcpListener;
use std::time::Duration;

use tracing::debug;

/// Poll interval while waiting for another instance to finish logging in.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long a losing instance waits before re-checking the cache.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Exclusive hold on the login port; released on drop.
#[derive(Debug)]
pub struct PortGuard {
    listener: TcpListener,
}

impl PortGuard {
    pub fn port(&self) -> u16 {
        self.listener.local_addr().map(|a| a.port()).unwrap_or_default()
    }

    /// Second handle to the held socket. The port stays bound until both
    /// this handle and the guard are dropped.
    pub fn share(&self) -> std::io::Result<TcpListener> {
        self.listener.try_clone()
    }
}

/// Bind `127.0.0.1:<port>` and keep it, or `None` if another process holds it.
pub fn acquire(port: u16) -> Option<PortGuard> {
    match TcpListener::bind(("127.0.0.1", port)) {
        Ok(listener) => Some(PortGuard { listener }),
        Err(e) => {
            debug!(port, err = %e, "login port busy");
            None
        }
    }
}

/// Probe whether `127.0.0.1:<port>` is free (test-and-release).
pub fn try_acquire(port: u16) -> bool {
    acquire(port).is_some()
}

/// Poll [`try_acquire`] until it succeeds or `timeout` elapses.
pub async fn wait_for_available(port: u16, timeout: Duration) -> bool {
    wait_with_interval(port, timeout, POLL_INTERVAL).await
}

pub(crate) async fn wait_with_interval(port: u16, timeout: Duration, interval: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if try_acquire(port) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
