// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opening the authorization URL in the user's browser.

use std::process::{Command, Stdio};

use tracing::{debug, warn};

/// Something that can show the user an authorization URL.
pub trait Browser: Send + Sync {
    fn open(&self, url: &str) -> anyhow::Result<()>;
}

/// The platform's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl SystemBrowser {
    fn command(url: &str) -> Command {
        // `open` on macOS, `xdg-open` elsewhere on unix, the URL protocol
        // handler on Windows (`start` is a shell builtin and mangles `&`).
        let mut cmd = if cfg!(target_os = "macos") {
            Command::new("open")
        } else if cfg!(target_os = "windows") {
            let mut cmd = Command::new("rundll32");
            cmd.arg("url.dll,FileProtocolHandler");
            cmd
        } else {
            Command::new("xdg-open")
        };
        cmd.arg(url);
        cmd
    }
}

impl Browser for SystemBrowser {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        // stdout carries the credential JSON; keep the launcher off it.
        Self::command(url).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null()).spawn()?;
        debug!("opened browser");
        Ok(())
    }
}

/// Open `url`, falling back to asking the user to open it by hand.
/// Never fails: the caller keeps waiting for the callback either way.
pub fn open_or_prompt(browser: &dyn Browser, url: &str) {
    eprintln!("Opening browser for authentication...");
    if let Err(e) = browser.open(url) {
        warn!(err = %e, "failed to open browser");
        eprintln!("Could not open a browser. Open this URL to continue:");
        eprintln!("{url}");
    }
}

#[cfg(test)]
#[path = "browser_tests.rs"]
mod tests;
