// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU32, Ordering};

use super::*;

struct Broken(AtomicU32);

impl Browser for Broken {
    fn open(&self, _url: &str) -> anyhow::Result<()> {
        self.0.fetch_add(1, Ordering::Relaxed);
        anyhow::bail!("no display")
    }
}

#[test]
fn open_failure_is_not_fatal() {
    let browser = Broken(AtomicU32::new(0));
    open_or_prompt(&browser, "https://example.com/authorize?x=1");
    assert_eq!(browser.0.load(Ordering::Relaxed), 1);
}

#[test]
fn command_passes_url_as_single_argument() {
    let url = "https://example.com/authorize?a=1&b=2";
    let cmd = SystemBrowser::command(url);
    let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
    assert_eq!(args.last().map(String::as_str), Some(url));
}
