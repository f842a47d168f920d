// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Instant;

use super::*;
use crate::test_support::free_port;

#[test]
fn free_port_is_acquirable_and_released() -> anyhow::Result<()> {
    let port = free_port()?;
    assert!(try_acquire(port));
    // The probe released it again.
    assert!(try_acquire(port));
    Ok(())
}

#[test]
fn held_port_is_not_acquirable() -> anyhow::Result<()> {
    let holder = TcpListener::bind("127.0.0.1:0")?;
    let port = holder.local_addr()?.port();
    assert!(!try_acquire(port));
    drop(holder);
    assert!(try_acquire(port));
    Ok(())
}

#[test]
fn guard_holds_port_until_every_handle_drops() -> anyhow::Result<()> {
    let port = free_port()?;
    let guard = acquire(port).ok_or_else(|| anyhow::anyhow!("port should be free"))?;
    assert_eq!(guard.port(), port);
    assert!(acquire(port).is_none());

    let shared = guard.share()?;
    drop(guard);
    assert!(!try_acquire(port));
    drop(shared);
    assert!(try_acquire(port));
    Ok(())
}

#[tokio::test]
async fn wait_succeeds_once_holder_releases() -> anyhow::Result<()> {
    let holder = TcpListener::bind("127.0.0.1:0")?;
    let port = holder.local_addr()?.port();

    let release = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(holder);
    });

    let started = Instant::now();
    assert!(wait_with_interval(port, Duration::from_secs(5), Duration::from_millis(50)).await);
    assert!(started.elapsed() < Duration::from_secs(5));
    release.await?;
    Ok(())
}

#[tokio::test]
async fn wait_gives_up_after_timeout() -> anyhow::Result<()> {
    let holder = TcpListener::bind("127.0.0.1:0")?;
    let port = holder.local_addr()?.port();

    let started = Instant::now();
    assert!(!wait_with_interval(port, Duration::from_millis(200), Duration::from_millis(50)).await);
    assert!(started.elapsed() >= Duration::from_millis(200));
    drop(holder);
    Ok(())
}
