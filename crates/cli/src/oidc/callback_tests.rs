// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::test_support::http_client;

const WAIT: Duration = Duration::from_secs(5);

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
}

#[yare::parameterized(
    success = { &[("state", "s1"), ("code", "c1")], CallbackOutcome::Code("c1".to_owned()) },
    provider_error = { &[("error", "access_denied"), ("error_description", "User said no")],
                       CallbackOutcome::Error("User said no".to_owned()) },
    error_without_description = { &[("error", "access_denied")],
                                  CallbackOutcome::Error("Unknown error".to_owned()) },
    wrong_state = { &[("state", "other"), ("code", "c1")],
                    CallbackOutcome::Error("invalid state or missing code".to_owned()) },
    missing_code = { &[("state", "s1")],
                     CallbackOutcome::Error("invalid state or missing code".to_owned()) },
    empty_code = { &[("state", "s1"), ("code", "")],
                   CallbackOutcome::Error("invalid state or missing code".to_owned()) },
)]
fn classify_redirect(pairs: &[(&str, &str)], expected: CallbackOutcome) {
    assert_eq!(classify(&params(pairs), "s1"), expected);
}

#[tokio::test]
async fn delivers_code_and_releases_port() -> anyhow::Result<()> {
    let listener = CallbackListener::bind(0, "state-1").await?;
    let port = listener.port();

    let client = http_client()?;
    let resp = client
        .get(format!("http://127.0.0.1:{port}/callback?state=state-1&code=the-code"))
        .send()
        .await?;
    assert!(resp.status().is_success());
    assert!(resp.text().await?.contains("Authentication successful"));

    let code = listener.wait(WAIT).await?;
    assert_eq!(code, "the-code");

    // The server has shut down, so the port can be bound again.
    let rebound = std::net::TcpListener::bind(("127.0.0.1", port));
    assert!(rebound.is_ok());
    Ok(())
}

#[tokio::test]
async fn guarded_port_stays_held_after_redirect() -> anyhow::Result<()> {
    let guard = crate::lock::acquire(0).ok_or_else(|| anyhow::anyhow!("bind failed"))?;
    let port = guard.port();
    let listener = CallbackListener::from_std(guard.share()?, "state-1")?;
    assert_eq!(listener.port(), port);

    http_client()?
        .get(format!("http://127.0.0.1:{port}/callback?state=state-1&code=the-code"))
        .send()
        .await?;
    assert_eq!(listener.wait(WAIT).await?, "the-code");

    assert!(!crate::lock::try_acquire(port));
    drop(guard);
    assert!(crate::lock::try_acquire(port));
    Ok(())
}

#[tokio::test]
async fn provider_error_is_surfaced() -> anyhow::Result<()> {
    let listener = CallbackListener::bind(0, "state-1").await?;
    let port = listener.port();

    http_client()?
        .get(format!(
            "http://127.0.0.1:{port}/callback?error=access_denied&error_description=denied+by+policy"
        ))
        .send()
        .await?;

    crate::assert_err_contains!(listener.wait(WAIT).await, "denied by policy");
    Ok(())
}

#[tokio::test]
async fn only_first_request_produces_a_result() -> anyhow::Result<()> {
    let listener = CallbackListener::bind(0, "state-1").await?;
    let port = listener.port();
    let client = http_client()?;

    client.get(format!("http://127.0.0.1:{port}/callback?state=state-1&code=first")).send().await?;
    let second = client
        .get(format!("http://127.0.0.1:{port}/callback?state=state-1&code=second"))
        .send()
        .await;
    // The server may already be gone; if it answered, it refused a second result.
    if let Ok(resp) = second {
        assert!(resp.text().await?.contains("already"));
    }

    assert_eq!(listener.wait(WAIT).await?, "first");
    Ok(())
}

#[tokio::test]
async fn times_out_without_redirect() -> anyhow::Result<()> {
    let listener = CallbackListener::bind(0, "state-1").await?;
    crate::assert_err_contains!(listener.wait(Duration::from_millis(100)).await, "timed out");
    Ok(())
}

#[tokio::test]
async fn busy_port_fails_immediately() -> anyhow::Result<()> {
    let holder = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = holder.local_addr()?.port();

    let err = match CallbackListener::bind(port, "s").await {
        Ok(_) => anyhow::bail!("bind on a held port should fail"),
        Err(e) => e,
    };
    assert!(format!("{err:#}").contains("unavailable"));
    assert_eq!(crate::error::code_of(&err), Some(crate::error::ErrorCode::Network));
    Ok(())
}
