// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;
use crate::oidc::provider::endpoint_for;
use crate::test_support::{fake_jwt, ScriptedServer};

fn target<'a>(domain: &'a str, endpoint: &'a ProviderEndpoint) -> TokenTarget<'a> {
    TokenTarget { domain, provider_type: "okta", endpoint, client_id: "client-1" }
}

fn okta() -> anyhow::Result<&'static ProviderEndpoint> {
    endpoint_for("okta").ok_or_else(|| anyhow::anyhow!("okta missing"))
}

#[tokio::test]
async fn exchange_code_posts_form_and_decodes_claims() -> anyhow::Result<()> {
    let id_token = fake_jwt(&json!({"sub": "u1", "email": "u1@example.com", "nonce": "n"}));
    let body = json!({"id_token": id_token, "refresh_token": "rt-1", "access_token": "at"});
    let server = ScriptedServer::start(vec![(200, body.to_string())]).await?;
    let domain = server.url();
    let endpoint = okta()?;

    let tokens = TokenClient::new()?
        .exchange_code(&target(&domain, endpoint), "http://localhost:8400/callback", "code-9", "ver")
        .await?;

    assert_eq!(tokens.id_token, id_token);
    assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
    assert_eq!(tokens.claims.email(), Some("u1@example.com"));

    let reqs = server.requests();
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0].path, "/oauth2/v1/token");
    assert!(reqs[0].body.contains("grant_type=authorization_code"));
    assert!(reqs[0].body.contains("code=code-9"));
    assert!(reqs[0].body.contains("code_verifier=ver"));
    assert!(reqs[0].body.contains("client_id=client-1"));
    Ok(())
}

#[tokio::test]
async fn non_200_carries_status_and_body() -> anyhow::Result<()> {
    let server =
        ScriptedServer::start(vec![(400, r#"{"error":"invalid_grant"}"#.to_owned())]).await?;
    let domain = server.url();
    let endpoint = okta()?;
    let client = TokenClient::new()?;

    let result = client.refresh(&target(&domain, endpoint), "old-rt").await;
    crate::assert_err_contains!(result, "invalid_grant");

    let result = client.refresh(&target(&domain, endpoint), "old-rt").await;
    crate::assert_err_contains!(result, "400");
    Ok(())
}

#[yare::parameterized(
    missing = { json!({"access_token": "at"}) },
    empty = { json!({"id_token": "", "access_token": "at"}) },
)]
#[test_macro(tokio::test)]
async fn success_without_id_token_is_error(body: serde_json::Value) -> anyhow::Result<()> {
    let server = ScriptedServer::start(vec![(200, body.to_string())]).await?;
    let domain = server.url();
    let result = TokenClient::new()?.refresh(&target(&domain, okta()?), "rt").await;
    crate::assert_err_contains!(result, "no id_token");
    Ok(())
}

#[tokio::test]
async fn refresh_without_rotation_keeps_previous_token() -> anyhow::Result<()> {
    let id_token = fake_jwt(&json!({"sub": "u1"}));
    let server =
        ScriptedServer::start(vec![(200, json!({"id_token": id_token}).to_string())]).await?;
    let domain = server.url();

    let tokens = TokenClient::new()?.refresh(&target(&domain, okta()?), "rt-old").await?;
    assert_eq!(tokens.refresh_token, None);
    let tokens = tokens.retain_refresh_token("rt-old");
    assert_eq!(tokens.refresh_token.as_deref(), Some("rt-old"));

    let reqs = server.requests();
    assert!(reqs[0].body.contains("grant_type=refresh_token"));
    assert!(reqs[0].body.contains("refresh_token=rt-old"));
    Ok(())
}

#[test]
fn rotated_refresh_token_wins() {
    let tokens = TokenSet {
        id_token: "t".to_owned(),
        refresh_token: Some("rt-new".to_owned()),
        claims: Default::default(),
    };
    assert_eq!(tokens.retain_refresh_token("rt-old").refresh_token.as_deref(), Some("rt-new"));
}

#[test]
fn token_url_normalizes_azure_domain() -> anyhow::Result<()> {
    let endpoint = endpoint_for("azure").ok_or_else(|| anyhow::anyhow!("azure missing"))?;
    let target = TokenTarget {
        domain: "login.microsoftonline.com/tenant/v2.0",
        provider_type: "azure",
        endpoint,
        client_id: "c",
    };
    assert_eq!(target.token_url(), "https://login.microsoftonline.com/tenant/oauth2/v2.0/token");
    Ok(())
}
