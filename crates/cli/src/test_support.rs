// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: mock servers, fake tokens, and assertion helpers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tokio::net::TcpListener;

/// Build an unsigned JWT carrying `claims` as its payload.
pub fn fake_jwt(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

/// Serve `app` on an ephemeral localhost port.
pub async fn spawn_server(app: Router) -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok(addr)
}

/// Plain reqwest client for driving local test servers.
pub fn http_client() -> anyhow::Result<reqwest::Client> {
    crate::ensure_crypto();
    Ok(reqwest::Client::builder().timeout(std::time::Duration::from_secs(10)).build()?)
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A request captured by [`ScriptedServer`].
#[derive(Debug, Clone)]
pub struct Captured {
    pub path: String,
    pub authorization: Option<String>,
    pub body: String,
}

/// Mock HTTP server replaying a fixed sequence of `(status, body)` responses
/// on every path, repeating the last one once exhausted.
pub struct ScriptedServer {
    pub addr: SocketAddr,
    pub calls: Arc<AtomicU32>,
    pub captured: Arc<Mutex<Vec<Captured>>>,
}

impl ScriptedServer {
    pub async fn start(responses: Vec<(u16, String)>) -> anyhow::Result<Self> {
        let calls = Arc::new(AtomicU32::new(0));
        let captured = Arc::new(Mutex::new(Vec::new()));
        let responses = Arc::new(responses);

        let count = Arc::clone(&calls);
        let log = Arc::clone(&captured);
        let app = Router::new().fallback(move |req: axum::extract::Request| {
            let count = Arc::clone(&count);
            let log = Arc::clone(&log);
            let resps = Arc::clone(&responses);
            async move {
                let idx = count.fetch_add(1, Ordering::Relaxed) as usize;
                let path = req.uri().path().to_owned();
                let authorization = req
                    .headers()
                    .get(axum::http::header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let body = axum::body::to_bytes(req.into_body(), 1 << 20)
                    .await
                    .map(|b| String::from_utf8_lossy(&b).into_owned())
                    .unwrap_or_default();
                if let Ok(mut log) = log.lock() {
                    log.push(Captured { path, authorization, body });
                }

                let (status, body) = resps
                    .get(idx)
                    .or_else(|| resps.last())
                    .cloned()
                    .unwrap_or((500, "{}".to_owned()));
                let status =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, [(axum::http::header::CONTENT_TYPE, "application/json")], body)
                    .into_response()
            }
        });

        let addr = spawn_server(app).await?;
        Ok(Self { addr, calls, captured })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.captured.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

/// Mock serving both STS (query protocol, XML) and Cognito Identity (JSON
/// protocol) on one address, recording `(target, body)` per request. STS
/// requests are recorded with target `sts`.
pub struct MockAws {
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockAws {
    pub const STS_ACCESS_KEY: &'static str = "ASIADIRECT";
    pub const COGNITO_ACCESS_KEY: &'static str = "ASIACOGNITO";

    pub async fn start() -> anyhow::Result<Self> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let app = Router::new().fallback(move |req: axum::extract::Request| {
            let log = Arc::clone(&log);
            async move {
                let target = req
                    .headers()
                    .get("x-amz-target")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("sts")
                    .to_owned();
                let body = axum::body::to_bytes(req.into_body(), 1 << 20)
                    .await
                    .map(|b| String::from_utf8_lossy(&b).into_owned())
                    .unwrap_or_default();
                if let Ok(mut log) = log.lock() {
                    log.push((target.clone(), body));
                }
                let json = [(axum::http::header::CONTENT_TYPE, "application/x-amz-json-1.1")];
                match target.as_str() {
                    "AWSCognitoIdentityService.GetId" => {
                        (json, serde_json::json!({"IdentityId": "us-east-1:identity-1"}).to_string())
                            .into_response()
                    }
                    "AWSCognitoIdentityService.GetCredentialsForIdentity" => (
                        json,
                        serde_json::json!({
                            "IdentityId": "us-east-1:identity-1",
                            "Credentials": {
                                "AccessKeyId": Self::COGNITO_ACCESS_KEY,
                                "SecretKey": "cognito-secret",
                                "SessionToken": "cognito-session",
                                "Expiration": 1_893_456_000,
                            }
                        })
                        .to_string(),
                    )
                        .into_response(),
                    _ => ([(axum::http::header::CONTENT_TYPE, "text/xml")], STS_RESPONSE)
                        .into_response(),
                }
            }
        });
        let addr = spawn_server(app).await?;
        Ok(Self { addr, seen })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.seen.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

const STS_RESPONSE: &str = r#"<AssumeRoleWithWebIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <AssumeRoleWithWebIdentityResult>
    <SubjectFromWebIdentityToken>auth0|12345</SubjectFromWebIdentityToken>
    <Credentials>
      <AccessKeyId>ASIADIRECT</AccessKeyId>
      <SecretAccessKey>direct-secret</SecretAccessKey>
      <SessionToken>direct-session</SessionToken>
      <Expiration>2030-01-01T00:00:00Z</Expiration>
    </Credentials>
  </AssumeRoleWithWebIdentityResult>
  <ResponseMetadata>
    <RequestId>req-1</RequestId>
  </ResponseMetadata>
</AssumeRoleWithWebIdentityResponse>"#;

/// Assert that an expression evaluates to `Err` whose Display output
/// (including the context chain) contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = format!("{err:#}");
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
