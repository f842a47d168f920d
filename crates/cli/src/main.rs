// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;
use tracing::debug;

use credproc::cache::credentials::CredentialCache;
use credproc::cache::monitoring::TOKEN_ENV;
use credproc::cache::{home_dir, CachePaths};
use credproc::config::{Config, Mode};
use credproc::error::{code_of, ErrorCode};
use credproc::pipeline::CredentialPipeline;

#[tokio::main]
async fn main() {
    let config = match Config::try_parse() {
        Ok(config) => config,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }

    init_tracing(&config);

    match run(&config).await {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            if code_of(&e) == Some(ErrorCode::QuotaBlocked) {
                eprintln!("{e}");
            } else {
                debug!(profile = %config.profile, err = ?e, "failure detail");
                eprintln!("error: {e:#}");
            }
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr: stdout carries only the credential JSON.
fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let default = if config.debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    match config.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}

/// Returns whether the invocation succeeded.
async fn run(config: &Config) -> anyhow::Result<bool> {
    let home = home_dir()?;
    let paths = CachePaths::under(&home);

    // Cache-only modes work without a profile config.
    match config.mode() {
        Mode::ClearCache => {
            let cache = CredentialCache::new(&paths.credentials, &paths.session_dir);
            let cleared = cache.clear(&config.profile)?;
            if cleared.is_empty() {
                eprintln!("No cached credentials for profile {}", config.profile);
            } else {
                eprintln!("Cleared {} for profile {}", cleared.join(", "), config.profile);
            }
            return Ok(true);
        }
        Mode::CheckExpiration => {
            let cache = CredentialCache::new(&paths.credentials, &paths.session_dir);
            let valid = !cache.is_expired(&config.profile);
            debug!(profile = %config.profile, valid, "checked expiration");
            return Ok(valid);
        }
        Mode::Credentials | Mode::RefreshIfNeeded | Mode::MonitoringToken => {}
    }

    let exe_dir: Option<PathBuf> =
        std::env::current_exe().ok().and_then(|p| p.parent().map(PathBuf::from));
    let profile = config.load_profile(exe_dir.as_deref(), Some(&home))?;
    debug!(profile = %config.profile, provider = %profile.provider_domain, "loaded profile");

    let pipeline = CredentialPipeline::new(&config.profile, profile, &paths)?
        .with_env_token(std::env::var(TOKEN_ENV).ok());

    match config.mode() {
        Mode::RefreshIfNeeded => {
            pipeline.refresh_if_needed().await?;
            Ok(true)
        }
        Mode::MonitoringToken => match pipeline.monitoring_token().await? {
            Some(token) => {
                println!("{token}");
                Ok(true)
            }
            None => Err(ErrorCode::Protocol.with_message("no monitoring token available").into()),
        },
        _ => {
            let credential = pipeline.run().await?;
            println!("{}", serde_json::to_string(&credential)?);
            Ok(true)
        }
    }
}
