// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud credential cache in the key-value section format understood by the
//! AWS CLI (`~/.aws/credentials`), one section per profile.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ErrorCode;

/// Credentials expiring within this many seconds are treated as expired.
pub const EXPIRY_BUFFER_SECS: i64 = 30;

/// Access key id marking an explicitly cleared section.
pub const EXPIRED_SENTINEL: &str = "EXPIRED";

const KEY_ACCESS: &str = "aws_access_key_id";
const KEY_SECRET: &str = "aws_secret_access_key";
const KEY_TOKEN: &str = "aws_session_token";
const KEY_EXPIRATION: &str = "x-expiration";

/// Temporary cloud credentials in the `credential_process` output shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CloudCredential {
    pub version: u32,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    /// RFC3339, UTC.
    pub expiration: String,
}

impl CloudCredential {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        expiration: DateTime<Utc>,
    ) -> Self {
        Self {
            version: 1,
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.into(),
            expiration: format_timestamp(expiration),
        }
    }

    /// Parsed expiration; accepts both `Z` and `+00:00` offsets.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.expiration)
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_key_id == EXPIRED_SENTINEL {
            return false;
        }
        match self.expires_at() {
            Some(at) => (at - now).num_seconds() > EXPIRY_BUFFER_SECS,
            None => false,
        }
    }

    fn sentinel() -> Self {
        let past = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).single().unwrap_or_default();
        Self::new(EXPIRED_SENTINEL, EXPIRED_SENTINEL, EXPIRED_SENTINEL, past)
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim()).ok().map(|t| t.with_timezone(&Utc))
}

/// Per-profile cloud credential cache plus the session files tied to it.
#[derive(Debug, Clone)]
pub struct CredentialCache {
    path: PathBuf,
    session_dir: PathBuf,
}

impl CredentialCache {
    pub fn new(path: impl Into<PathBuf>, session_dir: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), session_dir: session_dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the profile's section. I/O and parse problems are a miss.
    pub fn read(&self, profile: &str) -> Option<CloudCredential> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), err = %e, "unreadable credential cache");
                return None;
            }
        };
        let doc = IniDoc::parse(&text);
        let section = doc.section(profile)?;
        let field = |key: &str| section.get(key).map(str::to_owned);
        let credential = CloudCredential {
            version: 1,
            access_key_id: field(KEY_ACCESS)?,
            secret_access_key: field(KEY_SECRET)?,
            session_token: field(KEY_TOKEN)?,
            expiration: field(KEY_EXPIRATION)?,
        };
        if credential.expires_at().is_none() {
            warn!(profile, expiration = %credential.expiration, "unparseable cached expiration");
            return None;
        }
        Some(credential)
    }

    /// Write the profile's section, preserving every other section and any
    /// unknown keys in this one.
    pub fn write(&self, credential: &CloudCredential, profile: &str) -> anyhow::Result<()> {
        let existing = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(ErrorCode::Cache
                    .with_message(format!("reading {}: {e}", self.path.display()))
                    .into())
            }
        };

        let mut doc = IniDoc::parse(&existing);
        let section = doc.section_mut(profile);
        section.set(KEY_ACCESS, &credential.access_key_id);
        section.set(KEY_SECRET, &credential.secret_access_key);
        section.set(KEY_TOKEN, &credential.session_token);
        section.set(KEY_EXPIRATION, &credential.expiration);

        super::write_private(&self.path, doc.render().as_bytes()).map_err(|e| {
            ErrorCode::Cache.with_message(format!("writing {}: {e:#}", self.path.display()))
        })?;
        debug!(profile, path = %self.path.display(), "cached credentials");
        Ok(())
    }

    pub fn get_valid(&self, profile: &str) -> Option<CloudCredential> {
        self.read(profile).filter(|c| c.is_valid_at(Utc::now()))
    }

    pub fn is_expired(&self, profile: &str) -> bool {
        self.get_valid(profile).is_none()
    }

    /// Invalidate the profile: overwrite its section with the `EXPIRED`
    /// sentinel and drop its session files. Returns what was cleared.
    pub fn clear(&self, profile: &str) -> anyhow::Result<Vec<String>> {
        let mut cleared = Vec::new();

        if self.read(profile).is_some() {
            self.write(&CloudCredential::sentinel(), profile)?;
            cleared.push("credentials".to_owned());
        }
        if super::remove_if_exists(&super::monitoring_file(&self.session_dir, profile))? {
            cleared.push("monitoring token".to_owned());
        }
        if super::remove_if_exists(&super::quota_check_file(&self.session_dir, profile))? {
            cleared.push("quota check".to_owned());
        }

        let empty = std::fs::read_dir(&self.session_dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty && std::fs::remove_dir(&self.session_dir).is_ok() {
            cleared.push("session directory".to_owned());
        }

        debug!(profile, ?cleared, "cleared cache");
        Ok(cleared)
    }
}

/// Line-preserving model of an INI file. Lines before the first header
/// belong to an unnamed leading section.
#[derive(Debug, Default)]
struct IniDoc {
    sections: Vec<IniSection>,
}

#[derive(Debug)]
struct IniSection {
    name: Option<String>,
    lines: Vec<String>,
}

fn header_name(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    trimmed.strip_prefix('[')?.strip_suffix(']').map(str::trim)
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    Some((key.trim(), value.trim()))
}

impl IniDoc {
    fn parse(text: &str) -> Self {
        let mut sections = vec![IniSection { name: None, lines: Vec::new() }];
        for line in text.lines() {
            match header_name(line) {
                Some(name) => {
                    sections.push(IniSection { name: Some(name.to_owned()), lines: Vec::new() })
                }
                None => {
                    if let Some(current) = sections.last_mut() {
                        current.lines.push(line.to_owned());
                    }
                }
            }
        }
        Self { sections }
    }

    fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name.as_deref() == Some(name))
    }

    fn section_mut(&mut self, name: &str) -> &mut IniSection {
        let index = match self.sections.iter().position(|s| s.name.as_deref() == Some(name)) {
            Some(i) => i,
            None => {
                if let Some(last) = self.sections.last_mut() {
                    if last.lines.last().is_some_and(|l| !l.trim().is_empty()) {
                        last.lines.push(String::new());
                    }
                }
                self.sections.push(IniSection { name: Some(name.to_owned()), lines: Vec::new() });
                self.sections.len() - 1
            }
        };
        &mut self.sections[index]
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            if let Some(name) = &section.name {
                out.push('[');
                out.push_str(name);
                out.push_str("]\n");
            }
            for line in &section.lines {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}

impl IniSection {
    fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().filter_map(|l| split_entry(l)).find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    fn set(&mut self, key: &str, value: &str) {
        let entry = format!("{key} = {value}");
        if let Some(line) =
            self.lines.iter_mut().find(|l| split_entry(l).is_some_and(|(k, _)| k == key))
        {
            *line = entry;
            return;
        }
        // Keep trailing blank separator lines after the entries.
        let at = self.lines.iter().rposition(|l| !l.trim().is_empty()).map_or(0, |i| i + 1);
        self.lines.insert(at, entry);
    }
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
