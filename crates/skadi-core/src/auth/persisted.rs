//! On-disk session so a signed-in CLI stays signed in between runs.
//!
//! The session file holds the last access token, the role, and the cookies
//! the refresh endpoint needs. It is dropped once the server's refresh
//! lifetime has certainly passed.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Credential, CredentialStore};
use crate::models::Role;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Refresh cookies issued by the backend live for 10 days.
const REFRESH_LIFETIME_DAYS: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub access_token: Option<String>,
    pub role: Option<Role>,
    pub username: Option<String>,
    /// `Cookie` header value for the refresh endpoint
    pub cookies: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl SessionData {
    pub fn is_expired(&self) -> bool {
        let expiry = self.saved_at + Duration::days(REFRESH_LIFETIME_DAYS);
        Utc::now() > expiry
    }

    /// Credential to seed the store with. A token without a known role is
    /// not trusted; the route guard resolves it through the identity query.
    pub fn credential(&self) -> Credential {
        match (&self.access_token, self.role) {
            (Some(token), Some(role)) => Credential::authenticated(token.clone(), role),
            _ => Credential::default(),
        }
    }
}

pub struct Session {
    cache_dir: PathBuf,
    pub data: Option<SessionData>,
}

impl Session {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            data: None,
        }
    }

    /// Load session from disk
    pub fn load(&mut self) -> Result<bool> {
        let path = self.session_path();
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .context("Failed to read session file")?;
            let data: SessionData = serde_json::from_str(&contents)
                .context("Failed to parse session file")?;

            if !data.is_expired() {
                self.data = Some(data);
                return Ok(true);
            }
            debug!("Stored session expired");
        }
        Ok(false)
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        if let Some(ref data) = self.data {
            let path = self.session_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(data)?;
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    /// Clear session data
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Snapshot the store and the refresh cookies into this session
    pub fn capture(
        &mut self,
        store: &CredentialStore,
        jar: &Jar,
        refresh_url: &str,
        username: Option<String>,
    ) {
        let credential = store.get();
        self.data = Some(SessionData {
            access_token: credential.token().map(str::to_string),
            role: credential.role(),
            username: username.or_else(|| self.data.as_ref().and_then(|d| d.username.clone())),
            cookies: capture_cookies(jar, refresh_url),
            saved_at: Utc::now(),
        });
    }

    pub fn username(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.username.as_deref())
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

/// Cookie header the jar would send to `url`
pub fn capture_cookies(jar: &Jar, url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    jar.cookies(&url)
        .and_then(|value| value.to_str().ok().map(str::to_string))
}

/// Put previously captured cookies back into a jar
pub fn restore_cookies(jar: &Jar, url: &str, header: &str) {
    let url = match Url::parse(url) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "Cannot restore cookies for invalid URL");
            return;
        }
    };
    for pair in header.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        jar.add_cookie_str(&format!("{}; Path=/", pair), &url);
    }
}
