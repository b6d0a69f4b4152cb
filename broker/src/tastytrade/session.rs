//! On-disk session token cache.
//!
//! A tastytrade session token is valid for 24 hours. Reusing it across
//! daily runs avoids a login per run.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// How long a freshly created session token is trusted.
pub const SESSION_LIFETIME_HOURS: i64 = 24;

#[derive(Serialize, Deserialize)]
struct CachedSession {
    environment: String,
    session_token: Zeroizing<String>,
    expires_at: DateTime<Utc>,
}

/// JSON file holding one session token per file.
#[derive(Debug, Clone)]
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached token for `environment`, if present and unexpired at `now`.
    ///
    /// A missing or unreadable cache is a miss, never an error.
    pub fn load(&self, environment: &str, now: DateTime<Utc>) -> Option<Zeroizing<String>> {
        let raw = Zeroizing::new(fs::read_to_string(&self.path).ok()?);
        let cached: CachedSession = match serde_json::from_str(&raw) {
            Ok(c) => c,
            Err(e) => {
                warn!("Ignoring unreadable session cache {}: {e}", self.path.display());
                return None;
            }
        };
        if cached.environment != environment {
            debug!("Session cache belongs to {}, not {environment}", cached.environment);
            return None;
        }
        if now >= cached.expires_at {
            debug!("Cached session token expired at {}", cached.expires_at);
            return None;
        }
        debug!("Reusing session token valid until {}", cached.expires_at);
        Some(cached.session_token)
    }

    /// Store `token`, expiring [`SESSION_LIFETIME_HOURS`] after `now`.
    pub fn store(&self, environment: &str, token: &str, now: DateTime<Utc>) -> std::io::Result<()> {
        let cached = CachedSession {
            environment: environment.to_string(),
            session_token: Zeroizing::new(token.to_string()),
            expires_at: now + Duration::hours(SESSION_LIFETIME_HOURS),
        };
        let json = Zeroizing::new(
            serde_json::to_string_pretty(&cached).map_err(std::io::Error::other)?,
        );

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, json.as_bytes())?;
        restrict_permissions(&self.path)
    }

    /// Remove the cache file. A missing file is fine.
    pub fn clear(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove session cache {}: {e}", self.path.display());
            }
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 30, hour, 0, 0).unwrap()
    }

    #[test]
    fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SessionCache::new(dir.path().join("session.json"));
        cache.store("sandbox", "tok-123", at(10)).unwrap();

        let token = cache.load("sandbox", at(20)).unwrap();
        assert_eq!(token.as_str(), "tok-123");
    }

    #[test]
    fn cache_file_holds_plain_token() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SessionCache::new(dir.path().join("session.json"));
        cache.store("production", "tok-456", at(9)).unwrap();

        let raw = std::fs::read_to_string(cache.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["session_token"], "tok-456");
        assert_eq!(json["environment"], "production");
        assert_eq!(cache.load("production", at(10)).unwrap().as_str(), "tok-456");
    }

    #[test]
    fn expired_token_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SessionCache::new(dir.path().join("session.json"));
        cache.store("sandbox", "tok-123", at(0)).unwrap();

        let next_day = at(0) + Duration::hours(SESSION_LIFETIME_HOURS);
        assert!(cache.load("sandbox", next_day).is_none());
    }

    #[test]
    fn other_environment_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SessionCache::new(dir.path().join("session.json"));
        cache.store("sandbox", "tok-123", at(0)).unwrap();
        assert!(cache.load("production", at(1)).is_none());
    }

    #[test]
    fn missing_or_corrupt_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let cache = SessionCache::new(&path);
        assert!(cache.load("sandbox", at(0)).is_none());

        fs::write(&path, "not json").unwrap();
        assert!(cache.load("sandbox", at(0)).is_none());

        cache.clear();
        assert!(!path.exists());
    }

    #[test]
    fn creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SessionCache::new(dir.path().join("nested/state/session.json"));
        cache.store("production", "tok", at(0)).unwrap();
        assert!(cache.path().exists());
    }
}
