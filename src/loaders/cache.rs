use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Statistical releases are annual; a week-old body is still current.
const CACHE_TTL_SECONDS: u64 = 7 * 86400;

/// Get the platform-appropriate cache directory for feed bodies
pub fn get_cache_path() -> PathBuf {
    dirs::cache_dir()
        .map(|p| p.join("public-good-index/feeds"))
        .unwrap_or_else(|| {
            PathBuf::from(format!(
                "{}/.cache/public-good-index/feeds",
                std::env::var("HOME").unwrap_or_default()
            ))
        })
}

/// Raw response body with the time it was fetched
#[derive(Debug, Serialize, Deserialize)]
struct CachedFeed {
    fetched_at: u64, // Unix timestamp
    body: String,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// On-disk cache of feed bodies, keyed by feed name and reference year.
///
/// Keys never contain API keys, so a cached body is shared across key changes.
#[derive(Debug, Clone)]
pub struct FeedCache {
    path: PathBuf,
    ttl: Duration,
}

impl FeedCache {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            ttl: Duration::from_secs(CACHE_TTL_SECONDS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fresh cached body for `key`, if any. Unreadable entries count as misses.
    pub fn get(&self, key: &str) -> Option<String> {
        let bytes = cacache::read_sync(&self.path, key).ok()?;
        let entry: CachedFeed = serde_json::from_slice(&bytes).ok()?;
        let age = now_secs().saturating_sub(entry.fetched_at);
        (age < self.ttl.as_secs()).then_some(entry.body)
    }

    pub fn put(&self, key: &str, body: &str) -> Result<()> {
        let entry = CachedFeed {
            fetched_at: now_secs(),
            body: body.to_string(),
        };
        let json = serde_json::to_vec(&entry)?;
        cacache::write_sync(&self.path, key, &json)?;
        Ok(())
    }
}
