//! Short-TTL memo of backwards-verification results
//!
//! One cache is shared by every issuer verifier. Entries are keyed by
//! subject and issuer and hold only the time of the last confirmation.
//!
//! Freshness is decided on read against the injected [`Clock`]; there is no
//! background sweep. Two windows apply:
//!
//! ```text
//! validated_at         +ttl                      +ttl*grace_multiplier
//!      |── fresh ───────|──── degraded only ───────────|── gone
//! ```
//!
//! [`VerificationCache::get`] only returns fresh entries.
//! [`VerificationCache::get_degraded`] is the single path past the TTL, used
//! when the authoritative endpoint is unreachable, and logs a warning.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;

/// Cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationCacheConfig {
    /// Normal freshness window in seconds
    pub ttl_secs: u64,
    /// Degraded-mode window as a multiple of `ttl_secs`
    pub grace_multiplier: u32,
}

impl Default for VerificationCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            grace_multiplier: 5,
        }
    }
}

impl VerificationCacheConfig {
    /// Normal freshness window
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Degraded-mode window
    pub fn grace_window(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.saturating_mul(u64::from(self.grace_multiplier)))
    }
}

/// One confirmed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCacheEntry {
    /// Subject that was confirmed
    pub subject: String,
    /// Issuer that confirmed it
    pub issuer: String,
    /// Unix time of the confirmation
    pub validated_at: u64,
}

impl VerificationCacheEntry {
    /// Age at `now`; `None` if `validated_at` is in the future (clock moved
    /// backwards), which callers treat as unusable.
    pub fn age_at(&self, now: u64) -> Option<u64> {
        now.checked_sub(self.validated_at)
    }
}

type CacheKey = (String, String);

/// Concurrent verification cache.
#[derive(Debug)]
pub struct VerificationCache {
    entries: DashMap<CacheKey, VerificationCacheEntry>,
    config: VerificationCacheConfig,
    clock: Arc<dyn Clock>,
}

impl VerificationCache {
    /// Create an empty cache.
    pub fn new(config: VerificationCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            clock,
        }
    }

    /// Settings in effect
    pub fn config(&self) -> VerificationCacheConfig {
        self.config
    }

    fn key(subject: &str, issuer: &str) -> CacheKey {
        (subject.to_string(), issuer.to_string())
    }

    /// Fresh entry for `subject` at `issuer`, if any.
    pub fn get(&self, subject: &str, issuer: &str) -> Option<VerificationCacheEntry> {
        let now = self.clock.now_secs();
        let entry = self.entries.get(&Self::key(subject, issuer))?;

        match entry.age_at(now) {
            Some(age) if age < self.config.ttl_secs => {
                debug!(issuer, subject, age_secs = age, "Verification cache hit");
                Some(entry.clone())
            }
            _ => None,
        }
    }

    /// Entry within the grace window, for use only when the authoritative
    /// endpoint is unreachable.
    pub fn get_degraded(&self, subject: &str, issuer: &str) -> Option<VerificationCacheEntry> {
        let now = self.clock.now_secs();
        let entry = self.entries.get(&Self::key(subject, issuer))?;
        let age = entry.age_at(now)?;

        if age < self.config.grace_window().as_secs() {
            warn!(
                degraded = true,
                issuer,
                subject,
                age_secs = age,
                grace_secs = self.config.grace_window().as_secs(),
                "Honoring stale verification while issuer is unreachable"
            );
            Some(entry.clone())
        } else {
            debug!(issuer, subject, age_secs = age, "Verification entry past grace window");
            None
        }
    }

    /// Record a confirmation at the current time.
    pub fn put(&self, subject: &str, issuer: &str) {
        let validated_at = self.clock.now_secs();
        self.put_at(subject, issuer, validated_at);
    }

    /// Record a confirmation at `validated_at`.
    pub fn put_at(&self, subject: &str, issuer: &str, validated_at: u64) {
        self.entries.insert(
            Self::key(subject, issuer),
            VerificationCacheEntry {
                subject: subject.to_string(),
                issuer: issuer.to_string(),
                validated_at,
            },
        );
    }

    /// Drop the entry for `subject` at `issuer`. Returns true if one existed.
    pub fn invalidate(&self, subject: &str, issuer: &str) -> bool {
        self.entries.remove(&Self::key(subject, issuer)).is_some()
    }

    /// Drop every entry past the grace window. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_secs();
        let grace = self.config.grace_window().as_secs();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.age_at(now).is_some_and(|age| age < grace));
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries, including stale ones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache(clock: Arc<ManualClock>) -> VerificationCache {
        VerificationCache::new(VerificationCacheConfig::default(), clock)
    }

    #[test]
    fn test_fresh_window() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = cache(clock.clone());
        cache.put("u1", "A");

        assert!(cache.get("u1", "A").is_some());
        assert!(cache.get("u1", "B").is_none());
        assert!(cache.get("u2", "A").is_none());

        clock.set(1_029);
        assert!(cache.get("u1", "A").is_some());
        clock.set(1_030);
        assert!(cache.get("u1", "A").is_none());
    }

    #[test]
    fn test_degraded_window() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = cache(clock.clone());
        cache.put("u1", "A");

        clock.set(1_100);
        assert!(cache.get("u1", "A").is_none());
        assert_eq!(cache.get_degraded("u1", "A").unwrap().validated_at, 1_000);

        clock.set(1_150);
        assert!(cache.get_degraded("u1", "A").is_none());
    }

    #[test]
    fn test_clock_backwards_is_unusable() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = cache(clock.clone());
        cache.put("u1", "A");

        clock.set(999);
        assert!(cache.get("u1", "A").is_none());
        assert!(cache.get_degraded("u1", "A").is_none());
    }

    #[test]
    fn test_put_refreshes() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = cache(clock.clone());
        cache.put("u1", "A");
        clock.set(1_040);
        cache.put("u1", "A");
        assert_eq!(cache.get("u1", "A").unwrap().validated_at, 1_040);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_and_purge() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = cache(clock.clone());
        cache.put("u1", "A");
        cache.put_at("u2", "A", 800);

        assert!(cache.invalidate("u1", "A"));
        assert!(!cache.invalidate("u1", "A"));

        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }
}
