//! Single-slot TTL cache for the trending feed.
//!
//! Absolute TTL, no sliding refresh. An expired entry is invisible to `get`
//! and is replaced on the next `set`.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// Default lifetime of a cached trending feed.
pub const DEFAULT_TTL_SECS: u64 = 1800;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ResultCache<T> {
    slot: Mutex<Option<CacheEntry<T>>>,
}

impl<T: Clone> ResultCache<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Option<T> {
        self.get_at(Utc::now())
    }

    /// Returns the value only while `now < expires_at`.
    pub fn get_at(&self, now: DateTime<Utc>) -> Option<T> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .filter(|e| now < e.expires_at)
            .map(|e| e.value.clone())
    }

    pub fn set(&self, value: T, ttl: std::time::Duration) {
        self.set_at(value, ttl, Utc::now());
    }

    /// Overwrite the slot; last writer wins.
    pub fn set_at(&self, value: T, ttl: std::time::Duration, now: DateTime<Utc>) {
        let ttl = Duration::from_std(ttl).unwrap_or(Duration::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(CacheEntry { value, expires_at });
    }

    /// Time left before expiry, `None` when empty or expired.
    pub fn ttl_remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .map(|e| e.expires_at - now)
            .filter(|left| *left > Duration::zero())
    }
}

impl<T: Clone> Default for ResultCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
