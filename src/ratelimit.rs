//! Daily quota + pacing gate for the trending provider.
//!
//! Both gates are evaluated and consumed inside one mutex-guarded critical
//! section, so two concurrent callers can never both see quota available.
//! The daily counter resets lazily: the first access on a new UTC date zeroes it.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::error::RateLimitError;

/// Default requests per calendar day.
pub const DEFAULT_DAILY_LIMIT: u32 = 100;
/// Minimum gap between two consumed calls (fixed).
pub const PACING_INTERVAL_MS: i64 = 1000;

#[derive(Debug, Clone)]
struct RateLimitState {
    daily_count: u32,
    last_reset_day: NaiveDate,
    last_call_at: Option<DateTime<Utc>>,
}

impl RateLimitState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            daily_count: 0,
            last_reset_day: now.date_naive(),
            last_call_at: None,
        }
    }

    fn roll_over(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        // A stale `now` from before the last reset never rewinds the day.
        if today > self.last_reset_day {
            self.daily_count = 0;
            self.last_reset_day = today;
        }
    }
}

/// Snapshot of the daily quota, after applying any pending rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub daily_limit: u32,
    pub used: u32,
    pub remaining: u32,
    pub day: NaiveDate,
}

#[derive(Debug)]
pub struct RateLimiter {
    daily_limit: u32,
    min_interval: Duration,
    state: Mutex<RateLimitState>,
}

impl RateLimiter {
    pub fn new(daily_limit: u32) -> Self {
        Self::new_at(daily_limit, Utc::now())
    }

    /// Construct with an explicit "process start" instant (tests).
    pub fn new_at(daily_limit: u32, now: DateTime<Utc>) -> Self {
        Self {
            daily_limit,
            min_interval: Duration::milliseconds(PACING_INTERVAL_MS),
            state: Mutex::new(RateLimitState::new(now)),
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Check both gates and consume one unit of quota.
    ///
    /// # Errors
    ///
    /// [`RateLimitError::DailyQuotaExceeded`] once `daily_limit` calls were
    /// consumed today, else [`RateLimitError::TooFrequent`] within the pacing
    /// interval of the previous consumed call.
    pub fn check_and_consume(&self) -> Result<(), RateLimitError> {
        self.check_and_consume_at(Utc::now())
    }

    /// Same as [`Self::check_and_consume`] at an explicit instant.
    ///
    /// # Errors
    ///
    /// See [`Self::check_and_consume`].
    pub fn check_and_consume_at(&self, now: DateTime<Utc>) -> Result<(), RateLimitError> {
        let mut st = self.lock();
        st.roll_over(now);

        if st.daily_count >= self.daily_limit {
            return Err(RateLimitError::DailyQuotaExceeded {
                limit: self.daily_limit,
            });
        }
        if let Some(last) = st.last_call_at {
            if now - last < self.min_interval {
                return Err(RateLimitError::TooFrequent {
                    min_interval_ms: PACING_INTERVAL_MS as u64,
                });
            }
        }

        st.daily_count += 1;
        st.last_call_at = Some(now);
        Ok(())
    }

    pub fn status(&self) -> QuotaStatus {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> QuotaStatus {
        let mut st = self.lock();
        st.roll_over(now);
        QuotaStatus {
            daily_limit: self.daily_limit,
            used: st.daily_count,
            remaining: self.daily_limit.saturating_sub(st.daily_count),
            day: st.last_reset_day,
        }
    }

    /// Read-only view at `now`: reports a pending rollover without applying it.
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> QuotaStatus {
        let st = self.lock();
        let (used, day) = if now.date_naive() > st.last_reset_day {
            (0, now.date_naive())
        } else {
            (st.daily_count, st.last_reset_day)
        };
        QuotaStatus {
            daily_limit: self.daily_limit,
            used,
            remaining: self.daily_limit.saturating_sub(used),
            day,
        }
    }

    // Every critical section leaves the state consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, RateLimitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_DAILY_LIMIT)
    }
}
