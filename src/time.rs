//! Wall-clock abstraction.
//!
//! Staleness checks and `-1` timestamps depend on "now". Routing every read
//! through `Clock` lets tests pin time instead of racing the system clock.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;

    /// Current time as Unix seconds.
    fn now_unix(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Clock backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that returns a fixed, manually advanced instant.
///
/// # Examples
///
/// ```
/// use kyro_filter::time::{Clock, FixedClock};
///
/// let clock = FixedClock::at_unix(1_000);
/// assert_eq!(clock.now_unix(), 1_000);
/// clock.advance_secs(60);
/// assert_eq!(clock.now_unix(), 1_060);
/// ```
#[derive(Debug)]
pub struct FixedClock {
    unix_secs: AtomicI64,
}

impl FixedClock {
    /// Creates a clock pinned at the given Unix second.
    #[must_use]
    pub const fn at_unix(unix_secs: i64) -> Self {
        Self {
            unix_secs: AtomicI64::new(unix_secs),
        }
    }

    /// Moves the clock forward (or backward, for negative values).
    pub fn advance_secs(&self, secs: i64) {
        self.unix_secs.fetch_add(secs, Ordering::Relaxed);
    }

    /// Pins the clock at a new Unix second.
    pub fn set_unix(&self, unix_secs: i64) {
        self.unix_secs.store(unix_secs, Ordering::Relaxed);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        let secs = self.unix_secs.load(Ordering::Relaxed);
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }

    fn now_unix(&self) -> i64 {
        self.unix_secs.load(Ordering::Relaxed)
    }
}
