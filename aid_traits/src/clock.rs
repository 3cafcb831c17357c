use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const MS_PER_MIN: f64 = 60_000.0;

/// Wall clock abstraction for the control loop.
///
/// - now_ms(): milliseconds since the Unix epoch (pump and CGM timestamps use the same base)
/// - sleep(): sleeps for the provided duration (implementations may simulate)
/// - minutes_since(): elapsed minutes from an earlier timestamp, negative if it lies in the future
pub trait Clock {
    fn now_ms(&self) -> i64;
    fn sleep(&self, d: Duration);

    fn minutes_since(&self, earlier_ms: i64) -> f64 {
        (self.now_ms().saturating_sub(earlier_ms)) as f64 / MS_PER_MIN
    }
}

/// Real-time clock backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

/// Deterministic clock whose time is advanced manually.
///
/// sleep(d) advances internal time by d without actually sleeping. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<Mutex<i64>>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(Mutex::new(start_ms)),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, d: Duration) {
        let step = i64::try_from(d.as_millis()).unwrap_or(i64::MAX);
        if let Ok(mut now) = self.now_ms.lock() {
            *now = now.saturating_add(step);
        }
    }

    /// Advance by whole minutes (the loop's natural unit).
    pub fn advance_min(&self, minutes: u32) {
        self.advance(Duration::from_secs(u64::from(minutes) * 60));
    }

    /// Set the absolute time.
    pub fn set_ms(&self, ms: i64) {
        if let Ok(mut now) = self.now_ms.lock() {
            *now = ms;
        }
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.lock().map(|g| *g).unwrap_or(0)
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}
