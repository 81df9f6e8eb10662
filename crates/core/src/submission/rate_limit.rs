//! Fixed-window submission limiter keyed by submitter identity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_WINDOW_SECS: u64 = 300;
/// Attempts between sweeps of expired windows.
pub const SWEEP_INTERVAL: u32 = 256;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Test clock that only moves when told to.
#[derive(Clone, Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { origin: Instant::now(), offset: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = match self.offset.lock() {
            Ok(offset) => offset,
            Err(poisoned) => poisoned.into_inner(),
        };
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = match self.offset.lock() {
            Ok(offset) => *offset,
            Err(poisoned) => *poisoned.into_inner(),
        };
        self.origin + offset
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct RateWindow {
    count: u32,
    resets_at: Instant,
}

#[derive(Debug, Default)]
struct WindowTable {
    entries: HashMap<String, RateWindow>,
    attempts_since_sweep: u32,
}

impl WindowTable {
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, window| now < window.resets_at);
        self.attempts_since_sweep = 0;
        before - self.entries.len()
    }
}

/// Windows are created on the first attempt for a key. The first attempt
/// after `resets_at` starts a new window, and every [`SWEEP_INTERVAL`]
/// attempts the expired windows of all keys are dropped.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    windows: Mutex<WindowTable>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock, windows: Mutex::new(WindowTable::default()) }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Records an attempt for `key` and reports whether it may proceed.
    pub fn is_allowed(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut windows = self.lock_windows();

        windows.attempts_since_sweep += 1;
        if windows.attempts_since_sweep >= SWEEP_INTERVAL {
            windows.sweep(now);
        }

        match windows.entries.get_mut(key) {
            Some(window) if now < window.resets_at => {
                if window.count < self.config.max_attempts {
                    window.count += 1;
                    true
                } else {
                    false
                }
            }
            _ => {
                windows.entries.insert(
                    key.to_string(),
                    RateWindow { count: 1, resets_at: now + self.config.window },
                );
                self.config.max_attempts > 0
            }
        }
    }

    /// Time until `key` may submit again; zero when it is not blocked.
    pub fn remaining_cooldown(&self, key: &str) -> Duration {
        let now = self.clock.now();
        let windows = self.lock_windows();
        match windows.entries.get(key) {
            Some(window) if window.count >= self.config.max_attempts && now < window.resets_at => {
                window.resets_at - now
            }
            _ => Duration::ZERO,
        }
    }

    /// Drops expired windows now instead of waiting for the next sweep.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.lock_windows().sweep(now)
    }

    /// Number of keys with a window, expired or not.
    pub fn tracked_keys(&self) -> usize {
        self.lock_windows().entries.len()
    }

    fn lock_windows(&self) -> std::sync::MutexGuard<'_, WindowTable> {
        match self.windows.lock() {
            Ok(windows) => windows,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
