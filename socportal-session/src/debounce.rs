//! Debounce gate for refresh attempts

use chrono::{DateTime, Duration, Utc};

/// Default minimum time between two refresh attempts
pub const DEFAULT_COOLDOWN_SECONDS: u64 = 30;

/// Whether `cooldown_seconds` have passed since `last_check`
pub fn is_cooldown_over(last_check: Option<DateTime<Utc>>, cooldown_seconds: u64) -> bool {
    is_cooldown_over_at(last_check, cooldown_seconds, Utc::now())
}

/// Whether `cooldown_seconds` have passed since `last_check`, evaluated at `now`
///
/// Never checked means the gate is open. The boundary instant itself is still
/// inside the cooldown (`now - last_check > cooldown`).
pub fn is_cooldown_over_at(
    last_check: Option<DateTime<Utc>>,
    cooldown_seconds: u64,
    now: DateTime<Utc>,
) -> bool {
    match last_check {
        None => true,
        Some(last_check) => now - last_check > cooldown(cooldown_seconds),
    }
}

fn cooldown(seconds: u64) -> Duration {
    Duration::try_seconds(i64::try_from(seconds).unwrap_or(i64::MAX)).unwrap_or(Duration::MAX)
}

/// A cooldown window bound to one configured duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceGate {
    cooldown_seconds: u64,
}

impl Default for DebounceGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_SECONDS)
    }
}

impl DebounceGate {
    pub fn new(cooldown_seconds: u64) -> Self {
        Self { cooldown_seconds }
    }

    pub fn cooldown_seconds(&self) -> u64 {
        self.cooldown_seconds
    }

    pub fn is_open(&self, last_check: Option<DateTime<Utc>>) -> bool {
        is_cooldown_over(last_check, self.cooldown_seconds)
    }

    pub fn is_open_at(&self, last_check: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        is_cooldown_over_at(last_check, self.cooldown_seconds, now)
    }
}
