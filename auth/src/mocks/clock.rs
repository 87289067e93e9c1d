//! A settable, advanceable clock for deterministic expiry tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use cognito_auth_core::environment::Clock;

/// A clock frozen at a settable instant.
///
/// Clones share the same instant, so a test can hold one handle while the
/// machine holds another.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    /// Create a clock frozen at the given epoch second.
    #[must_use]
    pub fn at_epoch(epoch_seconds: i64) -> Self {
        Self {
            now: Arc::new(Mutex::new(
                DateTime::from_timestamp(epoch_seconds, 0).unwrap_or_default(),
            )),
        }
    }

    /// Move the clock forward.
    pub fn advance_secs(&self, seconds: i64) {
        let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *now += Duration::seconds(seconds);
    }

    /// Jump the clock to a specific epoch second.
    pub fn set_epoch(&self, epoch_seconds: i64) {
        let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *now = DateTime::from_timestamp(epoch_seconds, 0).unwrap_or_default();
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
