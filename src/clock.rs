//! Injectable date source.

use chrono::{DateTime, Utc};

/// Source of the current time, injected so freshness decisions are testable.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Default clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}
