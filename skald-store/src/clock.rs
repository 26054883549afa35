//! Time source used for key expiry.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, as seen by the store.
#[derive(Debug, Clone, Default)]
pub enum Clock {
  /// Wall clock.
  #[default]
  System,
  /// Hand-driven clock shared between clones (tests and replays).
  Manual(Arc<AtomicI64>),
}

impl Clock {
  /// A manual clock starting at `start_ms`.
  pub fn manual(start_ms: i64) -> Self {
    Clock::Manual(Arc::new(AtomicI64::new(start_ms)))
  }

  pub fn now_ms(&self) -> i64 {
    match self {
      Clock::System => SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default(),
      Clock::Manual(ms) => ms.load(Ordering::SeqCst),
    }
  }

  /// Move a manual clock forward. No-op for the system clock.
  pub fn advance(&self, by: Duration) {
    if let Clock::Manual(ms) = self {
      ms.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
  }
}
