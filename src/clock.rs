//! Monotonic millisecond clock used to stamp document timestamps.

use std::{
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use crate::types::Millis;

/// Wall clock that never repeats or goes backward.
///
/// Each [`Clock::tick`] returns a value strictly greater than every previous
/// tick from the same clock, even when several writes land in the same
/// millisecond or the system clock steps back.
#[derive(Debug, Default)]
pub struct Clock {
    last: AtomicU64,
}

impl Clock {
    /// Creates a clock with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next timestamp.
    pub fn tick(&self) -> Millis {
        let now = now_ms();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Process-wide clock shared by every store that is not given its own.
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<Clock>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(Clock::new())))
    }

    /// Last value handed out, or zero.
    pub fn last(&self) -> Millis {
        self.last.load(Ordering::Acquire)
    }
}

pub(crate) fn now_ms() -> Millis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
