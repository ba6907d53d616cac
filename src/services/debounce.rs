use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::LineId;

/// Time source injected into the engine so cooldowns can be simulated in tests.
pub trait Clock: Send + Sync + Debug {
    /// Monotonic time elapsed since the clock's origin.
    fn monotonic(&self) -> Duration;

    /// Wall-clock time used for document and line timestamps.
    fn now_utc(&self) -> DateTime<Utc>;
}

#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    start: DateTime<Utc>,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
        *elapsed += by;
    }

    fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn monotonic(&self) -> Duration {
        self.elapsed()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.start + elapsed
    }
}

/// Completion cooldown: once a scan drives a line to `completed`/`over`, further scans of the
/// same line inside `window` are scanner bounce and get coalesced.
#[derive(Debug, Clone)]
pub struct CompletionDebouncer {
    window: Duration,
    completed_at: HashMap<LineId, Duration>,
}

impl CompletionDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            completed_at: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_cooling_down(&self, line_id: &LineId, now: Duration) -> bool {
        self.completed_at
            .get(line_id)
            .map(|at| now.saturating_sub(*at) < self.window)
            .unwrap_or(false)
    }

    pub fn record_completion(&mut self, line_id: LineId, now: Duration) {
        self.completed_at.insert(line_id, now);
    }

    /// Forgets a line, e.g. after a manual correction pulled it back under plan.
    pub fn reset(&mut self, line_id: &LineId) {
        self.completed_at.remove(line_id);
    }
}
