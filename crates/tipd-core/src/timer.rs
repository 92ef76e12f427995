use std::time::{Duration, Instant};

/// A restartable one-shot delay.
///
/// Holds at most one pending deadline. Starting replaces whatever was
/// pending, so starting twice before the deadline still fires once.
#[derive(Debug, Clone)]
pub struct DelayTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl DelayTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm (or re-arm) the timer to fire `delay` after `now`.
    pub fn start(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true exactly once when the pending deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
