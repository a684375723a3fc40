//! Query deadline and step budget.
//!
//! Cooperative cancellation: every traversal loop calls [`Deadline::tick`]
//! once per iteration. Exceeding the wall-clock deadline or the step budget
//! returns `Timeout` / `StepLimit`; the caller abandons its branch without
//! leaving caches half-updated (cache rebuilds are single-writer and
//! replaceable).

use crate::error::EngineError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Shared deadline + step-budget token for one query.
///
/// Cheap to clone conceptually but deliberately not `Clone`: one token per
/// query, passed by reference into every traversal.
#[derive(Debug)]
pub struct Deadline {
    started: Instant,
    wall: Option<Duration>,
    max_steps: Option<u64>,
    steps: AtomicU64,
    cancelled: AtomicBool,
}

impl Deadline {
    /// Create a token with the given wall-clock and step limits.
    /// `None` disables the respective limit.
    pub fn new(wall: Option<Duration>, max_steps: Option<u64>) -> Self {
        Deadline {
            started: Instant::now(),
            wall,
            max_steps,
            steps: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    /// A token that never fires.
    pub fn unlimited() -> Self {
        Deadline::new(None, None)
    }

    /// Record one unit of work and check all limits.
    pub fn tick(&self) -> Result<(), EngineError> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(EngineError::Timeout);
        }
        let steps = self.steps.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(max) = self.max_steps {
            if steps > max {
                return Err(EngineError::StepLimit);
            }
        }
        if let Some(wall) = self.wall {
            if self.started.elapsed() > wall {
                self.cancelled.store(true, Ordering::Relaxed);
                return Err(EngineError::Timeout);
            }
        }
        Ok(())
    }

    /// Check limits without consuming a step.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(EngineError::Timeout);
        }
        if let Some(wall) = self.wall {
            if self.started.elapsed() > wall {
                self.cancelled.store(true, Ordering::Relaxed);
                return Err(EngineError::Timeout);
            }
        }
        Ok(())
    }

    /// Cancel explicitly; subsequent ticks fail with `Timeout`.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Steps consumed so far.
    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    /// Time elapsed since the token was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
