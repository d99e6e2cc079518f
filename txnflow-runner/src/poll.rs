//! Fixed-interval polling with a deadline.
//!
//! Used wherever the pipeline waits on something outside its control: the
//! upstream API finishing its initial data pull, and a copied blob becoming
//! readable at its destination. Waits are plain blocking sleeps.

use std::time::{Duration, Instant};

/// Interval and overall deadline for a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSchedule {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// How a poll loop ended (errors from the check are returned separately).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut { attempts: u32, waited: Duration },
}

/// Call `check` until it yields `Some`, an error, or the deadline passes.
///
/// The check always runs at least once, so a zero timeout means "check once".
pub fn poll_until<T, E>(
    schedule: PollSchedule,
    mut check: impl FnMut() -> Result<Option<T>, E>,
) -> Result<PollOutcome<T>, E> {
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let Some(value) = check()? {
            return Ok(PollOutcome::Ready(value));
        }

        let waited = started.elapsed();
        if waited >= schedule.timeout {
            return Ok(PollOutcome::TimedOut { attempts, waited });
        }
        std::thread::sleep(schedule.interval.min(schedule.timeout - waited));
    }
}
