//! Blocking poll-until-true helper.

use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::errors::{HarnessError, Result};

/// Evaluate `predicate` every `interval` until it returns true.
///
/// At least one of `attempts` and `timeout` must be given; when both are, the
/// first bound reached fails the poll.
pub fn poll_for_condition<F>(
    mut predicate: F,
    interval: Duration,
    attempts: Option<usize>,
    timeout: Option<Duration>,
) -> Result<()>
where
    F: FnMut() -> bool,
{
    if attempts.is_none() && timeout.is_none() {
        return Err(HarnessError::PollUnbounded);
    }

    let start = Instant::now();
    let mut attempt = 0;
    loop {
        attempt += 1;
        if predicate() {
            trace!(attempt, "poll condition met");
            return Ok(());
        }
        if attempts.is_some_and(|max| attempt >= max) {
            return Err(HarnessError::PollAttemptsExhausted { attempts: attempt });
        }
        let elapsed = start.elapsed();
        let mut sleep_for = interval;
        if let Some(timeout) = timeout {
            if elapsed >= timeout {
                return Err(HarnessError::PollTimeout {
                    timeout: timeout.as_secs_f64(),
                    elapsed: elapsed.as_secs_f64(),
                    attempts: attempt,
                });
            }
            sleep_for = sleep_for.min(timeout - elapsed);
        }
        thread::sleep(sleep_for);
    }
}
