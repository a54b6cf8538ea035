use crate::error::{OlapError, OlapResult};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct ExecutionState {
    cancelled: bool,
    deadline: Option<Instant>,
    /// Set once the first poller has reported the stop.
    reported: bool,
}

/// Shared state of one running query: cancellation flag and optional deadline.
///
/// Long loops poll it through [`CancellationChecker`]; another thread stops the query with
/// [`Execution::cancel`].
#[derive(Debug, Default)]
pub struct Execution {
    state: Mutex<ExecutionState>,
}

impl Execution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(ExecutionState {
                deadline: Some(Instant::now() + timeout),
                ..ExecutionState::default()
            }),
        }
    }

    pub fn cancel(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancelled
    }

    /// Fail with `Cancelled` or `Timeout` if the query should stop.
    pub fn check_cancel_or_timeout(&self) -> OlapResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let err = if state.cancelled {
            OlapError::Cancelled
        } else if state.deadline.is_some_and(|d| Instant::now() >= d) {
            OlapError::Timeout
        } else {
            return Ok(());
        };
        if !state.reported {
            state.reported = true;
            log::debug!("stopping query: {err}");
        }
        Err(err)
    }
}

/// Periodic cancellation polling for long iterations.
pub struct CancellationChecker;

impl CancellationChecker {
    /// Poll `execution` when `iteration` is a multiple of `interval`.
    ///
    /// No-op when there is no execution or `interval` is 0. Iteration 0 always polls.
    pub fn check(
        iteration: usize,
        execution: Option<&Execution>,
        interval: usize,
    ) -> OlapResult<()> {
        match execution {
            Some(execution) if interval > 0 && iteration % interval == 0 => {
                execution.check_cancel_or_timeout()
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polls_only_on_interval_boundaries() {
        let execution = Execution::new();
        execution.cancel();
        assert!(CancellationChecker::check(3, Some(&execution), 2).is_ok());
        assert!(matches!(
            CancellationChecker::check(4, Some(&execution), 2),
            Err(OlapError::Cancelled)
        ));
    }

    #[test]
    fn zero_interval_and_missing_execution_never_fail() {
        let execution = Execution::new();
        execution.cancel();
        assert!(CancellationChecker::check(0, Some(&execution), 0).is_ok());
        assert!(CancellationChecker::check(0, None, 1).is_ok());
    }

    #[test]
    fn expired_deadline_times_out() {
        let execution = Execution::with_timeout(Duration::ZERO);
        assert!(matches!(
            execution.check_cancel_or_timeout(),
            Err(OlapError::Timeout)
        ));
        assert!(!execution.is_cancelled());
    }
}
