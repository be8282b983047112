use std::time::{Duration, Instant};

use crate::error::ConnectionError;

/// Per-call deadline for [`Transport`](crate::Transport) operations.
///
/// The remaining time is applied to the socket for the duration of the call,
/// so an expired deadline interrupts a read or write that is already blocked.
/// Waiting for the path lock is not bounded; the deadline is re-checked once
/// the lock is held.
#[derive(Debug, Clone, Copy, Default)]
pub struct Context {
    deadline: Option<Instant>,
}

impl Context {
    /// No deadline: block for as long as the connection does.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Time left for I/O, or an error if the deadline already passed.
    pub(crate) fn remaining(&self) -> Result<Option<Duration>, ConnectionError> {
        match self.deadline {
            None => Ok(None),
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    Err(ConnectionError::deadline_exceeded())
                } else {
                    Ok(Some(left))
                }
            }
        }
    }
}
