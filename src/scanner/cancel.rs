//! Cooperative cancellation and deadline for one scan attempt

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Why a polling loop stopped without a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    TimedOut,
}

/// Passed by value into the worker; the HTTP side keeps a clone of `token`.
///
/// Client disconnect and explicit cancellation both cancel the token; the
/// wall-clock budget is the deadline. Cancellation wins over the deadline so
/// a client that walked away is never reported as a timeout.
#[derive(Debug, Clone)]
pub struct ScanContext {
    token: CancellationToken,
    deadline: Instant,
}

impl ScanContext {
    pub fn new(token: CancellationToken, timeout: Duration) -> Self {
        Self {
            token,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.is_cancelled() {
            Some(StopReason::Cancelled)
        } else if self.remaining().is_zero() {
            Some(StopReason::TimedOut)
        } else {
            None
        }
    }

    /// Sleep up to `interval`, waking early on cancellation
    pub fn pause(&self, interval: Duration) {
        const SLICE: Duration = Duration::from_millis(20);

        let until = Instant::now() + interval.min(self.remaining());
        while !self.is_cancelled() {
            let left = until.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            std::thread::sleep(left.min(SLICE));
        }
    }
}
