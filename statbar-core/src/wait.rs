// statbar-core/src/wait.rs
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::io;
use std::os::fd::BorrowedFd;
use std::time::{Duration, Instant};

/// Readiness bits reported for one descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub hangup: bool,
    /// Error condition or a descriptor the kernel no longer recognises
    pub error: bool,
}

impl Readiness {
    pub fn is_empty(&self) -> bool {
        !(self.readable || self.hangup || self.error)
    }

    pub fn merge(self, other: Readiness) -> Readiness {
        Readiness {
            readable: self.readable || other.readable,
            hangup: self.hangup || other.hangup,
            error: self.error || other.error,
        }
    }
}

/// Result of one bounded wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Indices into the descriptor slice that reported activity
    Ready(Vec<(usize, Readiness)>),
    TimedOut,
    /// A signal arrived while blocked
    Interrupted,
}

/// Blocks on descriptor readiness for at most `timeout` (`None` = no bound)
pub trait Waiter {
    fn wait(
        &mut self,
        descriptors: &[BorrowedFd<'_>],
        timeout: Option<Duration>,
    ) -> io::Result<WaitOutcome>;
}

/// Source of monotonic time
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// `poll(2)` backed waiter
#[derive(Debug, Default)]
pub struct PollWaiter;

impl PollWaiter {
    pub fn new() -> Self {
        Self
    }
}

/// Convert to whole milliseconds, rounding up so a sub-millisecond remainder
/// does not turn into a zero-timeout spin.
fn poll_timeout(timeout: Option<Duration>) -> PollTimeout {
    let Some(timeout) = timeout else {
        return PollTimeout::NONE;
    };
    let millis = timeout.as_micros().div_ceil(1000);
    let millis = i32::try_from(millis).unwrap_or(i32::MAX);
    PollTimeout::try_from(millis).unwrap_or(PollTimeout::MAX)
}

impl Waiter for PollWaiter {
    fn wait(
        &mut self,
        descriptors: &[BorrowedFd<'_>],
        timeout: Option<Duration>,
    ) -> io::Result<WaitOutcome> {
        let mut poll_fds: Vec<PollFd<'_>> = descriptors
            .iter()
            .map(|fd| PollFd::new(*fd, PollFlags::POLLIN))
            .collect();

        match poll(&mut poll_fds, poll_timeout(timeout)) {
            Ok(0) => Ok(WaitOutcome::TimedOut),
            Ok(_) => {
                let ready = poll_fds
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, pfd)| {
                        let revents = pfd.revents()?;
                        let readiness = Readiness {
                            readable: revents.contains(PollFlags::POLLIN),
                            hangup: revents.contains(PollFlags::POLLHUP),
                            error: revents.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL),
                        };
                        (!readiness.is_empty()).then_some((idx, readiness))
                    })
                    .collect();
                Ok(WaitOutcome::Ready(ready))
            }
            Err(Errno::EINTR) => Ok(WaitOutcome::Interrupted),
            Err(e) => Err(io::Error::from(e)),
        }
    }
}
