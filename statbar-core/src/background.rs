// statbar-core/src/background.rs
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded, unbounded};
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::source::{Refresh, SourceId};

/// Text produced by finished background work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub source: SourceId,
    pub text: String,
}

/// Sending half of the completion hand-off. The scheduler drains the
/// receiving half once per iteration.
#[derive(Clone)]
pub struct Completions {
    tx: Sender<Completion>,
}

impl Completions {
    pub fn send(&self, source: SourceId, text: String) {
        // Ignore send errors (scheduler already gone)
        let _ = self.tx.send(Completion { source, text });
    }
}

pub fn completion_channel() -> (Completions, Receiver<Completion>) {
    let (tx, rx) = unbounded();
    (Completions { tx }, rx)
}

/// Bounded retry with a fixed pause between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Slow operation run off the scheduler thread
pub trait Fetch: Send + Sync + 'static {
    type Error: Display;

    fn fetch(&self, query: &str) -> Result<String, Self::Error>;
}

/// Clears the in-flight flag when the worker exits, panics included
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs at most one fetch at a time on a worker thread.
///
/// A trigger that arrives while a fetch is outstanding is dropped. The
/// worker hands its result to the scheduler through [`Completions`] and
/// never touches scheduler state directly.
pub struct BackgroundJob<F: Fetch> {
    name: &'static str,
    fetcher: Arc<F>,
    policy: RetryPolicy,
    in_flight: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    stop_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl<F: Fetch> BackgroundJob<F> {
    pub fn new(name: &'static str, fetcher: F, policy: RetryPolicy) -> Self {
        let (stop_tx, stop_rx) = bounded(1);
        Self {
            name,
            fetcher: Arc::new(fetcher),
            policy,
            in_flight: Arc::new(AtomicBool::new(false)),
            stop_tx: Some(stop_tx),
            stop_rx,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Start a fetch for `query` unless one is already running
    pub fn trigger(
        &mut self,
        source: SourceId,
        query: String,
        completions: &Completions,
    ) -> std::io::Result<Refresh> {
        if self.stop_tx.is_none() {
            return Ok(Refresh::Busy);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(Refresh::Busy);
        }

        let guard = InFlight(Arc::clone(&self.in_flight));
        let worker = Worker {
            name: self.name,
            fetcher: Arc::clone(&self.fetcher),
            policy: self.policy,
            stop: self.stop_rx.clone(),
            completions: completions.clone(),
            source,
        };

        tracing::debug!(source = self.name, "starting background fetch");
        let spawned = std::thread::Builder::new()
            .name(format!("statbar-{}", self.name))
            .spawn(move || {
                let _guard = guard;
                worker.run(&query);
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(Refresh::Pending)
            }
            Err(e) => {
                // The guard moved into the closure and was dropped with it
                self.in_flight.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Ask the worker to stop and wait up to `grace` for it. Returns whether
    /// the worker finished; otherwise it is abandoned and its late result, if
    /// any, goes nowhere.
    pub fn shutdown(&mut self, grace: Duration) -> bool {
        // Dropping the sender disconnects every worker's stop receiver
        self.stop_tx.take();

        let Some(handle) = self.handle.take() else {
            return true;
        };

        let deadline = Instant::now() + grace;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!(source = self.name, "abandoning background fetch");
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        let _ = handle.join();
        true
    }
}

impl<F: Fetch> Drop for BackgroundJob<F> {
    fn drop(&mut self) {
        self.stop_tx.take();
    }
}

struct Worker<F: Fetch> {
    name: &'static str,
    fetcher: Arc<F>,
    policy: RetryPolicy,
    stop: Receiver<()>,
    completions: Completions,
    source: SourceId,
}

impl<F: Fetch> Worker<F> {
    fn stop_requested(&self) -> bool {
        !matches!(self.stop.try_recv(), Err(TryRecvError::Empty))
    }

    fn run(&self, query: &str) {
        for attempt in 1..=self.policy.attempts {
            if self.stop_requested() {
                return;
            }

            match self.fetcher.fetch(query) {
                Ok(text) => {
                    tracing::debug!(source = self.name, attempt, "background fetch done");
                    self.completions.send(self.source, text);
                    return;
                }
                Err(e) => {
                    tracing::warn!(source = self.name, attempt, error = %e, "fetch failed");
                }
            }

            if attempt < self.policy.attempts {
                match self.stop.recv_timeout(self.policy.backoff) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => return,
                }
            }
        }

        tracing::warn!(
            source = self.name,
            attempts = self.policy.attempts,
            "giving up, keeping previous text"
        );
    }
}
