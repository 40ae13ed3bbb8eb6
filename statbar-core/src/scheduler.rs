// statbar-core/src/scheduler.rs
//! The wake/refresh/redraw loop.
//!
//! Each iteration:
//! 1. applies a pending reload request,
//! 2. gathers descriptors of active event-driven sources,
//! 3. blocks until one is ready or the nearest timer deadline passes,
//! 4. services ready descriptors, finished background work and due timers,
//! 5. redraws the status line if any fragment changed,
//! 6. stops once shutdown was requested.

use crossbeam::channel::Receiver;
use std::io;
use std::time::{Duration, Instant};

use crate::background::{Completion, Completions, completion_channel};
use crate::config::{Config, ConfigError, ConfigLoader};
use crate::render::{Composer, DisplaySurface};
use crate::signal::{SignalBridge, SignalHandle};
use crate::source::{Reconfigure, SlotState, Source, SourceContext, SourceId, SourceSlot};
use crate::timer::{Timer, TimerSet};
use crate::wait::{Clock, MonotonicClock, PollWaiter, Readiness, WaitOutcome, Waiter};

/// Delay before refreshing again when a reload-enabled source found its
/// previous background work still running
pub const RESTART_RETRY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("display unavailable: {0}")]
    Display(#[source] io::Error),
    #[error("waiting for events failed: {0}")]
    Wait(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    /// Shutdown requested, current iteration finished
    Draining,
    Stopped,
}

pub struct Scheduler<W: Waiter = PollWaiter, C: Clock = MonotonicClock> {
    slots: Vec<SourceSlot>,
    timers: TimerSet,
    config: Config,
    loader: ConfigLoader,
    signals: SignalBridge,
    display: Box<dyn DisplaySurface>,
    composer: Composer,
    waiter: W,
    clock: C,
    completions: Completions,
    completed: Receiver<Completion>,
    dirty: bool,
    state: LoopState,
}

impl Scheduler<PollWaiter, MonotonicClock> {
    pub fn new(
        config: Config,
        loader: ConfigLoader,
        signals: SignalBridge,
        display: Box<dyn DisplaySurface>,
    ) -> Self {
        Self::with_parts(
            config,
            loader,
            signals,
            display,
            PollWaiter::new(),
            MonotonicClock,
        )
    }
}

impl<W: Waiter, C: Clock> Scheduler<W, C> {
    pub fn with_parts(
        config: Config,
        loader: ConfigLoader,
        signals: SignalBridge,
        display: Box<dyn DisplaySurface>,
        waiter: W,
        clock: C,
    ) -> Self {
        let (completions, completed) = completion_channel();
        Self {
            slots: Vec::new(),
            timers: TimerSet::new(),
            config,
            loader,
            signals,
            display,
            composer: Composer::default(),
            waiter,
            clock,
            completions,
            completed,
            dirty: false,
            state: LoopState::Running,
        }
    }

    pub fn with_composer(mut self, composer: Composer) -> Self {
        self.composer = composer;
        self
    }

    /// Register a source. Sources appear on the status line in the order
    /// they are added.
    pub fn add_source(&mut self, source: Box<dyn Source>) -> SourceId {
        let id = SourceId(self.slots.len());
        self.slots.push(SourceSlot::new(id, source));
        id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn signal_handle(&self) -> SignalHandle {
        self.signals.handle()
    }

    pub fn fragment(&self, id: SourceId) -> Option<&str> {
        self.slots.get(id.0).map(SourceSlot::fragment)
    }

    pub fn slot_state(&self, id: SourceId) -> Option<SlotState> {
        self.slots.get(id.0).map(SourceSlot::state)
    }

    pub fn timer_of(&self, id: SourceId) -> Option<&Timer> {
        let timer = self.slots.get(id.0)?.timer()?;
        Some(self.timers.get(timer))
    }

    /// Initialize every source, create timers for the ones that have a
    /// period, and draw the first status line. Failing to draw here is fatal.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        let now = self.clock.now();

        for slot in &mut self.slots {
            let ctx = SourceContext {
                id: slot.id(),
                completions: self.completions.clone(),
            };
            slot.mount(&ctx);

            if let Some(period) = slot.period(&self.config) {
                let timer = self.timers.add(slot.name(), period, now);
                slot.set_timer(timer);
                if !slot.is_active() {
                    self.timers.disarm(timer);
                }
            }
        }

        self.state = LoopState::Running;
        self.dirty = true;
        self.render().map_err(SchedulerError::Display)
    }

    /// Run iterations until shutdown is requested, then release the sources
    pub fn run(&mut self) -> Result<(), SchedulerError> {
        tracing::info!(sources = self.slots.len(), "entering main loop");
        let result = loop {
            match self.run_once() {
                Ok(LoopState::Running) => continue,
                Ok(_) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.shutdown();
        result
    }

    /// One pass of the loop
    pub fn run_once(&mut self) -> Result<LoopState, SchedulerError> {
        if self.signals.take_reload()
            && let Err(e) = self.reload()
        {
            tracing::warn!(error = %e, "config reload failed, keeping previous configuration");
        }

        let now = self.clock.now();
        let timeout = self.timers.timeout(now);

        // owners[i] is the slot index for descriptor i, None for the wakeup pipe
        let (outcome, owners) = {
            let mut fds = Vec::new();
            let mut owners = Vec::new();
            if let Some(fd) = self.signals.wake_fd() {
                fds.push(fd);
                owners.push(None);
            }
            for (idx, slot) in self.slots.iter().enumerate() {
                for fd in slot.descriptors() {
                    fds.push(fd);
                    owners.push(Some(idx));
                }
            }

            tracing::trace!(descriptors = fds.len(), ?timeout, "waiting");
            let outcome = self
                .waiter
                .wait(&fds, timeout)
                .map_err(SchedulerError::Wait)?;
            (outcome, owners)
        };

        match outcome {
            WaitOutcome::Ready(ready) => self.service_ready(&owners, ready),
            WaitOutcome::TimedOut => {}
            WaitOutcome::Interrupted => tracing::debug!("wait interrupted by signal"),
        }

        self.collect_completions();

        let now = self.clock.now();
        self.fire_due_timers(now);

        if self.dirty
            && let Err(e) = self.render()
        {
            tracing::warn!(error = %e, "failed to update display");
        }

        if self.signals.shutdown_requested() && self.state == LoopState::Running {
            tracing::info!("shutdown requested");
            self.state = LoopState::Draining;
        }

        Ok(self.state)
    }

    fn service_ready(&mut self, owners: &[Option<usize>], ready: Vec<(usize, Readiness)>) {
        // A source may own several descriptors; service it once
        let mut per_slot: Vec<(usize, Readiness)> = Vec::new();
        for (fd_idx, readiness) in ready {
            match owners.get(fd_idx).copied().flatten() {
                Some(slot_idx) => match per_slot.iter_mut().find(|(idx, _)| *idx == slot_idx) {
                    Some((_, merged)) => *merged = merged.merge(readiness),
                    None => per_slot.push((slot_idx, readiness)),
                },
                None => self.signals.drain_wakeups(),
            }
        }

        for (slot_idx, readiness) in per_slot {
            if self.slots[slot_idx].service(readiness) {
                self.dirty = true;
            }
        }
    }

    fn collect_completions(&mut self) {
        for completion in self.completed.try_iter() {
            if let Some(slot) = self.slots.get_mut(completion.source.0) {
                tracing::debug!(source = slot.name(), "background refresh finished");
                slot.complete(completion.text);
                self.dirty = true;
            }
        }
    }

    fn fire_due_timers(&mut self, now: Instant) {
        for timer in self.timers.due(now) {
            if let Some(slot) = self.slots.iter_mut().find(|s| s.timer() == Some(timer)) {
                if slot.refresh() {
                    self.dirty = true;
                }
                if !slot.is_active() {
                    self.timers.disarm(timer);
                    continue;
                }
                if slot.restart_pending() {
                    self.timers.arm_at(timer, now + RESTART_RETRY);
                    continue;
                }
            }
            self.timers.advance_past(timer, now);
        }
    }

    fn render(&mut self) -> io::Result<()> {
        let line = self
            .composer
            .compose(self.slots.iter().map(SourceSlot::fragment));
        self.display.push(&line)?;
        tracing::debug!(len = line.len(), "status line updated");
        self.dirty = false;
        Ok(())
    }

    /// Load the config file and apply it. On error nothing changes.
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        let config = self.loader.load()?;
        let now = self.clock.now();

        for slot in &mut self.slots {
            let change = slot.reconfigure(&config);
            let Some(timer) = slot.timer() else {
                continue;
            };
            if let Some(period) = slot.period(&config) {
                self.timers.set_period(timer, period);
            }
            match change {
                Reconfigure::Enable => self.timers.arm_at(timer, now),
                Reconfigure::Disable => self.timers.disarm(timer),
                Reconfigure::Unchanged => {}
            }
        }

        self.config = config;
        tracing::info!(path = %self.loader.path().display(), "configuration reloaded");
        Ok(())
    }

    /// Close every source. Background work gets a short grace period inside
    /// each source's `close`.
    pub fn shutdown(&mut self) {
        if self.state == LoopState::Stopped {
            return;
        }
        for slot in &mut self.slots {
            slot.unmount();
        }
        self.state = LoopState::Stopped;
        tracing::info!("stopped");
    }
}
