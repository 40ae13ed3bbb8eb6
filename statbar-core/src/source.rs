// statbar-core/src/source.rs
use std::os::fd::BorrowedFd;
use std::time::Duration;

use crate::background::Completions;
use crate::config::Config;
use crate::render::truncate_to_boundary;
use crate::timer::TimerId;
use crate::wait::Readiness;

/// Fragment size used when a source does not declare its own
pub const DEFAULT_FRAGMENT_LIMIT: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Nothing to do until a reload supplies the missing setting
    #[error("not configured: {0}")]
    Unconfigured(&'static str),
    /// Device or service cannot be used for the rest of the process lifetime
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a source gets fresh data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Cheap call made directly from the scheduler on its timer
    Synchronous,
    /// Serviced when one of its descriptors becomes ready
    EventDriven,
    /// Timer starts work on another thread, result arrives as a [`Completion`](crate::Completion)
    Background,
}

/// Result of a timer-driven refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refresh {
    Updated(String),
    /// Background work was started
    Pending,
    /// Background work from an earlier trigger is still running
    Busy,
}

/// Result of servicing a ready descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceOutcome {
    pub text: Option<String>,
    /// The connection is gone for good
    pub disconnected: bool,
}

/// What a source wants after seeing a new config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconfigure {
    Unchanged,
    /// Start (or restart) timer-driven refreshes
    Enable,
    /// Stop refreshing until a later reload enables it again
    Disable,
}

/// Identity of a source, equal to its position on the status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub usize);

/// Handed to each source once at startup
#[derive(Clone)]
pub struct SourceContext {
    pub id: SourceId,
    pub completions: Completions,
}

/// A provider of one status line fragment
pub trait Source: Send {
    fn name(&self) -> &'static str;

    fn policy(&self) -> RefreshPolicy;

    /// Text shown before the first refresh and when the source cannot be used
    fn placeholder(&self) -> String {
        String::new()
    }

    /// Maximum fragment size in bytes
    fn fragment_limit(&self) -> usize {
        DEFAULT_FRAGMENT_LIMIT
    }

    /// Refresh period under `config`, `None` for sources without a timer
    fn period(&self, _config: &Config) -> Option<Duration> {
        None
    }

    /// Acquire devices, connections or settings
    fn init(&mut self, ctx: &SourceContext) -> Result<(), SourceError>;

    fn refresh(&mut self) -> Result<Refresh, SourceError>;

    /// Descriptors to wait on. An empty list means nothing to wait for.
    fn descriptors(&self) -> Vec<BorrowedFd<'_>> {
        Vec::new()
    }

    fn service_event(&mut self, _readiness: Readiness) -> ServiceOutcome {
        ServiceOutcome::default()
    }

    fn reconfigure(&mut self, _config: &Config) -> Reconfigure {
        Reconfigure::Unchanged
    }

    /// Release whatever `init` acquired
    fn close(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Active,
    /// Waiting for configuration
    Idle,
    /// Failed to initialize, never retried
    Unavailable,
    /// Event connection lost, never retried
    Disconnected,
}

/// Scheduler-owned container for one source and its current fragment
pub struct SourceSlot {
    id: SourceId,
    source: Box<dyn Source>,
    fragment: String,
    state: SlotState,
    timer: Option<TimerId>,
    /// Enabled by a reload but not refreshed yet
    restart_pending: bool,
}

impl SourceSlot {
    pub fn new(id: SourceId, source: Box<dyn Source>) -> Self {
        let mut slot = Self {
            id,
            fragment: String::new(),
            state: SlotState::Idle,
            timer: None,
            restart_pending: false,
            source,
        };
        let placeholder = slot.source.placeholder();
        slot.set_fragment(placeholder);
        slot
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.source.name()
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.source.policy()
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SlotState::Active
    }

    pub fn timer(&self) -> Option<TimerId> {
        self.timer
    }

    /// A reload enabled this source but its last refresh found earlier
    /// background work still running
    pub fn restart_pending(&self) -> bool {
        self.restart_pending
    }

    pub(crate) fn set_timer(&mut self, timer: TimerId) {
        self.timer = Some(timer);
    }

    pub fn period(&self, config: &Config) -> Option<Duration> {
        self.source.period(config)
    }

    /// Descriptors of an active event-driven source
    pub fn descriptors(&self) -> Vec<BorrowedFd<'_>> {
        if self.is_active() && self.policy() == RefreshPolicy::EventDriven {
            self.source.descriptors()
        } else {
            Vec::new()
        }
    }

    fn set_fragment(&mut self, mut text: String) {
        truncate_to_boundary(&mut text, self.source.fragment_limit());
        self.fragment = text;
    }

    /// Initialize the source and, when that works, take a first sample.
    /// Returns whether the fragment changed.
    pub fn mount(&mut self, ctx: &SourceContext) -> bool {
        match self.source.init(ctx) {
            Ok(()) => {
                self.state = SlotState::Active;
                tracing::info!(source = self.name(), "source initialized");
                self.refresh()
            }
            Err(SourceError::Unconfigured(what)) => {
                self.state = SlotState::Idle;
                tracing::info!(source = self.name(), "{what} not configured, source idle");
                false
            }
            Err(e) => {
                self.state = SlotState::Unavailable;
                tracing::warn!(source = self.name(), error = %e, "source unavailable");
                false
            }
        }
    }

    /// Timer-driven refresh. Returns whether the fragment changed.
    pub fn refresh(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }

        let result = self.source.refresh();
        if !matches!(result, Ok(Refresh::Busy)) {
            self.restart_pending = false;
        }
        match result {
            Ok(Refresh::Updated(text)) => {
                self.set_fragment(text);
                true
            }
            Ok(Refresh::Pending) => false,
            Ok(Refresh::Busy) => {
                tracing::debug!(source = self.name(), "previous refresh still running");
                false
            }
            Err(e) => {
                tracing::warn!(source = self.name(), error = %e, "refresh failed, source idle");
                self.state = SlotState::Idle;
                false
            }
        }
    }

    /// Handle readiness on this source's descriptors. Returns whether the
    /// status line needs redrawing.
    pub fn service(&mut self, readiness: Readiness) -> bool {
        if !self.is_active() {
            return false;
        }

        let outcome = self.source.service_event(readiness);
        let mut dirty = false;

        if let Some(text) = outcome.text {
            self.set_fragment(text);
            dirty = true;
        }

        if outcome.disconnected {
            tracing::warn!(source = self.name(), "connection lost, source disabled");
            self.source.close();
            self.state = SlotState::Disconnected;
            dirty = true;
        }

        dirty
    }

    /// Store the result of finished background work
    pub fn complete(&mut self, text: String) {
        self.set_fragment(text);
    }

    /// Let the source look at a new config. Permanently disabled sources
    /// always report `Unchanged`.
    pub fn reconfigure(&mut self, config: &Config) -> Reconfigure {
        if matches!(self.state, SlotState::Unavailable | SlotState::Disconnected) {
            return Reconfigure::Unchanged;
        }

        let change = self.source.reconfigure(config);
        match change {
            Reconfigure::Enable => {
                self.state = SlotState::Active;
                self.restart_pending = true;
            }
            Reconfigure::Disable => {
                self.state = SlotState::Idle;
                self.restart_pending = false;
            }
            Reconfigure::Unchanged => {}
        }
        change
    }

    pub fn unmount(&mut self) {
        if matches!(self.state, SlotState::Active | SlotState::Idle) {
            self.source.close();
        }
        self.state = SlotState::Unavailable;
    }
}
