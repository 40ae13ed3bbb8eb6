pub mod background;
pub mod config;
pub mod render;
pub mod scheduler;
pub mod signal;
pub mod source;
pub mod timer;
pub mod wait;
pub mod watch;

pub use background::{BackgroundJob, Completion, Completions, Fetch, RetryPolicy};
pub use config::{Config, ConfigError, ConfigLoader, Intervals};
pub use render::{Composer, DisplaySurface, MAX_STATUS_LEN, SEPARATOR, truncate_to_boundary};
pub use scheduler::{LoopState, Scheduler, SchedulerError};
pub use signal::{SignalBridge, SignalHandle};
pub use source::{
    Reconfigure, Refresh, RefreshPolicy, ServiceOutcome, SlotState, Source, SourceContext,
    SourceError, SourceId,
};
pub use timer::{MIN_PERIOD, TimerId, TimerSet};
pub use wait::{Clock, MonotonicClock, PollWaiter, Readiness, WaitOutcome, Waiter};
pub use watch::{ConfigWatcher, WatchError};
