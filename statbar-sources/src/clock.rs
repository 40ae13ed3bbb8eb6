// statbar-sources/src/clock.rs
use chrono::{DateTime, Local, TimeZone};
use statbar_core::{Config, Refresh, RefreshPolicy, Source, SourceContext, SourceError};
use std::fmt::Display;
use std::time::Duration;

/// `Mon Oct 19 09:04:05 2026`
pub const CLOCK_FORMAT: &str = "%a %b %e %T %Y";

pub fn format_clock<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    time.format(CLOCK_FORMAT).to_string()
}

/// Local wall-clock time
#[derive(Debug, Default)]
pub struct ClockSource;

impl ClockSource {
    pub fn new() -> Self {
        Self
    }
}

impl Source for ClockSource {
    fn name(&self) -> &'static str {
        "clock"
    }

    fn policy(&self) -> RefreshPolicy {
        RefreshPolicy::Synchronous
    }

    fn fragment_limit(&self) -> usize {
        25
    }

    fn period(&self, config: &Config) -> Option<Duration> {
        Some(config.intervals.clock)
    }

    fn init(&mut self, _ctx: &SourceContext) -> Result<(), SourceError> {
        Ok(())
    }

    fn refresh(&mut self) -> Result<Refresh, SourceError> {
        Ok(Refresh::Updated(format_clock(&Local::now())))
    }
}
