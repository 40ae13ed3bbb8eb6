// statbar-sources/src/volume.rs
use statbar_core::{
    Readiness, Refresh, RefreshPolicy, ServiceOutcome, Source, SourceContext, SourceError,
};
use std::io::{self, Read};
use std::os::fd::{AsFd, BorrowedFd};
use std::process::{Child, Command, Stdio};

use crate::common::{format_level, glyphs};

const PLACEHOLDER: &str = "Vol: ?";

/// Unterminated output longer than this is thrown away
const MAX_PENDING: usize = 4096;

/// Parse one line of monitor output: an integer percentage, `%` optional
pub fn parse_percent(line: &str) -> Option<u32> {
    let line = line.trim();
    let digits = line.strip_suffix('%').unwrap_or(line).trim_end();
    digits.parse::<u32>().ok().filter(|pct| *pct <= 100)
}

/// Byte stream the monitor writes to
pub trait MonitorStream: Read + AsFd + Send {}

impl<T: Read + AsFd + Send> MonitorStream for T {}

/// Collects bytes until full lines are available
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append `bytes` and return the last valid percentage among the
    /// completed lines
    fn push(&mut self, bytes: &[u8]) -> Option<u32> {
        self.pending.extend_from_slice(bytes);
        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            if self.pending.len() > MAX_PENDING {
                tracing::debug!(len = self.pending.len(), "dropping unterminated monitor output");
                self.pending.clear();
            }
            return None;
        };

        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
        String::from_utf8_lossy(&complete)
            .lines()
            .filter_map(|line| {
                let parsed = parse_percent(line);
                if parsed.is_none() && !line.trim().is_empty() {
                    tracing::debug!(line, "ignoring volume monitor output");
                }
                parsed
            })
            .last()
    }
}

/// Output volume, pushed by an external monitor process.
///
/// The monitor's stdout is the descriptor the scheduler waits on. Once the
/// stream ends the source reports a disconnect and keeps its last value.
pub struct VolumeSource {
    command: Option<Vec<String>>,
    child: Option<Child>,
    stream: Option<Box<dyn MonitorStream>>,
    lines: LineBuffer,
    percent: Option<u32>,
}

impl VolumeSource {
    /// Spawn `command` at init and read percentages from its stdout
    pub fn new(command: Option<Vec<String>>) -> Self {
        Self {
            command,
            child: None,
            stream: None,
            lines: LineBuffer::default(),
            percent: None,
        }
    }

    /// Read from an already open stream instead of spawning a process
    pub fn from_stream(stream: impl MonitorStream + 'static) -> Self {
        let mut source = Self::new(None);
        source.stream = Some(Box::new(stream));
        source
    }

    fn text(&self) -> String {
        match self.percent {
            Some(percent) => format_level(glyphs::VOLUME, percent),
            None => PLACEHOLDER.to_string(),
        }
    }

    fn spawn(argv: &[String]) -> Result<Child, SourceError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(SourceError::Unavailable("empty volume command".into()));
        };
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SourceError::Unavailable(format!("failed to start {program}: {e}")))
    }

    /// Read whatever is available. Returns `Ok(false)` on end of stream.
    fn read_available(&mut self) -> io::Result<bool> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(false);
        };
        let mut buf = [0u8; 512];
        let n = match stream.read(&mut buf) {
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                return Ok(true);
            }
            Err(e) => return Err(e),
        };
        if n == 0 {
            return Ok(false);
        }
        if let Some(percent) = self.lines.push(&buf[..n]) {
            self.percent = Some(percent);
        }
        Ok(true)
    }
}

impl Source for VolumeSource {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn policy(&self) -> RefreshPolicy {
        RefreshPolicy::EventDriven
    }

    fn placeholder(&self) -> String {
        PLACEHOLDER.into()
    }

    fn fragment_limit(&self) -> usize {
        10
    }

    fn init(&mut self, _ctx: &SourceContext) -> Result<(), SourceError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let Some(argv) = &self.command else {
            return Err(SourceError::Unavailable("no volume command configured".into()));
        };

        let mut child = Self::spawn(argv)?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SourceError::Unavailable("volume command has no stdout".into()));
        };

        tracing::info!(pid = child.id(), "volume monitor started");
        self.stream = Some(Box::new(stdout));
        self.child = Some(child);
        Ok(())
    }

    fn refresh(&mut self) -> Result<Refresh, SourceError> {
        Ok(Refresh::Updated(self.text()))
    }

    fn descriptors(&self) -> Vec<BorrowedFd<'_>> {
        self.stream.iter().map(|s| s.as_fd()).collect()
    }

    fn service_event(&mut self, readiness: Readiness) -> ServiceOutcome {
        let before = self.percent;
        let mut open = !(readiness.hangup || readiness.error) || readiness.readable;

        if readiness.readable {
            match self.read_available() {
                Ok(still_open) => open = still_open,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read volume monitor");
                    open = false;
                }
            }
        }

        ServiceOutcome {
            text: (self.percent != before).then(|| self.text()),
            disconnected: !open,
        }
    }

    fn close(&mut self) {
        self.stream = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            match child.wait() {
                Ok(status) => tracing::debug!(%status, "volume monitor exited"),
                Err(e) => tracing::warn!(error = %e, "failed to reap volume monitor"),
            }
        }
    }
}

impl Drop for VolumeSource {
    fn drop(&mut self) {
        self.close();
    }
}
