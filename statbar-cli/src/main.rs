// statbar-cli/src/main.rs
use crossterm::{execute, terminal::SetTitle, tty::IsTty};
use std::{
    fs::File,
    io::{self, Write},
    path::PathBuf,
    sync::Mutex,
};
use tracing_subscriber::EnvFilter;

use statbar_core::{ConfigLoader, ConfigWatcher, DisplaySurface, Scheduler, SignalBridge};
use statbar_sources::{BatterySource, ClockSource, MailSource, VolumeSource, WeatherSource};

const LOG_ENV: &str = "STATBAR_LOG";

const USAGE: &str = "usage: statbar [--config=PATH] [--stdout] [--log-file=PATH]";

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    config: Option<PathBuf>,
    stdout: bool,
    log_file: Option<PathBuf>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args::default();
    for arg in args {
        if let Some(path) = arg.strip_prefix("--config=") {
            parsed.config = Some(PathBuf::from(path));
        } else if let Some(path) = arg.strip_prefix("--log-file=") {
            parsed.log_file = Some(PathBuf::from(path));
        } else if arg == "--stdout" {
            parsed.stdout = true;
        } else {
            return Err(format!("unknown argument '{arg}'\n{USAGE}"));
        }
    }
    Ok(parsed)
}

fn init_logging(log_file: Option<&PathBuf>) -> io::Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = File::options().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Shows the status line as the terminal window title
struct TerminalTitle {
    out: io::Stdout,
}

impl TerminalTitle {
    fn new() -> io::Result<Self> {
        let out = io::stdout();
        if !out.is_tty() {
            return Err(io::Error::other(
                "stdout is not a terminal, use --stdout to print status lines",
            ));
        }
        Ok(Self { out })
    }
}

impl DisplaySurface for TerminalTitle {
    fn push(&mut self, text: &str) -> io::Result<()> {
        execute!(self.out, SetTitle(text))
    }
}

/// Prints one status line per update
struct StdoutLine {
    out: io::Stdout,
}

impl DisplaySurface for StdoutLine {
    fn push(&mut self, text: &str) -> io::Result<()> {
        let mut out = self.out.lock();
        writeln!(out, "{text}")?;
        out.flush()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args(std::env::args().skip(1))?;
    init_logging(args.log_file.as_ref())?;

    // Load config
    let loader = match args.config {
        Some(path) => ConfigLoader::new(path),
        None => ConfigLoader::new(ConfigLoader::default_path()?),
    };
    loader.ensure_dir()?;
    let config = loader.load_or_default()?;
    tracing::info!(path = %loader.path().display(), "configuration loaded");

    let display: Box<dyn DisplaySurface> = if args.stdout {
        Box::new(StdoutLine { out: io::stdout() })
    } else {
        Box::new(TerminalTitle::new()?)
    };

    let signals = SignalBridge::install()?;

    // Keep the watcher alive for the whole run
    let _watcher = match ConfigWatcher::new(loader.path(), signals.handle()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "config file watching disabled");
            None
        }
    };

    let mut scheduler = Scheduler::new(config.clone(), loader, signals, display);

    // Status line order
    scheduler.add_source(Box::new(MailSource::new(config.mail_inbox.clone())));
    scheduler.add_source(Box::new(WeatherSource::new(
        config.weather_location.clone(),
    )));
    scheduler.add_source(Box::new(VolumeSource::new(config.volume_command.clone())));
    scheduler.add_source(Box::new(BatterySource::new(config.battery_device.clone())));
    scheduler.add_source(Box::new(ClockSource::new()));

    scheduler.start()?;
    scheduler.run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, String> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_no_arguments() {
        assert_eq!(args(&[]).unwrap(), Args::default());
    }

    #[test]
    fn test_all_arguments() {
        let parsed = args(&["--config=/tmp/s.toml", "--stdout", "--log-file=/tmp/s.log"]).unwrap();
        assert_eq!(
            parsed,
            Args {
                config: Some(PathBuf::from("/tmp/s.toml")),
                stdout: true,
                log_file: Some(PathBuf::from("/tmp/s.log")),
            }
        );
    }

    #[test]
    fn test_unknown_argument_is_rejected() {
        let err = args(&["--dashboard=main"]).unwrap_err();
        assert!(err.contains("--dashboard=main"));
        assert!(err.contains("usage"));
    }
}
