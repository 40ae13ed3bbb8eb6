use serde::Deserialize;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;
use toml::Spanned;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("syntax error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("invalid value on line {line}: {message}")]
    Invalid { line: usize, message: String },
    #[error("Config directory not found")]
    NoConfigDir,
}

impl ConfigError {
    /// 1-based line the error points at, when it has one
    pub fn line(&self) -> Option<usize> {
        match self {
            ConfigError::Parse { line, .. } | ConfigError::Invalid { line, .. } => Some(*line),
            _ => None,
        }
    }
}

const INTERVAL_RANGE_MS: RangeInclusive<u64> = 1..=600_000;
const WEATHER_INTERVAL_RANGE_MS: RangeInclusive<u64> = 1_000..=86_400_000;

/// Refresh periods for the timer-driven sources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub clock: Duration,
    pub battery: Duration,
    pub mail: Duration,
    pub weather: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            clock: Duration::from_secs(1),
            battery: Duration::from_secs(5),
            mail: Duration::from_secs(30),
            weather: Duration::from_secs(3600),
        }
    }
}

/// Validated configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub intervals: Intervals,
    /// Maildir root; its `new/` subdirectory is checked for mail
    pub mail_inbox: Option<PathBuf>,
    pub weather_location: Option<String>,
    /// Power supply directory, e.g. `/sys/class/power_supply/BAT0`
    pub battery_device: Option<PathBuf>,
    /// argv of a process printing volume percentages, one per line
    pub volume_command: Option<Vec<String>>,
}

// On-disk layout. Spans are kept so errors can name a line.

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    intervals: IntervalsSection,
    mail: MailSection,
    weather: WeatherSection,
    battery: BatterySection,
    volume: VolumeSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct IntervalsSection {
    clock: Option<Spanned<u64>>,
    battery: Option<Spanned<u64>>,
    mail: Option<Spanned<u64>>,
    weather: Option<Spanned<u64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MailSection {
    inbox: Option<Spanned<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct WeatherSection {
    location: Option<Spanned<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BatterySection {
    device: Option<Spanned<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct VolumeSection {
    command: Option<Spanned<Vec<String>>>,
}

fn line_of(content: &str, offset: usize) -> usize {
    let end = offset.min(content.len());
    content.as_bytes()[..end]
        .iter()
        .filter(|b| **b == b'\n')
        .count()
        + 1
}

struct Validator<'a> {
    content: &'a str,
}

impl Validator<'_> {
    fn invalid(&self, span: std::ops::Range<usize>, message: String) -> ConfigError {
        ConfigError::Invalid {
            line: line_of(self.content, span.start),
            message,
        }
    }

    fn interval(
        &self,
        name: &str,
        value: Option<Spanned<u64>>,
        range: RangeInclusive<u64>,
        default: Duration,
    ) -> Result<Duration, ConfigError> {
        let Some(value) = value else {
            return Ok(default);
        };
        let millis = *value.get_ref();
        if !range.contains(&millis) {
            return Err(self.invalid(
                value.span(),
                format!(
                    "{name} interval must be between {} and {} ms, got {millis}",
                    range.start(),
                    range.end()
                ),
            ));
        }
        Ok(Duration::from_millis(millis))
    }

    fn text(&self, name: &str, value: Option<Spanned<String>>) -> Result<Option<String>, ConfigError> {
        let Some(value) = value else {
            return Ok(None);
        };
        let span = value.span();
        let text = value.into_inner().trim().to_string();
        if text.is_empty() {
            return Err(self.invalid(span, format!("{name} must not be empty")));
        }
        Ok(Some(text))
    }
}

/// Expand a leading `~/` to the home directory
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

impl Config {
    /// Parse and validate a whole file. Either every entry is accepted or
    /// an error is returned.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| ConfigError::Parse {
            line: e.span().map(|s| line_of(content, s.start)).unwrap_or(1),
            message: e.message().to_string(),
        })?;

        let v = Validator { content };
        let defaults = Intervals::default();
        let intervals = Intervals {
            clock: v.interval("clock", file.intervals.clock, INTERVAL_RANGE_MS, defaults.clock)?,
            battery: v.interval(
                "battery",
                file.intervals.battery,
                INTERVAL_RANGE_MS,
                defaults.battery,
            )?,
            mail: v.interval("mail", file.intervals.mail, INTERVAL_RANGE_MS, defaults.mail)?,
            weather: v.interval(
                "weather",
                file.intervals.weather,
                WEATHER_INTERVAL_RANGE_MS,
                defaults.weather,
            )?,
        };

        let volume_command = match file.volume.command {
            Some(command) => {
                let span = command.span();
                let argv = command.into_inner();
                if argv.first().is_none_or(|program| program.trim().is_empty()) {
                    return Err(v.invalid(span, "volume command must name a program".into()));
                }
                Some(argv)
            }
            None => None,
        };

        Ok(Self {
            intervals,
            mail_inbox: v.text("mail inbox", file.mail.inbox)?.map(|p| expand_home(&p)),
            weather_location: v.text("weather location", file.weather.location)?,
            battery_device: v
                .text("battery device", file.battery.device)?
                .map(|p| expand_home(&p)),
            volume_command,
        })
    }
}

/// Reads the config file from a fixed path
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/statbar/statbar.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join("statbar/statbar.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory holding the config file
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
            _ => Ok(()),
        }
    }

    /// Load the file; a missing file is an error
    pub fn load(&self) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(&self.path)?;
        Config::parse(&content)
    }

    /// Load the file, falling back to defaults when it does not exist
    pub fn load_or_default(&self) -> Result<Config, ConfigError> {
        match self.load() {
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Config::default())
            }
            other => other,
        }
    }
}
