// statbar-sources/src/battery.rs
use statbar_core::{
    Config, Reconfigure, Refresh, RefreshPolicy, Source, SourceContext, SourceError,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::{format_level, glyphs};

pub const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

/// Contents of the sysfs `status` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeStatus {
    Charging,
    Discharging,
    Full,
    NotCharging,
    Unknown,
}

impl ChargeStatus {
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "Charging" => Self::Charging,
            "Discharging" => Self::Discharging,
            "Full" => Self::Full,
            "Not charging" => Self::NotCharging,
            _ => Self::Unknown,
        }
    }

    /// Whether external power is connected
    pub fn on_ac(self) -> bool {
        matches!(self, Self::Charging | Self::Full | Self::NotCharging)
    }
}

/// Contents of the sysfs `capacity_level` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityLevel {
    Critical,
    Low,
    Normal,
    High,
    Full,
    Unknown,
}

impl CapacityLevel {
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "Critical" => Self::Critical,
            "Low" => Self::Low,
            "Normal" => Self::Normal,
            "High" => Self::High,
            "Full" => Self::Full,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryReading {
    pub capacity: u32,
    pub status: ChargeStatus,
    pub level: CapacityLevel,
}

impl BatteryReading {
    pub fn glyph(&self) -> &'static str {
        if self.status.on_ac() {
            glyphs::PLUG
        } else if self.level == CapacityLevel::Critical {
            glyphs::BATTERY_LOW
        } else if self.status == ChargeStatus::Unknown {
            glyphs::UNKNOWN
        } else if self.level == CapacityLevel::Low {
            glyphs::BATTERY_MID
        } else {
            glyphs::BATTERY
        }
    }

    pub fn format(&self) -> String {
        format_level(self.glyph(), self.capacity)
    }
}

fn read_attr(device: &Path, name: &str) -> io::Result<String> {
    fs::read_to_string(device.join(name))
}

/// Read one power supply directory. `capacity_level` is optional, some
/// drivers do not provide it.
pub fn read_battery(device: &Path) -> io::Result<BatteryReading> {
    let capacity = read_attr(device, "capacity")?
        .trim()
        .parse::<u32>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let status = ChargeStatus::parse(&read_attr(device, "status")?);
    let level = read_attr(device, "capacity_level")
        .map(|text| CapacityLevel::parse(&text))
        .unwrap_or(CapacityLevel::Unknown);

    Ok(BatteryReading {
        capacity,
        status,
        level,
    })
}

/// First `BAT*` entry under `root`, by name
pub fn find_battery(root: &Path) -> io::Result<Option<PathBuf>> {
    let mut found: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("BAT"))
        .map(|entry| entry.path())
        .collect();
    found.sort();
    Ok(found.into_iter().next())
}

/// Charge level and power state from sysfs
pub struct BatterySource {
    configured: Option<PathBuf>,
    search_root: PathBuf,
    device: Option<PathBuf>,
}

impl BatterySource {
    /// Use `device` if given, otherwise the first battery the kernel reports
    pub fn new(device: Option<PathBuf>) -> Self {
        Self::with_search_root(device, POWER_SUPPLY_DIR)
    }

    pub fn with_search_root(device: Option<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            configured: device,
            search_root: root.into(),
            device: None,
        }
    }

    pub fn device(&self) -> Option<&Path> {
        self.device.as_deref()
    }
}

impl Source for BatterySource {
    fn name(&self) -> &'static str {
        "battery"
    }

    fn policy(&self) -> RefreshPolicy {
        RefreshPolicy::Synchronous
    }

    fn placeholder(&self) -> String {
        "Bat: ?".into()
    }

    fn fragment_limit(&self) -> usize {
        10
    }

    fn period(&self, config: &Config) -> Option<Duration> {
        Some(config.intervals.battery)
    }

    fn init(&mut self, _ctx: &SourceContext) -> Result<(), SourceError> {
        let device = match &self.configured {
            Some(device) => device.clone(),
            None => find_battery(&self.search_root)?.ok_or_else(|| {
                SourceError::Unavailable(format!(
                    "no battery under {}",
                    self.search_root.display()
                ))
            })?,
        };

        if !device.join("capacity").is_file() {
            return Err(SourceError::Unavailable(format!(
                "{} is not a battery",
                device.display()
            )));
        }

        tracing::debug!(device = %device.display(), "using battery");
        self.device = Some(device);
        Ok(())
    }

    fn refresh(&mut self) -> Result<Refresh, SourceError> {
        let Some(device) = &self.device else {
            return Err(SourceError::Unavailable("battery not initialized".into()));
        };

        match read_battery(device) {
            Ok(reading) => Ok(Refresh::Updated(reading.format())),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read battery");
                Ok(Refresh::Updated(glyphs::UNKNOWN.to_string()))
            }
        }
    }

    fn reconfigure(&mut self, config: &Config) -> Reconfigure {
        // Switch devices only when the new one looks usable
        if let Some(device) = &config.battery_device
            && self.device.as_ref() != Some(device)
            && device.join("capacity").is_file()
        {
            tracing::info!(device = %device.display(), "switching battery device");
            self.device = Some(device.clone());
        }
        self.configured = config.battery_device.clone();
        Reconfigure::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statbar_core::SourceId;
    use statbar_core::background::completion_channel;

    fn write_device(dir: &Path, capacity: &str, status: &str, level: Option<&str>) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("capacity"), capacity).unwrap();
        fs::write(dir.join("status"), status).unwrap();
        if let Some(level) = level {
            fs::write(dir.join("capacity_level"), level).unwrap();
        }
    }

    fn ctx() -> SourceContext {
        let (completions, _rx) = completion_channel();
        SourceContext {
            id: SourceId(0),
            completions,
        }
    }

    fn reading(status: ChargeStatus, level: CapacityLevel) -> BatteryReading {
        BatteryReading {
            capacity: 50,
            status,
            level,
        }
    }

    #[test]
    fn test_glyph_precedence() {
        use CapacityLevel as L;
        use ChargeStatus as S;

        assert_eq!(reading(S::Charging, L::Critical).glyph(), glyphs::PLUG);
        assert_eq!(reading(S::NotCharging, L::Normal).glyph(), glyphs::PLUG);
        assert_eq!(reading(S::Discharging, L::Critical).glyph(), glyphs::BATTERY_LOW);
        assert_eq!(reading(S::Unknown, L::Critical).glyph(), glyphs::BATTERY_LOW);
        assert_eq!(reading(S::Unknown, L::Low).glyph(), glyphs::UNKNOWN);
        assert_eq!(reading(S::Discharging, L::Low).glyph(), glyphs::BATTERY_MID);
        assert_eq!(reading(S::Discharging, L::Normal).glyph(), glyphs::BATTERY);
        assert_eq!(reading(S::Discharging, L::Unknown).glyph(), glyphs::BATTERY);
    }

    #[test]
    fn test_read_battery_from_sysfs() {
        let dir = tempfile::tempdir().unwrap();
        write_device(dir.path(), "87\n", "Discharging\n", Some("Normal\n"));

        let reading = read_battery(dir.path()).unwrap();
        assert_eq!(reading.capacity, 87);
        assert_eq!(reading.status, ChargeStatus::Discharging);
        assert_eq!(reading.level, CapacityLevel::Normal);
        assert_eq!(reading.format(), "\u{f241}   87%");
    }

    #[test]
    fn test_missing_capacity_level_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        write_device(dir.path(), "40", "Charging", None);

        let reading = read_battery(dir.path()).unwrap();
        assert_eq!(reading.level, CapacityLevel::Unknown);
        assert_eq!(reading.glyph(), glyphs::PLUG);
    }

    #[test]
    fn test_garbage_capacity_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_device(dir.path(), "lots", "Full", None);
        assert!(read_battery(dir.path()).is_err());
    }

    #[test]
    fn test_find_battery_picks_first_bat_entry() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("AC")).unwrap();
        fs::create_dir(root.path().join("BAT1")).unwrap();
        fs::create_dir(root.path().join("BAT0")).unwrap();

        let found = find_battery(root.path()).unwrap();
        assert_eq!(found, Some(root.path().join("BAT0")));
    }

    #[test]
    fn test_no_battery_is_unavailable() {
        let root = tempfile::tempdir().unwrap();
        let mut source = BatterySource::with_search_root(None, root.path());
        assert!(matches!(
            source.init(&ctx()),
            Err(SourceError::Unavailable(_))
        ));
    }

    #[test]
    fn test_refresh_reads_discovered_device() {
        let root = tempfile::tempdir().unwrap();
        write_device(&root.path().join("BAT0"), "100", "Full", Some("Full"));

        let mut source = BatterySource::with_search_root(None, root.path());
        source.init(&ctx()).unwrap();
        assert_eq!(source.device(), Some(root.path().join("BAT0").as_path()));
        assert_eq!(
            source.refresh().unwrap(),
            Refresh::Updated("\u{f492}  100%".into())
        );
    }

    #[test]
    fn test_read_failure_shows_unknown_glyph() {
        let root = tempfile::tempdir().unwrap();
        let device = root.path().join("BAT0");
        write_device(&device, "55", "Discharging", None);

        let mut source = BatterySource::new(Some(device.clone()));
        source.init(&ctx()).unwrap();
        fs::remove_file(device.join("status")).unwrap();

        assert_eq!(
            source.refresh().unwrap(),
            Refresh::Updated(glyphs::UNKNOWN.into())
        );
    }

    #[test]
    fn test_reload_switches_to_usable_device() {
        let root = tempfile::tempdir().unwrap();
        let first = root.path().join("BAT0");
        let second = root.path().join("BAT1");
        write_device(&first, "10", "Discharging", None);
        write_device(&second, "90", "Discharging", None);

        let mut source = BatterySource::new(Some(first));
        source.init(&ctx()).unwrap();

        let config = Config {
            battery_device: Some(second.clone()),
            ..Config::default()
        };
        assert_eq!(source.reconfigure(&config), Reconfigure::Unchanged);
        assert_eq!(source.device(), Some(second.as_path()));

        let bogus = Config {
            battery_device: Some(root.path().join("missing")),
            ..Config::default()
        };
        source.reconfigure(&bogus);
        assert_eq!(source.device(), Some(second.as_path()));
    }
}
