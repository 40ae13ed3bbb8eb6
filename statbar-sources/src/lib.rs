pub mod battery;
pub mod clock;
pub mod common;
pub mod mail;
pub mod volume;
pub mod weather;

pub use battery::{BatteryReading, BatterySource, CapacityLevel, ChargeStatus};
pub use clock::ClockSource;
pub use mail::MailSource;
pub use volume::VolumeSource;
pub use weather::{FetchError, WeatherSource, WttrFetcher};
