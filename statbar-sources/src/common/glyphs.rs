// statbar-sources/src/common/glyphs.rs
//! Nerd Font code points used in fragments. Each one is three bytes of UTF-8.

pub const MAIL: &str = "\u{eb1c}";
pub const VOLUME: &str = "\u{f028}";
pub const BATTERY: &str = "\u{f241}";
pub const BATTERY_MID: &str = "\u{f242}";
pub const BATTERY_LOW: &str = "\u{f243}";
pub const PLUG: &str = "\u{f492}";
pub const UNKNOWN: &str = "\u{eb32}";
