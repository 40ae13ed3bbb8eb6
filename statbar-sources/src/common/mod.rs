pub mod format;
pub mod glyphs;

pub use format::format_level;
