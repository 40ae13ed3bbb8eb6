// statbar-sources/src/common/format.rs

/// Format a percentage behind a glyph, right-aligned to three digits
///
/// # Example
/// ```rust
/// use statbar_sources::common::format_level;
/// assert_eq!(format_level("V", 7), "V    7%");
/// ```
pub fn format_level(glyph: &str, percent: u32) -> String {
    format!("{glyph}  {:>3}%", percent.min(100))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::glyphs;

    #[test]
    fn test_format_level_pads_to_three_digits() {
        assert_eq!(format_level(glyphs::VOLUME, 5), "\u{f028}    5%");
        assert_eq!(format_level(glyphs::VOLUME, 55), "\u{f028}   55%");
        assert_eq!(format_level(glyphs::VOLUME, 100), "\u{f028}  100%");
    }

    #[test]
    fn test_format_level_fits_ten_bytes() {
        for percent in [0, 9, 10, 99, 100, 250] {
            assert!(format_level(glyphs::BATTERY, percent).len() <= 10);
        }
    }
}
