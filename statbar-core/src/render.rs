// statbar-core/src/render.rs
use std::io;

/// Separator placed between fragments
pub const SEPARATOR: &str = " | ";

/// Longest status line pushed to the display, in bytes
pub const MAX_STATUS_LEN: usize = 127;

/// Where the composed status line ends up (window title, stdout, ...)
pub trait DisplaySurface {
    /// Show `text`, replacing whatever was shown before
    fn push(&mut self, text: &str) -> io::Result<()>;
}

/// Cut `text` to at most `max` bytes without splitting a character
pub fn truncate_to_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

/// Joins fragments into one bounded status line
#[derive(Debug, Clone)]
pub struct Composer {
    separator: &'static str,
    max_len: usize,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new(MAX_STATUS_LEN)
    }
}

impl Composer {
    pub fn new(max_len: usize) -> Self {
        Self {
            separator: SEPARATOR,
            max_len,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Join `fragments` in the given order and truncate to the maximum length
    pub fn compose<'a>(&self, fragments: impl IntoIterator<Item = &'a str>) -> String {
        let mut line = String::with_capacity(self.max_len);
        for (i, fragment) in fragments.into_iter().enumerate() {
            if i > 0 {
                line.push_str(self.separator);
            }
            line.push_str(fragment);
            if line.len() > self.max_len {
                break;
            }
        }
        truncate_to_boundary(&mut line, self.max_len);
        line
    }
}
