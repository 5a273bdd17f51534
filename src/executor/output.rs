//! Making helper output safe to embed in a single reply line.

use std::fmt::Write;

/// Escape text so it fits on one protocol line.
///
/// Backslash, newline, carriage return and tab use their C escapes; other
/// control characters become `\xNN`. A single trailing newline is dropped.
pub fn escape_output(output: &str) -> String {
    let trimmed = output.strip_suffix('\n').unwrap_or(output);
    let mut escaped = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if c.is_ascii_control() => {
                let _ = write!(escaped, "\\x{:02x}", c as u32);
            }
            c => escaped.push(c),
        }
    }
    escaped
}
