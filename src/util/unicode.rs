//! Unicode utilities
//!
//! Character classes used by string to number conversion.

/// Check if a code unit is a line terminator
#[inline]
pub fn is_line_terminator(c: u32) -> bool {
    matches!(c, 0x000A | 0x000D | 0x2028 | 0x2029)
}

/// Check if a code unit is whitespace or a line terminator
#[inline]
pub fn is_whitespace(c: u32) -> bool {
    matches!(
        c,
        0x0009  // Tab
        | 0x000B // Vertical Tab
        | 0x000C // Form Feed
        | 0x0020 // Space
        | 0x00A0 // No-Break Space
        | 0xFEFF // BOM
    ) || is_line_terminator(c)
        || is_unicode_space(c)
}

/// Check if a code unit is a Unicode space separator
#[inline]
pub fn is_unicode_space(c: u32) -> bool {
    matches!(c, 0x1680 | 0x2000..=0x200A | 0x202F | 0x205F | 0x3000)
}

/// Strip leading and trailing whitespace from UTF-16 units
pub fn trim_whitespace(units: &[u16]) -> &[u16] {
    let start = units
        .iter()
        .position(|&c| !is_whitespace(c as u32))
        .unwrap_or(units.len());
    let end = units
        .iter()
        .rposition(|&c| !is_whitespace(c as u32))
        .map_or(start, |i| i + 1);
    &units[start..end]
}
