//! Conversions for values coming out of simulator buffers.

/// Copy a possibly non-terminated byte buffer into an owned string.
///
/// Reads at most `max_len` bytes and stops at the first NUL. Invalid UTF-8
/// is replaced, control characters are dropped and surrounding whitespace is
/// trimmed.
pub fn bounded_text(bytes: &[u8], max_len: usize) -> String {
    let window = &bytes[..bytes.len().min(max_len)];
    let end = window.iter().position(|&b| b == 0).unwrap_or(window.len());
    String::from_utf8_lossy(&window[..end])
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Longest prefix of `s` that fits in `max_bytes` without splitting a char.
pub fn truncate_on_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Replace NaN and infinities with `0.0`.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
