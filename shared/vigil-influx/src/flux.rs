//! Helpers for composing Flux source text

/// Quote a value as a Flux string literal.
///
/// Escapes backslashes, quotes, control characters and `${` interpolation so
/// the value can never terminate the literal early.
pub fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Relative range start for a trailing window, e.g. `-15m`
pub fn trailing_minutes(minutes: u32) -> String {
    format!("-{}m", minutes)
}
