//! Text helpers shared by capture, resolution and banner scanning.

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max` characters, respecting char boundaries.
pub fn truncate_chars(input: &str, max: usize) -> String {
    match input.char_indices().nth(max) {
        Some((idx, _)) => input[..idx].to_string(),
        None => input.to_string(),
    }
}

/// Normalize then truncate; the shape every captured text field takes.
pub fn clip(input: &str, max: usize) -> String {
    truncate_chars(&normalize_whitespace(input), max)
}
