//! Shared guardrails for corpus sizes and worker bounds.

pub const DEFAULT_MAX_ENCODED_TEXT_BYTES: usize = 4 * 1024 * 1024;
pub const MIN_ENCODED_TEXT_BYTES: usize = 1024;
pub const MAX_ENCODED_TEXT_BYTES: usize = 256 * 1024 * 1024;

pub const DEFAULT_SCRIPT_WORKERS: usize = 4;
pub const MAX_SCRIPT_WORKERS: usize = 32;

/// Stored excerpts of matching script lines are cut to this many bytes.
pub const MAX_EXCERPT_LENGTH: usize = 512;

pub fn clamp_usize(value: usize, minimum: usize, maximum: usize) -> usize {
    value.max(minimum).min(maximum)
}

pub fn clamp_workers(value: usize) -> usize {
    clamp_usize(value, 1, MAX_SCRIPT_WORKERS)
}

pub fn clamp_text_limit(value: usize) -> usize {
    clamp_usize(value, MIN_ENCODED_TEXT_BYTES, MAX_ENCODED_TEXT_BYTES)
}

/// Trim a line and cut it to [`MAX_EXCERPT_LENGTH`] on a char boundary.
pub fn truncate_excerpt(line: &str) -> String {
    let stripped = line.trim();
    if stripped.len() <= MAX_EXCERPT_LENGTH {
        return stripped.to_string();
    }
    let mut end = MAX_EXCERPT_LENGTH;
    while !stripped.is_char_boundary(end) {
        end -= 1;
    }
    stripped[..end].to_string()
}
