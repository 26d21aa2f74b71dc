//! Utility helpers
//!
//! - Byte interleave split/merge for paired ROM images
//! - Filename sanitizing for instrument-provided names

pub mod interleave;

/// Replace every character outside `[A-Za-z0-9_-]` with `-`
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_allowed() {
        assert_eq!(sanitize_filename("A28_U611-ACQ"), "A28_U611-ACQ");
    }

    #[test]
    fn test_sanitize_replaces_others() {
        assert_eq!(sanitize_filename("SD-24 v1.0"), "SD-24-v1-0");
        assert_eq!(sanitize_filename("a/b:c\"d"), "a-b-c-d");
        assert_eq!(sanitize_filename("µ"), "-");
    }
}
