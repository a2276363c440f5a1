/// Characters rejected in a path segment by at least one supported filesystem.
///
/// The Windows set is used everywhere so a tree downloaded on one machine can be
/// copied to another.
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

fn is_forbidden(c: char) -> bool {
    c.is_ascii_control() || FORBIDDEN_CHARS.contains(&c)
}

/// Strip every character that cannot appear in a file or directory name.
///
/// Case, whitespace and every other character are left alone, so two different
/// titles can end up with the same name.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars().filter(|c| !is_forbidden(*c)).collect()
}

/// Integer percentage of `done` out of `total`, capped at 100.
///
/// Returns `None` when the total is zero or unknown.
pub fn percentage(done: u64, total: Option<u64>) -> Option<u8> {
    match total {
        Some(total) if total > 0 => Some((done.min(total) * 100 / total) as u8),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("What is Rust?"), "What is Rust");
        assert_eq!(sanitize_file_name("a/b\\c:d*e"), "abcde");
        assert_eq!(sanitize_file_name("<\"quoted\"> | piped"), "quoted  piped");
        assert_eq!(sanitize_file_name("tab\there\n"), "tabhere");
        assert_eq!(sanitize_file_name("  Keep Spacing  "), "  Keep Spacing  ");
        assert_eq!(sanitize_file_name("Ünïcödé 日本"), "Ünïcödé 日本");
    }

    #[test]
    fn test_sanitize_is_idempotent_and_clean() {
        let samples = [
            "Chapter 1: Getting Started",
            "C:\\Windows\\System32",
            "??***??",
            "",
            "normal name.mp4",
            "\u{0}\u{1f}nul",
        ];

        for sample in samples {
            let once = sanitize_file_name(sample);
            assert_eq!(sanitize_file_name(&once), once);
            assert!(!once.chars().any(is_forbidden), "{once:?} still has forbidden chars");
        }
    }

    #[test]
    fn test_sanitize_collisions_are_kept() {
        assert_eq!(sanitize_file_name("a:b"), sanitize_file_name("a*b"));
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(0, Some(200)), Some(0));
        assert_eq!(percentage(50, Some(200)), Some(25));
        assert_eq!(percentage(200, Some(200)), Some(100));
        assert_eq!(percentage(300, Some(200)), Some(100));
        assert_eq!(percentage(10, Some(0)), None);
        assert_eq!(percentage(10, None), None);
    }
}
