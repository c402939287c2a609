//! Story text helpers used by the reading view.

use once_cell::sync::Lazy;
use regex::Regex;

/// Reading speed assumed for [`reading_time_minutes`].
const WORDS_PER_MINUTE: usize = 200;

/// One or more blank lines (whitespace-only lines count as blank).
static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n[ \t]*(?:\r?\n[ \t]*)+").unwrap());

/// Split stored story text into narration paragraphs.
///
/// Paragraphs are separated by blank lines.  Each paragraph is trimmed; empty
/// ones (leading/trailing blank lines, whitespace-only text) are dropped so the
/// engine never receives an empty segment.  Single line breaks inside a
/// paragraph are kept.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    RE_BLANK_LINES
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Estimated reading time, rounded up to whole minutes.  Never less than one.
pub fn reading_time_minutes(text: &str) -> usize {
    text.split_whitespace().count().div_ceil(WORDS_PER_MINUTE).max(1)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_blank_lines() {
        let p = split_paragraphs("Era uma vez.\n\nUm gato.\n\nFim.");
        assert_eq!(p, vec!["Era uma vez.", "Um gato.", "Fim."]);
    }

    #[test]
    fn test_single_newline_stays_inside_paragraph() {
        let p = split_paragraphs("linha um\nlinha dois\n\noutro");
        assert_eq!(p, vec!["linha um\nlinha dois", "outro"]);
    }

    #[test]
    fn test_runs_of_blank_lines_and_crlf() {
        let p = split_paragraphs("\n\nA\r\n\r\n\r\nB\n  \n\t\nC\n\n");
        assert_eq!(p, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_empty_text() {
        assert!(split_paragraphs("").is_empty());
        assert!(split_paragraphs(" \n\n \n").is_empty());
    }

    #[test]
    fn test_reading_time() {
        assert_eq!(reading_time_minutes(""), 1);
        assert_eq!(reading_time_minutes("uma palavra"), 1);
        assert_eq!(reading_time_minutes(&"palavra ".repeat(200)), 1);
        assert_eq!(reading_time_minutes(&"palavra ".repeat(201)), 2);
    }
}
