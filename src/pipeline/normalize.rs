//! Deterministic cleanup of language-model output.
//!
//! Even with an explicit "output only the text" instruction, models wrap
//! answers in code fences, prefix titles with `Title:`, quote them, or emit
//! CRLF and zero-width characters. These rules strip such wrappers without
//! touching wording.
//!
//! Rule order matters: fences are stripped before line endings are
//! normalised, and invisible characters go before blank-line collapsing so
//! that a line holding only U+200B counts as blank.

use crate::document::{truncate_chars, MAX_TITLE_CHARS};
use once_cell::sync::Lazy;
use regex::Regex;

/// Clean a reformatted-content response.
pub fn clean_content(input: &str) -> String {
    let s = strip_outer_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

/// Clean a title response: first non-empty line, unwrapped and truncated.
pub fn clean_title(input: &str) -> String {
    let s = strip_outer_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let Some(line) = s.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return String::new();
    };
    let line = RE_TITLE_PREFIX.replace(line, "");
    let line = line.trim_matches(|c: char| TITLE_WRAPPERS.contains(&c) || c.is_whitespace());
    let line = RE_WHITESPACE_RUN.replace_all(line, " ");
    truncate_chars(&line, MAX_TITLE_CHARS).trim_end().to_string()
}

/// Whether `a` and `b` hold the same characters once whitespace and
/// invisible characters are ignored.
///
/// A reformatted reply must pass this against the OCR text; anything else
/// means the model changed wording or stopped early.
pub fn same_text(a: &str, b: &str) -> bool {
    let visible = |s: &str| {
        remove_invisible_chars(s)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
    };
    visible(a) == visible(b)
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_outer_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ──────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse runs of blank lines to one ──────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Title-only rules ─────────────────────────────────────────────────────

static RE_TITLE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:\*\*)?(?:title|titel|标题)\s*(?:\*\*)?\s*[:：]\s*").unwrap());

static RE_WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const TITLE_WRAPPERS: &[char] = &['"', '\'', '`', '*', '#', '“', '”', '「', '」', '《', '》'];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_with_and_without_language() {
        assert_eq!(strip_outer_fences("```text\nA\nB\n```"), "A\nB");
        assert_eq!(strip_outer_fences("```\nA\n```\n"), "A");
        assert_eq!(strip_outer_fences("A\n```\nB"), "A\n```\nB");
    }

    #[test]
    fn content_cleanup() {
        let raw = "```\r\nInvoice #123  \r\n\r\n\r\n\r\nTotal:\u{200B} $50\r\n```";
        assert_eq!(clean_content(raw), "Invoice #123\n\nTotal: $50");
    }

    #[test]
    fn content_cleanup_keeps_single_blank_lines() {
        assert_eq!(clean_content("a\n\nb\n"), "a\n\nb");
    }

    #[test]
    fn same_text_ignores_layout_only() {
        assert!(same_text("Invoice  #123\nTotal:\n$50", "Invoice #123\nTotal: $50"));
        assert!(same_text("a\u{200B}b c", "ab\n\nc"));
        assert!(!same_text("Line 1\nLine 2\nLine 3", "Line 1\nLine 2"));
        assert!(!same_text("Total: $50", "Total: $5O"));
    }

    #[test]
    fn title_prefix_and_quotes_removed() {
        assert_eq!(clean_title("Title: \"Invoice 123\""), "Invoice 123");
        assert_eq!(clean_title("**Title:** Quarterly report"), "Quarterly report");
        assert_eq!(clean_title("标题：发票"), "发票");
        assert_eq!(clean_title("\n\n# Water bill\nextra"), "Water bill");
    }

    #[test]
    fn title_whitespace_collapsed_and_truncated() {
        assert_eq!(clean_title("  a   b\tc "), "a b c");
        let long = "x".repeat(200);
        assert_eq!(clean_title(&long).chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn empty_title_response() {
        assert_eq!(clean_title(" \n\u{200B}\n "), "");
        assert_eq!(clean_title("\"\""), "");
    }
}
