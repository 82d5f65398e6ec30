//! Text sanitation for feed values

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

fn markup_regex() -> &'static Regex {
    static MARKUP: OnceLock<Regex> = OnceLock::new();
    MARKUP.get_or_init(|| Regex::new(r"<[^>]*>").expect("static markup pattern"))
}

fn spaces_regex() -> &'static Regex {
    static SPACES: OnceLock<Regex> = OnceLock::new();
    SPACES.get_or_init(|| Regex::new(r" {2,}").expect("static whitespace pattern"))
}

/// Strip markup and control whitespace, collapse runs of spaces, trim
pub fn sanitize_text(value: &str) -> String {
    let stripped = markup_regex().replace_all(value, " ");
    let stripped = stripped
        .replace('\r', "")
        .replace('\n', " ")
        .replace('\t', " ");
    spaces_regex().replace_all(&stripped, " ").trim().to_string()
}

/// Whether `c` may appear in an XML 1.0 document
pub fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r')
        || ('\u{20}'..='\u{D7FF}').contains(&c)
        || ('\u{E000}'..='\u{FFFD}').contains(&c)
        || c >= '\u{10000}'
}

/// Drop code points XML 1.0 cannot carry, in text or CDATA alike
pub fn strip_invalid_xml_chars(value: &str) -> Cow<'_, str> {
    if value.chars().all(is_xml_char) {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(value.chars().filter(|c| is_xml_char(*c)).collect())
    }
}

/// A value needs a CDATA section when sanitizing it would change it
pub fn needs_cdata(value: &str) -> bool {
    sanitize_text(value) != value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("<p>Warm <b>light</b></p>"), "Warm light");
        assert_eq!(sanitize_text("line one\r\nline two"), "line one line two");
        assert_eq!(sanitize_text("  tabs\tand   spaces "), "tabs and spaces");
        assert_eq!(sanitize_text("plain"), "plain");
    }

    #[test]
    fn test_strip_invalid_xml_chars() {
        assert_eq!(strip_invalid_xml_chars("Line\u{0B}tab\u{1}"), "Linetab");
        assert_eq!(strip_invalid_xml_chars("a\u{FFFE}b\u{FFFF}c"), "abc");
        assert_eq!(strip_invalid_xml_chars("tab\tline\r\n"), "tab\tline\r\n");
        assert_eq!(strip_invalid_xml_chars("caf\u{e9} \u{1F600}"), "caf\u{e9} \u{1F600}");
        assert!(matches!(strip_invalid_xml_chars("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_needs_cdata() {
        assert!(needs_cdata("<p>html</p>"));
        assert!(needs_cdata("two\nlines"));
        assert!(needs_cdata(" padded"));
        assert!(!needs_cdata("Tom & Jerry"));
        assert!(!needs_cdata("19.99"));
        assert!(!needs_cdata(""));
    }
}
