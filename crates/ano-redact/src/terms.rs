//! Term matchers compiled from user input
//!
//! A term is first tried as a regular expression, which also matches the
//! term's literal text. If it does not compile on its own it is escaped and
//! compiled as a literal. Word boundaries apply only on edges where the term
//! starts or ends with a word character. Compilation never fails
//! outward: a term that cannot be compiled even escaped falls back to a
//! case-insensitive literal scan.

use regex::{Captures, Regex, RegexBuilder};

const SIZE_LIMIT: usize = 1 << 24;

/// Whole-word, case-insensitive matcher for one term
#[derive(Debug, Clone)]
pub struct TermMatcher {
    index: usize,
    mask: String,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Regex(Regex),
    Literal(String),
}

impl TermMatcher {
    /// Compile a term. `index` is 1-based and becomes the mask suffix.
    ///
    /// Returns `None` for blank terms, which never redact anything.
    pub fn new(term: &str, index: usize, mask: &str) -> Option<Self> {
        if term.trim().is_empty() {
            return None;
        }
        Some(Self {
            index,
            mask: format!("{}-{}", mask, index),
            matcher: compile(term),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Mask substituted for this term (`<mask>-<index>`)
    pub fn mask(&self) -> &str {
        &self.mask
    }

    /// Whether the haystack contains the term as a whole word
    pub fn is_match(&self, haystack: &str) -> bool {
        match &self.matcher {
            Matcher::Regex(re) => re.find_iter(haystack).any(|m| !m.as_str().is_empty()),
            Matcher::Literal(needle) => literal_matches(haystack, needle).next().is_some(),
        }
    }

    /// Replace every whole-word occurrence with `replacement`.
    ///
    /// Returns `None` when nothing was replaced. Empty matches are ignored.
    pub fn replace_all(&self, text: &str, replacement: &str) -> Option<String> {
        match &self.matcher {
            Matcher::Regex(re) => {
                let mut hits = 0usize;
                let replaced = re.replace_all(text, |caps: &Captures| {
                    let matched = &caps[0];
                    if matched.is_empty() {
                        String::new()
                    } else {
                        hits += 1;
                        replacement.to_string()
                    }
                });
                if hits == 0 {
                    None
                } else {
                    Some(replaced.into_owned())
                }
            }
            Matcher::Literal(needle) => {
                let ranges: Vec<_> = literal_matches(text, needle).collect();
                if ranges.is_empty() {
                    return None;
                }
                let mut out = String::with_capacity(text.len());
                let mut last = 0;
                for (start, end) in ranges {
                    out.push_str(&text[last..start]);
                    out.push_str(replacement);
                    last = end;
                }
                out.push_str(&text[last..]);
                Some(out)
            }
        }
    }
}

/// Compile `fragment` for a term whose edges decide the word boundaries.
///
/// `\b` is only required on an edge where the term starts or ends with a word
/// character; `@secretorg` or `Jane Doe (MIT)` would otherwise never match.
fn build(term: &str, fragment: &str) -> Result<Regex, regex::Error> {
    let start = if term.chars().next().is_some_and(is_word_char) {
        r"\b"
    } else {
        ""
    };
    let end = if term.chars().next_back().is_some_and(is_word_char) {
        r"\b"
    } else {
        ""
    };
    RegexBuilder::new(&format!("{}(?:{}){}", start, fragment, end))
        .case_insensitive(true)
        .size_limit(SIZE_LIMIT)
        .build()
}

fn compile(term: &str) -> Matcher {
    // The term must be valid on its own; wrapping could otherwise turn an
    // unbalanced term such as `a)(b` into a different, valid pattern.
    let standalone_ok = RegexBuilder::new(term)
        .size_limit(SIZE_LIMIT)
        .build()
        .is_ok();
    let escaped = regex::escape(term);
    if standalone_ok {
        // The term's own text matches too, so `Jane Doe (MIT)` is found as written
        let fragment = if escaped == term {
            escaped.clone()
        } else {
            format!("{}|{}", term, escaped)
        };
        if let Ok(re) = build(term, &fragment) {
            return Matcher::Regex(re);
        }
    }

    match build(term, &escaped) {
        Ok(re) => {
            tracing::debug!("Term is not a valid pattern, matching it literally");
            Matcher::Regex(re)
        }
        Err(e) => {
            tracing::warn!("Escaped term failed to compile ({}), using literal scan", e);
            Matcher::Literal(term.to_ascii_lowercase())
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte ranges of whole-word, ASCII-case-insensitive occurrences
fn literal_matches<'a>(haystack: &'a str, needle: &'a str) -> impl Iterator<Item = (usize, usize)> + 'a {
    let lowered = haystack.to_ascii_lowercase();
    let mut ranges = Vec::new();
    let mut from = 0;
    while let Some(pos) = lowered[from..].find(needle) {
        let start = from + pos;
        let end = start + needle.len();
        let before_ok = !needle.starts_with(is_word_char)
            || haystack[..start]
                .chars()
                .next_back()
                .is_none_or(|c| !is_word_char(c));
        let after_ok = !needle.ends_with(is_word_char)
            || haystack[end..].chars().next().is_none_or(|c| !is_word_char(c));
        if before_ok && after_ok {
            ranges.push((start, end));
            from = end;
        } else {
            from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
        }
        if from >= lowered.len() {
            break;
        }
    }
    ranges.into_iter()
}

/// Ordered set of term matchers
#[derive(Debug, Clone, Default)]
pub struct TermSet {
    matchers: Vec<TermMatcher>,
}

impl TermSet {
    /// Compile terms in order. Blank terms keep their position in the
    /// numbering but never match.
    pub fn new(terms: &[String], mask: &str) -> Self {
        let matchers = terms
            .iter()
            .enumerate()
            .filter_map(|(i, term)| TermMatcher::new(term, i + 1, mask))
            .collect();
        Self { matchers }
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TermMatcher> {
        self.matchers.iter()
    }
}

/// Recognizes mask tokens (`<mask>` with an optional `-<n>` suffix)
#[derive(Debug, Clone)]
pub struct MaskPattern {
    mask: String,
    token: Option<Regex>,
}

impl MaskPattern {
    pub fn new(mask: &str) -> Self {
        let token = Regex::new(&format!(r"{}(?:-\d+)?", regex::escape(mask))).ok();
        Self {
            mask: mask.to_string(),
            token,
        }
    }

    pub fn mask(&self) -> &str {
        &self.mask
    }

    pub fn is_present(&self, s: &str) -> bool {
        s.contains(&self.mask)
    }

    /// Anchored pattern where each mask token is a non-empty wildcard and
    /// everything else is literal.
    pub fn wildcard_pattern(&self, s: &str, wildcard: &str) -> String {
        let mut pattern = String::from("^");
        let mut last = 0;
        if let Some(token) = &self.token {
            for m in token.find_iter(s) {
                pattern.push_str(&regex::escape(&s[last..m.start()]));
                pattern.push_str(wildcard);
                last = m.end();
            }
        }
        pattern.push_str(&regex::escape(&s[last..]));
        pattern.push('$');
        pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_term() {
        let term = TermMatcher::new("secret-?org", 1, "XXXX").unwrap();
        assert!(term.is_match("from Secret-Org with love"));
        assert!(term.is_match("SECRETORG"));
        assert_eq!(
            term.replace_all("Secret-Org.txt and SECRETORG.txt", "XXXX-1").unwrap(),
            "XXXX-1.txt and XXXX-1.txt"
        );
    }

    #[test]
    fn test_whole_word_only() {
        let term = TermMatcher::new("org", 2, "XXXX").unwrap();
        assert!(!term.is_match("organization"));
        assert_eq!(term.replace_all("organization", "XXXX-2"), None);
        assert_eq!(term.replace_all("my org.", "XXXX-2").unwrap(), "my XXXX-2.");
        assert_eq!(term.mask(), "XXXX-2");
    }

    #[test]
    fn test_non_word_edges() {
        let term = TermMatcher::new("@secretorg", 1, "XXXX").unwrap();
        assert_eq!(
            term.replace_all("cc @secretorg, @SecretOrg2", "M").unwrap(),
            "cc M, @SecretOrg2"
        );

        let term = TermMatcher::new("secretorg.", 1, "XXXX").unwrap();
        assert_eq!(
            term.replace_all("see secretorg. and mysecretorg.", "M").unwrap(),
            "see M and mysecretorg."
        );

        let term = TermMatcher::new("Jane Doe (MIT)", 1, "XXXX").unwrap();
        assert!(term.is_match("Author: Jane Doe (MIT)"));
        assert_eq!(
            term.replace_all("by jane doe (mit).", "M").unwrap(),
            "by M."
        );
    }

    #[test]
    fn test_invalid_regex_is_escaped() {
        let term = TermMatcher::new("john(doe", 1, "XXXX").unwrap();
        assert_eq!(
            term.replace_all("by john(doe here", "XXXX-1").unwrap(),
            "by XXXX-1 here"
        );

        let term = TermMatcher::new("a)(b", 1, "XXXX").unwrap();
        assert_eq!(term.replace_all("x a)(b y", "M").unwrap(), "x M y");
        assert_eq!(term.replace_all("x a b y", "M"), None);
    }

    #[test]
    fn test_blank_terms_are_skipped_but_keep_numbering() {
        let terms = vec!["  ".to_string(), "acme".to_string()];
        let set = TermSet::new(&terms, "XXXX");
        let matchers: Vec<_> = set.iter().collect();
        assert_eq!(matchers.len(), 1);
        assert_eq!(matchers[0].mask(), "XXXX-2");
    }

    #[test]
    fn test_empty_matches_are_ignored() {
        let term = TermMatcher::new("x*", 1, "XXXX").unwrap();
        assert_eq!(term.replace_all("hello world", "M"), None);
        assert_eq!(term.replace_all("a xx b", "M").unwrap(), "a M b");
    }

    #[test]
    fn test_literal_fallback() {
        let matcher = TermMatcher {
            index: 1,
            mask: "XXXX-1".to_string(),
            matcher: Matcher::Literal("acme".to_string()),
        };
        assert!(matcher.is_match("by ACME corp"));
        assert!(!matcher.is_match("acmeish"));
        assert_eq!(
            matcher.replace_all("Acme, acme_x and acme", "M").unwrap(),
            "M, acme_x and M"
        );

        let matcher = TermMatcher {
            index: 1,
            mask: "XXXX-1".to_string(),
            matcher: Matcher::Literal("@acme".to_string()),
        };
        assert_eq!(matcher.replace_all("cc @acme.", "M").unwrap(), "cc M.");
        assert!(!matcher.is_match("cc @acmeish"));
    }

    #[test]
    fn test_mask_pattern() {
        let mask = MaskPattern::new("XXXX");
        assert!(mask.is_present("src/XXXX-1/util.py"));
        assert!(!mask.is_present("src/util.py"));
        assert_eq!(mask.wildcard_pattern("XXXX-1.txt", ".+"), r"^.+\.txt$");
        assert_eq!(
            mask.wildcard_pattern("a-XXXX-12-XXXX", ".+"),
            r"^a\-.+\-.+$"
        );
    }
}
