use crate::terms::TermSet;
use lazy_static::lazy_static;
use regex::{Captures, Regex, RegexBuilder};
use std::borrow::Cow;

lazy_static! {
    static ref IMAGE: Regex = Regex::new(r#"!\[[^\]]*\]\([^)"]*(?:"[^"]*")?\s*\)"#).unwrap();
    static ref URL: Regex = Regex::new(
        r"<?\b((?:https?|ftps?|file)://)[-A-Za-z0-9+&@#/%?=~_|!:,.;]+[-A-Za-z0-9+&@#/%=~_|]\b/?>?"
    )
    .unwrap();
}

/// Links back to the source repository, rewritten to the anonymized viewer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfLink {
    /// `owner/name`
    pub repository: String,
    pub branch: String,
    pub app_hostname: String,
    pub repo_id: String,
}

impl SelfLink {
    pub fn target(&self) -> String {
        format!("https://{}/r/{}", self.app_hostname, self.repo_id)
    }

    /// Raw, blob and tree links before the bare repository link, so the
    /// longer forms are never half-rewritten.
    fn patterns(&self) -> Vec<Regex> {
        let repo = regex::escape(&self.repository);
        let branch = regex::escape(&self.branch);
        let repo_end = word_end(&self.repository);
        let branch_end = word_end(&self.branch);
        [
            format!(r"https://raw\.githubusercontent\.com/{repo}/{branch}{branch_end}"),
            format!(r"https://github\.com/{repo}/blob/{branch}{branch_end}"),
            format!(r"https://github\.com/{repo}/tree/{branch}{branch_end}"),
            format!(r"https://github\.com/{repo}{repo_end}"),
        ]
        .iter()
        .filter_map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| tracing::warn!("Skipping self-link pattern: {}", e))
                .ok()
        })
        .collect()
    }
}

fn word_end(s: &str) -> &'static str {
    match s.chars().last() {
        Some(c) if c.is_alphanumeric() || c == '_' => r"\b",
        _ => "",
    }
}

#[derive(Debug, Clone)]
pub struct AnonymizerOptions {
    pub mask: String,
    pub terms: Vec<String>,
    pub redact_images: bool,
    pub redact_links: bool,
    pub self_link: Option<SelfLink>,
}

impl Default for AnonymizerOptions {
    fn default() -> Self {
        Self {
            mask: "XXXX".to_string(),
            terms: Vec::new(),
            redact_images: true,
            redact_links: true,
            self_link: None,
        }
    }
}

/// Outcome of redacting one piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redaction<'a> {
    pub text: Cow<'a, str>,
    /// Non-zero when any rule changed the text
    pub count: usize,
}

impl Redaction<'_> {
    pub fn modified(&self) -> bool {
        self.count > 0
    }
}

/// Content redaction engine.
///
/// Rules are applied in a fixed order: images, links, self-links, terms.
#[derive(Debug, Clone)]
pub struct ContentAnonymizer {
    mask: String,
    redact_images: bool,
    redact_links: bool,
    self_links: Vec<Regex>,
    self_link_target: String,
    terms: TermSet,
}

impl ContentAnonymizer {
    pub fn new(options: &AnonymizerOptions) -> Self {
        let (self_links, self_link_target) = match &options.self_link {
            Some(link) => (link.patterns(), link.target()),
            None => (Vec::new(), String::new()),
        };
        Self {
            mask: options.mask.clone(),
            redact_images: options.redact_images,
            redact_links: options.redact_links,
            self_links,
            self_link_target,
            terms: TermSet::new(&options.terms, &options.mask),
        }
    }

    pub fn terms(&self) -> &TermSet {
        &self.terms
    }

    /// Redact a piece of text
    pub fn anonymize<'a>(&self, content: &'a str) -> Redaction<'a> {
        let mut text = Cow::Borrowed(content);
        let mut count = 0;

        if self.redact_images {
            count += replace_with(&IMAGE, &mut text, |_| Some(self.mask.clone()));
        }
        if self.redact_links {
            count += replace_with(&URL, &mut text, |_| Some(self.mask.clone()));
        }
        for pattern in &self.self_links {
            count += replace_with(pattern, &mut text, |_| Some(self.self_link_target.clone()));
        }

        for term in self.terms.iter() {
            // Whole URLs mentioning the term go first, then the bare word
            count += replace_with(&URL, &mut text, |caps| {
                term.is_match(&caps[0]).then(|| term.mask().to_string())
            });
            if let Some(replaced) = term.replace_all(&text, term.mask()) {
                text = Cow::Owned(replaced);
                count += 1;
            }
        }

        Redaction { text, count }
    }
}

/// Replace matches for which `f` returns a replacement; returns how many
/// were replaced.
fn replace_with<F>(re: &Regex, text: &mut Cow<'_, str>, mut f: F) -> usize
where
    F: FnMut(&Captures) -> Option<String>,
{
    let mut hits = 0;
    let replaced = match re.replace_all(&**text, |caps: &Captures| match f(caps) {
        Some(replacement) => {
            hits += 1;
            replacement
        }
        None => caps[0].to_string(),
    }) {
        Cow::Owned(s) if hits > 0 => Some(s),
        _ => None,
    };
    if let Some(s) = replaced {
        *text = Cow::Owned(s);
    }
    hits
}

/// Redact terms in a repository path.
///
/// Only the word rule applies: paths carry no images or links.
pub fn redact_path(path: &str, terms: &TermSet) -> (String, bool) {
    let mut out = Cow::Borrowed(path);
    for term in terms.iter() {
        if let Some(replaced) = term.replace_all(&out, term.mask()) {
            out = Cow::Owned(replaced);
        }
    }
    let modified = matches!(out, Cow::Owned(_));
    (out.into_owned(), modified)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anonymizer(terms: &[&str], images: bool, links: bool) -> ContentAnonymizer {
        ContentAnonymizer::new(&AnonymizerOptions {
            terms: terms.iter().map(|s| s.to_string()).collect(),
            redact_images: images,
            redact_links: links,
            ..Default::default()
        })
    }

    #[test]
    fn test_terms_are_numbered() {
        let a = anonymizer(&["secretorg", "Jane Doe"], false, false);
        let out = a.anonymize("Author: Jane Doe, secretorg. JANE DOE again.");
        assert_eq!(out.text, "Author: XXXX-2, XXXX-1. XXXX-2 again.");
        assert!(out.modified());
    }

    #[test]
    fn test_images_then_links() {
        let a = anonymizer(&["secretorg"], true, true);
        let out =
            a.anonymize("See ![logo](https://example.com/logo.png) and visit http://example.com/secretorg");
        assert_eq!(out.text, "See XXXX and visit XXXX");
    }

    #[test]
    fn test_url_with_term_is_fully_masked() {
        let a = anonymizer(&["secretorg"], false, false);
        let out = a.anonymize("clone https://gitlab.com/secretorg/tool.git today");
        assert_eq!(out.text, "clone XXXX-1 today");

        let out = a.anonymize("docs at https://example.com/guide");
        assert_eq!(out.text, "docs at https://example.com/guide");
        assert!(!out.modified());
    }

    #[test]
    fn test_image_with_title() {
        let a = anonymizer(&[], true, false);
        let out = a.anonymize(r#"![alt text](img/a.png "Title") done"#);
        assert_eq!(out.text, "XXXX done");
    }

    #[test]
    fn test_self_links() {
        let a = ContentAnonymizer::new(&AnonymizerOptions {
            terms: vec!["secretorg".to_string()],
            redact_links: false,
            self_link: Some(SelfLink {
                repository: "secretorg/tool".to_string(),
                branch: "main".to_string(),
                app_hostname: "anon.example".to_string(),
                repo_id: "abc123".to_string(),
            }),
            ..Default::default()
        });
        let out = a.anonymize(
            "raw https://raw.githubusercontent.com/secretorg/tool/main/a.png \
             blob https://github.com/SecretOrg/Tool/blob/main/README.md \
             home https://github.com/secretorg/tool",
        );
        assert_eq!(
            out.text,
            "raw https://anon.example/r/abc123/a.png \
             blob https://anon.example/r/abc123/README.md \
             home https://anon.example/r/abc123"
        );
    }

    #[test]
    fn test_no_terms_no_change() {
        let a = anonymizer(&[], false, false);
        let out = a.anonymize("plain text");
        assert!(matches!(out.text, Cow::Borrowed(_)));
        assert_eq!(out.count, 0);
    }

    #[test]
    fn test_redact_path() {
        let terms = TermSet::new(&["secretorg".to_string()], "XXXX");
        assert_eq!(
            redact_path("src/secretorg/util.py", &terms),
            ("src/XXXX-1/util.py".to_string(), true)
        );
        assert_eq!(redact_path("src/util.py", &terms), ("src/util.py".to_string(), false));
    }
}
