use ano_redact::{TermSet, redact_path};

pub fn handle(path: &str, terms: &[String], mask: &str) {
    let terms = TermSet::new(terms, mask);
    let (redacted, _) = redact_path(path, &terms);
    println!("{}", redacted);
}
