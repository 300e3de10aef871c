//! Anonymized view of a file tree

use ano_core::{FileEntry, Tree, TreeNode};
use ano_redact::{TermSet, redact_path};

/// Length of the identifier exposed in place of a content hash
const SHORT_SHA_LEN: usize = 8;

/// Redact every segment of `tree`.
///
/// Files keep their size. With `include_sha` they get [`short_sha`] of the
/// original hash, never the hash itself. When two names redact to the same
/// key the later one (in name order) wins.
pub fn anonymize_tree(tree: &Tree, terms: &TermSet, include_sha: bool) -> Tree {
    let mut out = Tree::new();
    for (name, node) in tree.iter() {
        let (anonymized, _) = redact_path(name, terms);
        let node = match node {
            TreeNode::File(entry) => TreeNode::File(FileEntry {
                size: entry.size,
                sha: if include_sha {
                    entry.sha.as_deref().map(short_sha)
                } else {
                    None
                },
            }),
            TreeNode::Directory(children) => {
                TreeNode::Directory(anonymize_tree(children, terms, include_sha))
            }
        };
        if out.insert(anonymized.clone(), node).is_some() {
            tracing::debug!("Anonymized name {} collides, keeping the last entry", anonymized);
        }
    }
    out
}

/// Stable identifier derived from an original content hash
pub fn short_sha(sha: &str) -> String {
    let hex = blake3::hash(sha.as_bytes()).to_hex();
    hex[..SHORT_SHA_LEN].to_string()
}
