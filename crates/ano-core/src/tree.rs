//! File tree and flat file index records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Leaf of a tree: a file with a defined size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

/// A node is a file iff it carries a size; anything else is a directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    File(FileEntry),
    Directory(Tree),
}

impl TreeNode {
    pub fn is_file(&self) -> bool {
        matches!(self, TreeNode::File(_))
    }

    pub fn as_file(&self) -> Option<&FileEntry> {
        match self {
            TreeNode::File(entry) => Some(entry),
            TreeNode::Directory(_) => None,
        }
    }

    pub fn as_directory(&self) -> Option<&Tree> {
        match self {
            TreeNode::Directory(tree) => Some(tree),
            TreeNode::File(_) => None,
        }
    }
}

/// Directory mapping of name -> node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tree(BTreeMap<String, TreeNode>);

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TreeNode)> {
        self.0.iter()
    }

    /// Insert a direct child, replacing any previous child with the same name.
    pub fn insert(&mut self, name: String, node: TreeNode) -> Option<TreeNode> {
        self.0.insert(name, node)
    }

    pub fn child(&self, name: &str) -> Option<&TreeNode> {
        self.0.get(name)
    }

    /// Look up a node by slash-separated path. The empty path is not a node.
    pub fn get(&self, path: &str) -> Option<&TreeNode> {
        let path = normalize_path(path);
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let mut node = self.0.get(segments.next()?)?;
        for segment in segments {
            node = node.as_directory()?.0.get(segment)?;
        }
        Some(node)
    }

    /// Subtree at `path`; the empty path is the tree itself.
    pub fn subtree(&self, path: &str) -> Option<&Tree> {
        if normalize_path(path).is_empty() {
            return Some(self);
        }
        self.get(path)?.as_directory()
    }

    /// Insert a file, creating intermediate directories.
    pub fn insert_file(&mut self, path: &str, entry: FileEntry) {
        let (dir, name) = split_path(path);
        if name.is_empty() {
            return;
        }
        self.directory_mut(&dir)
            .0
            .insert(name, TreeNode::File(entry));
    }

    /// Insert a directory (and its parents) if it does not exist yet.
    pub fn insert_dir(&mut self, path: &str) {
        self.directory_mut(path);
    }

    fn directory_mut(&mut self, path: &str) -> &mut Tree {
        let mut current = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let node = current
                .0
                .entry(segment.to_string())
                .or_insert_with(|| TreeNode::Directory(Tree::new()));
            if node.is_file() {
                // A later directory listing wins over a stale file entry
                *node = TreeNode::Directory(Tree::new());
            }
            current = match node {
                TreeNode::Directory(tree) => tree,
                TreeNode::File(_) => unreachable!("replaced above"),
            };
        }
        current
    }

    /// Build a tree from flat index records.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a FileRecord>) -> Self {
        let mut tree = Tree::new();
        for record in records {
            let full = record.full_path();
            match record.size {
                Some(size) => tree.insert_file(
                    &full,
                    FileEntry {
                        size,
                        sha: record.sha.clone(),
                    },
                ),
                None => tree.insert_dir(&full),
            }
        }
        tree
    }

    /// Flatten into index records, directories included.
    pub fn to_records(&self, repo_id: &str) -> Vec<FileRecord> {
        let mut records = Vec::new();
        self.collect_records(repo_id, "", &mut records);
        records
    }

    fn collect_records(&self, repo_id: &str, dir: &str, out: &mut Vec<FileRecord>) {
        for (name, node) in &self.0 {
            match node {
                TreeNode::File(entry) => out.push(FileRecord {
                    repo_id: repo_id.to_string(),
                    path: dir.to_string(),
                    name: name.clone(),
                    size: Some(entry.size),
                    sha: entry.sha.clone(),
                }),
                TreeNode::Directory(tree) => {
                    out.push(FileRecord {
                        repo_id: repo_id.to_string(),
                        path: dir.to_string(),
                        name: name.clone(),
                        size: None,
                        sha: None,
                    });
                    tree.collect_records(repo_id, &join_path(dir, name), out);
                }
            }
        }
    }

    pub fn file_count(&self) -> usize {
        self.0
            .values()
            .map(|node| match node {
                TreeNode::File(_) => 1,
                TreeNode::Directory(tree) => tree.file_count(),
            })
            .sum()
    }

    pub fn total_size(&self) -> u64 {
        self.0
            .values()
            .map(|node| match node {
                TreeNode::File(entry) => entry.size,
                TreeNode::Directory(tree) => tree.total_size(),
            })
            .sum()
    }
}

/// One entry of the persisted file index.
///
/// `path` is the directory portion ("" at the root) and `name` the leaf.
/// Directories are stored without a size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub repo_id: String,
    pub path: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

impl FileRecord {
    pub fn file(repo_id: &str, full_path: &str, size: u64, sha: Option<String>) -> Self {
        let (path, name) = split_path(full_path);
        Self {
            repo_id: repo_id.to_string(),
            path,
            name,
            size: Some(size),
            sha,
        }
    }

    pub fn directory(repo_id: &str, full_path: &str) -> Self {
        let (path, name) = split_path(full_path);
        Self {
            repo_id: repo_id.to_string(),
            path,
            name,
            size: None,
            sha: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.size.is_some()
    }

    pub fn full_path(&self) -> String {
        join_path(&self.path, &self.name)
    }
}

/// Trim surrounding whitespace and slashes and collapse empty segments.
pub fn normalize_path(path: &str) -> String {
    path.trim()
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Split a path into (directory, leaf name).
pub fn split_path(path: &str) -> (String, String) {
    let path = normalize_path(path);
    match path.rsplit_once('/') {
        Some((dir, name)) => (dir.to_string(), name.to_string()),
        None => (String::new(), path),
    }
}

pub fn join_path(dir: &str, name: &str) -> String {
    match (dir.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => dir.to_string(),
        (false, false) => format!("{}/{}", dir, name),
    }
}
