use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::{Language, RoleTag};
use crate::types::Result;

/// One regular file found by the scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Root-relative, `/`-separated
    pub path: String,
    pub size: u64,
    pub language_guess: Language,
    pub role_tag: RoleTag,
}

impl FileRecord {
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Parent directory, empty for files at the root
    pub fn dir(&self) -> &str {
        self.path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        name.rsplit_once('.')
            .filter(|(stem, _)| !stem.is_empty())
            .map(|(_, ext)| ext)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionStats {
    pub files: usize,
    pub bytes: u64,
}

/// Entry the scanner could not read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: String,
}

/// Immutable inventory of a scanned repository.
///
/// Files are sorted by path, so lookups binary-search and serialized
/// snapshots of the same tree compare equal apart from `scanned_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    pub root: PathBuf,
    pub files: Vec<FileRecord>,
    pub total_files: usize,
    pub total_bytes: u64,
    pub by_extension: BTreeMap<String, ExtensionStats>,
    pub by_language: BTreeMap<String, usize>,
    #[serde(default)]
    pub skipped: Vec<SkippedEntry>,
    pub scanned_at: DateTime<Utc>,
}

impl RepositorySnapshot {
    /// Build a snapshot, computing every aggregate from `files`
    pub fn new(root: PathBuf, mut files: Vec<FileRecord>, skipped: Vec<SkippedEntry>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files.dedup_by(|a, b| a.path == b.path);

        let mut by_extension: BTreeMap<String, ExtensionStats> = BTreeMap::new();
        let mut by_language: BTreeMap<String, usize> = BTreeMap::new();
        for file in &files {
            let ext = file
                .extension()
                .map(str::to_lowercase)
                .unwrap_or_else(|| "(none)".to_string());
            let stats = by_extension.entry(ext).or_default();
            stats.files += 1;
            stats.bytes += file.size;
            *by_language
                .entry(file.language_guess.tag().to_string())
                .or_default() += 1;
        }

        Self {
            root,
            total_files: files.len(),
            total_bytes: files.iter().map(|f| f.size).sum(),
            files,
            by_extension,
            by_language,
            skipped,
            scanned_at: Utc::now(),
        }
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files
            .binary_search_by(|f| f.path.as_str().cmp(path))
            .ok()
            .map(|idx| &self.files[idx])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn with_role(&self, role: RoleTag) -> impl Iterator<Item = &FileRecord> {
        self.files.iter().filter(move |f| f.role_tag == role)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Read up to `limit` bytes of a file as text.
    ///
    /// Returns `None` for files not in the snapshot, larger than
    /// `max_size`, or not valid UTF-8.
    pub fn read_text(&self, path: &str, max_size: u64, limit: usize) -> Result<Option<String>> {
        let Some(record) = self.get(path) else {
            return Ok(None);
        };
        if record.size > max_size {
            return Ok(None);
        }

        let file = std::fs::File::open(self.root.join(path))?;
        let mut buf = Vec::with_capacity(limit.min(record.size as usize));
        file.take(limit as u64).read_to_end(&mut buf)?;

        match String::from_utf8(buf) {
            Ok(text) => Ok(Some(text)),
            // a cut may land inside a multi-byte char
            Err(err) => {
                let valid = err.utf8_error().valid_up_to();
                if err.utf8_error().error_len().is_none() && valid > 0 {
                    let mut bytes = err.into_bytes();
                    bytes.truncate(valid);
                    Ok(String::from_utf8(bytes).ok())
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Render the file list as an indented tree, limited in depth and width
    pub fn directory_tree(&self, max_depth: usize, max_entries: usize) -> String {
        let mut tree = TreeNode::default();
        for file in &self.files {
            let mut node = &mut tree;
            for segment in file.path.split('/') {
                node = node.children.entry(segment.to_string()).or_default();
            }
        }

        let root_name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string());
        let mut out = format!("{root_name}/\n");
        render(&tree, "", 0, max_depth, max_entries, &mut out);
        out
    }
}

/// Join path components with `/`
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Default)]
struct TreeNode {
    children: BTreeMap<String, TreeNode>,
}

fn render(
    node: &TreeNode,
    prefix: &str,
    depth: usize,
    max_depth: usize,
    max_entries: usize,
    out: &mut String,
) {
    let total = node.children.len();
    let shown = total.min(max_entries);

    for (i, (name, child)) in node.children.iter().take(shown).enumerate() {
        let last = i + 1 == total;
        let (branch, indent) = if last { ("└── ", "    ") } else { ("├── ", "│   ") };
        let is_dir = !child.children.is_empty();

        out.push_str(prefix);
        out.push_str(branch);
        out.push_str(name);
        if is_dir {
            out.push('/');
        }
        out.push('\n');

        if is_dir {
            if depth + 1 < max_depth {
                render(child, &format!("{prefix}{indent}"), depth + 1, max_depth, max_entries, out);
            } else {
                out.push_str(&format!("{prefix}{indent}└── ...\n"));
            }
        }
    }

    if total > shown {
        out.push_str(&format!("{prefix}└── ... ({} more)\n", total - shown));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, size: u64) -> FileRecord {
        let language_guess = Language::from_path(path);
        FileRecord {
            path: path.to_string(),
            size,
            language_guess,
            role_tag: RoleTag::classify(Path::new(path), language_guess),
        }
    }

    fn sample() -> RepositorySnapshot {
        RepositorySnapshot::new(
            PathBuf::from("/tmp/repo"),
            vec![
                record("src/util.py", 20),
                record("README.md", 100),
                record("src/main.py", 30),
            ],
            vec![],
        )
    }

    #[test]
    fn test_aggregates() {
        let snapshot = sample();
        assert_eq!(snapshot.total_files, 3);
        assert_eq!(snapshot.total_bytes, 150);
        assert_eq!(snapshot.by_language.get("python"), Some(&2));
        assert_eq!(snapshot.by_extension["py"], ExtensionStats { files: 2, bytes: 50 });
        assert_eq!(snapshot.files[0].path, "README.md");
    }

    #[test]
    fn test_lookup() {
        let snapshot = sample();
        assert!(snapshot.contains("src/main.py"));
        assert!(!snapshot.contains("src/missing.py"));
        assert_eq!(snapshot.get("src/util.py").map(|f| f.size), Some(20));
        assert_eq!(snapshot.with_role(RoleTag::Source).count(), 2);
    }

    #[test]
    fn test_record_helpers() {
        let r = record("src/pkg/mod.rs", 1);
        assert_eq!(r.file_name(), "mod.rs");
        assert_eq!(r.dir(), "src/pkg");
        assert_eq!(r.extension(), Some("rs"));
        assert_eq!(record(".gitignore", 1).extension(), None);
        assert_eq!(record("Makefile", 1).dir(), "");
    }

    #[test]
    fn test_directory_tree() {
        let tree = sample().directory_tree(3, 20);
        assert!(tree.starts_with("repo/\n"));
        assert!(tree.contains("├── README.md"));
        assert!(tree.contains("└── src/"));
        assert!(tree.contains("    ├── main.py"));
        assert!(tree.contains("    └── util.py"));
    }

    #[test]
    fn test_directory_tree_truncates() {
        let files = (0..5).map(|i| record(&format!("f{i}.txt"), 1)).collect();
        let snapshot = RepositorySnapshot::new(PathBuf::from("/r"), files, vec![]);
        let tree = snapshot.directory_tree(3, 2);
        assert!(tree.contains("... (3 more)"));
    }

    #[test]
    fn test_read_text_respects_limits() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello world").unwrap();
        let snapshot = RepositorySnapshot::new(
            dir.path().to_path_buf(),
            vec![record("a.txt", 11)],
            vec![],
        );

        assert_eq!(snapshot.read_text("a.txt", 100, 5).unwrap().as_deref(), Some("hello"));
        assert_eq!(snapshot.read_text("a.txt", 10, 100).unwrap(), None);
        assert_eq!(snapshot.read_text("b.txt", 100, 100).unwrap(), None);
    }
}
