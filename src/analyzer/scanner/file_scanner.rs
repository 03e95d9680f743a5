use ignore::{DirEntry, WalkBuilder};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::snapshot::to_slash;
use super::{FileRecord, Language, RepositorySnapshot, RoleTag, Scanner, SkippedEntry};
use crate::config::ScanConfig;
use crate::constants::scan::SHEBANG_HEAD_BYTES;
use crate::types::{DocpilotError, Result};

/// Check the cancellation token every this many entries
const CANCEL_CHECK_INTERVAL: usize = 256;

/// Walks a repository and builds a [`RepositorySnapshot`].
///
/// Read-only: files are opened to confirm readability and, for
/// extensionless files, to read a shebang line.
#[derive(Debug, Clone, Default)]
pub struct RepositoryScanner {
    strict: bool,
    respect_gitignore: bool,
    skipped_paths: Vec<PathBuf>,
}

impl RepositoryScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            strict: config.strict,
            respect_gitignore: config.respect_gitignore,
            skipped_paths: Vec::new(),
        }
    }

    /// Abort on the first unreadable entry instead of skipping it
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Leave out one directory, matched by its location rather than its
    /// name. Paths outside the scanned root are ignored.
    pub fn skip_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.skipped_paths.push(path.into());
        self
    }

    /// `root` must be canonical
    fn walker(&self, root: &Path, excluded_dirs: &[String]) -> ignore::Walk {
        let excluded: HashSet<String> = excluded_dirs
            .iter()
            .map(|d| d.trim().trim_matches('/').to_string())
            .filter(|d| !d.is_empty())
            .collect();
        let skipped: Vec<PathBuf> = self
            .skipped_paths
            .iter()
            .filter_map(|path| relative_to(root, path))
            .collect();
        let walk_root = root.to_path_buf();

        WalkBuilder::new(root)
            .hidden(false)
            .ignore(false)
            .parents(self.respect_gitignore)
            .git_ignore(self.respect_gitignore)
            .git_global(false)
            .git_exclude(self.respect_gitignore)
            .require_git(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                !is_excluded(entry, &excluded) && !is_skipped(entry, &walk_root, &skipped)
            })
            .build()
    }

    fn unreadable(&self, path: &Path, root: &Path, reason: String, skipped: &mut Vec<SkippedEntry>) -> Result<()> {
        if self.strict {
            return Err(DocpilotError::Permission {
                path: path.to_path_buf(),
                message: reason,
            });
        }
        let relative = path
            .strip_prefix(root)
            .map(to_slash)
            .unwrap_or_else(|_| path.display().to_string());
        warn!(path = %relative, reason = %reason, "Skipping unreadable entry");
        skipped.push(SkippedEntry {
            path: relative,
            reason,
        });
        Ok(())
    }

    fn scan_inner(
        &self,
        root: &Path,
        excluded_dirs: &[String],
        cancel: Option<&CancellationToken>,
    ) -> Result<RepositorySnapshot> {
        let metadata = std::fs::metadata(root).map_err(|_| DocpilotError::NotFound {
            path: root.to_path_buf(),
        })?;
        if !metadata.is_dir() {
            return Err(DocpilotError::NotFound {
                path: root.to_path_buf(),
            });
        }
        let root = root.canonicalize()?;

        let mut files = Vec::new();
        let mut skipped = Vec::new();

        for (seen, result) in self.walker(&root, excluded_dirs).enumerate() {
            if seen % CANCEL_CHECK_INTERVAL == 0
                && let Some(token) = cancel
                && token.is_cancelled()
            {
                return Err(DocpilotError::cancelled("scan"));
            }

            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    let path = error_path(&err).unwrap_or_else(|| root.clone());
                    self.unreadable(&path, &root, err.to_string(), &mut skipped)?;
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let path = entry.path();
            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(err) => {
                    self.unreadable(path, &root, err.to_string(), &mut skipped)?;
                    continue;
                }
            };

            let file = match File::open(path) {
                Ok(file) => file,
                Err(err) => {
                    self.unreadable(path, &root, err.to_string(), &mut skipped)?;
                    continue;
                }
            };

            let Ok(relative) = path.strip_prefix(&root) else {
                continue;
            };

            let mut language_guess = Language::from_path(relative);
            if !language_guess.is_known() && relative.extension().is_none() {
                language_guess = read_shebang(file).unwrap_or_default();
            }

            files.push(FileRecord {
                path: to_slash(relative),
                size,
                language_guess,
                role_tag: RoleTag::classify(relative, language_guess),
            });
        }

        let snapshot = RepositorySnapshot::new(root, files, skipped);
        info!(
            root = %snapshot.root.display(),
            files = snapshot.total_files,
            bytes = snapshot.total_bytes,
            skipped = snapshot.skipped.len(),
            "Repository scanned"
        );
        Ok(snapshot)
    }
}

impl Scanner for RepositoryScanner {
    fn scan(&self, root: &Path, excluded_dirs: &[String]) -> Result<RepositorySnapshot> {
        self.scan_inner(root, excluded_dirs, None)
    }

    fn scan_cancellable(
        &self,
        root: &Path,
        excluded_dirs: &[String],
        cancel: &CancellationToken,
    ) -> Result<RepositorySnapshot> {
        self.scan_inner(root, excluded_dirs, Some(cancel))
    }
}

/// Exact segment match on the entry's own name; the walk root is never excluded
fn is_excluded(entry: &DirEntry, excluded: &HashSet<String>) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let excluded_here = entry
        .file_name()
        .to_str()
        .is_some_and(|name| excluded.contains(name));
    if excluded_here {
        debug!(path = %entry.path().display(), "Excluded");
    }
    excluded_here
}

/// Location of `path` under the canonical `root`, if it is strictly inside
fn relative_to(root: &Path, path: &Path) -> Option<PathBuf> {
    let absolute = path
        .canonicalize()
        .or_else(|_| std::path::absolute(path))
        .ok()?;
    let relative = absolute.strip_prefix(root).ok()?;
    (!relative.as_os_str().is_empty()).then(|| relative.to_path_buf())
}

fn is_skipped(entry: &DirEntry, root: &Path, skipped: &[PathBuf]) -> bool {
    if skipped.is_empty() || entry.depth() == 0 {
        return false;
    }
    let hit = entry
        .path()
        .strip_prefix(root)
        .is_ok_and(|relative| skipped.iter().any(|s| s == relative));
    if hit {
        debug!(path = %entry.path().display(), "Skipped output directory");
    }
    hit
}

fn read_shebang(file: File) -> Option<Language> {
    let mut head = Vec::with_capacity(SHEBANG_HEAD_BYTES);
    file.take(SHEBANG_HEAD_BYTES as u64).read_to_end(&mut head).ok()?;
    let head = String::from_utf8_lossy(&head);
    let first_line = head.lines().next()?;
    let lang = Language::from_shebang(first_line);
    lang.is_known().then_some(lang)
}

fn error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        ignore::Error::Partial(errs) => errs.iter().find_map(error_path),
        _ => None,
    }
}
