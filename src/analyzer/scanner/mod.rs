//! Repository scanning: tree walk, language guess, role classification.

pub mod file_scanner;
pub mod language;
pub mod role;
pub mod snapshot;

pub use file_scanner::RepositoryScanner;
pub use language::Language;
pub use role::{MANIFEST_FILES, RoleTag};
pub use snapshot::{ExtensionStats, FileRecord, RepositorySnapshot, SkippedEntry};

use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::types::Result;

/// Builds a [`RepositorySnapshot`] from a directory tree
pub trait Scanner: Send + Sync {
    fn scan(&self, root: &Path, excluded_dirs: &[String]) -> Result<RepositorySnapshot>;

    /// Same as [`Scanner::scan`], giving up with `Cancelled` once `cancel` fires
    fn scan_cancellable(
        &self,
        root: &Path,
        excluded_dirs: &[String],
        cancel: &CancellationToken,
    ) -> Result<RepositorySnapshot> {
        if cancel.is_cancelled() {
            return Err(crate::types::DocpilotError::cancelled("scan"));
        }
        self.scan(root, excluded_dirs)
    }
}
