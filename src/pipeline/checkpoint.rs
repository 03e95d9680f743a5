//! Checkpoint Management
//!
//! Persists the mandatory-stage results under `<output_dir>/.docpilot/` so a
//! later `docs --resume` can skip scanning and analysis of the same tree.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::state::WorkflowState;
use crate::analyzer::{AnalysisReport, RepositorySnapshot};
use crate::constants::pipeline::STATE_DIR;
use crate::types::{DocpilotError, Result};

/// Current checkpoint format version
pub const CHECKPOINT_VERSION: u32 = 1;

const SNAPSHOT_FILE: &str = "snapshot.json";
const ANALYSIS_FILE: &str = "analysis.json";
const STATE_FILE: &str = "workflow_state.json";

/// On-disk envelope: every checkpoint file names its version and tree
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    repo_root: PathBuf,
    data: T,
}

/// Scan and analysis restored from a previous run
#[derive(Debug, Clone)]
pub struct Restored {
    pub snapshot: RepositorySnapshot,
    pub report: Option<AnalysisReport>,
}

pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            dir: output_dir.join(STATE_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_snapshot(&self, root: &Path, snapshot: &RepositorySnapshot) -> Result<()> {
        self.write(SNAPSHOT_FILE, root, snapshot)
    }

    pub fn save_analysis(&self, root: &Path, report: &AnalysisReport) -> Result<()> {
        self.write(ANALYSIS_FILE, root, report)
    }

    pub fn save_state(&self, root: &Path, state: &WorkflowState) -> Result<()> {
        self.write(STATE_FILE, root, state)
    }

    /// Load whatever was persisted for `root`.
    ///
    /// Returns `None` when there is no snapshot, or when the checkpoint
    /// belongs to a different tree. An analysis is only returned alongside
    /// the snapshot it was derived from.
    pub fn restore(&self, root: &Path) -> Result<Option<Restored>> {
        let Some(snapshot) = self.read::<RepositorySnapshot>(SNAPSHOT_FILE, root)? else {
            return Ok(None);
        };
        let report = self.read::<AnalysisReport>(ANALYSIS_FILE, root)?;
        info!(
            files = snapshot.total_files,
            analysis = report.is_some(),
            "Resuming from checkpoint"
        );
        Ok(Some(Restored { snapshot, report }))
    }

    pub fn load_state(&self, root: &Path) -> Result<Option<WorkflowState>> {
        self.read(STATE_FILE, root)
    }

    /// Drop persisted analysis; called when a fresh scan replaces the snapshot
    pub fn invalidate_analysis(&self) -> Result<()> {
        let path = self.dir.join(ANALYSIS_FILE);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn write<T: Serialize>(&self, name: &str, root: &Path, data: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let envelope = Envelope {
            version: CHECKPOINT_VERSION,
            repo_root: canonical(root),
            data,
        };
        let path = self.dir.join(name);
        // write then rename so an interrupted run never leaves half a file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&envelope)?)?;
        fs::rename(&tmp, &path)?;
        debug!(file = name, "Checkpoint saved");
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, name: &str, root: &Path) -> Result<Option<T>> {
        let path = self.dir.join(name);
        if !path.is_file() {
            return Ok(None);
        }
        // version and root are checked before the payload is typed
        let envelope: Envelope<serde_json::Value> = serde_json::from_slice(&fs::read(&path)?)?;

        if envelope.version > CHECKPOINT_VERSION {
            return Err(DocpilotError::Validation(format!(
                "checkpoint {} has version {}, newer than supported version {}",
                path.display(),
                envelope.version,
                CHECKPOINT_VERSION
            )));
        }
        if envelope.repo_root != canonical(root) {
            warn!(
                file = name,
                checkpoint_root = %envelope.repo_root.display(),
                "Checkpoint belongs to another repository, ignoring"
            );
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(envelope.data)?))
    }
}

fn canonical(root: &Path) -> PathBuf {
    root.canonicalize().unwrap_or_else(|_| root.to_path_buf())
}
