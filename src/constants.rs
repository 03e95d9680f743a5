//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Retry constants for generation-service calls
pub mod retry {
    /// Default number of retries after the first failed attempt
    pub const DEFAULT_MAX_RETRIES: u8 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 500;

    /// Maximum delay between retries (seconds)
    pub const MAX_DELAY_SECS: u64 = 30;

    /// Backoff multiplier
    pub const BACKOFF_FACTOR: f32 = 2.0;
}

/// Rate-limit gate constants
pub mod throttle {
    /// Pause applied when the service signals rate limiting without a Retry-After hint
    pub const DEFAULT_PAUSE_SECS: u64 = 20;

    /// Upper bound on any single pause, whatever the service advertises
    pub const MAX_PAUSE_SECS: u64 = 120;

    /// Random spread added to resume times so waiters do not all fire at once (milliseconds)
    pub const RESUME_JITTER_MS: u64 = 250;
}

/// Network constants
pub mod network {
    /// Default per-call timeout for the generation service (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;
}

/// Scan constants
pub mod scan {
    /// Files larger than this are listed but never read (1 MiB)
    pub const MAX_CONTENT_BYTES: u64 = 1024 * 1024;

    /// Maximum depth of the rendered directory tree
    pub const TREE_DEPTH: usize = 3;

    /// Maximum entries listed per directory in the rendered tree
    pub const TREE_ENTRIES_PER_DIR: usize = 20;

    /// Bytes read from an extensionless file to look for a shebang
    pub const SHEBANG_HEAD_BYTES: usize = 128;
}

/// Analysis constants
pub mod analysis {
    /// Total bytes of file excerpts sent for enrichment
    pub const ENRICHMENT_EXCERPT_BYTES: usize = 12 * 1024;

    /// Bytes taken from any single file for enrichment
    pub const EXCERPT_BYTES_PER_FILE: usize = 2 * 1024;

    /// Maximum public-surface names recorded per component
    pub const MAX_SURFACE_ITEMS: usize = 24;

    /// Bytes of each source file read for imports and public names
    pub const SOURCE_READ_BYTES: usize = 64 * 1024;

    /// Directory depth up to which conventional entry-point names count
    pub const ENTRY_POINT_MAX_DEPTH: usize = 2;
}

/// Pipeline constants
pub mod pipeline {
    /// Default bound on revise-loop iterations
    pub const DEFAULT_MAX_REVISIONS: u32 = 3;

    /// Default number of document tasks running at once
    pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

    /// Default cap on component documents per run
    pub const DEFAULT_MAX_COMPONENTS: usize = 12;

    /// Directory under the output dir holding checkpoints
    pub const STATE_DIR: &str = ".docpilot";

    /// Metrics artifact file name
    pub const METRICS_FILE: &str = "docpilot-metrics.json";
}

/// Quality constants
pub mod quality {
    /// Default score needed to accept a draft
    pub const DEFAULT_PASS_THRESHOLD: f32 = 0.7;

    /// Default number of identical consecutive drafts that counts as stalled
    pub const DEFAULT_STALL_WINDOW: usize = 2;

    /// Score weights (must sum to 1.0)
    pub mod weights {
        pub const SECTIONS: f32 = 0.5;
        pub const REFERENCES: f32 = 0.2;
        pub const LENGTH: f32 = 0.2;
        pub const FORMATTING: f32 = 0.1;
    }
}
