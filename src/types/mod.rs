pub mod error;

pub use error::{DocpilotError, ErrorCategory, ErrorClassifier, Result, ServiceError};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Document Kinds
// =============================================================================

/// Kind of document the pipeline can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocKind {
    Readme,
    Api,
    Component,
}

impl DocKind {
    pub const ALL: [DocKind; 3] = [DocKind::Readme, DocKind::Api, DocKind::Component];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Readme => "readme",
            Self::Api => "api",
            Self::Component => "component",
        }
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocKind {
    type Err = DocpilotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "readme" => Ok(Self::Readme),
            "api" => Ok(Self::Api),
            "component" | "components" => Ok(Self::Component),
            other => Err(DocpilotError::Config(format!(
                "Unknown document kind '{}'. Valid values: readme, api, component",
                other
            ))),
        }
    }
}
