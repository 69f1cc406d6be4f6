//! Error taxonomy for the update pipeline.
//!
//! Every component propagates one of these unchanged to the orchestrator.
//! Messages carry the nested diagnostic verbatim so the operator sees the
//! real cause (HTTP status, tool stderr, the file pair that failed to copy).

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::upgrade::PipelineState;

#[derive(Debug, Error)]
pub enum UpdateError {
    /// Feed query, metadata query or download transport failure,
    /// including non-2xx HTTP status.
    #[error("{context}: {source}")]
    Network {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("no weekly build found")]
    NoBuildFound,

    /// Every extraction strategy was attempted and failed.
    #[error(
        "could not extract {}: first strategy failed with: {first}; last strategy failed with: {last}",
        archive.display()
    )]
    Extraction {
        archive: PathBuf,
        first: String,
        last: String,
    },

    #[error("{context}: {source}")]
    Filesystem {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("installation folder not specified")]
    InstallDirNotSet,

    #[error("an update is already running")]
    Busy,

    #[error("update worker exited without a result")]
    WorkerLost,

    #[error("invalid pipeline transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: PipelineState,
        to: PipelineState,
    },
}

impl UpdateError {
    pub fn network(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        UpdateError::Network {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn filesystem(context: impl Into<String>, source: io::Error) -> Self {
        UpdateError::Filesystem {
            context: context.into(),
            source,
        }
    }

    /// Failure copying or creating `dst` from `src` during a merge.
    pub fn copy(src: &Path, dst: &Path, source: io::Error) -> Self {
        UpdateError::Filesystem {
            context: format!("error copying {} -> {}", src.display(), dst.display()),
            source,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, UpdateError::Network { .. })
    }
}
