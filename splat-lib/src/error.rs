use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SplatError {
    #[error("Invalid point cloud: {0}")]
    Format(String),

    #[error("Degenerate rotation quaternion at vertex {index} (norm {norm})")]
    NumericDegeneracy { index: usize, norm: f32 },

    #[error("Failed to decode splat records: {0}")]
    DecodeSplat(String),

    #[error("Failed to run '{program}': {source}")]
    Command {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SplatError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        SplatError::Format(msg.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SplatError::Io {
            path: path.into(),
            source,
        }
    }
}
