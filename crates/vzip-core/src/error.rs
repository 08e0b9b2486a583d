use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VzipError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("source directory {path:?} is missing or not a directory")]
    SourceDirectory { path: PathBuf },
    #[error("no frame files found; nothing to archive")]
    EmptyInput,
    #[error(
        "invalid partition: {total} items over {threads} threads gives regular share {regular} and remainder {remainder}"
    )]
    InvalidPartition {
        total: usize,
        threads: usize,
        regular: usize,
        remainder: i64,
    },
    #[error("invalid frame name {name:?}: expected a positive numeric order prefix")]
    InvalidFrameName { name: String },
    #[error("frame order {order} is used by both {first:?} and {second:?}")]
    DuplicateFrameOrder {
        order: usize,
        first: String,
        second: String,
    },
    #[error("frame order {missing} is missing; orders must cover 1..={total}")]
    FrameOrderGap { missing: usize, total: usize },
    #[error("frame {path:?} has {actual} bytes but the frame buffer holds {expected}")]
    FrameSizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
    #[error("slot error at index {index}: {reason}")]
    Slot { index: usize, reason: &'static str },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("decompression error: {0}")]
    Decompression(String),
    #[error("invalid archive: {0}")]
    InvalidFormat(&'static str),
    #[error("allocation of {bytes} bytes failed")]
    Allocation { bytes: usize },
    #[error("{what} waited longer than {waited_ms} ms without progress")]
    Stalled { what: &'static str, waited_ms: u64 },
    #[error("pipeline run was cancelled")]
    Cancelled,
    #[error("{0}")]
    InvalidState(String),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<VzipError>,
    },
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl VzipError {
    /// Wraps the error with a message naming the failed operation.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns true when this error only reports that the run was cancelled,
    /// possibly wrapped in context.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Context { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Returns true for errors raised before any pipeline thread starts.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::InvalidConfig(_)
            | Self::SourceDirectory { .. }
            | Self::EmptyInput
            | Self::InvalidPartition { .. }
            | Self::InvalidFrameName { .. }
            | Self::DuplicateFrameOrder { .. }
            | Self::FrameOrderGap { .. } => true,
            Self::Context { source, .. } => source.is_configuration(),
            _ => false,
        }
    }
}
