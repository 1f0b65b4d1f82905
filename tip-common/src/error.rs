//! Error kinds shared by every rank of the pipeline.
//!
//! Every condition is fatal for the whole run. Workers ship the [`ErrorKind`]
//! and rendered message of their failure to the coordinator, which rebuilds a
//! [`TipError::WorkerFailed`] from them.

use crate::types::Rank;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification that survives the trip over the message channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorKind {
    Io = 1,
    Configuration = 2,
    Consistency = 3,
    ResourceExhaustion = 4,
    ExternalTool = 5,
    Parse = 6,
    Protocol = 7,
    Timeout = 8,
    Aborted = 9,
}

impl ErrorKind {
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ErrorKind::Io),
            2 => Some(ErrorKind::Configuration),
            3 => Some(ErrorKind::Consistency),
            4 => Some(ErrorKind::ResourceExhaustion),
            5 => Some(ErrorKind::ExternalTool),
            6 => Some(ErrorKind::Parse),
            7 => Some(ErrorKind::Protocol),
            8 => Some(ErrorKind::Timeout),
            9 => Some(ErrorKind::Aborted),
            _ => None,
        }
    }
}

/// Main error type for TIP finder operations
#[derive(Error, Debug)]
pub enum TipError {
    /// I/O errors (permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad invocation: missing inputs, malformed manifest, pool too small
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Inputs that disagree with each other (paired read files of different length)
    #[error("Inconsistent input: {message}")]
    Consistency { message: String },

    #[error(
        "Out of memory on rank {rank}: {needed} bytes needed but the budget is {budget} bytes, \
         increase the memory flag or run on a machine with more memory"
    )]
    ResourceExhausted {
        rank: Rank,
        needed: usize,
        budget: usize,
    },

    #[error("External tool '{tool}' failed: {message}")]
    ExternalTool { tool: String, message: String },

    #[error("Parse error in {} at line {line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: u64,
        message: String,
    },

    /// Unexpected or undecodable message, or a peer that disappeared
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Rank {rank} timed out after {secs}s waiting for a message")]
    Timeout { rank: Rank, secs: u64 },

    #[error("Run aborted by the coordinator")]
    Aborted,

    /// Failure reported by a worker over the message channel
    #[error("{message}")]
    WorkerFailed {
        rank: Rank,
        kind: ErrorKind,
        message: String,
    },
}

/// Type alias for Results using TipError
pub type Result<T> = std::result::Result<T, TipError>;

impl TipError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn external_tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn parse(path: impl Into<PathBuf>, line: u64, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TipError::Io(_) => ErrorKind::Io,
            TipError::Config { .. } | TipError::FileNotFound { .. } => ErrorKind::Configuration,
            TipError::Consistency { .. } => ErrorKind::Consistency,
            TipError::ResourceExhausted { .. } => ErrorKind::ResourceExhaustion,
            TipError::ExternalTool { .. } => ErrorKind::ExternalTool,
            TipError::Parse { .. } => ErrorKind::Parse,
            TipError::Protocol { .. } => ErrorKind::Protocol,
            TipError::Timeout { .. } => ErrorKind::Timeout,
            TipError::Aborted => ErrorKind::Aborted,
            TipError::WorkerFailed { kind, .. } => *kind,
        }
    }
}
