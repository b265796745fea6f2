//! Error types for fater
//!
//! Two different kinds of failure live here:
//! - `TesterError` and friends are real errors: they stop a run from starting
//!   (bad configuration, unusable target) or report misuse of the control API.
//! - `Defect` is not an error in the `Result` sense. It is a classified,
//!   per-file finding about the media under test. Defects are reported through
//!   the event stream and tallied; they never abort a run.

use crate::tester::Phase;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the tester
#[derive(Error, Debug)]
pub enum TesterError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Target directory cannot be used for a run
    #[error("Target directory '{path}' is unavailable: {reason}")]
    TargetUnavailable { path: PathBuf, reason: String },

    /// Illegal phase transition request
    #[error("Phase error: {0}")]
    Phase(#[from] PhaseError),

    /// Background thread could not be started
    #[error("Failed to spawn tester thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File count must be positive and addressable
    #[error("Invalid file count {count}: must be between 1 and {max}")]
    InvalidFileCount { count: u64, max: u64 },

    /// File size must be positive and addressable
    #[error("Invalid file size {size} {unit}: {reason}")]
    InvalidFileSize {
        size: u64,
        unit: &'static str,
        reason: String,
    },

    /// Shard width must be positive
    #[error("Invalid shard width {width}: must be at least 1")]
    InvalidShardWidth { width: u64 },

    /// Target path is empty
    #[error("A target directory is required")]
    MissingTarget,
}

/// Phase transition errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseError {
    /// The requested transition is not the next step of the run
    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },
}

/// Result type alias for TesterError
pub type Result<T> = std::result::Result<T, TesterError>;

/// Classification of a problem found on the media under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefectKind {
    /// Writing a file failed
    WriteFailed,

    /// A written file is no longer there
    FileMissing,

    /// A written file cannot be opened for reading
    FileUnreadable,

    /// A file's content no longer matches its recorded fingerprint
    FileCorrupted,

    /// The volume ran out of space before all files were written
    LowSpaceSkip,
}

impl DefectKind {
    /// All kinds, in reporting order
    pub const ALL: [DefectKind; 5] = [
        DefectKind::WriteFailed,
        DefectKind::FileMissing,
        DefectKind::FileUnreadable,
        DefectKind::FileCorrupted,
        DefectKind::LowSpaceSkip,
    ];

    /// Short code shown next to log lines
    pub fn code(&self) -> &'static str {
        match self {
            DefectKind::WriteFailed => "Err#0",
            DefectKind::FileMissing => "Err#1",
            DefectKind::FileUnreadable => "Err#2",
            DefectKind::FileCorrupted => "Err#3",
            DefectKind::LowSpaceSkip => "LowSpace",
        }
    }
}

impl fmt::Display for DefectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DefectKind::WriteFailed => "write failed",
            DefectKind::FileMissing => "not found",
            DefectKind::FileUnreadable => "unreadable",
            DefectKind::FileCorrupted => "corrupted",
            DefectKind::LowSpaceSkip => "low space",
        };
        f.write_str(name)
    }
}

/// A single classified finding about one file index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defect {
    pub kind: DefectKind,
    pub index: u64,
    pub path: PathBuf,
    pub detail: Option<String>,
}

impl Defect {
    pub fn new(kind: DefectKind, index: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            index,
            path: path.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Human-readable log line for the operator
    pub fn log_line(&self) -> String {
        match self.kind {
            DefectKind::WriteFailed => format!(
                "Creation of {} failed: {} ({})",
                self.path.display(),
                self.detail.as_deref().unwrap_or("unknown error"),
                self.kind.code()
            ),
            DefectKind::LowSpaceSkip => format!(
                "No more space left @{}! Skipping to next step...",
                self.index
            ),
            _ => {
                let name = self
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| self.index.to_string());
                format!("{}: is {}! ({})", name, self.kind, self.kind.code())
            }
        }
    }
}
