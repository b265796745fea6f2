//! Events sent to the Controller and the final run report

use crate::error::{Defect, DefectKind};
use crate::tester::Phase;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Outbound notifications from a running tester
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TesterEvent {
    /// Human-readable log line
    Log(String),

    /// Classified per-file finding (also reported as a `Log` line)
    Defect(Defect),

    /// Combined progress in `[0, 2 × file_count]`
    Progress(u64),

    /// The run moved to a new phase
    PhaseChanged(Phase),
}

/// Per-kind defect tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefectCounts {
    pub write_failed: u64,
    pub file_missing: u64,
    pub file_unreadable: u64,
    pub file_corrupted: u64,
    pub low_space_skip: u64,
}

impl DefectCounts {
    pub fn record(&mut self, kind: DefectKind) {
        *self.slot_mut(kind) += 1;
    }

    pub fn get(&self, kind: DefectKind) -> u64 {
        match kind {
            DefectKind::WriteFailed => self.write_failed,
            DefectKind::FileMissing => self.file_missing,
            DefectKind::FileUnreadable => self.file_unreadable,
            DefectKind::FileCorrupted => self.file_corrupted,
            DefectKind::LowSpaceSkip => self.low_space_skip,
        }
    }

    pub fn total(&self) -> u64 {
        DefectKind::ALL.iter().map(|k| self.get(*k)).sum()
    }

    fn slot_mut(&mut self, kind: DefectKind) -> &mut u64 {
        match kind {
            DefectKind::WriteFailed => &mut self.write_failed,
            DefectKind::FileMissing => &mut self.file_missing,
            DefectKind::FileUnreadable => &mut self.file_unreadable,
            DefectKind::FileCorrupted => &mut self.file_corrupted,
            DefectKind::LowSpaceSkip => &mut self.low_space_skip,
        }
    }
}

/// Result of a test run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Files requested
    pub file_count: u64,

    /// Write attempts made before finishing or skipping
    pub files_written: u64,

    /// Bytes successfully written
    pub bytes_written: u64,

    /// Files that passed verification (and were deleted)
    pub files_verified: u64,

    /// Files that failed verification
    pub error_count: u64,

    /// Index at which writing stopped for lack of space
    pub skipped_at: Option<u64>,

    /// Defects by kind
    pub defects: DefectCounts,

    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,

    /// Time spent in the write phase
    pub write_duration: Duration,

    /// Time spent in the read phase
    pub read_duration: Duration,

    /// Whether the run reached `Finished` (vs was shut down)
    pub completed: bool,
}

impl RunReport {
    /// True when the run finished and every written file verified
    pub fn passed(&self) -> bool {
        self.completed && self.error_count == 0
    }

    /// Write throughput in bytes per second
    pub fn write_bytes_per_second(&self) -> f64 {
        rate(self.bytes_written, self.write_duration)
    }

    /// Read throughput in bytes per second, counting every file that was checked
    pub fn read_bytes_per_second(&self, file_size: usize) -> f64 {
        let checked = self.files_verified + self.error_count;
        rate(checked.saturating_mul(file_size as u64), self.read_duration)
    }
}

fn rate(bytes: u64, duration: Duration) -> f64 {
    let secs = duration.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / secs
    } else {
        0.0
    }
}
