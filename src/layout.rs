//! On-disk layout of test files
//!
//! Files live at `<target>/<shard>/<index>.txt`, where `shard = index / width`.
//! Sharding keeps directories small on volumes where a flat layout with tens
//! of thousands of entries would be slow (FAT32 in particular).
//!
//! Path computation is pure. Directory side effects happen only when an index
//! enters a new shard:
//! - in [`SlotMode::Create`] (write phase) the new shard directory is created;
//! - in [`SlotMode::Prune`] (read phase) the previous shard directory is
//!   removed, since every file in it has already been checked. Removal only
//!   succeeds on an empty directory, so shards holding failed files survive.
//!
//! Index 0 always counts as entering a new shard. The shard "before" index 0
//! is taken to be shard 0 itself.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default number of files per shard directory
pub const DEFAULT_SHARD_WIDTH: u64 = 5000;

/// Directory side effects to apply when an index enters a new shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotMode {
    /// Create the new shard directory (write phase)
    Create,
    /// Remove the drained previous shard directory (read phase)
    Prune,
}

/// Resolved location of one test file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSlot {
    pub index: u64,
    pub shard: u64,
    pub path: PathBuf,
    /// True when this index is the first one of its shard
    pub entered_shard: bool,
}

/// Shard number for a file index
pub fn shard_of(index: u64, width: u64) -> u64 {
    index / width
}

/// Shard of the index before `index`; index 0 has shard 0 as its predecessor
pub fn previous_shard(index: u64, width: u64) -> u64 {
    match index.checked_sub(1) {
        Some(prev) => shard_of(prev, width),
        None => shard_of(0, width),
    }
}

/// Whether `index` is the first index of a shard
pub fn enters_new_shard(index: u64, width: u64) -> bool {
    index == 0 || shard_of(index, width) != previous_shard(index, width)
}

/// Directory for a shard
pub fn shard_dir(target: &Path, shard: u64) -> PathBuf {
    target.join(shard.to_string())
}

/// Compute a file slot without touching the filesystem
pub fn slot(target: &Path, index: u64, width: u64) -> FileSlot {
    let shard = shard_of(index, width);
    FileSlot {
        index,
        shard,
        path: shard_dir(target, shard).join(format!("{}.txt", index)),
        entered_shard: enters_new_shard(index, width),
    }
}

/// Maps file indices to sharded paths and maintains shard directories
#[derive(Debug, Clone, Copy)]
pub struct PathPlanner {
    width: u64,
}

impl PathPlanner {
    /// Create a planner; a zero width is clamped to 1
    pub fn new(width: u64) -> Self {
        Self {
            width: width.max(1),
        }
    }

    pub fn width(&self) -> u64 {
        self.width
    }

    /// Resolve the slot for `index`, applying the shard-entry side effect for `mode`
    ///
    /// Directory failures are logged and otherwise ignored; a missing shard
    /// directory shows up later as a failed write or a missing file.
    pub fn locate(&self, target: &Path, index: u64, mode: SlotMode) -> FileSlot {
        let slot = slot(target, index, self.width);

        if slot.entered_shard {
            match mode {
                SlotMode::Create => {
                    let dir = shard_dir(target, slot.shard);
                    if let Err(e) = create_shard(&dir) {
                        warn!("Failed to create shard directory {}: {}", dir.display(), e);
                    }
                }
                SlotMode::Prune => {
                    let dir = shard_dir(target, previous_shard(index, self.width));
                    prune_shard(&dir);
                }
            }
        }

        slot
    }

    /// Remove the last shard used by a run of `file_count` files, if it is empty
    pub fn prune_final(&self, target: &Path, file_count: u64) {
        if file_count == 0 {
            return;
        }
        let dir = shard_dir(target, shard_of(file_count - 1, self.width));
        prune_shard(&dir);
    }
}

fn create_shard(dir: &Path) -> io::Result<()> {
    match fs::create_dir(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

/// Remove a shard directory if it is empty
fn prune_shard(dir: &Path) {
    if let Err(e) = fs::remove_dir(dir) {
        debug!("Shard directory {} kept: {}", dir.display(), e);
    }
}
