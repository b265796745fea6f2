//! Configuration types for fater
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::error::ConfigError;
use crate::layout::DEFAULT_SHARD_WIDTH;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Scale factor applied to the `--size` argument (KiB to bytes)
pub const SIZE_UNIT: u64 = 1024;

/// Upper bound on the file count (one fingerprint per file is held in memory)
pub const MAX_FILE_COUNT: u64 = 100_000_000;

/// How often the remount wait re-checks for a continue request or shutdown
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Storage media integrity tester
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fater",
    version,
    about = "Storage media integrity tester",
    long_about = "Fills a volume with random files and records an MD5 fingerprint of each one.\n\n\
                  After all files are written you are asked to detach, unplug and replug the\n\
                  device, which defeats caches that could hide fake capacity. Every file is\n\
                  then read back and verified. Verified files are deleted; bad ones are kept\n\
                  for inspection.",
    after_help = "EXAMPLES:\n    \
        fater /media/usb -n 1000 -s 1024\n    \
        fater /media/usb -n 60000 -s 512 --sync\n    \
        fater /tmp/scratch -n 10 -s 4 --no-wait"
)]
pub struct CliArgs {
    /// Directory on the device under test
    #[arg(value_name = "TARGET_DIR")]
    pub target: PathBuf,

    /// Number of files to write
    #[arg(short = 'n', long = "files", default_value = "1000", value_name = "NUM")]
    pub files: u64,

    /// Size of each file in KiB
    #[arg(short = 's', long = "size", default_value = "1024", value_name = "KIB")]
    pub size_kib: u64,

    /// Number of files per shard directory
    #[arg(long, default_value_t = DEFAULT_SHARD_WIDTH, value_name = "NUM")]
    pub shard_width: u64,

    /// fsync every file after writing it
    #[arg(long)]
    pub sync: bool,

    /// Start verifying right away instead of waiting for a replug
    #[arg(short = 'y', long)]
    pub no_wait: bool,

    /// Quiet mode - no progress bar or running log; defects and the summary are still printed
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated run configuration
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Number of files to write and verify
    pub file_count: u64,

    /// Size of each file in bytes
    pub file_size: usize,

    /// Directory the files are written under
    pub target_dir: PathBuf,

    /// Files per shard directory
    pub shard_width: u64,

    /// fsync each file after writing
    pub sync_writes: bool,

    /// Remount wait re-check interval
    pub poll_interval: Duration,
}

impl TestConfig {
    /// Create a validated configuration with default shard width
    pub fn new(
        file_count: u64,
        file_size: usize,
        target_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        if file_count == 0 || file_count > MAX_FILE_COUNT {
            return Err(ConfigError::InvalidFileCount {
                count: file_count,
                max: MAX_FILE_COUNT,
            });
        }

        if file_size == 0 {
            return Err(ConfigError::InvalidFileSize {
                size: 0,
                unit: "bytes",
                reason: "must be at least 1".into(),
            });
        }

        let target_dir = target_dir.into();
        if target_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingTarget);
        }

        Ok(Self {
            file_count,
            file_size,
            target_dir,
            shard_width: DEFAULT_SHARD_WIDTH,
            sync_writes: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let file_size = kib_to_bytes(args.size_kib)?;

        let config = Self::new(args.files, file_size, args.target.clone())?
            .with_shard_width(args.shard_width)?
            .with_sync_writes(args.sync);

        Ok(config)
    }

    pub fn with_shard_width(mut self, width: u64) -> Result<Self, ConfigError> {
        if width == 0 {
            return Err(ConfigError::InvalidShardWidth { width });
        }
        self.shard_width = width;
        Ok(self)
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Upper bound of the combined write + read progress range
    pub fn progress_max(&self) -> u64 {
        self.file_count.saturating_mul(2)
    }

    /// Total bytes the write phase would produce without a skip
    pub fn total_bytes(&self) -> u64 {
        self.file_count.saturating_mul(self.file_size as u64)
    }
}

/// Convert a whole-KiB size argument to a byte count
fn kib_to_bytes(size_kib: u64) -> Result<usize, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidFileSize {
        size: size_kib,
        unit: "KiB",
        reason: reason.to_string(),
    };

    if size_kib == 0 {
        return Err(invalid("must be at least 1"));
    }

    let bytes = size_kib
        .checked_mul(SIZE_UNIT)
        .ok_or_else(|| invalid("too large"))?;

    usize::try_from(bytes).map_err(|_| invalid("does not fit in memory on this platform"))
}
