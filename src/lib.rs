//! fater - Storage Media Integrity Tester
//!
//! Detects fake-capacity, failing, or silently corrupting storage (cheap USB
//! sticks and SD cards in particular) by filling the device with random files,
//! asking the operator to physically replug it, and verifying every file.
//!
//! # Features
//!
//! - **Replug rendezvous**: verification only starts after the device has
//!   been detached and reattached, so firmware and OS caches cannot answer
//!   reads with data that never reached the flash.
//!
//! - **Free-space aware**: writing stops cleanly when the volume is full and
//!   only the files that were actually written are verified.
//!
//! - **Classified defects**: write failures, missing, unreadable and
//!   corrupted files are reported individually and counted; none of them
//!   abort the run.
//!
//! - **Self-cleaning**: verified files and drained shard directories are
//!   deleted as the read pass goes; failed files stay for inspection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐         ┌──────────────────────────────┐
//! │         Controller           │ events  │      Tester (own thread)     │
//! │  (CLI, GUI, test harness)    │◄────────│                              │
//! │                              │         │  Writing                     │
//! │  - progress / log display    │         │   ├─ SpaceProbe (statvfs)    │
//! │  - replug prompt             │ control │   ├─ ContentGenerator        │
//! │  - request_reading()         │────────►│   ├─ PathPlanner (create)    │
//! │  - shutdown()                │         │   └─ digest → table          │
//! └──────────────────────────────┘         │  AwaitingRemount             │
//!                                          │  Reading                     │
//!                                          │   ├─ PathPlanner (prune)     │
//!                                          │   └─ digest_file == ?        │
//!                                          │  Finished                    │
//!                                          └──────────────┬───────────────┘
//!                                                         │
//!                                                         ▼
//!                                          <target>/<index / width>/<index>.txt
//! ```
//!
//! # Example
//!
//! ```bash
//! # 1000 files of 1 MiB each on a USB stick
//! fater /media/usb -n 1000 -s 1024
//!
//! # Fill a 64 GB card with 512 KiB files, fsyncing each one
//! fater /media/sdcard -n 130000 -s 512 --sync
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod layout;
pub mod progress;
pub mod space;
pub mod tester;

pub use config::{CliArgs, TestConfig};
pub use error::{ConfigError, Defect, DefectKind, PhaseError, Result, TesterError};
pub use layout::{FileSlot, PathPlanner, SlotMode};
pub use space::{SpaceProbe, StatvfsProbe};
pub use tester::{DefectCounts, Phase, RunReport, Tester, TesterControl, TesterEvent};
