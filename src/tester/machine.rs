//! The tester state machine
//!
//! One call to [`Tester::run`] drives a complete test. Each loop iteration
//! handles a single file (or one wait slice), so a shutdown request is seen
//! between files.
//!
//! Fingerprints are recorded from the generated payload, not from what landed
//! on disk. A write that fails therefore still has an expected fingerprint and
//! is reported again as a verification failure during the read phase. They are
//! held as raw 16-byte digests and only rendered as hex for log lines.

use crate::config::TestConfig;
use crate::content::{digest, digest_file, ContentGenerator, RawDigest};
use crate::error::{Defect, DefectKind, Result, TesterError};
use crate::layout::{self, FileSlot, PathPlanner, SlotMode};
use crate::space::{SpaceProbe, StatvfsProbe};
use crate::tester::events::{DefectCounts, RunReport, TesterEvent};
use crate::tester::phase::{Phase, TesterControl};
use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use humansize::{format_size, BINARY};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Mutable run state, owned by the tester
#[derive(Debug)]
struct RunState {
    phase: Phase,
    /// Next file index to handle in the current phase
    index: u64,
    /// Index at which writing stopped for lack of space
    skipped_at: Option<u64>,
    /// Files that failed verification
    error_count: u64,
}

/// Writes, waits for a replug, then verifies
pub struct Tester {
    config: TestConfig,
    control: TesterControl,
    events: Sender<TesterEvent>,
    probe: Box<dyn SpaceProbe>,
    generator: ContentGenerator,
    planner: PathPlanner,

    /// Target directory for the current phase
    target: PathBuf,

    /// Expected digest per index; `None` past the write cutoff
    expected: Vec<Option<RawDigest>>,

    /// Payload buffer reused across files
    buffer: Vec<u8>,

    state: RunState,

    files_written: u64,
    bytes_written: u64,
    files_verified: u64,
    defects: DefectCounts,
    started_at: DateTime<Utc>,
    write_duration: Duration,
    read_duration: Duration,
    phase_started: Instant,
}

impl Tester {
    /// Create a tester for `config`, reporting to `events`
    ///
    /// Fails if the target directory is missing or not a directory.
    pub fn new(config: TestConfig, events: Sender<TesterEvent>) -> Result<Self> {
        check_target(&config.target_dir)?;

        let slots = usize::try_from(config.file_count).map_err(|_| {
            TesterError::Config(crate::error::ConfigError::InvalidFileCount {
                count: config.file_count,
                max: usize::MAX as u64,
            })
        })?;

        Ok(Self {
            control: TesterControl::new(config.target_dir.clone()),
            events,
            probe: Box::new(StatvfsProbe),
            generator: ContentGenerator::new(config.file_size),
            planner: PathPlanner::new(config.shard_width),
            target: config.target_dir.clone(),
            expected: vec![None; slots],
            buffer: vec![0u8; config.file_size],
            state: RunState {
                phase: Phase::Writing,
                index: 0,
                skipped_at: None,
                error_count: 0,
            },
            files_written: 0,
            bytes_written: 0,
            files_verified: 0,
            defects: DefectCounts::default(),
            started_at: Utc::now(),
            write_duration: Duration::ZERO,
            read_duration: Duration::ZERO,
            phase_started: Instant::now(),
            config,
        })
    }

    /// Replace the free space source
    pub fn with_space_probe(mut self, probe: impl SpaceProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Replace the payload generator
    pub fn with_generator(mut self, generator: ContentGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Handle for the Controller
    pub fn control(&self) -> TesterControl {
        self.control.clone()
    }

    /// Run the test on a named background thread
    pub fn spawn(self) -> Result<JoinHandle<Result<RunReport>>> {
        thread::Builder::new()
            .name("fater-tester".to_string())
            .spawn(move || self.run())
            .map_err(TesterError::Spawn)
    }

    /// Run the test to completion (or shutdown) on the current thread
    pub fn run(mut self) -> Result<RunReport> {
        self.started_at = Utc::now();
        self.phase_started = Instant::now();

        info!(
            target_dir = %self.target.display(),
            files = self.config.file_count,
            file_size = self.config.file_size,
            "Starting media test"
        );
        self.log(format!(
            "Creating {} files with {} random data...",
            self.config.file_count,
            format_size(self.config.file_size, BINARY)
        ));
        self.emit(TesterEvent::PhaseChanged(Phase::Writing));

        loop {
            if self.control.is_shutdown() {
                info!(phase = %self.state.phase, index = self.state.index, "Shutdown requested");
                break;
            }

            match self.state.phase {
                Phase::Writing => self.write_step()?,
                Phase::AwaitingRemount => self.wait_step()?,
                Phase::Reading => self.read_step()?,
                Phase::Finished => {
                    self.finish();
                    break;
                }
            }
        }

        Ok(self.into_report())
    }

    /// Write one file, or leave the write phase
    fn write_step(&mut self) -> Result<()> {
        let index = self.state.index;
        if index >= self.config.file_count {
            return self.end_writing();
        }

        let available = match self.probe.available(&self.target) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Free space query on {} failed: {}", self.target.display(), e);
                0
            }
        };

        if available < self.config.file_size as u64 {
            let path = layout::slot(&self.target, index, self.planner.width()).path;
            self.defect(
                Defect::new(DefectKind::LowSpaceSkip, index, path)
                    .with_detail(format!("{} bytes available", available)),
            );
            self.state.skipped_at = Some(index);
            self.state.index = self.config.file_count;
            return Ok(());
        }

        self.generator.fill(&mut self.buffer);

        let slot = self.planner.locate(&self.target, index, SlotMode::Create);
        self.log_shard_switch(&slot);

        match write_payload(&slot.path, &self.buffer, self.config.sync_writes) {
            Ok(()) => {
                self.bytes_written += self.buffer.len() as u64;
                debug!("Wrote {}", slot.path.display());
            }
            Err(e) => {
                self.defect(
                    Defect::new(DefectKind::WriteFailed, index, slot.path).with_detail(e.to_string()),
                );
            }
        }

        self.expected[index as usize] = Some(digest(&self.buffer));
        self.files_written += 1;
        self.state.index += 1;
        self.emit(TesterEvent::Progress(self.state.index));

        Ok(())
    }

    fn end_writing(&mut self) -> Result<()> {
        self.write_duration = self.phase_started.elapsed();
        self.state.index = 0;
        self.log("Waiting for you to detach, unplug and replug the device...");
        self.transition(Phase::AwaitingRemount)
    }

    /// Wait one slice for the Controller to ask for verification
    fn wait_step(&mut self) -> Result<()> {
        if self.control.wait_for_reading(self.config.poll_interval) {
            let target = self.control.target_dir();
            if target != self.target {
                info!(
                    from = %self.target.display(),
                    to = %target.display(),
                    "Target directory changed during remount"
                );
            }
            self.target = target;
            self.phase_started = Instant::now();
            self.transition(Phase::Reading)?;
        }
        Ok(())
    }

    /// Verify one file, or leave the read phase
    fn read_step(&mut self) -> Result<()> {
        let index = self.state.index;
        let file_count = self.config.file_count;

        if index == 0 {
            self.log("Reading files and checking checksums");
        }

        if index >= file_count {
            self.planner.prune_final(&self.target, file_count);
            return self.end_reading();
        }

        if self.state.skipped_at == Some(index) {
            self.log(format!("Finishing at {}...", index));
            return self.end_reading();
        }

        let slot = self.planner.locate(&self.target, index, SlotMode::Prune);
        self.log_shard_switch(&slot);

        if self.verify(&slot) {
            if let Err(e) = fs::remove_file(&slot.path) {
                warn!("Failed to remove verified file {}: {}", slot.path.display(), e);
            }
            self.files_verified += 1;
        } else {
            self.state.error_count += 1;
        }

        self.state.index += 1;
        self.emit(TesterEvent::Progress(file_count + self.state.index));

        Ok(())
    }

    fn end_reading(&mut self) -> Result<()> {
        self.read_duration = self.phase_started.elapsed();
        self.transition(Phase::Finished)
    }

    /// Run every check on one file, reporting each failure
    fn verify(&mut self, slot: &FileSlot) -> bool {
        let exists = slot.path.is_file();
        if !exists {
            self.defect(Defect::new(DefectKind::FileMissing, slot.index, &slot.path));
        }

        let readable = match File::open(&slot.path) {
            Ok(_) => true,
            Err(e) => {
                self.defect(
                    Defect::new(DefectKind::FileUnreadable, slot.index, &slot.path)
                        .with_detail(e.to_string()),
                );
                false
            }
        };

        let actual = digest_file(&slot.path).ok();
        let expected = self.expected.get(slot.index as usize).copied().flatten();
        let intact = actual.is_some() && actual == expected;
        if !intact {
            let detail = format!(
                "expected {}, found {}",
                expected.map_or_else(|| "nothing".to_string(), hex::encode),
                actual.map_or_else(|| "nothing".to_string(), hex::encode)
            );
            self.defect(
                Defect::new(DefectKind::FileCorrupted, slot.index, &slot.path).with_detail(detail),
            );
        }

        exists && readable && intact
    }

    fn finish(&mut self) {
        self.log(format!(
            "Finished. Number of errors {}.",
            self.state.error_count
        ));
        self.emit(TesterEvent::Progress(self.config.progress_max()));
        info!(
            errors = self.state.error_count,
            verified = self.files_verified,
            skipped_at = ?self.state.skipped_at,
            "Media test finished"
        );
    }

    fn transition(&mut self, to: Phase) -> Result<()> {
        self.control.advance(to)?;
        info!(from = %self.state.phase, to = %to, "Phase change");
        self.state.phase = to;
        self.emit(TesterEvent::PhaseChanged(to));
        Ok(())
    }

    fn log_shard_switch(&self, slot: &FileSlot) {
        if slot.entered_shard {
            self.log(format!("Switching to directory: {}", slot.shard));
        }
    }

    fn log(&self, line: impl Into<String>) {
        let line = line.into();
        debug!("{}", line);
        self.emit(TesterEvent::Log(line));
    }

    fn defect(&mut self, defect: Defect) {
        self.defects.record(defect.kind);
        self.log(defect.log_line());
        self.emit(TesterEvent::Defect(defect));
    }

    fn emit(&self, event: TesterEvent) {
        // The Controller may have gone away; the run continues regardless
        let _ = self.events.send(event);
    }

    fn into_report(self) -> RunReport {
        RunReport {
            file_count: self.config.file_count,
            files_written: self.files_written,
            bytes_written: self.bytes_written,
            files_verified: self.files_verified,
            error_count: self.state.error_count,
            skipped_at: self.state.skipped_at,
            defects: self.defects,
            started_at: self.started_at,
            write_duration: self.write_duration,
            read_duration: self.read_duration,
            completed: self.state.phase == Phase::Finished,
        }
    }
}

fn check_target(path: &Path) -> Result<()> {
    let metadata = fs::metadata(path).map_err(|e| TesterError::TargetUnavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if !metadata.is_dir() {
        return Err(TesterError::TargetUnavailable {
            path: path.to_path_buf(),
            reason: "not a directory".into(),
        });
    }

    Ok(())
}

/// Write `payload` verbatim to a new file at `path`
fn write_payload(path: &Path, payload: &[u8], sync: bool) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(payload)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    if sync {
        file.sync_all()?;
    }
    Ok(())
}
