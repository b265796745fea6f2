//! Integration tests for fater
//!
//! Each test runs the full write → wait → read cycle against a temporary
//! directory, standing in for the operator between the phases.

use crossbeam_channel::{unbounded, Receiver};
use fater::content::{fingerprint, ContentGenerator};
use fater::{
    DefectKind, Phase, RunReport, TestConfig, Tester, TesterControl, TesterEvent, TesterError,
};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tempfile::tempdir;

const WAIT: Duration = Duration::from_secs(30);

struct Run {
    control: TesterControl,
    events: Receiver<TesterEvent>,
    handle: JoinHandle<fater::Result<RunReport>>,
    seen: Vec<TesterEvent>,
}

impl Run {
    fn start(tester: Tester, events: Receiver<TesterEvent>) -> Self {
        let control = tester.control();
        let handle = tester.spawn().unwrap();
        Self {
            control,
            events,
            handle,
            seen: Vec::new(),
        }
    }

    /// Collect events until the run reaches `phase`
    fn wait_for(&mut self, phase: Phase) {
        loop {
            let event = self
                .events
                .recv_timeout(WAIT)
                .unwrap_or_else(|_| panic!("timed out waiting for {}", phase));
            let reached = event == TesterEvent::PhaseChanged(phase);
            self.seen.push(event);
            if reached {
                return;
            }
        }
    }

    /// Let the run verify and collect everything up to the end
    fn finish(mut self) -> (RunReport, Vec<TesterEvent>) {
        self.control.request_reading().unwrap();
        let report = self.handle.join().unwrap().unwrap();
        self.seen.extend(self.events.try_iter());
        (report, self.seen)
    }
}

fn config(dir: &Path, files: u64, size: usize) -> TestConfig {
    TestConfig::new(files, size, dir)
        .unwrap()
        .with_poll_interval(Duration::from_millis(10))
}

fn new_tester(config: TestConfig) -> (Tester, Receiver<TesterEvent>) {
    let (tx, rx) = unbounded();
    (Tester::new(config, tx).unwrap(), rx)
}

fn defects(events: &[TesterEvent], kind: DefectKind) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            TesterEvent::Defect(d) if d.kind == kind => Some(d.index),
            _ => None,
        })
        .collect()
}

fn logs(events: &[TesterEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            TesterEvent::Log(line) => Some(line.as_str()),
            _ => None,
        })
        .collect()
}

fn count_files(dir: &Path) -> usize {
    let mut count = 0;
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            count += count_files(&path);
        } else {
            count += 1;
        }
    }
    count
}

fn file_path(dir: &Path, shard: u64, index: u64) -> PathBuf {
    dir.join(shard.to_string()).join(format!("{}.txt", index))
}

#[test]
fn test_clean_run_leaves_nothing_behind() {
    let dir = tempdir().unwrap();
    let (tester, rx) = new_tester(config(dir.path(), 10, 1024));
    let mut run = Run::start(tester, rx);

    run.wait_for(Phase::AwaitingRemount);
    assert_eq!(run.control.phase(), Phase::AwaitingRemount);
    assert_eq!(count_files(dir.path()), 10);
    for i in 0..10 {
        let content = fs::read(file_path(dir.path(), 0, i)).unwrap();
        assert_eq!(content.len(), 1024);
        assert!(content.iter().all(|b| b.is_ascii_alphanumeric()));
    }

    let (report, events) = run.finish();
    assert!(report.completed);
    assert!(report.passed());
    assert_eq!(report.error_count, 0);
    assert_eq!(report.files_written, 10);
    assert_eq!(report.files_verified, 10);
    assert_eq!(report.bytes_written, 10 * 1024);
    assert_eq!(report.skipped_at, None);
    assert_eq!(report.defects.total(), 0);

    // Files and the shard directory are gone
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

    let phases: Vec<Phase> = events
        .iter()
        .filter_map(|e| match e {
            TesterEvent::PhaseChanged(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![Phase::Writing, Phase::AwaitingRemount, Phase::Reading, Phase::Finished]
    );

    let progress: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            TesterEvent::Progress(v) => Some(*v),
            _ => None,
        })
        .collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.first(), Some(&1));
    assert_eq!(progress.last(), Some(&20));

    assert!(logs(&events).contains(&"Finished. Number of errors 0."));
}

#[test]
fn test_sharded_layout_and_cleanup() {
    let dir = tempdir().unwrap();
    let config = config(dir.path(), 7, 64).with_shard_width(3).unwrap();
    let (tester, rx) = new_tester(config);
    let mut run = Run::start(tester, rx);

    run.wait_for(Phase::AwaitingRemount);
    for i in 0..7 {
        assert!(file_path(dir.path(), i / 3, i).is_file(), "missing {}", i);
    }
    let mut shards: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    shards.sort();
    assert_eq!(shards, vec!["0", "1", "2"]);

    let (report, events) = run.finish();
    assert!(report.passed());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

    let switches = logs(&events)
        .iter()
        .filter(|l| l.starts_with("Switching to directory"))
        .count();
    // Three shards entered while writing and again while reading
    assert_eq!(switches, 6);
}

#[test]
fn test_corrupted_file_is_reported_and_kept() {
    let dir = tempdir().unwrap();
    let (tester, rx) = new_tester(config(dir.path(), 10, 1024));
    let mut run = Run::start(tester, rx);
    run.wait_for(Phase::AwaitingRemount);

    let victim = file_path(dir.path(), 0, 4);
    let mut content = fs::read(&victim).unwrap();
    content[100] = if content[100] == b'0' { b'1' } else { b'0' };
    fs::write(&victim, &content).unwrap();

    let (report, events) = run.finish();
    assert!(report.completed);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.files_verified, 9);
    assert_eq!(defects(&events, DefectKind::FileCorrupted), vec![4]);
    assert!(defects(&events, DefectKind::FileMissing).is_empty());
    assert!(defects(&events, DefectKind::FileUnreadable).is_empty());

    // Only the bad file survives, with the corrupted content
    assert!(victim.is_file());
    assert_eq!(count_files(dir.path()), 1);
    assert_eq!(fs::read(&victim).unwrap(), content);
    assert!(logs(&events).contains(&"4.txt: is corrupted! (Err#3)"));
}

#[test]
fn test_missing_file_is_reported() {
    let dir = tempdir().unwrap();
    let (tester, rx) = new_tester(config(dir.path(), 10, 1024));
    let mut run = Run::start(tester, rx);
    run.wait_for(Phase::AwaitingRemount);

    fs::remove_file(file_path(dir.path(), 0, 7)).unwrap();

    let (report, events) = run.finish();
    assert!(report.completed);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.files_verified, 9);
    assert_eq!(defects(&events, DefectKind::FileMissing), vec![7]);
    assert_eq!(report.defects.file_missing, 1);
    assert!(logs(&events).contains(&"7.txt: is not found! (Err#1)"));
    assert_eq!(count_files(dir.path()), 0);
}

#[test]
fn test_low_space_stops_writing_and_verification() {
    let dir = tempdir().unwrap();
    let calls = Arc::new(AtomicU64::new(0));
    let probe_calls = Arc::clone(&calls);

    // Space runs out before the fifth file
    let probe = move |_: &Path| -> io::Result<u64> {
        let call = probe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(if call < 4 { 1 << 30 } else { 0 })
    };

    let (tester, rx) = new_tester(config(dir.path(), 10, 1024));
    let tester = tester.with_space_probe(probe);
    let mut run = Run::start(tester, rx);
    run.wait_for(Phase::AwaitingRemount);

    assert_eq!(count_files(dir.path()), 4);

    let (report, events) = run.finish();
    assert!(report.completed);
    assert_eq!(report.skipped_at, Some(4));
    assert_eq!(report.files_written, 4);
    assert_eq!(report.files_verified, 4);
    assert_eq!(report.error_count, 0);
    assert_eq!(defects(&events, DefectKind::LowSpaceSkip), vec![4]);
    assert!(defects(&events, DefectKind::FileMissing).is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    let lines = logs(&events);
    assert!(lines.contains(&"No more space left @4! Skipping to next step..."));
    assert!(lines.contains(&"Finishing at 4..."));

    // Progress still ends at the maximum
    assert_eq!(events.last(), Some(&TesterEvent::Progress(20)));
}

#[test]
fn test_failed_write_is_caught_when_verifying() {
    let dir = tempdir().unwrap();
    let (tester, rx) = new_tester(config(dir.path(), 3, 32).with_shard_width(1).unwrap());

    // A plain file where shard 1 should be makes its directory unusable
    fs::write(dir.path().join("1"), b"in the way").unwrap();

    let mut run = Run::start(tester, rx);
    run.wait_for(Phase::AwaitingRemount);
    assert_eq!(defects(&run.seen, DefectKind::WriteFailed), vec![1]);

    let (report, events) = run.finish();
    assert!(report.completed);
    assert_eq!(report.files_written, 3);
    assert_eq!(report.bytes_written, 64);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.files_verified, 2);
    assert_eq!(defects(&events, DefectKind::FileMissing), vec![1]);
    assert_eq!(defects(&events, DefectKind::FileUnreadable), vec![1]);
    assert_eq!(defects(&events, DefectKind::FileCorrupted), vec![1]);
}

#[test]
fn test_reading_request_rejected_while_writing() {
    let dir = tempdir().unwrap();
    let (tester, rx) = new_tester(config(dir.path(), 2, 16));
    let control = tester.control();

    assert!(control.request_reading().is_err());
    assert_eq!(control.phase(), Phase::Writing);

    let mut run = Run::start(tester, rx);
    run.wait_for(Phase::AwaitingRemount);
    let (report, _) = run.finish();
    assert!(report.passed());

    assert_eq!(control.phase(), Phase::Finished);
    assert!(control.request_reading().is_err());
}

#[test]
fn test_target_reread_at_remount() {
    let dir = tempdir().unwrap();
    let elsewhere = tempdir().unwrap();
    let (tester, rx) = new_tester(config(dir.path(), 5, 128));
    let mut run = Run::start(tester, rx);
    run.wait_for(Phase::AwaitingRemount);

    // Device came back at a different mount point
    fs::rename(dir.path().join("0"), elsewhere.path().join("0")).unwrap();
    run.control.set_target_dir(elsewhere.path());

    let (report, _) = run.finish();
    assert!(report.passed());
    assert_eq!(report.files_verified, 5);
    assert_eq!(fs::read_dir(elsewhere.path()).unwrap().count(), 0);
}

#[test]
fn test_shutdown_during_wait() {
    let dir = tempdir().unwrap();
    let (tester, rx) = new_tester(config(dir.path(), 3, 16));
    let mut run = Run::start(tester, rx);
    run.wait_for(Phase::AwaitingRemount);

    run.control.shutdown();
    let report = run.handle.join().unwrap().unwrap();

    assert!(!report.completed);
    assert!(!report.passed());
    assert_eq!(report.files_written, 3);
    assert_eq!(report.files_verified, 0);

    // Written files stay on disk
    assert_eq!(count_files(dir.path()), 3);
}

#[test]
fn test_shutdown_during_write() {
    let dir = tempdir().unwrap();
    let (tester, rx) = new_tester(config(dir.path(), 10, 64));
    let control = tester.control();
    let stopper = control.clone();
    let calls = Arc::new(AtomicU64::new(0));
    let probe_calls = Arc::clone(&calls);

    // Interrupt arrives while the third file is being prepared
    let tester = tester.with_space_probe(move |_: &Path| -> io::Result<u64> {
        if probe_calls.fetch_add(1, Ordering::SeqCst) == 2 {
            stopper.shutdown();
        }
        Ok(1 << 30)
    });

    let report = tester.run().unwrap();
    let events: Vec<TesterEvent> = rx.try_iter().collect();

    assert!(!report.completed);
    assert_eq!(report.files_written, 3);
    assert_eq!(report.files_verified, 0);
    assert_eq!(report.skipped_at, None);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(control.phase(), Phase::Writing);
    assert!(!events.contains(&TesterEvent::PhaseChanged(Phase::AwaitingRemount)));

    // The file in flight is finished, nothing after it is started
    assert_eq!(count_files(dir.path()), 3);
}

#[test]
fn test_unreadable_file_is_reported_and_kept() {
    // Mode bits do not stop root from reading
    if unsafe { libc::geteuid() } == 0 {
        return;
    }

    let dir = tempdir().unwrap();
    let (tester, rx) = new_tester(config(dir.path(), 6, 256));
    let mut run = Run::start(tester, rx);
    run.wait_for(Phase::AwaitingRemount);

    let victim = file_path(dir.path(), 0, 3);
    fs::set_permissions(&victim, fs::Permissions::from_mode(0o000)).unwrap();

    let (report, events) = run.finish();
    assert!(report.completed);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.files_verified, 5);
    assert_eq!(defects(&events, DefectKind::FileUnreadable), vec![3]);
    assert_eq!(defects(&events, DefectKind::FileCorrupted), vec![3]);
    assert!(defects(&events, DefectKind::FileMissing).is_empty());
    assert!(logs(&events).contains(&"3.txt: is unreadable! (Err#2)"));

    assert!(victim.is_file());
    assert_eq!(count_files(dir.path()), 1);
}

#[test]
fn test_seeded_generator_content_on_disk() {
    let dir = tempdir().unwrap();
    let (tester, rx) = new_tester(config(dir.path(), 3, 512));
    let tester = tester.with_generator(ContentGenerator::with_seed(512, 7));
    let mut run = Run::start(tester, rx);
    run.wait_for(Phase::AwaitingRemount);

    let mut expected = ContentGenerator::with_seed(512, 7);
    for i in 0..3 {
        assert_eq!(fs::read(file_path(dir.path(), 0, i)).unwrap(), expected.next_payload());
    }

    let (report, _) = run.finish();
    assert!(report.passed());
}

#[test]
fn test_written_content_matches_recorded_fingerprints() {
    let dir = tempdir().unwrap();
    let (tester, rx) = new_tester(config(dir.path(), 4, 4096));
    let mut run = Run::start(tester, rx);
    run.wait_for(Phase::AwaitingRemount);

    // Swapping two files keeps every file intact but puts content at the wrong index
    let a = file_path(dir.path(), 0, 1);
    let b = file_path(dir.path(), 0, 2);
    let (content_a, content_b) = (fs::read(&a).unwrap(), fs::read(&b).unwrap());
    assert_ne!(fingerprint(&content_a), fingerprint(&content_b));
    fs::write(&a, &content_b).unwrap();
    fs::write(&b, &content_a).unwrap();

    let (report, events) = run.finish();
    assert_eq!(report.error_count, 2);
    assert_eq!(defects(&events, DefectKind::FileCorrupted), vec![1, 2]);
}

#[test]
fn test_missing_target_fails_before_start() {
    let dir = tempdir().unwrap();
    let (tx, _rx) = unbounded();
    let result = Tester::new(config(&dir.path().join("unplugged"), 1, 16), tx);
    assert!(matches!(result, Err(TesterError::TargetUnavailable { .. })));
}
