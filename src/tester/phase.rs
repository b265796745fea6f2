//! Run phases and the Controller-facing control handle

use crate::error::PhaseError;
use parking_lot::{Condvar, Mutex, RwLock};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Phase of a test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Writing test files
    Writing,
    /// All files written; waiting for the operator to replug the device
    AwaitingRemount,
    /// Reading files back and verifying them
    Reading,
    /// Done; terminal
    Finished,
}

impl Phase {
    /// The only phase this one may move to
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Writing => Some(Phase::AwaitingRemount),
            Phase::AwaitingRemount => Some(Phase::Reading),
            Phase::Reading => Some(Phase::Finished),
            Phase::Finished => None,
        }
    }

    pub fn can_advance_to(self, to: Phase) -> bool {
        self.next() == Some(to)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Writing => "Writing",
            Phase::AwaitingRemount => "AwaitingRemount",
            Phase::Reading => "Reading",
            Phase::Finished => "Finished",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct PhaseState {
    current: Phase,
    reading_requested: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<PhaseState>,
    changed: Condvar,
    target: RwLock<PathBuf>,
    shutdown: Arc<AtomicBool>,
}

/// Handle the Controller uses to observe and steer a run
///
/// Requests are advisory: the tester picks them up at the top of its next
/// loop iteration. Cloning the handle shares the same run.
#[derive(Debug, Clone)]
pub struct TesterControl {
    shared: Arc<Shared>,
}

impl TesterControl {
    pub(crate) fn new(target: PathBuf) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PhaseState {
                    current: Phase::Writing,
                    reading_requested: false,
                }),
                changed: Condvar::new(),
                target: RwLock::new(target),
                shutdown: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// Current phase of the run
    pub fn phase(&self) -> Phase {
        self.shared.state.lock().current
    }

    /// Ask the tester to start verifying (operator has replugged the device)
    ///
    /// Only valid while the run is in `AwaitingRemount`.
    pub fn request_reading(&self) -> Result<(), PhaseError> {
        let mut state = self.shared.state.lock();
        if state.current != Phase::AwaitingRemount {
            return Err(PhaseError::InvalidTransition {
                from: state.current,
                to: Phase::Reading,
            });
        }
        state.reading_requested = true;
        self.shared.changed.notify_all();
        Ok(())
    }

    /// Target directory as currently configured by the Controller
    pub fn target_dir(&self) -> PathBuf {
        self.shared.target.read().clone()
    }

    /// Change the target directory
    ///
    /// The tester picks the new value up when it moves to `Reading`, so a path
    /// that changed across the replug (new mount point) can be corrected here.
    pub fn set_target_dir(&self, path: impl AsRef<Path>) {
        *self.shared.target.write() = path.as_ref().to_path_buf();
    }

    /// Stop the run at the next loop iteration
    ///
    /// A file being written at that moment is not rolled back.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        let _state = self.shared.state.lock();
        self.shared.changed.notify_all();
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    ///
    /// Setting it directly does not wake a waiting tester; the wait notices
    /// it at the end of the current poll interval.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shared.shutdown)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Relaxed)
    }

    /// Move to `to`; only the tester calls this
    pub(crate) fn advance(&self, to: Phase) -> Result<(), PhaseError> {
        let mut state = self.shared.state.lock();
        if !state.current.can_advance_to(to) {
            return Err(PhaseError::InvalidTransition {
                from: state.current,
                to,
            });
        }
        state.current = to;
        state.reading_requested = false;
        self.shared.changed.notify_all();
        Ok(())
    }

    /// Block for up to `timeout` waiting for a reading request, consuming it
    ///
    /// Returns early without a request when a shutdown is signalled.
    pub(crate) fn wait_for_reading(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.reading_requested && !self.is_shutdown() {
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        std::mem::take(&mut state.reading_requested)
    }
}
