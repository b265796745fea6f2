//! fater - Storage Media Integrity Tester
//!
//! Entry point for the CLI application. The CLI is the Controller: it runs the
//! tester on a background thread, shows its progress and log, and handles the
//! replug prompt.

use anyhow::{Context, Result};
use clap::Parser;
use console::Term;
use crossbeam_channel::{never, select, unbounded, Receiver};
use fater::config::{CliArgs, TestConfig};
use fater::progress::{
    event_line, print_header, print_remount_prompt, print_summary, ProgressReporter,
};
use fater::tester::{Phase, RunReport, Tester, TesterControl, TesterEvent};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for a run that finished but found bad files
const EXIT_DEFECTS: u8 = 2;

fn main() -> ExitCode {
    match run() {
        Ok(report) if report.passed() => ExitCode::SUCCESS,
        Ok(report) if report.completed => ExitCode::from(EXIT_DEFECTS),
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<RunReport> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = TestConfig::from_args(&args).context("Invalid configuration")?;

    if !args.quiet {
        print_header(&config);
    }

    let (events_tx, events_rx) = unbounded();
    let tester = Tester::new(config.clone(), events_tx).context("Failed to initialize tester")?;
    let control = tester.control();

    // Setup signal handler for graceful shutdown
    let signal_control = control.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        signal_control.shutdown();
    })
    .context("Failed to set signal handler")?;

    let progress = if args.quiet {
        ProgressReporter::hidden(&config)
    } else {
        ProgressReporter::new(&config)
    };

    let handle = tester.spawn().context("Failed to start tester")?;

    drive(&control, &events_rx, &progress, &args);

    let report = handle
        .join()
        .map_err(|_| anyhow::anyhow!("Tester thread panicked"))?
        .context("Media test failed")?;

    progress.finish(if report.completed { "done" } else { "interrupted" });
    print_summary(&report, config.file_size);

    if !report.completed {
        info!("Test was interrupted before completion");
    }

    if report.error_count > 0 {
        info!(errors = report.error_count, "Test completed with errors");
    }

    Ok(report)
}

/// One step of the Controller loop
enum Step {
    Event(TesterEvent),
    Answer(Option<String>),
    AnswerLost,
    Closed,
}

/// Consume tester events until the tester thread ends
fn drive(
    control: &TesterControl,
    events: &Receiver<TesterEvent>,
    progress: &ProgressReporter,
    args: &CliArgs,
) {
    let mut answers: Receiver<Option<String>> = never();

    loop {
        let step = select! {
            recv(events) -> event => match event {
                Ok(event) => Step::Event(event),
                Err(_) => Step::Closed,
            },
            recv(answers) -> answer => match answer {
                Ok(answer) => Step::Answer(answer),
                Err(_) => Step::AnswerLost,
            },
        };

        match step {
            Step::Event(event) => {
                if let Some(line) = event_line(&event, args.quiet) {
                    progress.println(&line);
                }
                match event {
                    TesterEvent::Progress(value) => progress.set_position(value),
                    TesterEvent::PhaseChanged(phase) => {
                        progress.set_phase(phase);
                        if phase == Phase::AwaitingRemount {
                            if args.no_wait {
                                continue_reading(control, None);
                            } else {
                                answers = ask_for_replug(control, progress);
                            }
                        }
                    }
                    TesterEvent::Log(_) | TesterEvent::Defect(_) => {}
                }
            }
            Step::Answer(answer) => {
                answers = never();
                continue_reading(control, answer);
            }
            Step::AnswerLost => {
                answers = never();
                warn!("Replug prompt closed without an answer");
            }
            Step::Closed => break,
        }
    }
}

/// Prompt on a helper thread so the event loop keeps running (and Ctrl-C works)
fn ask_for_replug(control: &TesterControl, progress: &ProgressReporter) -> Receiver<Option<String>> {
    let (tx, rx) = unbounded();
    let target = control.target_dir().display().to_string();

    progress.suspend(|| print_remount_prompt(&target));

    let spawned = thread::Builder::new()
        .name("replug-prompt".to_string())
        .spawn(move || {
            let answer = Term::stdout().read_line().ok().and_then(|line| {
                let line = line.trim().to_string();
                (!line.is_empty()).then_some(line)
            });
            let _ = tx.send(answer);
        });

    if let Err(e) = spawned {
        warn!("Failed to start replug prompt: {}", e);
        continue_reading(control, None);
    }

    rx
}

/// Apply an optional new target path and let the tester start verifying
fn continue_reading(control: &TesterControl, new_target: Option<String>) {
    if let Some(path) = new_target {
        let path = PathBuf::from(path);
        info!(target_dir = %path.display(), "Verifying from new target directory");
        control.set_target_dir(path);
    }

    if let Err(e) = control.request_reading() {
        warn!("Cannot start verification: {}", e);
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("fater=debug,warn")
    } else {
        EnvFilter::new("fater=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
