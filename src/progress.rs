//! Progress reporting for the CLI
//!
//! Provides a progress bar over the combined write + read range and the
//! header/summary printed around a run.

use crate::config::TestConfig;
use crate::tester::{Phase, RunReport, TesterEvent};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays run status
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,

    /// Number of files per phase
    file_count: u64,
}

impl ProgressReporter {
    /// Create a new progress reporter for `config`
    pub fn new(config: &TestConfig) -> Self {
        let bar = ProgressBar::new(config.progress_max());

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            bar,
            file_count: config.file_count,
        }
    }

    /// Hidden reporter for quiet mode
    pub fn hidden(config: &TestConfig) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            file_count: config.file_count,
        }
    }

    /// Update the bar position
    pub fn set_position(&self, value: u64) {
        self.bar.set_position(value);
    }

    /// Reflect a phase change in the bar message
    pub fn set_phase(&self, phase: Phase) {
        let msg = match phase {
            Phase::Writing => format!("writing {} files", format_number(self.file_count)),
            Phase::AwaitingRemount => "waiting for replug".to_string(),
            Phase::Reading => "verifying".to_string(),
            Phase::Finished => "done".to_string(),
        };
        self.bar.set_message(msg);
    }

    /// Print a log line above the bar
    pub fn println(&self, line: &str) {
        if self.bar.is_hidden() {
            println!("{}", line);
        } else {
            self.bar.println(line);
        }
    }

    /// Run `f` with the bar cleared from the terminal (for prompts)
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.bar.suspend(f)
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Line to print for a tester event, if any
///
/// Quiet mode drops the running log and keeps one line per defect.
pub fn event_line(event: &TesterEvent, quiet: bool) -> Option<String> {
    match event {
        TesterEvent::Log(line) if !quiet => Some(line.clone()),
        TesterEvent::Defect(defect) if quiet => Some(defect.log_line()),
        _ => None,
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of the run
pub fn print_header(config: &TestConfig) {
    println!();
    println!(
        "{} {}",
        style("fater").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Target:").bold(), config.target_dir.display());
    println!(
        "  {} {} × {}",
        style("Files:").bold(),
        format_number(config.file_count),
        format_size(config.file_size, BINARY)
    );
    println!(
        "  {} {}",
        style("Total:").bold(),
        format_size(config.total_bytes(), BINARY)
    );
    println!(
        "  {} {} files per directory",
        style("Shards:").bold(),
        format_number(config.shard_width)
    );
    println!();
}

/// Print the replug prompt
pub fn print_remount_prompt(target: &str) {
    println!();
    println!(
        "{}",
        style("All files written. It is now safe to remove the device.").yellow().bold()
    );
    println!("  1. Detach (unmount) and unplug the device");
    println!("  2. Plug it back in and mount it");
    println!(
        "  3. Press Enter to verify {} (or type the new path if it changed)",
        style(target).bold()
    );
}

/// Print a summary of the run
pub fn print_summary(report: &RunReport, file_size: usize) {
    println!();
    if report.passed() {
        println!("{}", style("Test Passed").green().bold());
    } else if report.completed {
        println!("{}", style("Test Failed").red().bold());
    } else {
        println!("{}", style("Test Interrupted").yellow().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {} ({})",
        style("Written:").bold(),
        format_number(report.files_written),
        format_size(report.bytes_written, BINARY)
    );
    if let Some(at) = report.skipped_at {
        println!(
            "  {} volume full after {} of {} files",
            style("Stopped:").yellow().bold(),
            format_number(at),
            format_number(report.file_count)
        );
    }
    println!(
        "  {} {}",
        style("Verified:").bold(),
        format_number(report.files_verified)
    );
    println!(
        "  {} {}/s write, {}/s read",
        style("Speed:").bold(),
        format_size(report.write_bytes_per_second() as u64, BINARY),
        format_size(report.read_bytes_per_second(file_size) as u64, BINARY)
    );

    let errors_label = if report.error_count > 0 {
        style("Errors:").red().bold()
    } else {
        style("Errors:").bold()
    };
    println!("  {} {}", errors_label, format_number(report.error_count));

    let d = &report.defects;
    if d.total() > 0 {
        println!(
            "    write failed {}, missing {}, unreadable {}, corrupted {}",
            d.write_failed, d.file_missing, d.file_unreadable, d.file_corrupted
        );
    }
    println!(
        "  {} {}",
        style("Started:").bold(),
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
}
