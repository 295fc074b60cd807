//! Terminal output for `lmsync`
//!
//! Every command writes through an [`OutputFormatter`] picked by the global
//! `--json` flag.
//!
//! ## Design Notes
//!
//! - Human mode draws the live sync progress on one stderr line, redrawn in
//!   place, so stdout only carries results
//! - JSON mode prints one document per command on stdout and stays silent
//!   while a sync runs, keeping the output parseable

use std::cell::Cell;
use std::io::Write;

use lmsync_core::domain::{NewFilesList, Progress, SyncOutcome};
use lmsync_core::sanitize::format_size;
use serde_json::{json, Value};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Sink for everything a command reports
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &Value);

    /// Redraws the progress of a running sync
    fn progress(&self, progress: &Progress);

    /// Final report of a sync: its outcome and the files it wrote
    fn sync_report(&self, outcome: SyncOutcome, new_files: &NewFilesList);
}

// ============================================================================
// Rendering helpers
// ============================================================================

/// One-line summary of a progress snapshot
pub fn progress_line(progress: &Progress) -> String {
    format!(
        "{:>3}%  {} / {}  ({} active)",
        (progress.ratio() * 100.0).floor() as u32,
        format_size(progress.downloaded),
        format_size(progress.total),
        progress.files.len()
    )
}

/// User-facing sentence for a sync outcome
pub fn outcome_message(outcome: SyncOutcome) -> &'static str {
    match outcome {
        SyncOutcome::Success => "Sync complete",
        SyncOutcome::AlreadySyncing => "Another sync is already running",
        SyncOutcome::Stopped => "Sync stopped",
        SyncOutcome::NetworkError => "Sync failed: the platform could not be reached",
        SyncOutcome::FsError => "Sync failed: could not write to the download folder",
        SyncOutcome::UnknownError => "Sync failed with an unexpected error",
    }
}

/// Per-course listing of written files, courses in name order
pub fn new_files_lines(new_files: &NewFilesList) -> Vec<String> {
    let mut courses: Vec<_> = new_files.iter().collect();
    courses.sort_by(|a, b| a.0.cmp(b.0));

    let mut lines = Vec::new();
    for (course, files) in courses {
        lines.push(format!("{course}:"));
        for file in files {
            let marker = if file.updated { "updated" } else { "new" };
            lines.push(format!(
                "  {} ({}, {marker})",
                file.filename,
                format_size(file.size)
            ));
        }
    }
    lines
}

/// JSON document of a finished sync
pub fn sync_report_json(outcome: SyncOutcome, new_files: &NewFilesList) -> Value {
    json!({
        "outcome": outcome,
        "success": outcome.is_success(),
        "message": outcome_message(outcome),
        "new_files": new_files,
    })
}

// ============================================================================
// Formatters
// ============================================================================

/// Human-readable output with status glyphs
#[derive(Default)]
pub struct HumanFormatter {
    progress_drawn: Cell<bool>,
}

impl HumanFormatter {
    /// Ends a pending progress line so the next message starts clean
    fn close_progress(&self) {
        if self.progress_drawn.replace(false) {
            eprintln!();
        }
    }
}

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        self.close_progress();
        println!("\u{2713} {message}");
    }

    fn error(&self, message: &str) {
        self.close_progress();
        eprintln!("\u{2717} Error: {message}");
    }

    fn warn(&self, message: &str) {
        self.close_progress();
        eprintln!("\u{26a0} Warning: {message}");
    }

    fn info(&self, message: &str) {
        self.close_progress();
        println!("  {message}");
    }

    fn print_json(&self, _value: &Value) {}

    fn progress(&self, progress: &Progress) {
        let mut stderr = std::io::stderr().lock();
        // A closed terminal only loses the progress line
        let _ = write!(stderr, "\r\x1b[2K{}", progress_line(progress));
        let _ = stderr.flush();
        self.progress_drawn.set(true);
    }

    fn sync_report(&self, outcome: SyncOutcome, new_files: &NewFilesList) {
        let message = outcome_message(outcome);
        if outcome.is_success() {
            let count: usize = new_files.values().map(Vec::len).sum();
            self.success(&format!("{message}: {count} new or updated files"));
        } else if outcome == SyncOutcome::Stopped {
            self.warn(message);
        } else {
            self.error(message);
        }
        for line in new_files_lines(new_files) {
            self.info(&line);
        }
    }
}

/// Machine-readable output, one JSON document per line
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!("{}", json!({"success": true, "message": message}));
    }

    fn error(&self, message: &str) {
        eprintln!("{}", json!({"success": false, "error": message}));
    }

    fn warn(&self, message: &str) {
        eprintln!("{}", json!({"level": "warning", "message": message}));
    }

    fn info(&self, _message: &str) {}

    fn print_json(&self, value: &Value) {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }

    fn progress(&self, _progress: &Progress) {}

    fn sync_report(&self, outcome: SyncOutcome, new_files: &NewFilesList) {
        self.print_json(&sync_report_json(outcome, new_files));
    }
}

pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonFormatter)
    } else {
        Box::new(HumanFormatter::default())
    }
}
