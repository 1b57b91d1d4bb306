//! Formatting utilities for sizes, durations, and build summaries.

use console::Term;
use kiln_build::{BuildOutcome, Diagnostic, DiagnosticSeverity};
use owo_colors::OwoColorize;
use std::time::Duration;

use super::{colors_enabled, messages};

/// Format file size in human-readable format.
///
/// ```
/// use kiln_cli::ui::format_size;
///
/// assert_eq!(format_size(0), "0 B");
/// assert_eq!(format_size(500), "500 B");
/// assert_eq!(format_size(1024), "1.00 KB");
/// assert_eq!(format_size(1_048_576), "1.00 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Format duration in human-readable format.
///
/// ```
/// use std::time::Duration;
/// use kiln_cli::ui::format_duration;
///
/// assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();

    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Print the result of one build to stderr.
///
/// Successful builds get a one-line summary; `list_files` adds a table of
/// every output. Failed builds print their diagnostics.
pub fn print_build_summary(outcome: &BuildOutcome, list_files: bool) {
    print_diagnostics(&outcome.diagnostics);

    if !outcome.success {
        messages::error(&format!(
            "Build #{} failed after {}",
            outcome.iteration,
            format_duration(outcome.duration)
        ));
        return;
    }

    let files = outcome.output_files.as_deref().unwrap_or_default();
    let assets = outcome.asset_files.as_deref().unwrap_or_default();
    let total: u64 = files.iter().map(|f| f.size() as u64).sum();

    if list_files && !files.is_empty() {
        let width = (Term::stderr().size().1 as usize).min(80);
        eprintln!("{}", "─".repeat(width));
        for file in files {
            let size = format_size(file.size() as u64);
            if colors_enabled() {
                eprintln!("  {} {} {}", "▸".blue(), file.path().bright_white(), size.dimmed());
            } else {
                eprintln!("  ▸ {} {}", file.path(), size);
            }
        }
        eprintln!("{}", "─".repeat(width));
    }

    let mut summary = format!(
        "Build #{} completed in {}: {} file(s), {}",
        outcome.iteration,
        format_duration(outcome.duration),
        files.len(),
        format_size(total)
    );
    if !assets.is_empty() {
        summary.push_str(&format!(", {} asset(s)", assets.len()));
    }
    messages::success(&summary);
}

/// Print bundler diagnostics, errors first.
pub fn print_diagnostics(diagnostics: &[Diagnostic]) {
    let errors = diagnostics
        .iter()
        .filter(|d| d.severity == DiagnosticSeverity::Error);
    let warnings = diagnostics
        .iter()
        .filter(|d| d.severity == DiagnosticSeverity::Warning);

    for diagnostic in errors.chain(warnings) {
        match diagnostic.severity {
            DiagnosticSeverity::Error => messages::error(&diagnostic.to_string()),
            DiagnosticSeverity::Warning => messages::warning(&diagnostic.to_string()),
        }
    }
}
