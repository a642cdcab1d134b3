//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! Each video is shown by its positional index and file name, with the
//! numbers that matter (display size, canvas, bytes) as indented context
//! lines underneath.
//!
//! # Output Format
//!
//! ## Plan
//!
//! ```text
//! 001 beach.mov
//!     Display: 1920x1080 → 1358x764 (scale 0.707)
//!     Size: 100.0 MB → ~40.0 MB
//! 002 broken.mp4
//!     Error: Cannot read media broken.mp4: moov atom not found
//!
//! Total: 100.0 MB → ~40.0 MB at 50% reduction
//! ```
//!
//! ## Estimate
//!
//! ```text
//! beach.mov (1920x1080, 100.0 MB)
//!   Reduce       Canvas   Estimate
//!      10%    1822x1024   ~72.0 MB
//!      ...
//! ```
//!
//! ## Shrink
//!
//! ```text
//! beach.mov → 1358x764 (~40.0 MB)
//!     beach.mov 50%
//!     beach-50pct.mp4: transcoded, 41.2 MB
//!
//! Shrunk 1 of 2 videos
//! Predicted: ~40.0 MB, actual: 41.2 MB
//! Cache: 1 transcoded
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::batch::{
    BatchEvent, BatchPreview, BatchReport, ExportStatus, JobStatus, format_percent,
};
use crate::planner::{PlanError, Size, VideoInfo, VideoPlan};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn format_size(size: Size) -> String {
    format!("{}x{}", size.width.round(), size.height.round())
}

/// Decimal (SI) byte count: `950 B`, `40.0 MB`, `1.2 GB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1000 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

// ============================================================================
// plan
// ============================================================================

/// Context lines for one planned video.
pub fn format_plan(plan: &VideoPlan) -> Vec<String> {
    vec![
        format!(
            "{}Display: {} → {}x{} (scale {:.3})",
            indent(1),
            format_size(plan.display),
            plan.canvas.width,
            plan.canvas.height,
            plan.scale
        ),
        format!(
            "{}Size: {} → ~{}",
            indent(1),
            format_bytes(plan.original_bytes),
            format_bytes(plan.predicted_bytes)
        ),
    ]
}

/// Every source with its plan or error, followed by the batch total.
pub fn format_preview(preview: &BatchPreview) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, item) in preview.items.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), file_label(&item.source)));
        match (&item.plan, &item.error) {
            (Some(plan), _) => lines.extend(format_plan(plan)),
            (None, Some(error)) => lines.push(format!("{}Error: {}", indent(1), error)),
            (None, None) => {}
        }
    }
    lines.push(String::new());
    lines.push(format!(
        "Total: {} → ~{} at {}% reduction",
        format_bytes(preview.original_total),
        format_bytes(preview.predicted_total),
        format_percent(preview.reduction_percent)
    ));
    lines
}

pub fn print_preview(preview: &BatchPreview) {
    for line in format_preview(preview) {
        println!("{}", line);
    }
}

// ============================================================================
// estimate
// ============================================================================

/// One row per reduction tick: canvas and predicted size, or why that tick
/// cannot be planned.
pub fn format_estimate_table(
    source: &Path,
    info: &VideoInfo,
    rows: &[(f64, Result<VideoPlan, PlanError>)],
) -> Vec<String> {
    let display = info
        .geometry
        .display_size()
        .map(format_size)
        .unwrap_or_else(|e| e.to_string());

    let mut lines = vec![
        format!(
            "{} ({}, {})",
            file_label(source),
            display,
            format_bytes(info.file_size)
        ),
        format!("  {:>6}  {:>11}  {:>10}", "Reduce", "Canvas", "Estimate"),
    ];
    for (percent, result) in rows {
        let pct = format!("{}%", format_percent(*percent));
        lines.push(match result {
            Ok(plan) => format!(
                "  {:>6}  {:>11}  {:>10}",
                pct,
                format!("{}x{}", plan.canvas.width, plan.canvas.height),
                format!("~{}", format_bytes(plan.predicted_bytes))
            ),
            Err(e) => format!("  {:>6}  {}", pct, e),
        });
    }
    lines
}

pub fn print_estimate_table(
    source: &Path,
    info: &VideoInfo,
    rows: &[(f64, Result<VideoPlan, PlanError>)],
) {
    for line in format_estimate_table(source, info, rows) {
        println!("{}", line);
    }
}

// ============================================================================
// shrink
// ============================================================================

/// Format a single batch event as display lines.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::Started {
            source,
            canvas,
            predicted_bytes,
        } => vec![format!(
            "{} → {}x{} (~{})",
            file_label(source),
            canvas.width,
            canvas.height,
            format_bytes(*predicted_bytes)
        )],
        BatchEvent::Progress { source, progress } => vec![format!(
            "{}{} {:.0}%",
            indent(1),
            file_label(source),
            progress * 100.0
        )],
        BatchEvent::Finished {
            output,
            bytes,
            status,
            ..
        } => {
            let status_str = match status {
                ExportStatus::Cached => "cached",
                ExportStatus::Copied => "copied",
                ExportStatus::Transcoded => "transcoded",
            };
            vec![format!(
                "{}{}: {}, {}",
                indent(1),
                file_label(output),
                status_str,
                format_bytes(*bytes)
            )]
        }
        BatchEvent::Failed { source, error } => {
            vec![format!("{}{}: failed: {}", indent(1), file_label(source), error)]
        }
    }
}

/// Closing summary of a batch.
pub fn format_batch_summary(report: &BatchReport) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        format!(
            "Shrunk {} of {} videos",
            report.succeeded(),
            report.items.len()
        ),
        format!(
            "Predicted: ~{}, actual: {}",
            format_bytes(report.predicted_total),
            format_bytes(report.actual_total)
        ),
        format!("Cache: {}", report.cache),
    ];
    let failures: Vec<_> = report
        .items
        .iter()
        .filter_map(|i| match &i.status {
            JobStatus::Failed { error } => Some((&i.source, error)),
            _ => None,
        })
        .collect();
    if !failures.is_empty() {
        lines.push("Failed:".to_string());
        for (source, error) in failures {
            lines.push(format!("{}{}: {}", indent(1), file_label(source), error));
        }
    }
    lines
}

pub fn print_batch_summary(report: &BatchReport) {
    for line in format_batch_summary(report) {
        println!("{}", line);
    }
}
