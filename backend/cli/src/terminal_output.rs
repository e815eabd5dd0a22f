//! Terminal rendering for the `analyze` command: progress line, status
//! notes, and the run summary table.
//!
//! Status goes to stderr so stdout carries only results.

use std::io::Write;

use labelscan_core::{PipelineState, ProgressEvent, ProgressPhase};

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";

pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";

/// Check if the terminal supports color output.
pub fn supports_color() -> bool {
    std::env::var("NO_COLOR").is_err()
        && (std::env::var("COLORTERM").is_ok()
            || std::env::var("TERM")
                .map(|t| t != "dumb")
                .unwrap_or(false))
}

/// Strip ANSI escape codes from a string.
pub fn strip_ansi(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn paint(color: &str, text: &str) -> String {
    if supports_color() {
        format!("{color}{BOLD}{text}{RESET}")
    } else {
        text.to_string()
    }
}

pub fn note_info(msg: &str) {
    eprintln!("{} {msg}", paint(CYAN, "info:"));
}

pub fn note_warn(msg: &str) {
    eprintln!("{} {msg}", paint(YELLOW, "warning:"));
}

pub fn note_error(msg: &str) {
    eprintln!("{} {msg}", paint(RED, "error:"));
}

pub fn note_success(msg: &str) {
    eprintln!("{} {msg}", paint(GREEN, "done:"));
}

/// Section heading for stdout output.
pub fn heading(title: &str) -> String {
    if supports_color() {
        format!("{BOLD}{title}{RESET}\n{}", "=".repeat(title.chars().count()))
    } else {
        format!("{title}\n{}", "=".repeat(title.chars().count()))
    }
}

/// Render a single-line progress bar, e.g. `[#####-----]  50% recognizing text`.
pub fn render_progress(progress: &ProgressEvent, width: usize) -> String {
    let percent = progress.percent.clamp(0.0, 1.0);
    let filled = ((percent * width as f32).round() as usize).min(width);
    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(width - filled));
    let pct = (percent * 100.0).round() as u32;
    match progress.phase {
        ProgressPhase::Error => format!("[{bar}] {pct:>3}% {} (failed)", progress.label),
        _ => format!("[{bar}] {pct:>3}% {}", progress.label),
    }
}

/// Overwrite the current terminal line.
pub fn write_progress_line(writer: &mut impl Write, line: &str) -> std::io::Result<()> {
    write!(writer, "\r\x1b[2K{line}")?;
    writer.flush()
}

/// Two-column key/value table.
pub fn render_table(rows: &[(&str, String)]) -> String {
    let key_width = rows
        .iter()
        .map(|(k, _)| strip_ansi(k).chars().count())
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    for (key, value) in rows {
        let pad = key_width.saturating_sub(strip_ansi(key).chars().count());
        out.push_str(&format!("  {key}{}  {value}\n", " ".repeat(pad)));
    }
    out
}

/// Summary of a finished run.
pub fn render_summary(state: &PipelineState, provider: &str, engine: &str) -> String {
    let mut rows = vec![
        ("Phase", state.phase.to_string()),
        ("Mode", state.mode.to_string()),
        ("OCR engine", engine.to_string()),
        ("LLM provider", provider.to_string()),
    ];
    if let Some(image) = &state.image {
        rows.push((
            "Image",
            format!(
                "{} ({}, {} bytes)",
                image.name.as_deref().unwrap_or("<unnamed>"),
                image.mime_type,
                image.size_bytes
            ),
        ));
    }
    if let Some(ocr) = &state.ocr_result {
        rows.push(("OCR chars", ocr.text.chars().count().to_string()));
    }
    if let Some(analysis) = &state.analysis_result {
        let status = if analysis.succeeded { "ok" } else { "fallback" };
        rows.push(("Analysis", status.to_string()));
    }
    render_table(&rows)
}
