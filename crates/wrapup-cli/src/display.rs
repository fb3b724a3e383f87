//! Vertical card display for a panel snapshot.
//!
//! Text sections are word-wrapped into a fixed-height region; a section whose
//! content overflows that region by more than the scroll tolerance is cut off
//! with a scroll marker, the way the panel shows a scrollbar.

use std::fmt::Display;

use wrapup_core::layout::{OverflowMode, TextRegion};
use wrapup_core::{Severity, TextField};
use wrapup_host::{PanelSnapshot, TextSection, WrapUpSuggestion};

const TEXT_WIDTH: usize = 72;
const VISIBLE_LINES: usize = 4;
const LINE_HEIGHT_PX: f64 = 20.0;

// ── Public API ──

/// Print the whole panel as a card: wrap-up codes, then the text sections.
pub fn print_panel(snapshot: &PanelSnapshot, tolerance: f64) {
    println!("=== {} {} ===", snapshot.kind, snapshot.record_id);
    if !snapshot.loaded {
        println!("  (record not loaded)");
        println!();
        return;
    }
    println!();

    let header = if snapshot.processing {
        "Wrap-up codes (sending...)"
    } else {
        "Wrap-up codes"
    };
    println!("{header}");
    for suggestion in &snapshot.wrap_ups {
        println!("{}", wrap_up_line(suggestion));
    }
    println!();

    for section in &snapshot.sections {
        print_section(section, tolerance);
    }
}

pub fn print_toast(title: &str, message: &str, severity: Severity) {
    println!("[{severity}] {title}: {message}");
}

const HELP: &[(&str, &str)] = &[
    ("edit <text>", "replace the summary (auto-saves after the debounce)"),
    ("blur", "save the summary now"),
    ("select <1-3>", "send a suggested wrap-up code"),
    ("refresh", "refetch the record"),
    ("show", "print the panel"),
    ("quit", "save pending edits and exit"),
];

pub fn print_help() {
    println!("Commands");
    for (command, description) in HELP {
        print_row(command, description);
    }
}

/// One `label  value` row, aligned like the rest of the card.
pub fn print_row(label: &str, value: impl Display) {
    println!("  {label:<26} {value}");
}

// ── Rendering ──

fn wrap_up_line(suggestion: &WrapUpSuggestion) -> String {
    let name = if suggestion.name.is_empty() {
        "-"
    } else {
        suggestion.name.as_str()
    };
    let code = suggestion.code_id.as_deref().unwrap_or("no code");
    format!(
        "  [{}] {:<22} {:>5}  {:<18} {}",
        suggestion.slot,
        name,
        percent(suggestion.confidence),
        suggestion.color.to_string(),
        code
    )
}

fn print_section(section: &TextSection, tolerance: f64) {
    let mut header = format!(
        "{} {}  {}",
        section.field.label(),
        percent(section.confidence),
        section.color
    );
    if section.editing {
        header.push_str("  (editing)");
    }
    println!("{header}");

    let (lines, truncated) = visible_lines(&section.text, tolerance);
    if lines.is_empty() {
        println!("    -");
    }
    for line in lines {
        println!("    {line}");
    }
    if truncated {
        println!("    ... (scroll for more)");
    }
    if section.field == TextField::Summary && !section.editing {
        println!("    (type `edit <text>` to change)");
    }
    println!();
}

/// Lines to print for `text`, and whether the region would scroll.
fn visible_lines(text: &str, tolerance: f64) -> (Vec<String>, bool) {
    let mut lines = wrap(text, TEXT_WIDTH);
    let region = TextRegion {
        scroll_height: lines.len() as f64 * LINE_HEIGHT_PX,
        client_height: VISIBLE_LINES as f64 * LINE_HEIGHT_PX,
    };
    let scrolls = region.overflow(tolerance).vertical == OverflowMode::Auto;
    if scrolls {
        lines.truncate(VISIBLE_LINES);
    }
    (lines, scrolls)
}

fn percent(confidence: Option<f64>) -> String {
    match confidence {
        Some(c) if c.is_finite() => format!("{:.0}%", c * 100.0),
        _ => "--".to_string(),
    }
}

/// Greedy word wrap. Words longer than `width` get a line of their own.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}
