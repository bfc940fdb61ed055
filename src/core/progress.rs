// src/core/progress.rs

//! The adaptive progress indicator.
//!
//! Rendering is opt-in three times over. The diagnostic stream must be an
//! interactive terminal and the `show_progress` flag must be on; verbosity
//! must also sit exactly at Info, because Debug sessions narrate every step
//! on their own and quiet sessions asked for silence. Long loops are
//! sampled rather than redrawn per unit, and the drawn line adapts to the
//! terminal width.

use crate::constants::{FALLBACK_TERMINAL_WIDTH, NARROW_TERMINAL_WIDTH};
use crate::core::settings::Settings;
use crate::models::LogLevel;
use colored::Colorize;
use std::io::{IsTerminal, Write};
use std::sync::Arc;

/// Renders `current/total` style progress on standard error.
pub struct Progress {
    settings: Arc<Settings>,
    interactive: bool,
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("interactive", &self.interactive)
            .finish_non_exhaustive()
    }
}

impl Progress {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self::with_interactivity(settings, std::io::stderr().is_terminal())
    }

    /// Builds a reporter with a fixed interactivity answer, for embedders
    /// that redirect the diagnostic stream.
    pub fn with_interactivity(settings: Arc<Settings>, interactive: bool) -> Self {
        Self {
            settings,
            interactive,
        }
    }

    /// Draws one progress update if every gate and the sampling policy
    /// agree. Returns whether a render happened.
    ///
    /// On the final unit (`current == total`) the line is cleared and a
    /// newline emitted so later output starts on a fresh line.
    pub fn show(&self, current: u64, total: u64, label: &str) -> bool {
        if total == 0 || current > total {
            return false;
        }
        if !self.interactive
            || self.settings.verbosity() != LogLevel::Info
            || !self.settings.show_progress()
        {
            return false;
        }
        if !should_sample(current, total, self.settings.progress_update_interval()) {
            return false;
        }

        let width = terminal_width();
        let line = render_line(current, total, label, width);
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r{line}");
        if current == total {
            let _ = write!(stderr, "\r{blank:width$}\r", blank = "");
            let _ = writeln!(stderr);
        }
        let _ = stderr.flush();
        true
    }
}

/// The sampling policy. Tiny loops show only their boundaries; larger
/// ones add a midpoint, then a five-unit stride, then the configured
/// interval. A zero `current` is the not-yet-started state and never
/// renders.
fn should_sample(current: u64, total: u64, interval: u64) -> bool {
    if current == 0 {
        return false;
    }
    if current == 1 || current == total {
        return true;
    }
    match total {
        0..=3 => false,
        4..=8 => current == total.div_ceil(2),
        9..=25 => current % 5 == 0,
        _ => current % interval.max(1) == 0,
    }
}

fn render_line(current: u64, total: u64, label: &str, width: usize) -> String {
    let line = if width >= NARROW_TERMINAL_WIDTH {
        let percent = current.saturating_mul(100) / total.max(1);
        format!(
            "{}: {} of {} ({percent}%)",
            label.bold(),
            group_digits(current),
            group_digits(total)
        )
    } else {
        format!("{current}/{total}")
    };
    // One line only; anything past the terminal edge would wrap and
    // defeat the carriage-return redraw.
    line.chars().take(width.saturating_sub(1)).collect()
}

/// The terminal width in columns, from the `COLUMNS` variable shells
/// export, with a conventional fallback.
pub fn terminal_width() -> usize {
    width_from(|name| std::env::var(name).ok())
}

fn width_from<F>(lookup: F) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    lookup("COLUMNS")
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|w| *w > 0)
        .unwrap_or(FALLBACK_TERMINAL_WIDTH)
}

fn group_digits(n: u64) -> String {
    let raw = n.to_string();
    let mut grouped = String::with_capacity(raw.len() + raw.len() / 3);
    for (idx, ch) in raw.chars().enumerate() {
        let remaining = raw.len() - idx;
        if idx > 0 && remaining % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
