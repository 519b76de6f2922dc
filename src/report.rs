//! Call reporting: one status line per invoked phase.
//!
//! Test bodies are reported as `"  <name>... passed [1.2s]"`, with the status
//! word optionally right-aligned to the configured width. Setup and teardown
//! phases only print when they fail. A failure is followed by a one-line
//! `<type>: <message>` summary and, when output was captured, the replayed
//! output banners.

use std::time::{Duration, Instant};

use miette::Report;

use crate::config::{HarnessConfig, GREEN, RED, YELLOW};
use crate::errors::HarnessError;
use crate::output::{capture, replay_captured, SharedOutput};

/// How much a call prints when it succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStyle {
    /// `"  name... passed"` for every call.
    StatusLine,
    /// Silent on success; `"  name failed (...)"` on failure.
    FailureOnly,
}

pub struct CallReporter<'a> {
    config: &'a HarnessConfig,
    out: &'a SharedOutput,
}

impl<'a> CallReporter<'a> {
    pub fn new(config: &'a HarnessConfig, out: &'a SharedOutput) -> Self {
        Self { config, out }
    }

    /// Time `body`, report its outcome, and hand its result back unchanged.
    ///
    /// `name` is the qualified name shown on the status line, `phase` labels the
    /// captured-output banners. With `intercept` unset (or a verbose config) the
    /// body writes straight to the real sink.
    pub fn call<T, F>(
        &self,
        name: &str,
        phase: &str,
        style: ReportStyle,
        intercept: bool,
        body: F,
    ) -> miette::Result<T>
    where
        F: FnOnce(&SharedOutput) -> miette::Result<T>,
    {
        let prefix = format!("  {}... ", name);
        if style == ReportStyle::StatusLine {
            self.out.write(&prefix);
        }

        let start = Instant::now();
        let stream = self.config.verbose || !intercept;
        let (result, captured) = capture(stream, self.out, body);
        let elapsed = start.elapsed();

        match &result {
            Ok(_) => {
                if style == ReportStyle::StatusLine {
                    self.status(prefix.len(), "passed", GREEN, elapsed);
                }
            }
            Err(err) => {
                match style {
                    ReportStyle::StatusLine => {
                        self.status(prefix.len(), &format!("failed ({})", err), RED, elapsed)
                    }
                    ReportStyle::FailureOnly => self.out.line(
                        &self
                            .config
                            .colorize(&format!("  {} failed ({})", name, err), RED),
                    ),
                }
                self.out.line(&error_summary(err));
                self.out.line("");
                if let Some(captured) = captured {
                    replay_captured(phase, &captured, self.out);
                }
            }
        }
        result
    }

    /// Status line for a call that was deliberately not invoked.
    pub fn skip(&self, name: &str, reason: &str) {
        let prefix = format!("  {}... ", name);
        self.out.write(&prefix);
        self.status(prefix.len(), &format!("skipped ({})", reason), YELLOW, Duration::ZERO);
    }

    fn status(&self, prefix_len: usize, word: &str, color: &str, elapsed: Duration) {
        let (time, warn) = elapsed_parts(elapsed);
        let visible = if time.is_empty() {
            word.len()
        } else {
            word.len() + 1 + time.len()
        };
        let pad = " ".repeat(self.config.width.saturating_sub(prefix_len + visible));
        let mut line = format!("{}{}", pad, self.config.colorize(word, color));
        if !time.is_empty() {
            line.push(' ');
            if warn {
                line.push_str(&self.config.colorize(&time, YELLOW));
            } else {
                line.push_str(&time);
            }
        }
        self.out.line(&line);
    }
}

/// Render elapsed time; slow calls come back flagged for the warning color.
pub fn elapsed_parts(elapsed: Duration) -> (String, bool) {
    let secs = elapsed.as_secs_f64();
    if secs > 10.0 {
        (format!("[{}s]", secs.round() as u64), true)
    } else if secs > 5.0 {
        (format!("[{:.1}s]", secs), true)
    } else if secs > 1.0 {
        (format!("[{:.1}s]", secs), false)
    } else if secs > 0.1 {
        (format!("[{:.2}s]", secs), false)
    } else {
        (String::new(), false)
    }
}

/// Elapsed time with the warning color applied to slow calls.
pub fn timedelta_str(elapsed: Duration, config: &HarnessConfig) -> String {
    match elapsed_parts(elapsed) {
        (time, true) => config.colorize(&time, YELLOW),
        (time, false) => time,
    }
}

/// Single-line `<type>: <message>` rendering of a failure.
pub fn error_summary(err: &Report) -> String {
    let kind = if let Some(harness) = err.downcast_ref::<HarnessError>() {
        harness.error_type().to_string()
    } else if let Some(code) = err.code() {
        code.to_string()
    } else {
        "Error".to_string()
    };
    let message = err.to_string();
    let first_line = message.lines().next().unwrap_or("");
    format!("{}: {}", kind, first_line)
}
