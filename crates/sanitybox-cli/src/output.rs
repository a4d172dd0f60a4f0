//! Formatted output helpers for CLI commands.
//!
//! Provides colored status markers, human-readable durations, and the
//! JSON shape of a failed run.

use std::time::Duration;

use sanitybox_common::error::{RunError, SanityError};

pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const RESET: &str = "\x1b[0m";

/// Formats a duration for humans (e.g., "850ms", "12.4s", "3m 05s").
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else if d.as_secs() < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        let secs = d.as_secs();
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

/// The last `n` lines of `lines`.
#[must_use]
pub fn tail(lines: &[String], n: usize) -> &[String] {
    &lines[lines.len().saturating_sub(n)..]
}

/// JSON report for a run that ended in an error.
#[must_use]
pub fn failure_json(err: &SanityError) -> serde_json::Value {
    let (status, kind) = match err {
        SanityError::Build(_) => ("error", "build"),
        SanityError::Run(RunError::TestExecution { .. }) => ("failed", "test"),
        SanityError::Run(RunError::TimedOut { .. }) => ("error", "timeout"),
        SanityError::Run(RunError::Cancelled { .. }) => ("error", "cancelled"),
        SanityError::Run(RunError::Spawn { .. }) => ("error", "run"),
        SanityError::Config { .. } | SanityError::Io { .. } | SanityError::Serialization { .. } => {
            ("error", "setup")
        }
    };
    let exit_code = match err {
        SanityError::Run(e) => e.exit_code(),
        _ => None,
    };
    serde_json::json!({
        "status": status,
        "kind": kind,
        "error": err.to_string(),
        "exit_code": exit_code,
        "output": err.output(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_displays_millis() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
    }

    #[test]
    fn format_duration_displays_seconds() {
        assert_eq!(format_duration(Duration::from_millis(12_400)), "12.4s");
    }

    #[test]
    fn format_duration_displays_minutes() {
        assert_eq!(format_duration(Duration::from_secs(185)), "3m 05s");
    }

    #[test]
    fn tail_keeps_last_lines() {
        let lines: Vec<String> = (0..5).map(|i| i.to_string()).collect();
        assert_eq!(tail(&lines, 2), ["3", "4"]);
        assert_eq!(tail(&lines, 10).len(), 5);
    }

    #[test]
    fn failure_json_carries_output_and_code() {
        let err = SanityError::Run(RunError::TestExecution {
            command: "podman run".into(),
            exit_code: 1,
            output: vec!["test1 ran".into(), "test2 ran".into()],
        });
        let json = failure_json(&err);
        assert_eq!(json["status"], "failed");
        assert_eq!(json["exit_code"], 1);
        assert_eq!(json["output"][1], "test2 ran");
    }
}
