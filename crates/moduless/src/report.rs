//! Plain-text reports of finished cover runs.
//!
//! ```text
//! PASS: coverLogin
//! FAIL: coverLogout
//!     √ session.closed
//!     ✗: cookies.length === 0
//! ERROR: coverCrash
//!     Cannot read properties of undefined
//!         at coverCrash (/app/src/crash.ts:12:5)
//! ```

use std::fmt::Write as _;

use crate::project::Project;
use crate::protocol::EndCoverMessage;

/// Outcome class of a cover run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Every verification passed
    Pass,
    /// At least one verification failed
    Fail,
    /// The cover threw
    Error,
}

impl Outcome {
    /// Classify a finished run
    #[must_use]
    pub fn of(message: &EndCoverMessage) -> Self {
        if message.has_exception() {
            Self::Error
        } else if message.verifications.iter().all(|v| v.pass) {
            Self::Pass
        } else {
            Self::Fail
        }
    }

    /// Report heading
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
        }
    }
}

/// Format a finished run. When `project` is given, stack frames that point
/// into its bundle are rewritten to original source positions.
#[must_use]
pub fn format_end_cover(message: &EndCoverMessage, project: Option<&Project>) -> String {
    let outcome = Outcome::of(message);
    let mut out = format!("{}: {}\n", outcome.label(), message.cover_name);

    match outcome {
        Outcome::Pass => {}
        Outcome::Error => {
            let _ = writeln!(out, "\t{}", message.exception_description);
            for frame in &message.exception_stack {
                let _ = writeln!(out, "\t\t{}", resolve(frame, project));
            }
        }
        Outcome::Fail => {
            for verification in &message.verifications {
                let mark = if verification.pass { "√" } else { "✗:" };
                let _ = writeln!(out, "\t{mark} {}", verification.expression);
            }
        }
    }
    out
}

fn resolve(frame: &str, project: Option<&Project>) -> String {
    let Some(position) = project.and_then(|p| p.resolve_frame(frame)) else {
        return frame.trim().to_string();
    };
    let trimmed = frame.trim();
    let callee = trimmed
        .strip_prefix("at ")
        .and_then(|rest| rest.split_once(" ("))
        .map(|(callee, _)| callee);
    match callee {
        Some(callee) => format!("at {callee} ({position})"),
        None => format!("at {position}"),
    }
}

/// Running tally across several reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Passing covers
    pub passed: usize,
    /// Covers with a failing verification
    pub failed: usize,
    /// Covers that threw
    pub errored: usize,
}

impl Summary {
    /// Count one finished run
    pub fn record(&mut self, message: &EndCoverMessage) {
        match Outcome::of(message) {
            Outcome::Pass => self.passed += 1,
            Outcome::Fail => self.failed += 1,
            Outcome::Error => self.errored += 1,
        }
    }

    /// Total runs counted
    #[must_use]
    pub const fn total(&self) -> usize {
        self.passed + self.failed + self.errored
    }

    /// Whether every run passed
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} covers: {} passed, {} failed, {} errored",
            self.total(),
            self.passed,
            self.failed,
            self.errored
        )
    }
}
