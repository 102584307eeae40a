//! Static analysis module.
//!
//! Runs the configured checkers (flake8, mypy, ...) against a file list and
//! collects their stdout lines as findings. A checker's exit status only says
//! "issues found", so it is logged but never treated as failure. A checker
//! that is not installed becomes a single synthetic finding.

use std::fmt;
use std::io;
use std::path::PathBuf;

use tracing::{debug, instrument, warn};

use crate::config::Checker;

/// One line of checker output.
///
/// Findings are opaque: no file, line or severity is parsed out of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Name of the checker that produced the line.
    pub checker: String,
    /// The output line, verbatim.
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Runs static checkers in sequence and collects findings.
#[derive(Debug, Clone)]
pub struct Analyzer {
    checkers: Vec<Checker>,
}

impl Analyzer {
    /// Create a new analyzer running `checkers` in the given order.
    pub fn new(checkers: Vec<Checker>) -> Self {
        Self { checkers }
    }

    /// Names of the configured checkers, in run order.
    pub fn checker_names(&self) -> Vec<&str> {
        self.checkers.iter().map(|c| c.name.as_str()).collect()
    }

    /// Run every checker on `files` and collect their findings.
    ///
    /// Findings are ordered checker by checker, then line by line. All
    /// checkers run even when an earlier one is missing or reports issues.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn analyze(&self, files: &[PathBuf]) -> Vec<Finding> {
        let mut findings = Vec::new();

        for checker in &self.checkers {
            debug!(checker = %checker.name, program = %checker.program, "running checker");

            let output = match tokio::process::Command::new(&checker.program)
                .args(&checker.args)
                .args(files)
                .output()
                .await
            {
                Ok(output) => output,
                Err(e) => {
                    warn!(checker = %checker.name, error = %e, "failed to spawn checker");
                    findings.push(Finding {
                        checker: checker.name.clone(),
                        message: unavailable_message(&checker.name, &e),
                    });
                    continue;
                }
            };

            if !output.status.success() {
                debug!(
                    checker = %checker.name,
                    exit_code = ?output.status.code(),
                    "checker reported issues"
                );
            }
            if !output.stderr.is_empty() {
                debug!(
                    checker = %checker.name,
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "checker stderr"
                );
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            let before = findings.len();
            findings.extend(
                stdout
                    .trim()
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| Finding {
                        checker: checker.name.clone(),
                        message: line.to_owned(),
                    }),
            );
            debug!(
                checker = %checker.name,
                findings = findings.len() - before,
                "checker finished"
            );
        }

        findings
    }
}

fn unavailable_message(name: &str, err: &io::Error) -> String {
    if err.kind() == io::ErrorKind::NotFound {
        format!("{name} is not installed or not found in PATH.")
    } else {
        format!("{name} could not be run: {err}")
    }
}
