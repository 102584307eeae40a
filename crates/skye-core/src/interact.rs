//! User interaction seam.
//!
//! Everything the improve loop says to or asks of the user goes through
//! [`Interaction`], so the CLI can bind it to the terminal and tests can
//! script it.

use std::future::Future;

use crate::error::CoreError;

/// Line-oriented conversation with the user.
pub trait Interaction {
    /// Show a line of output.
    fn show(&mut self, message: &str);

    /// Ask a question and wait for one line of input.
    ///
    /// Returns `Ok(None)` at end of input. The returned line has its
    /// trailing newline removed but is otherwise untrimmed.
    fn ask(&mut self, prompt: &str) -> impl Future<Output = Result<Option<String>, CoreError>>;
}
