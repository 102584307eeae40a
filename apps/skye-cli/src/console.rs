//! Terminal binding for [`Interaction`].

use std::io::{self, BufRead, Write};
use std::thread;

use skye_core::{CoreError, Interaction};
use tokio::sync::mpsc;

/// Prints to stdout and reads answers line by line from stdin.
///
/// Stdin is read on a plain OS thread that hands lines over a channel. A
/// read blocked there does not hold up runtime shutdown, so an interrupted
/// session can exit while the user has not typed anything.
pub struct Console {
    lines: mpsc::Receiver<io::Result<String>>,
}

impl Console {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
        Self { lines: rx }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Interaction for Console {
    fn show(&mut self, message: &str) {
        println!("{message}");
    }

    async fn ask(&mut self, prompt: &str) -> Result<Option<String>, CoreError> {
        print!("{prompt}");
        io::stdout().flush()?;
        match self.lines.recv().await {
            Some(line) => Ok(Some(line?)),
            None => Ok(None),
        }
    }
}
