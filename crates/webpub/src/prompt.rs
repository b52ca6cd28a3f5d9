//! Interactive questions on the controlling terminal.
//!
//! Questions go to stderr so stdout stays clean for scripting. End of input
//! (e.g. stdin redirected from /dev/null) answers "no" to everything.

use std::io::{self, BufRead, Write};

use webpub_mount::Operator;

/// [`Operator`] reading answers from stdin.
pub struct TerminalOperator {
    assume_yes: bool,
}

impl TerminalOperator {
    /// With `assume_yes`, confirmations are answered without asking.
    /// Selections are always asked.
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Operator for TerminalOperator {
    fn choose(&mut self, prompt: &str, options: &[String]) -> Option<String> {
        eprintln!("{prompt}:");
        for option in options {
            eprintln!("  {option}");
        }
        read_answer("Alias (empty to cancel): ").filter(|answer| !answer.is_empty())
    }

    fn confirm(&mut self, question: &str) -> bool {
        if self.assume_yes {
            eprintln!("{question} [y/N] y");
            return true;
        }
        read_answer(&format!("{question} [y/N] ")).is_some_and(|answer| is_yes(&answer))
    }
}

fn read_answer(prompt: &str) -> Option<String> {
    eprint!("{prompt}");
    let _ = io::stderr().flush();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(line.trim().to_string()),
        Err(e) => {
            tracing::warn!("Failed to read answer: {e}");
            None
        }
    }
}

/// Only an explicit yes counts.
fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
