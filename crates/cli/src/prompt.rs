//! Line prompts
//!
//! [`Prompt`] is the seam interactive selection goes through; tests supply
//! their own answers.

use console::Term;
use std::io::BufRead;

/// Source of interactive answers
pub trait Prompt {
    /// Show `message` and read one line
    ///
    /// Returns `None` when input is closed or interrupted.
    fn ask(&mut self, message: &str) -> Option<String>;
}

/// Prompt on the controlling terminal, falling back to plain stdin
#[derive(Debug, Default)]
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
    fn ask(&mut self, message: &str) -> Option<String> {
        let term = Term::stdout();
        if term.is_term() {
            term.write_str(message).ok()?;
            return term.read_line().ok().map(|line| line.trim().to_string());
        }

        print!("{message}");
        let _ = std::io::Write::flush(&mut std::io::stdout());
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

/// Replays fixed answers, then reports closed input
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: std::collections::VecDeque<String>,
    /// Messages shown so far
    pub asked: Vec<String>,
}

impl ScriptedPrompt {
    /// Answer with `answers` in order
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&mut self, message: &str) -> Option<String> {
        self.asked.push(message.to_string());
        self.answers.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_prompt_runs_out() {
        let mut prompt = ScriptedPrompt::new(["x", "2"]);
        assert_eq!(prompt.ask("pick: ").as_deref(), Some("x"));
        assert_eq!(prompt.ask("pick: ").as_deref(), Some("2"));
        assert_eq!(prompt.ask("pick: "), None);
        assert_eq!(prompt.asked.len(), 3);
    }
}
