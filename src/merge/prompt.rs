//! Asking the user to settle a conflict.

use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Write};

/// A source of answers for conflict prompts.
pub trait Prompter {
    /// ask a question; an empty answer means `default`
    fn prompt(&mut self, message: &str, default: &str) -> io::Result<String>;
}

/// Prompts on stderr and reads answers from stdin.
///
/// Without a terminal on stdin every prompt returns its default, so a merge
/// run from a script takes the default choice.
#[derive(Debug, Default)]
pub struct StdioPrompter;

impl Prompter for StdioPrompter {
    fn prompt(&mut self, message: &str, default: &str) -> io::Result<String> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            tracing::info!(default, "no terminal, using default answer");
            return Ok(default.to_string());
        }

        let mut stderr = io::stderr();
        write!(stderr, "{} [{}]: ", message, default)?;
        stderr.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(default.to_string());
        }
        let answer = line.trim();
        Ok(if answer.is_empty() { default } else { answer }.to_string())
    }
}

/// Answers prompts from a fixed list, for tests and scripted merges.
///
/// Once the answers run out every prompt gets its default.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<S: Into<String>>(answers: impl IntoIterator<Item = S>) -> Self {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }

    /// every message prompted so far
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl Prompter for ScriptedPrompter {
    fn prompt(&mut self, message: &str, default: &str) -> io::Result<String> {
        self.asked.push(message.to_string());
        let answer = self.answers.pop_front().unwrap_or_default();
        Ok(if answer.is_empty() { default.to_string() } else { answer })
    }
}

/// ask until the answer is one of `choices`; returns the matching choice
pub(crate) fn choose(
    prompter: &mut dyn Prompter,
    message: &str,
    choices: &[&str],
    default: &str,
) -> io::Result<String> {
    // a scripted prompter with a bad answer would loop forever
    const MAX_ATTEMPTS: usize = 5;

    let mut question = message.to_string();
    for _ in 0..MAX_ATTEMPTS {
        let answer = prompter.prompt(&question, default)?;
        let answer = answer.trim().to_lowercase();
        if let Some(choice) = choices.iter().find(|c| **c == answer) {
            return Ok(choice.to_string());
        }
        question = format!("Please answer one of {}. {}", choices.join("/"), message);
    }
    Ok(default.to_string())
}
