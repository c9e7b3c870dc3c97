//! Human-in-the-loop choices: approach selection, command confirmation and
//! review item selection.
//!
//! The pipeline only sees the [`Interaction`] trait. [`TerminalInteraction`]
//! reads answers line by line; [`AutoInteraction`] answers every question
//! with the auto policy so unattended runs never block.

use std::cell::RefCell;
use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};

use crate::core::review::ReviewSelection;
use crate::core::types::ReviewItem;

pub trait Interaction {
    /// Pick one of `options`, returning its index. `default` is used on an
    /// empty answer.
    fn request_selection(&self, title: &str, options: &[String], default: usize) -> Result<usize>;

    fn request_text(&self, prompt: &str) -> Result<String>;

    fn confirm(&self, prompt: &str) -> Result<bool>;

    fn request_review_selection(&self, items: &[ReviewItem]) -> Result<ReviewSelection>;
}

/// Line-oriented prompts over any reader and writer (stdin/stdout in production).
pub struct TerminalInteraction<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
}

impl TerminalInteraction<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalInteraction<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
        }
    }

    fn say(&self, text: &str) -> Result<()> {
        let mut output = self.output.borrow_mut();
        output.write_all(text.as_bytes()).context("write prompt")?;
        output.flush().context("flush prompt")
    }

    fn read_answer(&self) -> Result<String> {
        let mut line = String::new();
        let read = self
            .input
            .borrow_mut()
            .read_line(&mut line)
            .context("read answer")?;
        if read == 0 {
            bail!("input closed while waiting for an answer");
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> Interaction for TerminalInteraction<R, W> {
    fn request_selection(&self, title: &str, options: &[String], default: usize) -> Result<usize> {
        let mut menu = format!("\n{title}\n");
        for (idx, option) in options.iter().enumerate() {
            let marker = if idx == default { " (default)" } else { "" };
            menu.push_str(&format!("  {}. {option}{marker}\n", idx + 1));
        }
        self.say(&menu)?;
        loop {
            self.say(&format!("Choose 1-{}: ", options.len()))?;
            let answer = self.read_answer()?;
            if answer.is_empty() {
                return Ok(default);
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
                _ => self.say("Invalid choice.\n")?,
            }
        }
    }

    fn request_text(&self, prompt: &str) -> Result<String> {
        loop {
            self.say(&format!("{prompt}: "))?;
            let answer = self.read_answer()?;
            if !answer.is_empty() {
                return Ok(answer);
            }
        }
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        self.say(&format!("{prompt} [y/N] "))?;
        let answer = self.read_answer()?;
        Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
    }

    fn request_review_selection(&self, items: &[ReviewItem]) -> Result<ReviewSelection> {
        let mut listing = String::from("\nReview findings:\n");
        for item in items {
            listing.push_str(&format!(
                "  {:>2}. [{}] {} ({}): {}\n",
                item.ordinal, item.severity, item.file, item.item_type, item.description
            ));
        }
        self.say(&listing)?;
        loop {
            self.say("Fix which? [a]ll, [n]one, [c]ritical+high, >=medium, or ids like 1,3: ")?;
            match ReviewSelection::parse(&self.read_answer()?) {
                Ok(selection) => return Ok(selection),
                Err(err) => self.say(&format!("{err}\n"))?,
            }
        }
    }
}

/// Unattended answers: default option, approve commands, fix everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoInteraction;

impl Interaction for AutoInteraction {
    fn request_selection(&self, _title: &str, _options: &[String], default: usize) -> Result<usize> {
        Ok(default)
    }

    fn request_text(&self, prompt: &str) -> Result<String> {
        bail!("free-text answer required in unattended mode: {prompt}")
    }

    fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }

    fn request_review_selection(&self, _items: &[ReviewItem]) -> Result<ReviewSelection> {
        Ok(ReviewSelection::All)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn terminal(answers: &str) -> TerminalInteraction<Cursor<Vec<u8>>, Vec<u8>> {
        TerminalInteraction::new(Cursor::new(answers.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn selection_retries_until_valid_and_defaults_on_empty() {
        let options = vec!["flask".to_string(), "django".to_string()];
        let ui = terminal("7\nx\n2\n");
        assert_eq!(ui.request_selection("Approach", &options, 0).expect("select"), 1);

        let ui = terminal("\n");
        assert_eq!(ui.request_selection("Approach", &options, 1).expect("select"), 1);
    }

    #[test]
    fn confirm_accepts_only_yes() {
        assert!(terminal("Y\n").confirm("run?").expect("confirm"));
        assert!(!terminal("\n").confirm("run?").expect("confirm"));
        assert!(!terminal("nope\n").confirm("run?").expect("confirm"));
    }

    #[test]
    fn closed_input_is_an_error() {
        assert!(terminal("").confirm("run?").is_err());
    }

    #[test]
    fn review_selection_reprompts_on_bad_input() {
        let ui = terminal(">=bogus\nc\n");
        assert_eq!(
            ui.request_review_selection(&[]).expect("select"),
            ReviewSelection::AtLeast(crate::core::types::Severity::High)
        );
    }
}
