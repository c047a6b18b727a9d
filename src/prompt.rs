//! Interactive prompts.
//!
//! Commands that may destroy local edits ask through [`Confirm`] so the
//! decision can be scripted in tests. Without a terminal on stdin the
//! answer is always "no".

use std::io::IsTerminal as _;

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Password};

/// Yes/no gate before an overwrite.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Asks on the terminal; declines when stdin is not interactive.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if !std::io::stdin().is_terminal() {
            return false;
        }
        dialoguer::Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

/// Fixed answer, for `--force`-like callers and tests.
#[derive(Clone, Copy, Debug)]
pub struct Answer(pub bool);

impl Confirm for Answer {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

pub fn ask_text(prompt: &str) -> std::io::Result<String> {
    Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact_text()
        .map_err(std::io::Error::other)
}

pub fn ask_secret(prompt: &str) -> std::io::Result<String> {
    Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact()
        .map_err(std::io::Error::other)
}

#[must_use]
pub fn stdin_is_terminal() -> bool {
    std::io::stdin().is_terminal()
}
