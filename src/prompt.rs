//! Terminal prompting capability.
//!
//! Resolution logic never talks to a concrete terminal UI; it receives a
//! [`Prompter`] and branches on [`Prompter::is_interactive`]. The terminal
//! implementation uses dialoguer; [`ScriptedPrompter`] replays canned
//! responses for deterministic tests.

use std::collections::VecDeque;
use std::io::IsTerminal;
use std::sync::Mutex;

use anyhow::{Result, bail};
use dialoguer::{Confirm, Input, Password, Select};

/// Blocking prompt capability. At most one prompt is in flight; in
/// non-interactive mode callers must not invoke any prompt.
pub trait Prompter: Send + Sync {
    /// Whether prompting is possible at all. Resolution paths return a
    /// terminal error instead of prompting when this is false.
    fn is_interactive(&self) -> bool;

    /// Pick one item from a list; returns the selected index.
    fn select(&self, label: &str, items: &[String]) -> Result<usize>;

    /// Free-form text input with an optional default.
    fn input(&self, label: &str, default: Option<&str>) -> Result<String>;

    /// Masked input for secrets.
    fn password(&self, label: &str) -> Result<String>;

    fn confirm(&self, label: &str) -> Result<bool>;
}

/// Interactive prompter backed by dialoguer.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
    }

    fn select(&self, label: &str, items: &[String]) -> Result<usize> {
        let idx = Select::new()
            .with_prompt(label)
            .items(items)
            .default(0)
            .interact()?;
        Ok(idx)
    }

    fn input(&self, label: &str, default: Option<&str>) -> Result<String> {
        let mut prompt = Input::<String>::new().with_prompt(label);
        if let Some(default) = default {
            prompt = prompt.default(default.to_string());
        }
        Ok(prompt.interact_text()?)
    }

    fn password(&self, label: &str) -> Result<String> {
        Ok(Password::new().with_prompt(label).interact()?)
    }

    fn confirm(&self, label: &str) -> Result<bool> {
        Ok(Confirm::new().with_prompt(label).interact()?)
    }
}

/// Prompter for contexts where no terminal is attached. Every prompt is an
/// error; resolution paths are expected to check [`Prompter::is_interactive`]
/// first and fail with a more specific message.
pub struct NonInteractivePrompter;

impl Prompter for NonInteractivePrompter {
    fn is_interactive(&self) -> bool {
        false
    }

    fn select(&self, label: &str, _items: &[String]) -> Result<usize> {
        bail!("cannot prompt non-interactively: {label}")
    }

    fn input(&self, label: &str, _default: Option<&str>) -> Result<String> {
        bail!("cannot prompt non-interactively: {label}")
    }

    fn password(&self, label: &str) -> Result<String> {
        bail!("cannot prompt non-interactively: {label}")
    }

    fn confirm(&self, label: &str) -> Result<bool> {
        bail!("cannot prompt non-interactively: {label}")
    }
}

/// A canned response consumed by [`ScriptedPrompter`], in prompt order.
#[derive(Debug, Clone)]
pub enum Response {
    Select(usize),
    Input(String),
    Password(String),
    Confirm(bool),
}

/// Replays a fixed script of responses. Panics (in tests) when the code
/// under test prompts in an unexpected order.
pub struct ScriptedPrompter {
    responses: Mutex<VecDeque<Response>>,
}

impl ScriptedPrompter {
    pub fn new<I: IntoIterator<Item = Response>>(responses: I) -> Self {
        ScriptedPrompter {
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }

    fn next(&self, kind: &str, label: &str) -> Result<Response> {
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => Ok(response),
            None => bail!("unexpected {kind} prompt: {label}"),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn is_interactive(&self) -> bool {
        true
    }

    fn select(&self, label: &str, items: &[String]) -> Result<usize> {
        match self.next("select", label)? {
            Response::Select(i) if i < items.len() => Ok(i),
            Response::Select(i) => bail!("scripted select index {i} out of range: {label}"),
            other => bail!("expected select response for {label}, got {other:?}"),
        }
    }

    fn input(&self, label: &str, default: Option<&str>) -> Result<String> {
        match self.next("input", label)? {
            Response::Input(s) if s.is_empty() => Ok(default.unwrap_or_default().to_string()),
            Response::Input(s) => Ok(s),
            other => bail!("expected input response for {label}, got {other:?}"),
        }
    }

    fn password(&self, label: &str) -> Result<String> {
        match self.next("password", label)? {
            Response::Password(s) => Ok(s),
            other => bail!("expected password response for {label}, got {other:?}"),
        }
    }

    fn confirm(&self, label: &str) -> Result<bool> {
        match self.next("confirm", label)? {
            Response::Confirm(b) => Ok(b),
            other => bail!("expected confirm response for {label}, got {other:?}"),
        }
    }
}
