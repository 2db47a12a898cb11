//! Command implementations behind the clap surface in `main.rs`.

pub mod configure;
pub mod login;
pub mod token;

use std::sync::Arc;

use crate::env::Env;
use crate::oauth::TokenStore;
use crate::profile::Profiler;
use crate::prompt::Prompter;

/// Shared collaborators wired up once in `main` and passed to every
/// command. Tests construct this with in-memory implementations.
pub struct App {
    pub env: Env,
    pub profiler: Box<dyn Profiler>,
    pub store: Arc<dyn TokenStore>,
    pub prompter: Box<dyn Prompter>,
}
