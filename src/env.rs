//! Injectable environment lookup.
//!
//! The token resolver reads several `DATABRICKS_*` variables as part of its
//! precedence chain. Going through [`Env`] instead of `std::env` directly
//! keeps that chain testable without mutating process-global state.

use std::collections::HashMap;

/// Environment accessor. [`Env::real`] reads the process environment;
/// [`Env::fake`] serves from a fixed map (for tests).
#[derive(Debug, Clone)]
pub enum Env {
    Real,
    Fake(HashMap<String, String>),
}

impl Env {
    pub fn real() -> Self {
        Env::Real
    }

    pub fn fake<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Env::Fake(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Look up a variable. Unset and empty are both `None`.
    pub fn get(&self, name: &str) -> Option<String> {
        let value = match self {
            Env::Real => std::env::var(name).ok(),
            Env::Fake(vars) => vars.get(name).cloned(),
        };
        value.filter(|v| !v.is_empty())
    }

    /// Look up a boolean variable. Accepts "true" and "1".
    pub fn get_bool(&self, name: &str) -> bool {
        matches!(self.get(name).as_deref(), Some("true") | Some("1"))
    }
}

impl Default for Env {
    fn default() -> Self {
        Env::real()
    }
}
