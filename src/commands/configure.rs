//! `databricks configure`: save a personal-access-token profile.
//!
//! A PAT-based profile clears all OAuth metadata and non-PAT credential
//! keys so a single profile never satisfies more than one strategy.

use std::io::BufRead;

use anyhow::{Result, bail};

use crate::cfgfile;
use crate::commands::App;
use crate::config::ResolvedConfig;
use crate::consts;
use crate::profile;

/// Keys removed when saving a PAT profile.
const PAT_CLEAR_KEYS: &[&str] = &[
    "auth_type",
    "scopes",
    "client_id",
    "client_secret",
    "username",
    "password",
    "experimental_is_unified_host",
];

pub fn run(app: &App, host_flag: Option<String>, profile_flag: Option<String>) -> Result<()> {
    let mut cfg = ResolvedConfig {
        host: host_flag
            .or_else(|| app.env.get(consts::ENV_HOST))
            .unwrap_or_default(),
        token: app.env.get(consts::ENV_TOKEN).unwrap_or_default(),
        profile: profile_flag
            .or_else(|| app.env.get(consts::ENV_CONFIG_PROFILE))
            .unwrap_or_default(),
        config_file: app.env.get(consts::ENV_CONFIG_FILE).unwrap_or_default(),
        ..Default::default()
    };
    if !cfg.host.is_empty() {
        cfg.host = validate_host(&cfg.host)?;
    }

    if app.prompter.is_interactive() {
        if cfg.host.is_empty() {
            let input = app
                .prompter
                .input("Databricks workspace host (https://...)", None)?;
            cfg.host = validate_host(&input)?;
        }
        if cfg.token.is_empty() {
            cfg.token = app.prompter.password("Personal access token")?;
        }
    } else {
        if cfg.host.is_empty() {
            bail!("host must be set in non-interactive mode");
        }
        if cfg.token.is_empty() {
            cfg.token = read_token_from_stdin()?;
        }
    }

    cfgfile::save_to_profile(&cfg, PAT_CLEAR_KEYS)
}

fn validate_host(host: &str) -> Result<String> {
    let canonical = profile::canonicalize_host(host);
    let hostname = canonical.split("://").nth(1).unwrap_or_default();
    if hostname.is_empty() {
        bail!("invalid host: {host}");
    }
    if !canonical.starts_with("https://") {
        bail!("host must use https: {host}");
    }
    Ok(canonical)
}

fn read_token_from_stdin() -> Result<String> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let token = line.trim().to_string();
    if token.is_empty() {
        bail!("no token provided on stdin");
    }
    Ok(token)
}
