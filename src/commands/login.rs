//! `databricks auth login`: run the OAuth challenge for a host or profile
//! and persist the result as a profile.

use anyhow::{Result, bail};

use crate::auth::{AUTH_TYPE_DATABRICKS_CLI, AuthArguments};
use crate::cfgfile;
use crate::commands::App;
use crate::config::ResolvedConfig;
use crate::consts;
use crate::profile::{self, ProfileError, match_profile_names};

pub async fn run(app: &App, mut auth_arguments: AuthArguments, positional: Option<String>) -> Result<()> {
    // The positional argument is an alternative spelling of --host.
    if let Some(host) = positional {
        if !auth_arguments.host.is_empty() {
            bail!("providing both a positional host and --host is not supported");
        }
        auth_arguments.host = host;
    }

    let mut profile_name = auth_arguments.profile.clone();
    if profile_name.is_empty() {
        if app.prompter.is_interactive() {
            profile_name = app
                .prompter
                .input("Databricks profile name", Some(consts::DEFAULT_SECTION))?;
        } else {
            profile_name = consts::DEFAULT_SECTION.to_string();
        }
    }

    // An existing profile supplies defaults for everything not passed as a
    // flag, so `auth login --profile dev` re-runs the challenge in place.
    let existing = match app
        .profiler
        .load_profiles(&match_profile_names([profile_name.as_str()]))
    {
        Ok(profiles) => profiles.into_iter().next(),
        Err(ProfileError::NoConfiguration { .. }) => None,
        Err(err) => return Err(err.into()),
    };
    if let Some(p) = &existing {
        auth_arguments.apply_profile_defaults(p);
    }

    if auth_arguments.host.is_empty() {
        if !app.prompter.is_interactive() {
            bail!("no host provided");
        }
        auth_arguments.host = app.prompter.input(
            "Databricks host (e.g. https://<workspace>.cloud.databricks.com)",
            None,
        )?;
    }
    let canonical = profile::canonicalize_host(&auth_arguments.host);
    if (auth_arguments.is_unified_host || profile::is_account_host(&canonical))
        && auth_arguments.account_id.is_empty()
    {
        if !app.prompter.is_interactive() {
            bail!("no account ID provided for account host {}", auth_arguments.host);
        }
        auth_arguments.account_id = app.prompter.input("Databricks account ID", None)?;
    }

    auth_arguments.profile = profile_name.clone();
    let oauth_argument = auth_arguments.to_oauth_argument()?;
    app.store
        .challenge(&oauth_argument, Some(&profile_name), app.prompter.as_ref())
        .await?;

    cfgfile::save_to_profile(
        &ResolvedConfig {
            profile: profile_name.clone(),
            host: canonical,
            auth_type: AUTH_TYPE_DATABRICKS_CLI.to_string(),
            account_id: auth_arguments.account_id.clone(),
            workspace_id: auth_arguments.workspace_id.clone(),
            is_unified_host: auth_arguments.is_unified_host,
            config_file: app.env.get(consts::ENV_CONFIG_FILE).unwrap_or_default(),
            ..Default::default()
        },
        &[],
    )?;

    println!("Profile {profile_name} was successfully saved");
    Ok(())
}
