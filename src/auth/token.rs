//! Token resolution: turn flags, a positional argument, environment
//! variables and stored profiles into a valid OAuth token.

use std::time::Duration;

use anyhow::{Result, anyhow, bail};

use crate::auth::error::{helpful_error, invalid_refresh_token_message};
use crate::auth::{AUTH_TYPE_DATABRICKS_CLI, AuthArguments};
use crate::cfgfile;
use crate::config::ResolvedConfig;
use crate::consts;
use crate::env::Env;
use crate::oauth::{Token, TokenStore, TokenStoreError};
use crate::profile::{
    self, Profile, ProfileError, ProfileMatchFn, Profiler, match_all_profiles,
    match_profile_names, with_host, with_host_and_account_id,
};
use crate::prompt::Prompter;

/// Everything [`load_token`] needs. Collaborators are injected so tests can
/// run against in-memory profile and token stores.
pub struct LoadTokenArgs<'a> {
    pub auth_arguments: AuthArguments,
    /// Value of the `--profile` flag, empty when not given.
    pub profile_name: String,
    /// Positional arguments (at most one: a host or a profile name).
    pub args: Vec<String>,
    pub token_timeout: Duration,
    pub profiler: &'a dyn Profiler,
    pub store: &'a dyn TokenStore,
    pub prompter: &'a dyn Prompter,
    pub env: &'a Env,
}

/// Outcome of the interactive profile picker.
enum ProfileSelection {
    Profile(String),
    CreateNew,
    EnterHost,
}

/// Load an OAuth token from the persistent token store. The host and account
/// ID are resolved from the profile store when not explicitly provided. A
/// failed refresh is rewritten into a message with reauthentication steps.
pub async fn load_token(mut args: LoadTokenArgs<'_>) -> Result<Token> {
    if !args.profile_name.is_empty() && !args.args.is_empty() {
        bail!("providing both a profile and host is not supported");
    }

    // A single positional argument is treated as a profile name when it
    // matches a stored profile, and as a host otherwise.
    if args.profile_name.is_empty() && args.args.len() == 1 {
        let candidate = load_profile_by_name(&args.args[0], args.profiler)?;
        if candidate.is_some() {
            args.profile_name = args.args.remove(0);
        }
    }

    let mut existing_profile = load_profile_by_name(&args.profile_name, args.profiler)?;
    if let Some(p) = &existing_profile {
        args.auth_arguments.apply_profile_defaults(p);
    }

    // Nothing to go on at all: fall back to environment variables, then to
    // interactive profile selection.
    if args.profile_name.is_empty() && args.auth_arguments.host.is_empty() && args.args.is_empty()
    {
        let (resolved_name, resolved_profile) = resolve_no_args_token(&mut args).await?;
        args.profile_name = resolved_name;
        existing_profile = resolved_profile;
        if let Some(p) = &existing_profile {
            args.auth_arguments.apply_profile_defaults(p);
        }
    }

    set_host_and_account_id(
        existing_profile.as_ref(),
        &mut args.auth_arguments,
        &args.args,
        args.prompter,
    )?;

    // When no profile was specified, resolve the host back to a profile so
    // the token cache lookup uses the profile key rather than the host URL.
    // A host with no matching profile falls back to the legacy host key.
    if args.profile_name.is_empty() && !args.auth_arguments.host.is_empty() {
        let host = args.auth_arguments.host.clone();
        let canonical = profile::canonicalize_host(&host);
        let match_fn: ProfileMatchFn =
            if args.auth_arguments.is_unified_host || profile::is_account_host(&canonical) {
                with_host_and_account_id(&host, &args.auth_arguments.account_id)
            } else {
                with_host(&host)
            };

        let matching = load_profiles_or_empty(args.profiler, &match_fn)?;
        if matching.len() > 1 {
            if !args.prompter.is_interactive() {
                let names: Vec<&str> = matching.iter().map(|p| p.name.as_str()).collect();
                bail!(
                    "{} match {} in {}. Use --profile to specify which profile to use",
                    names.join(" and "),
                    host,
                    args.profiler.path()
                );
            }
            let selected = ask_for_matching_profile(args.prompter, &matching, &host)?;
            args.profile_name = selected.clone();
            existing_profile = load_profile_by_name(&selected, args.profiler)?;
        } else if let Some(p) = matching.into_iter().next() {
            args.profile_name = p.name.clone();
            existing_profile = Some(p);
        }
    }

    // Client-credential profiles have no user token to hand out.
    if let Some(p) = &existing_profile
        && p.has_client_credentials
    {
        bail!(
            "profile {:?} uses M2M authentication (client_id/client_secret). \
             `databricks auth token` only supports U2M (user-to-machine) authentication tokens. \
             To authenticate as a service principal, use the Databricks SDK directly",
            args.profile_name
        );
    }

    args.auth_arguments.profile = args.profile_name.clone();
    let oauth_argument = args.auth_arguments.to_oauth_argument()?;
    let profile_key = if args.profile_name.is_empty() {
        None
    } else {
        Some(args.profile_name.as_str())
    };

    let result = tokio::time::timeout(
        args.token_timeout,
        args.store.load(&oauth_argument, profile_key),
    )
    .await;

    let help = || helpful_error(&args.profile_name, Some(&oauth_argument));
    match result {
        Err(_) => Err(anyhow!("timed out waiting for a token. {}", help())),
        Ok(Ok(token)) => Ok(token),
        Ok(Err(TokenStoreError::NotFound)) => Err(anyhow!(
            "cache: databricks OAuth is not configured for this host. {}",
            help()
        )),
        Ok(Err(TokenStoreError::InvalidRefreshToken)) => Err(anyhow!(
            "{}",
            invalid_refresh_token_message(&args.profile_name, Some(&oauth_argument))
        )),
        Ok(Err(err)) => Err(anyhow!("{err}. {}", help())),
    }
}

/// Load a single profile by exact name. Returns `None` for an empty name, a
/// missing profile, or a missing configuration file.
fn load_profile_by_name(name: &str, profiler: &dyn Profiler) -> Result<Option<Profile>> {
    if name.is_empty() {
        return Ok(None);
    }
    let matcher = match_profile_names([name]);
    let profiles = load_profiles_or_empty(profiler, &matcher)?;
    Ok(profiles.into_iter().next())
}

fn load_profiles_or_empty(
    profiler: &dyn Profiler,
    matcher: &dyn Fn(&Profile) -> bool,
) -> Result<Vec<Profile>> {
    match profiler.load_profiles(matcher) {
        Ok(profiles) => Ok(profiles),
        Err(ProfileError::NoConfiguration { .. }) => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

/// Fill in the host and, for account hosts, the account ID: from the
/// positional argument, the profile, or an interactive prompt.
fn set_host_and_account_id(
    existing_profile: Option<&Profile>,
    auth: &mut AuthArguments,
    positional: &[String],
    prompter: &dyn Prompter,
) -> Result<()> {
    if auth.host.is_empty() {
        if let Some(arg) = positional.first() {
            auth.host = arg.clone();
        } else if let Some(p) = existing_profile.filter(|p| !p.host.is_empty()) {
            auth.host = p.host.clone();
        } else if prompter.is_interactive() {
            auth.host = prompter.input(
                "Databricks host (e.g. https://<workspace>.cloud.databricks.com)",
                None,
            )?;
        } else {
            bail!("no host provided");
        }
    }

    let canonical = profile::canonicalize_host(&auth.host);
    if (auth.is_unified_host || profile::is_account_host(&canonical))
        && auth.account_id.is_empty()
    {
        if let Some(p) = existing_profile.filter(|p| !p.account_id.is_empty()) {
            auth.account_id = p.account_id.clone();
        } else if prompter.is_interactive() {
            auth.account_id = prompter.input("Databricks account ID", None)?;
        } else {
            bail!("no account ID provided for account host {}", auth.host);
        }
    }
    Ok(())
}

/// Resolve a profile or host when no explicit profile, host, or positional
/// argument was given: environment variables first, then an interactive
/// profile picker, then a clear non-interactive error.
async fn resolve_no_args_token(
    args: &mut LoadTokenArgs<'_>,
) -> Result<(String, Option<Profile>)> {
    if let Some(host) = args.env.get(consts::ENV_HOST) {
        args.auth_arguments.host = host;
        if let Some(v) = args.env.get(consts::ENV_ACCOUNT_ID) {
            args.auth_arguments.account_id = v;
        }
        if let Some(v) = args.env.get(consts::ENV_WORKSPACE_ID) {
            args.auth_arguments.workspace_id = v;
        }
        if args.env.get_bool(consts::ENV_IS_UNIFIED_HOST) {
            args.auth_arguments.is_unified_host = true;
        }
        return Ok((String::new(), None));
    }

    if let Some(env_profile) = args.env.get(consts::ENV_CONFIG_PROFILE) {
        let p = load_profile_by_name(&env_profile, args.profiler)?;
        return Ok((env_profile, p));
    }

    let all_profiles = load_profiles_or_empty(args.profiler, &match_all_profiles)?;

    if !args.prompter.is_interactive() {
        if !all_profiles.is_empty() {
            bail!("no profile specified. Use --profile <name> to specify which profile to use");
        }
        bail!("no profiles configured. Run 'databricks auth login' to create a profile");
    }

    match prompt_for_profile_selection(args.prompter, &all_profiles)? {
        ProfileSelection::EnterHost => Ok((String::new(), None)),
        ProfileSelection::CreateNew => run_inline_login(args).await,
        ProfileSelection::Profile(name) => {
            let p = load_profile_by_name(&name, args.profiler)?;
            Ok((name, p))
        }
    }
}

/// Select list with all configured profiles plus the two meta-actions.
fn prompt_for_profile_selection(
    prompter: &dyn Prompter,
    profiles: &[Profile],
) -> Result<ProfileSelection> {
    let mut items: Vec<String> = profiles.iter().map(|p| p.label()).collect();
    let create_new_idx = items.len();
    items.push("Create a new profile".to_string());
    let enter_host_idx = items.len();
    items.push("Enter a host URL manually".to_string());

    let i = prompter.select("Select a profile", &items)?;
    if i == enter_host_idx {
        Ok(ProfileSelection::EnterHost)
    } else if i == create_new_idx {
        Ok(ProfileSelection::CreateNew)
    } else {
        Ok(ProfileSelection::Profile(profiles[i].name.clone()))
    }
}

fn ask_for_matching_profile(
    prompter: &dyn Prompter,
    profiles: &[Profile],
    host: &str,
) -> Result<String> {
    let items: Vec<String> = profiles.iter().map(|p| p.label()).collect();
    let i = prompter.select(&format!("Multiple profiles match {host}"), &items)?;
    Ok(profiles[i].name.clone())
}

/// Minimal interactive login: prompt for a profile name and host, run the
/// OAuth challenge, and persist the new profile.
async fn run_inline_login(args: &mut LoadTokenArgs<'_>) -> Result<(String, Option<Profile>)> {
    let profile_name = args
        .prompter
        .input("Databricks profile name", Some(consts::DEFAULT_SECTION))?;

    let existing_profile = load_profile_by_name(&profile_name, args.profiler)?;

    let mut login_args = AuthArguments::default();
    if let Some(p) = &existing_profile {
        login_args.apply_profile_defaults(p);
    }
    set_host_and_account_id(existing_profile.as_ref(), &mut login_args, &[], args.prompter)?;
    login_args.profile = profile_name.clone();

    let oauth_argument = login_args.to_oauth_argument()?;
    args.store
        .challenge(&oauth_argument, Some(&profile_name), args.prompter)
        .await?;

    cfgfile::save_to_profile(
        &ResolvedConfig {
            profile: profile_name.clone(),
            host: profile::canonicalize_host(&login_args.host),
            auth_type: AUTH_TYPE_DATABRICKS_CLI.to_string(),
            account_id: login_args.account_id.clone(),
            workspace_id: login_args.workspace_id.clone(),
            is_unified_host: login_args.is_unified_host,
            config_file: args.env.get(consts::ENV_CONFIG_FILE).unwrap_or_default(),
            ..Default::default()
        },
        &[],
    )?;

    println!("Profile {profile_name} was successfully saved");

    let p = load_profile_by_name(&profile_name, args.profiler)?;
    Ok((profile_name, p))
}
