//! Enrichment of authentication failures with identity context and
//! remediation steps.

use thiserror::Error;

use crate::auth::{
    AUTH_TYPE_AZURE_CLI, AUTH_TYPE_BASIC, AUTH_TYPE_DATABRICKS_CLI, AUTH_TYPE_OAUTH_M2M,
    AUTH_TYPE_PAT, AuthArguments, auth_type_display_name, build_describe_command,
    build_login_command,
};
use crate::config::ResolvedConfig;
use crate::oauth::OAuthArgument;

/// An error response from the Databricks REST API.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    pub status_code: u16,
    pub error_code: String,
    pub message: String,
}

/// An [`ApiError`] with identity context and next steps appended.
#[derive(Debug, Error)]
#[error("{source}\n{details}")]
pub struct EnrichedAuthError {
    #[source]
    pub source: ApiError,
    pub details: String,
}

/// Appends identity context and remediation steps to 401/403 API errors.
/// Any other error passes through unchanged.
pub fn enrich_auth_error(cfg: &ResolvedConfig, err: anyhow::Error) -> anyhow::Error {
    let Some(api_err) = err.downcast_ref::<ApiError>() else {
        return err;
    };
    if api_err.status_code != 401 && api_err.status_code != 403 {
        return err;
    }

    let mut b = String::new();

    if !cfg.profile.is_empty() {
        b.push_str(&format!("\nProfile:   {}", cfg.profile));
    }
    if !cfg.host.is_empty() {
        b.push_str(&format!("\nHost:      {}", cfg.host));
    }
    if !cfg.auth_type.is_empty() {
        b.push_str(&format!(
            "\nAuth type: {}",
            auth_type_display_name(&cfg.auth_type)
        ));
    }

    b.push_str("\n\nNext steps:");

    if api_err.status_code == 401 {
        write_reauth_steps(cfg, &mut b);
    } else {
        b.push_str("\n  - Verify you have the required permissions for this operation");
    }

    b.push_str(&format!(
        "\n  - Check your identity: {}",
        build_describe_command(&cfg.profile)
    ));

    if cfg.profile.is_empty() {
        b.push_str("\n  - Consider configuring a profile: databricks configure --profile <name>");
    }

    // downcast_ref proved the chain holds an ApiError; take it back out.
    let api_err = match err.downcast::<ApiError>() {
        Ok(api_err) => api_err,
        Err(err) => return err,
    };
    anyhow::Error::new(EnrichedAuthError {
        source: api_err,
        details: b,
    })
}

/// Auth-type-aware re-authentication suggestions for 401 errors.
fn write_reauth_steps(cfg: &ResolvedConfig, b: &mut String) {
    match cfg.auth_type.to_lowercase().as_str() {
        AUTH_TYPE_DATABRICKS_CLI => {
            if !cfg.profile.is_empty() {
                b.push_str(&format!(
                    "\n  - Re-authenticate: databricks auth login --profile {}",
                    cfg.profile
                ));
                return;
            }
            let args = AuthArguments {
                host: cfg.host.clone(),
                account_id: cfg.account_id.clone(),
                workspace_id: cfg.workspace_id.clone(),
                is_unified_host: cfg.is_unified_host,
                profile: String::new(),
            };
            let Ok(arg) = args.to_oauth_argument() else {
                b.push_str("\n  - Re-authenticate: databricks auth login");
                return;
            };
            let mut login_cmd = build_login_command("", Some(&arg));
            // The unified login command carries host and account ID only;
            // the workspace selection has to be spelled out separately.
            if cfg.is_unified_host && !cfg.workspace_id.is_empty() {
                login_cmd.push_str(&format!(" --workspace-id {}", cfg.workspace_id));
            }
            b.push_str(&format!("\n  - Re-authenticate: {login_cmd}"));
        }
        AUTH_TYPE_PAT => {
            if !cfg.profile.is_empty() {
                b.push_str(&format!(
                    "\n  - Regenerate your access token or run: databricks configure --profile {}",
                    cfg.profile
                ));
            } else {
                b.push_str("\n  - Regenerate your access token");
            }
        }
        AUTH_TYPE_BASIC => {
            if !cfg.profile.is_empty() {
                b.push_str(&format!(
                    "\n  - Check your username/password or run: databricks configure --profile {}",
                    cfg.profile
                ));
            } else {
                b.push_str("\n  - Check your username and password");
            }
        }
        AUTH_TYPE_AZURE_CLI => {
            b.push_str("\n  - Re-authenticate with Azure: az login");
        }
        AUTH_TYPE_OAUTH_M2M => {
            b.push_str("\n  - Check your service principal client ID and secret");
        }
        _ => {
            b.push_str("\n  - Check your authentication credentials");
        }
    }
}

/// The message shown when a cached refresh token is rejected. Only a new
/// login can recover, so no generic retry suffix is appended.
pub fn invalid_refresh_token_message(profile: &str, arg: Option<&OAuthArgument>) -> String {
    format!(
        "A new access token could not be retrieved because the refresh token is invalid. To reauthenticate, run the following command:\n  $ {}",
        build_login_command(profile, arg)
    )
}

/// Generic remediation suffix appended to token resolution failures.
pub fn helpful_error(profile: &str, arg: Option<&OAuthArgument>) -> String {
    format!(
        "Try logging in again with `{}` before retrying. If this fails, please report this issue to the Databricks CLI maintainers at https://github.com/databricks/cli/issues/new",
        build_login_command(profile, arg)
    )
}
