//! Authentication core: argument normalization, the credential chain, the
//! token resolver and error enrichment.

pub mod credentials;
pub mod error;
pub mod token;

use anyhow::{Result, bail};

use crate::oauth::OAuthArgument;
use crate::profile::{self, Profile};

pub use credentials::{CredentialsChain, CredentialsProvider, CredentialsStrategy};
pub use error::{ApiError, EnrichedAuthError, enrich_auth_error};
pub use token::{LoadTokenArgs, load_token};

/// Auth type identifiers as they appear in configuration files.
pub const AUTH_TYPE_PAT: &str = "pat";
pub const AUTH_TYPE_BASIC: &str = "basic";
pub const AUTH_TYPE_OAUTH_M2M: &str = "oauth-m2m";
pub const AUTH_TYPE_DATABRICKS_CLI: &str = "databricks-cli";
pub const AUTH_TYPE_AZURE_CLI: &str = "azure-cli";

/// Human-readable name for an auth type, used in enriched error output.
/// Unknown types are shown as-is.
pub fn auth_type_display_name(auth_type: &str) -> String {
    match auth_type.to_lowercase().as_str() {
        AUTH_TYPE_DATABRICKS_CLI => "OAuth (databricks-cli)".to_string(),
        AUTH_TYPE_PAT => "Personal Access Token (pat)".to_string(),
        AUTH_TYPE_BASIC => "Basic".to_string(),
        AUTH_TYPE_AZURE_CLI => "Azure CLI (azure-cli)".to_string(),
        AUTH_TYPE_OAUTH_M2M => "OAuth Machine-to-Machine (oauth-m2m)".to_string(),
        _ => auth_type.to_string(),
    }
}

/// The host/account/workspace tuple gathered from flags, environment
/// variables and the selected profile, before it is narrowed into an
/// [`OAuthArgument`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthArguments {
    pub host: String,
    pub account_id: String,
    pub workspace_id: String,
    pub is_unified_host: bool,
    pub profile: String,
}

impl AuthArguments {
    /// Fill in fields the user left unset from the selected profile.
    /// Explicit flags always win over profile values.
    pub fn apply_profile_defaults(&mut self, profile: &Profile) {
        if self.host.is_empty() {
            self.host = profile.host.clone();
        }
        if self.account_id.is_empty() {
            self.account_id = profile.account_id.clone();
        }
        if self.workspace_id.is_empty() {
            self.workspace_id = profile.workspace_id.clone();
        }
        if !self.is_unified_host {
            self.is_unified_host = profile.is_unified_host;
        }
    }

    /// Narrow into the OAuth target. The host is canonicalized; account
    /// console hosts require an account ID.
    pub fn to_oauth_argument(&self) -> Result<OAuthArgument> {
        if self.host.is_empty() {
            bail!("no host provided");
        }
        let host = profile::canonicalize_host(&self.host);
        if self.is_unified_host {
            if self.account_id.is_empty() {
                bail!("account ID is required for unified login");
            }
            return Ok(OAuthArgument::Unified {
                host,
                account_id: self.account_id.clone(),
                workspace_id: if self.workspace_id.is_empty() {
                    None
                } else {
                    Some(self.workspace_id.clone())
                },
            });
        }
        if profile::is_account_host(&host) {
            if self.account_id.is_empty() {
                bail!("account ID is required for account-level OAuth on {host}");
            }
            return Ok(OAuthArgument::Account {
                host,
                account_id: self.account_id.clone(),
            });
        }
        Ok(OAuthArgument::Workspace { host })
    }
}

/// The `auth login` invocation that would reauthenticate the given target.
/// A profile name takes precedence over host flags.
pub fn build_login_command(profile: &str, arg: Option<&OAuthArgument>) -> String {
    if !profile.is_empty() {
        return format!("databricks auth login --profile {profile}");
    }
    match arg {
        Some(OAuthArgument::Unified {
            host, account_id, ..
        }) => format!(
            "databricks auth login --host {host} --account-id {account_id} --experimental-is-unified-host"
        ),
        Some(OAuthArgument::Account { host, account_id }) => {
            format!("databricks auth login --host {host} --account-id {account_id}")
        }
        Some(OAuthArgument::Workspace { host }) => {
            format!("databricks auth login --host {host}")
        }
        None => "databricks auth login".to_string(),
    }
}

/// The `auth describe` invocation that would show the current identity.
pub fn build_describe_command(profile: &str) -> String {
    if !profile.is_empty() {
        return format!("databricks auth describe --profile {profile}");
    }
    "databricks auth describe".to_string()
}
