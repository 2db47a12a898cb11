//! The persistent OAuth token store and its lookup keys.
//!
//! The token resolver and the `databricks-cli` credential strategy consume
//! this module only through the [`TokenStore`] trait and the explicit
//! [`TokenStoreError`] kinds; the concrete implementation lives in
//! [`persistent`].

pub mod cache;
pub mod cached;
pub mod persistent;

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;

use crate::prompt::Prompter;

pub use cache::{InMemoryTokenCache, SqliteTokenCache, TokenCache};
pub use cached::{CachedTokenSource, TokenSource};
pub use persistent::PersistentAuth;

/// An OAuth token as stored in the cache and printed by `auth token`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Token {
    #[serde(rename = "access_token")]
    pub access: String,
    #[serde(rename = "refresh_token", default, skip_serializing_if = "String::is_empty")]
    pub refresh: String,
    #[serde(rename = "token_type", default = "default_token_type")]
    pub token_type: String,
    /// Expiration timestamp in milliseconds since epoch. Zero means the
    /// token does not expire.
    #[serde(rename = "expires_at_ms", default)]
    pub expires: u64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}

impl Token {
    pub fn is_expired(&self) -> bool {
        self.expires != 0 && now_ms() >= self.expires
    }

    /// Usable as-is: has an access token and is not expired.
    pub fn is_valid(&self) -> bool {
        !self.access.is_empty() && !self.is_expired()
    }

    /// Whether the token expires within the next `window_ms` milliseconds.
    pub fn expires_within(&self, window_ms: u64) -> bool {
        self.expires != 0 && now_ms() + window_ms >= self.expires
    }
}

/// The minimal tuple identifying an OAuth target, used as a cache and
/// lookup key. Exactly one of three mutually exclusive shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthArgument {
    Workspace {
        host: String,
    },
    Account {
        host: String,
        account_id: String,
    },
    Unified {
        host: String,
        account_id: String,
        workspace_id: Option<String>,
    },
}

impl OAuthArgument {
    pub fn host(&self) -> &str {
        match self {
            OAuthArgument::Workspace { host }
            | OAuthArgument::Account { host, .. }
            | OAuthArgument::Unified { host, .. } => host,
        }
    }

    /// The cache key for this target. Account keys embed the account ID so
    /// distinct accounts on the same console host never collide; unified
    /// workspace selections additionally embed the workspace ID.
    pub fn cache_key(&self) -> String {
        match self {
            OAuthArgument::Workspace { host } => host.clone(),
            OAuthArgument::Account { host, account_id } => {
                format!("{host}/oidc/accounts/{account_id}")
            }
            OAuthArgument::Unified {
                host,
                account_id,
                workspace_id,
            } => {
                let base = format!("{host}/oidc/accounts/{account_id}");
                match workspace_id {
                    Some(ws) => format!("{base}/workspaces/{ws}"),
                    None => base,
                }
            }
        }
    }

    /// The token endpoint of the target's authorization server.
    pub fn token_endpoint(&self) -> String {
        match self {
            OAuthArgument::Workspace { host } | OAuthArgument::Unified { host, .. } => {
                format!("{host}/oidc/v1/token")
            }
            OAuthArgument::Account { host, account_id } => {
                format!("{host}/oidc/accounts/{account_id}/v1/token")
            }
        }
    }

    /// The authorization endpoint of the target's authorization server.
    pub fn authorize_endpoint(&self) -> String {
        match self {
            OAuthArgument::Workspace { host } | OAuthArgument::Unified { host, .. } => {
                format!("{host}/oidc/v1/authorize")
            }
            OAuthArgument::Account { host, account_id } => {
                format!("{host}/oidc/accounts/{account_id}/v1/authorize")
            }
        }
    }
}

/// Failure kinds reported by the token store, pattern-matched by the
/// resolver to drive remediation. No dynamic type probing.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    /// No cache entry exists for the target.
    #[error("token not found")]
    NotFound,
    /// The cached refresh token was rejected by the authorization server.
    /// Only a new login can recover.
    #[error("a new access token could not be retrieved because the refresh token is invalid")]
    InvalidRefreshToken,
    /// Any other refresh failure (server error, malformed response).
    #[error("token refresh: {0}")]
    Refresh(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The persistent token source consumed by the resolver and the
/// `databricks-cli` credential strategy.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Fetch a valid token for the target, refreshing a stale one. When
    /// `profile` is set, the profile-keyed entry is preferred and the
    /// argument-keyed entry is kept as a legacy fallback.
    async fn load(
        &self,
        arg: &OAuthArgument,
        profile: Option<&str>,
    ) -> Result<Token, TokenStoreError>;

    /// Run the interactive OAuth challenge for the target and persist the
    /// resulting token under both keys.
    async fn challenge(
        &self,
        arg: &OAuthArgument,
        profile: Option<&str>,
        prompter: &dyn Prompter,
    ) -> Result<(), TokenStoreError>;
}
