//! The ordered credential-strategy chain.
//!
//! Order is a correctness-critical tie-break: a profile carrying both a
//! static token and OAuth metadata must resolve to token-based auth. The
//! first strategy whose precondition holds is authoritative; an error from
//! its `configure` is returned as-is, with no fallthrough to later
//! strategies.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use thiserror::Error;

use crate::auth::AuthArguments;
use crate::config::ResolvedConfig;
use crate::oauth::{CachedTokenSource, OAuthArgument, Token, TokenSource, TokenStore, TokenStoreError, now_ms};

/// A configured credential ready to authenticate outgoing requests.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Set authentication headers on an outgoing request.
    async fn set_headers(&self, headers: &mut HeaderMap) -> Result<()>;
}

impl std::fmt::Debug for dyn CredentialsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsProvider")
            .field("name", &self.name())
            .finish()
    }
}

/// One named strategy in the chain. `Ok(None)` means the strategy's
/// precondition does not hold and the chain moves on; `Err` means the
/// strategy is applicable but failed, which stops the chain.
#[async_trait]
pub trait CredentialsStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn configure(
        &self,
        cfg: &ResolvedConfig,
    ) -> Result<Option<Box<dyn CredentialsProvider>>>;
}

#[derive(Debug, Error)]
#[error("no host provided")]
pub struct NoHostError;

fn bearer_header(token: &Token) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("{} {}", token.token_type, token.access))
        .context("invalid token value")?;
    value.set_sensitive(true);
    Ok(value)
}

/// Static bearer provider for tokens that never rotate within a process.
struct StaticCredentials {
    name: &'static str,
    header: HeaderValue,
}

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    fn name(&self) -> &str {
        self.name
    }

    async fn set_headers(&self, headers: &mut HeaderMap) -> Result<()> {
        headers.insert(AUTHORIZATION, self.header.clone());
        Ok(())
    }
}

/// Personal access token authentication.
pub struct PatCredentials;

#[async_trait]
impl CredentialsStrategy for PatCredentials {
    fn name(&self) -> &str {
        "pat"
    }

    async fn configure(
        &self,
        cfg: &ResolvedConfig,
    ) -> Result<Option<Box<dyn CredentialsProvider>>> {
        if cfg.token.is_empty() || cfg.host.is_empty() {
            return Ok(None);
        }
        let mut header =
            HeaderValue::from_str(&format!("Bearer {}", cfg.token)).context("invalid token")?;
        header.set_sensitive(true);
        Ok(Some(Box::new(StaticCredentials { name: "pat", header })))
    }
}

/// Username/password authentication.
pub struct BasicCredentials;

#[async_trait]
impl CredentialsStrategy for BasicCredentials {
    fn name(&self) -> &str {
        "basic"
    }

    async fn configure(
        &self,
        cfg: &ResolvedConfig,
    ) -> Result<Option<Box<dyn CredentialsProvider>>> {
        if cfg.username.is_empty() || cfg.password.is_empty() || cfg.host.is_empty() {
            return Ok(None);
        }
        let encoded = STANDARD.encode(format!("{}:{}", cfg.username, cfg.password));
        let mut header = HeaderValue::from_str(&format!("Basic {encoded}"))
            .context("invalid basic credentials")?;
        header.set_sensitive(true);
        Ok(Some(Box::new(StaticCredentials { name: "basic", header })))
    }
}

/// Service principal (client credentials grant) authentication.
pub struct M2mCredentials;

struct M2mTokenSource {
    endpoint: String,
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
}

#[derive(serde::Deserialize)]
struct M2mTokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[async_trait]
impl TokenSource for M2mTokenSource {
    async fn token(&self) -> Result<Token, TokenStoreError> {
        let response = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", "all-apis")])
            .send()
            .await
            .context("client credentials request failed")?;
        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read token response")?;
        if !status.is_success() {
            return Err(TokenStoreError::Refresh(format!(
                "client credentials request returned {status}: {body}"
            )));
        }
        let parsed: M2mTokenResponse = serde_json::from_str(&body)
            .with_context(|| format!("cannot parse token response: {body}"))?;
        Ok(Token {
            access: parsed.access_token,
            refresh: String::new(),
            token_type: parsed.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires: parsed
                .expires_in
                .map(|secs| now_ms() + secs * 1000)
                .unwrap_or(0),
        })
    }
}

struct TokenSourceCredentials {
    name: &'static str,
    source: CachedTokenSource,
}

#[async_trait]
impl CredentialsProvider for TokenSourceCredentials {
    fn name(&self) -> &str {
        self.name
    }

    async fn set_headers(&self, headers: &mut HeaderMap) -> Result<()> {
        let token = self.source.token().await?;
        headers.insert(AUTHORIZATION, bearer_header(&token)?);
        Ok(())
    }
}

#[async_trait]
impl CredentialsStrategy for M2mCredentials {
    fn name(&self) -> &str {
        "oauth-m2m"
    }

    async fn configure(
        &self,
        cfg: &ResolvedConfig,
    ) -> Result<Option<Box<dyn CredentialsProvider>>> {
        if cfg.client_id.is_empty() || cfg.client_secret.is_empty() || cfg.host.is_empty() {
            return Ok(None);
        }
        let host = crate::profile::canonicalize_host(&cfg.host);
        let source = Arc::new(M2mTokenSource {
            endpoint: format!("{host}/oidc/v1/token"),
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            http: reqwest::Client::new(),
        });
        Ok(Some(Box::new(TokenSourceCredentials {
            name: "oauth-m2m",
            source: CachedTokenSource::new(source, !cfg.disable_async_refresh),
        })))
    }
}

/// Reads OAuth tokens directly from the local token store instead of
/// shelling out to a subprocess.
pub struct CliCredentials {
    store: Arc<dyn TokenStore>,
}

impl CliCredentials {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        CliCredentials { store }
    }
}

struct PersistentTokenSource {
    store: Arc<dyn TokenStore>,
    arg: OAuthArgument,
    profile: Option<String>,
}

#[async_trait]
impl TokenSource for PersistentTokenSource {
    async fn token(&self) -> Result<Token, TokenStoreError> {
        self.store.load(&self.arg, self.profile.as_deref()).await
    }
}

#[async_trait]
impl CredentialsStrategy for CliCredentials {
    fn name(&self) -> &str {
        "databricks-cli"
    }

    async fn configure(
        &self,
        cfg: &ResolvedConfig,
    ) -> Result<Option<Box<dyn CredentialsProvider>>> {
        if cfg.host.is_empty() {
            return Err(NoHostError.into());
        }
        let args = AuthArguments {
            host: cfg.host.clone(),
            account_id: cfg.account_id.clone(),
            workspace_id: cfg.workspace_id.clone(),
            is_unified_host: cfg.is_unified_host,
            profile: cfg.profile.clone(),
        };
        let arg = args.to_oauth_argument()?;
        let source = Arc::new(PersistentTokenSource {
            store: Arc::clone(&self.store),
            arg,
            profile: if cfg.profile.is_empty() {
                None
            } else {
                Some(cfg.profile.clone())
            },
        });
        Ok(Some(Box::new(TokenSourceCredentials {
            name: "databricks-cli",
            source: CachedTokenSource::new(source, !cfg.disable_async_refresh),
        })))
    }
}

/// The ordered chain. Reordering strategies changes tie-breaking for
/// configurations compatible with more than one of them.
pub struct CredentialsChain {
    strategies: Vec<Box<dyn CredentialsStrategy>>,
}

impl CredentialsChain {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        CredentialsChain {
            strategies: vec![
                Box::new(PatCredentials),
                Box::new(BasicCredentials),
                Box::new(M2mCredentials),
                Box::new(CliCredentials::new(store)),
            ],
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Configure the first applicable strategy. When `cfg.auth_type` is
    /// set, only the strategy of that name is considered.
    pub async fn configure(&self, cfg: &ResolvedConfig) -> Result<Box<dyn CredentialsProvider>> {
        for strategy in &self.strategies {
            if !cfg.auth_type.is_empty() && !cfg.auth_type.eq_ignore_ascii_case(strategy.name()) {
                continue;
            }
            if let Some(provider) = strategy
                .configure(cfg)
                .await
                .with_context(|| format!("{} auth", strategy.name()))?
            {
                return Ok(provider);
            }
        }
        bail!("cannot configure default credentials")
    }
}
