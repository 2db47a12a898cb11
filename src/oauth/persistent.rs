//! Persistent OAuth auth: cached tokens, refresh, and the login challenge.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngExt;
use sha2::{Digest, Sha256};

use super::cache::TokenCache;
use super::{OAuthArgument, Token, TokenStore, TokenStoreError, now_ms};
use crate::prompt::Prompter;

/// OAuth client ID of the CLI's public (U2M) application.
const CLIENT_ID: &str = "databricks-cli";
const REDIRECT_URI: &str = "http://localhost:8020";
const SCOPES: &str = "all-apis offline_access";

/// Buffer subtracted from the server-reported expiry so a token is
/// refreshed before it actually lapses.
const EXPIRY_BUFFER_MS: u64 = 5 * 60 * 1000;

/// Token store backed by a [`TokenCache`] and the target host's token
/// endpoint. Lookups prefer the profile key and fall back to the
/// OAuth-argument key; refreshed tokens are written back under both keys so
/// older clients that only know argument keys keep working.
pub struct PersistentAuth {
    cache: Box<dyn TokenCache>,
    http: reqwest::Client,
}

impl PersistentAuth {
    pub fn new(cache: Box<dyn TokenCache>) -> Self {
        PersistentAuth {
            cache,
            http: reqwest::Client::new(),
        }
    }

    fn lookup_keys(arg: &OAuthArgument, profile: Option<&str>) -> Vec<String> {
        let mut keys = Vec::with_capacity(2);
        if let Some(p) = profile
            && !p.is_empty()
        {
            keys.push(p.to_string());
        }
        keys.push(arg.cache_key());
        keys
    }

    async fn refresh(
        &self,
        arg: &OAuthArgument,
        refresh_token: &str,
    ) -> Result<Token, TokenStoreError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", CLIENT_ID),
            ("refresh_token", refresh_token),
        ];
        let resp = self
            .http
            .post(arg.token_endpoint())
            .form(&params)
            .send()
            .await
            .map_err(|e| TokenStoreError::Refresh(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TokenStoreError::Refresh(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_refresh_failure(&body));
        }

        parse_token_response(&body, refresh_token)
    }

    async fn exchange_code(
        &self,
        arg: &OAuthArgument,
        code: &str,
        verifier: &str,
    ) -> Result<Token, TokenStoreError> {
        // The pasted string may be in `code#state` form.
        let (code, _state) = code.split_once('#').unwrap_or((code, ""));

        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", CLIENT_ID),
            ("code", code),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", verifier),
        ];
        let resp = self
            .http
            .post(arg.token_endpoint())
            .form(&params)
            .send()
            .await
            .map_err(|e| TokenStoreError::Other(anyhow!("token exchange failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TokenStoreError::Other(anyhow!("token exchange failed: {e}")))?;
        if !status.is_success() {
            return Err(TokenStoreError::Other(anyhow!(
                "token exchange failed: {body}"
            )));
        }

        parse_token_response(&body, "")
    }
}

#[async_trait]
impl TokenStore for PersistentAuth {
    async fn load(
        &self,
        arg: &OAuthArgument,
        profile: Option<&str>,
    ) -> Result<Token, TokenStoreError> {
        let keys = Self::lookup_keys(arg, profile);

        let mut found = None;
        for key in &keys {
            if let Some(token) = self.cache.lookup(key)? {
                found = Some(token);
                break;
            }
        }
        let Some(token) = found else {
            return Err(TokenStoreError::NotFound);
        };

        if token.is_valid() {
            return Ok(token);
        }
        if token.refresh.is_empty() {
            return Err(TokenStoreError::InvalidRefreshToken);
        }

        let refreshed = self.refresh(arg, &token.refresh).await?;
        for key in &keys {
            self.cache.store(key, &refreshed)?;
        }
        Ok(refreshed)
    }

    async fn challenge(
        &self,
        arg: &OAuthArgument,
        profile: Option<&str>,
        prompter: &dyn Prompter,
    ) -> Result<(), TokenStoreError> {
        let pkce = generate_pkce();
        let url = build_authorize_url(arg, &pkce.challenge, &pkce.verifier);

        // Try to open a browser, silently ignore failures (e.g. headless/SSH).
        let _ = open::that(&url);

        println!("Open this URL to authenticate:\n");
        println!("  {url}\n");

        let code = prompter
            .input("Paste the authorization code", None)
            .context("failed to read authorization code")?;
        if code.trim().is_empty() {
            return Err(TokenStoreError::Other(anyhow!(
                "no authorization code provided"
            )));
        }

        let token = self.exchange_code(arg, code.trim(), &pkce.verifier).await?;
        for key in Self::lookup_keys(arg, profile) {
            self.cache.store(&key, &token)?;
        }
        Ok(())
    }
}

fn parse_token_response(body: &str, previous_refresh: &str) -> Result<Token, TokenStoreError> {
    #[derive(serde::Deserialize)]
    struct TokenResponse {
        access_token: String,
        #[serde(default)]
        token_type: Option<String>,
        #[serde(default)]
        refresh_token: Option<String>,
        #[serde(default)]
        expires_in: u64,
    }

    let data: TokenResponse = serde_json::from_str(body)
        .map_err(|e| TokenStoreError::Refresh(format!("cannot parse response: {e}")))?;

    let expires = if data.expires_in == 0 {
        0
    } else {
        now_ms() + data.expires_in * 1000 - EXPIRY_BUFFER_MS
    };

    Ok(Token {
        access: data.access_token,
        refresh: data
            .refresh_token
            .unwrap_or_else(|| previous_refresh.to_string()),
        token_type: data.token_type.unwrap_or_else(|| "Bearer".to_string()),
        expires,
    })
}

/// Classify a non-2xx refresh response into an explicit error kind.
fn classify_refresh_failure(body: &str) -> TokenStoreError {
    #[derive(serde::Deserialize, Default)]
    #[serde(default)]
    struct ErrorResponse {
        error: String,
        error_description: String,
    }

    let parsed: ErrorResponse = serde_json::from_str(body).unwrap_or_default();
    if parsed.error == "invalid_grant" || parsed.error_description.contains("Refresh token is invalid")
    {
        return TokenStoreError::InvalidRefreshToken;
    }
    if parsed.error.is_empty() {
        return TokenStoreError::Refresh(format!("unexpected response: {body}"));
    }
    TokenStoreError::Refresh(format!(
        "{} (error code: {})",
        parsed.error_description, parsed.error
    ))
}

/// PKCE verifier and challenge pair.
struct Pkce {
    verifier: String,
    challenge: String,
}

/// Generate a PKCE code verifier and S256 challenge.
fn generate_pkce() -> Pkce {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    let verifier = URL_SAFE_NO_PAD.encode(bytes);

    let hash = Sha256::digest(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(hash);

    Pkce { verifier, challenge }
}

fn build_authorize_url(arg: &OAuthArgument, challenge: &str, state: &str) -> String {
    let params = [
        ("client_id", CLIENT_ID),
        ("response_type", "code"),
        ("redirect_uri", REDIRECT_URI),
        ("scope", SCOPES),
        ("code_challenge", challenge),
        ("code_challenge_method", "S256"),
        ("state", state),
    ];

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoded(v)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{}?{}", arg.authorize_endpoint(), query)
}

/// Minimal URL encoding for query parameters.
fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => {
                out.push_str(&format!("%{:02X}", b));
            }
        }
    }
    out
}
