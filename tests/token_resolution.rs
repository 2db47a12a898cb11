//! End-to-end tests for token resolution against in-memory profile and
//! token stores.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use dbcli::auth::{AuthArguments, LoadTokenArgs, load_token};
use dbcli::env::Env;
use dbcli::oauth::{OAuthArgument, Token, TokenStore, TokenStoreError, now_ms};
use dbcli::profile::{InMemoryProfiler, Profile, Profiler};
use dbcli::prompt::{NonInteractivePrompter, Prompter, Response, ScriptedPrompter};

/// What the fake store does when it finds a token that is not valid
/// as-is and would need a refresh.
#[derive(Clone)]
enum RefreshBehavior {
    Succeed,
    InvalidRefreshToken,
    Fail(String),
}

struct FakeStore {
    tokens: Mutex<HashMap<String, Token>>,
    refresh: RefreshBehavior,
}

impl FakeStore {
    fn new<I, K>(tokens: I, refresh: RefreshBehavior) -> Self
    where
        I: IntoIterator<Item = (K, Token)>,
        K: Into<String>,
    {
        FakeStore {
            tokens: Mutex::new(tokens.into_iter().map(|(k, t)| (k.into(), t)).collect()),
            refresh,
        }
    }
}

#[async_trait]
impl TokenStore for FakeStore {
    async fn load(
        &self,
        arg: &OAuthArgument,
        profile: Option<&str>,
    ) -> Result<Token, TokenStoreError> {
        let tokens = self.tokens.lock().unwrap();
        let mut keys = Vec::new();
        if let Some(p) = profile.filter(|p| !p.is_empty()) {
            keys.push(p.to_string());
        }
        keys.push(arg.cache_key());

        let Some(token) = keys.iter().find_map(|k| tokens.get(k)).cloned() else {
            return Err(TokenStoreError::NotFound);
        };
        if token.is_valid() {
            return Ok(token);
        }
        match &self.refresh {
            RefreshBehavior::Succeed => Ok(fresh_token("new-access-token")),
            RefreshBehavior::InvalidRefreshToken => Err(TokenStoreError::InvalidRefreshToken),
            RefreshBehavior::Fail(msg) => Err(TokenStoreError::Refresh(msg.clone())),
        }
    }

    async fn challenge(
        &self,
        arg: &OAuthArgument,
        profile: Option<&str>,
        _prompter: &dyn Prompter,
    ) -> Result<(), TokenStoreError> {
        let mut tokens = self.tokens.lock().unwrap();
        let token = fresh_token("challenged-token");
        if let Some(p) = profile.filter(|p| !p.is_empty()) {
            tokens.insert(p.to_string(), token.clone());
        }
        tokens.insert(arg.cache_key(), token);
        Ok(())
    }
}

fn fresh_token(access: &str) -> Token {
    Token {
        access: access.to_string(),
        refresh: "refresh".to_string(),
        token_type: "Bearer".to_string(),
        expires: now_ms() + 3_600_000,
    }
}

fn needs_refresh_token() -> Token {
    Token {
        access: String::new(),
        refresh: "refresh".to_string(),
        token_type: "Bearer".to_string(),
        expires: 0,
    }
}

fn profiler() -> InMemoryProfiler {
    let p = |name: &str, host: &str, account_id: &str| Profile {
        name: name.to_string(),
        host: host.to_string(),
        account_id: account_id.to_string(),
        workspace_id: String::new(),
        is_unified_host: false,
        has_client_credentials: false,
    };
    InMemoryProfiler {
        profiles: vec![
            p("expired", "https://accounts.cloud.databricks.com", "expired"),
            p("active", "https://accounts.cloud.databricks.com", "active"),
            p("workspace-a", "https://workspace-a.cloud.databricks.com", ""),
            p("dup1", "https://shared.cloud.databricks.com", ""),
            p("dup2", "https://shared.cloud.databricks.com", ""),
            p("acct-dup1", "https://accounts.cloud.databricks.com", "same-account"),
            p("acct-dup2", "https://accounts.cloud.databricks.com", "same-account"),
            p("default.dev", "https://dev.cloud.databricks.com", ""),
            p("unique-ws", "https://unique-ws.cloud.databricks.com", ""),
            p("legacy-ws", "https://legacy-ws.cloud.databricks.com", ""),
        ],
    }
}

fn store(refresh: RefreshBehavior) -> FakeStore {
    FakeStore::new(
        [
            (
                "https://accounts.cloud.databricks.com/oidc/accounts/expired",
                needs_refresh_token(),
            ),
            ("expired", needs_refresh_token()),
            ("active", needs_refresh_token()),
            ("workspace-a", fresh_token("workspace-a")),
            (
                "https://workspace-a.cloud.databricks.com",
                fresh_token("workspace-a"),
            ),
            ("default.dev", fresh_token("default.dev")),
            ("unique-ws", fresh_token("unique-ws")),
            (
                "https://no-profile.cloud.databricks.com",
                fresh_token("no-profile"),
            ),
            (
                "https://legacy-ws.cloud.databricks.com",
                fresh_token("legacy-ws"),
            ),
        ],
        refresh,
    )
}

struct Scenario {
    profiler: InMemoryProfiler,
    store: FakeStore,
    env: Env,
}

impl Scenario {
    fn new(refresh: RefreshBehavior) -> Self {
        Scenario {
            profiler: profiler(),
            store: store(refresh),
            env: Env::fake(Vec::<(String, String)>::new()),
        }
    }

    fn args<'a>(
        &'a self,
        auth_arguments: AuthArguments,
        profile_name: &str,
        args: &[&str],
        prompter: &'a dyn Prompter,
    ) -> LoadTokenArgs<'a> {
        LoadTokenArgs {
            auth_arguments,
            profile_name: profile_name.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            token_timeout: Duration::from_secs(60),
            profiler: &self.profiler,
            store: &self.store,
            prompter,
            env: &self.env,
        }
    }
}

const NO_PROMPTS: NonInteractivePrompter = NonInteractivePrompter;

#[tokio::test]
async fn profile_and_positional_arg_conflict() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    let err = load_token(s.args(AuthArguments::default(), "active", &["workspace-a"], &NO_PROMPTS))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "providing both a profile and host is not supported"
    );
}

#[tokio::test]
async fn invalid_refresh_token_with_profile() {
    let s = Scenario::new(RefreshBehavior::InvalidRefreshToken);
    let err = load_token(s.args(AuthArguments::default(), "expired", &[], &NO_PROMPTS))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "A new access token could not be retrieved because the refresh token is invalid. \
         To reauthenticate, run the following command:\n  $ databricks auth login --profile expired"
    );
}

#[tokio::test]
async fn invalid_refresh_token_with_host_resolves_profile() {
    let s = Scenario::new(RefreshBehavior::InvalidRefreshToken);
    let auth = AuthArguments {
        host: "https://accounts.cloud.databricks.com".to_string(),
        account_id: "expired".to_string(),
        ..Default::default()
    };
    let err = load_token(s.args(auth, "", &[], &NO_PROMPTS)).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "A new access token could not be retrieved because the refresh token is invalid. \
         To reauthenticate, run the following command:\n  $ databricks auth login --profile expired"
    );
}

#[tokio::test]
async fn refresh_failure_appends_login_help() {
    let s = Scenario::new(RefreshBehavior::Fail(
        "Databricks is down (error code: other_error)".to_string(),
    ));
    let err = load_token(s.args(AuthArguments::default(), "active", &[], &NO_PROMPTS))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "token refresh: Databricks is down (error code: other_error). \
         Try logging in again with `databricks auth login --profile active` before retrying. \
         If this fails, please report this issue to the Databricks CLI maintainers at \
         https://github.com/databricks/cli/issues/new"
    );
}

#[tokio::test]
async fn succeeds_with_profile() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    let token = load_token(s.args(AuthArguments::default(), "active", &[], &NO_PROMPTS))
        .await
        .unwrap();
    assert_eq!(token.access, "new-access-token");
    assert_eq!(token.token_type, "Bearer");
}

#[tokio::test]
async fn succeeds_with_host() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    let auth = AuthArguments {
        host: "https://accounts.cloud.databricks.com".to_string(),
        account_id: "active".to_string(),
        ..Default::default()
    };
    let token = load_token(s.args(auth, "", &[], &NO_PROMPTS)).await.unwrap();
    assert_eq!(token.access, "new-access-token");
}

#[tokio::test]
async fn positional_arg_resolved_as_profile_name() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    let token = load_token(s.args(AuthArguments::default(), "", &["workspace-a"], &NO_PROMPTS))
        .await
        .unwrap();
    assert_eq!(token.access, "workspace-a");
}

#[tokio::test]
async fn dotted_positional_arg_treated_as_host_when_no_profile_matches() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    let token = load_token(s.args(
        AuthArguments::default(),
        "",
        &["workspace-a.cloud.databricks.com"],
        &NO_PROMPTS,
    ))
    .await
    .unwrap();
    assert_eq!(token.access, "workspace-a");
}

#[tokio::test]
async fn dotted_profile_name_resolved_as_profile_not_host() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    let token = load_token(s.args(AuthArguments::default(), "", &["default.dev"], &NO_PROMPTS))
        .await
        .unwrap();
    assert_eq!(token.access, "default.dev");
}

#[tokio::test]
async fn positional_arg_not_a_profile_falls_through_to_host() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    let err = load_token(s.args(AuthArguments::default(), "", &["nonexistent"], &NO_PROMPTS))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "cache: databricks OAuth is not configured for this host. \
         Try logging in again with `databricks auth login --host https://nonexistent` before retrying. \
         If this fails, please report this issue to the Databricks CLI maintainers at \
         https://github.com/databricks/cli/issues/new"
    );
}

#[tokio::test]
async fn scheme_less_account_host_ambiguity_detected() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    let auth = AuthArguments {
        host: "accounts.cloud.databricks.com".to_string(),
        account_id: "same-account".to_string(),
        ..Default::default()
    };
    let err = load_token(s.args(auth, "", &[], &NO_PROMPTS)).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "acct-dup1 and acct-dup2 match accounts.cloud.databricks.com in <in memory>. \
         Use --profile to specify which profile to use"
    );
}

#[tokio::test]
async fn workspace_host_ambiguity_non_interactive() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    let auth = AuthArguments {
        host: "https://shared.cloud.databricks.com".to_string(),
        ..Default::default()
    };
    let err = load_token(s.args(auth, "", &[], &NO_PROMPTS)).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "dup1 and dup2 match https://shared.cloud.databricks.com in <in memory>. \
         Use --profile to specify which profile to use"
    );
}

#[tokio::test]
async fn workspace_host_ambiguity_interactive_picker() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    let auth = AuthArguments {
        host: "https://shared.cloud.databricks.com".to_string(),
        ..Default::default()
    };
    // Neither dup profile has a cached token; picking dup2 makes the lookup
    // fail under that profile key, proving the selection was applied.
    let prompter = ScriptedPrompter::new([Response::Select(1)]);
    let err = load_token(s.args(auth, "", &[], &prompter)).await.unwrap_err();
    assert!(err.to_string().starts_with("cache: databricks OAuth is not configured for this host"));
}

#[tokio::test]
async fn same_account_host_different_account_ids_no_ambiguity() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    let auth = AuthArguments {
        host: "https://accounts.cloud.databricks.com".to_string(),
        account_id: "active".to_string(),
        ..Default::default()
    };
    let token = load_token(s.args(auth, "", &[], &NO_PROMPTS)).await.unwrap();
    assert_eq!(token.access, "new-access-token");
}

#[tokio::test]
async fn host_with_one_matching_profile_resolves_to_profile_key() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    let auth = AuthArguments {
        host: "https://unique-ws.cloud.databricks.com".to_string(),
        ..Default::default()
    };
    // The token exists only under the "unique-ws" profile key, not the host.
    let token = load_token(s.args(auth, "", &[], &NO_PROMPTS)).await.unwrap();
    assert_eq!(token.access, "unique-ws");
}

#[tokio::test]
async fn host_with_no_matching_profile_uses_host_key() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    let auth = AuthArguments {
        host: "https://no-profile.cloud.databricks.com".to_string(),
        ..Default::default()
    };
    let token = load_token(s.args(auth, "", &[], &NO_PROMPTS)).await.unwrap();
    assert_eq!(token.access, "no-profile");
}

#[tokio::test]
async fn matched_profile_with_host_key_only_token_found_via_fallback() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    let auth = AuthArguments {
        host: "https://legacy-ws.cloud.databricks.com".to_string(),
        ..Default::default()
    };
    // The profile "legacy-ws" matches but only a host-keyed token exists.
    let token = load_token(s.args(auth, "", &[], &NO_PROMPTS)).await.unwrap();
    assert_eq!(token.access, "legacy-ws");
}

#[tokio::test]
async fn env_host_short_circuits_profile_resolution() {
    let mut s = Scenario::new(RefreshBehavior::Succeed);
    s.env = Env::fake([
        ("DATABRICKS_HOST", "https://no-profile.cloud.databricks.com"),
    ]);
    let token = load_token(s.args(AuthArguments::default(), "", &[], &NO_PROMPTS))
        .await
        .unwrap();
    assert_eq!(token.access, "no-profile");
}

#[tokio::test]
async fn env_profile_selects_profile() {
    let mut s = Scenario::new(RefreshBehavior::Succeed);
    s.env = Env::fake([("DATABRICKS_CONFIG_PROFILE", "workspace-a")]);
    let token = load_token(s.args(AuthArguments::default(), "", &[], &NO_PROMPTS))
        .await
        .unwrap();
    assert_eq!(token.access, "workspace-a");
}

#[tokio::test]
async fn no_args_non_interactive_with_profiles_configured() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    let err = load_token(s.args(AuthArguments::default(), "", &[], &NO_PROMPTS))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "no profile specified. Use --profile <name> to specify which profile to use"
    );
}

#[tokio::test]
async fn no_args_non_interactive_without_profiles() {
    let mut s = Scenario::new(RefreshBehavior::Succeed);
    s.profiler = InMemoryProfiler::default();
    let err = load_token(s.args(AuthArguments::default(), "", &[], &NO_PROMPTS))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "no profiles configured. Run 'databricks auth login' to create a profile"
    );
}

#[tokio::test]
async fn no_args_interactive_picker_selects_profile() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    // Index 2 in the picker is "workspace-a".
    let prompter = ScriptedPrompter::new([Response::Select(2)]);
    let token = load_token(s.args(AuthArguments::default(), "", &[], &prompter))
        .await
        .unwrap();
    assert_eq!(token.access, "workspace-a");
}

#[tokio::test]
async fn no_args_interactive_enter_host_manually() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    // 10 profiles, index 10 = "Create a new profile", 11 = "Enter a host
    // URL manually"; then the host prompt.
    let prompter = ScriptedPrompter::new([
        Response::Select(11),
        Response::Input("https://no-profile.cloud.databricks.com".to_string()),
    ]);
    let token = load_token(s.args(AuthArguments::default(), "", &[], &prompter))
        .await
        .unwrap();
    assert_eq!(token.access, "no-profile");
}

#[tokio::test]
async fn m2m_profile_is_rejected() {
    let mut s = Scenario::new(RefreshBehavior::Succeed);
    s.profiler.profiles.push(Profile {
        name: "sp".to_string(),
        host: "https://sp.cloud.databricks.com".to_string(),
        account_id: String::new(),
        workspace_id: String::new(),
        is_unified_host: false,
        has_client_credentials: true,
    });
    let err = load_token(s.args(AuthArguments::default(), "sp", &[], &NO_PROMPTS))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "profile \"sp\" uses M2M authentication (client_id/client_secret). \
         `databricks auth token` only supports U2M (user-to-machine) authentication tokens. \
         To authenticate as a service principal, use the Databricks SDK directly"
    );
}

#[tokio::test]
async fn account_host_without_account_id_non_interactive() {
    let s = Scenario::new(RefreshBehavior::Succeed);
    let auth = AuthArguments {
        host: "https://accounts.cloud.databricks.com".to_string(),
        ..Default::default()
    };
    let err = load_token(s.args(auth, "", &[], &NO_PROMPTS)).await.unwrap_err();
    assert!(err.to_string().contains("no account ID provided"));
}

#[tokio::test]
async fn in_memory_profiler_path_is_stable() {
    // The ambiguity message embeds this path; keep it fixed.
    assert_eq!(profiler().path(), "<in memory>");
}
