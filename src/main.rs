use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use dbcli::auth::AuthArguments;
use dbcli::commands::{self, App};
use dbcli::consts;
use dbcli::env::Env;
use dbcli::oauth::{PersistentAuth, SqliteTokenCache};
use dbcli::profile::FileProfiler;
use dbcli::prompt::TerminalPrompter;

#[derive(Parser)]
#[command(name = "databricks", version, about = "Databricks CLI authentication")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Connection profile from the profile file (~/.databrickscfg)
    #[arg(short = 'p', long, global = true)]
    profile: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Authentication commands
    #[command(subcommand)]
    Auth(AuthCommand),

    /// Configure authentication with a personal access token
    Configure {
        /// Workspace host to configure
        #[arg(long)]
        host: Option<String>,
    },
}

#[derive(Subcommand)]
enum AuthCommand {
    /// Get an authentication token from the local cache, refreshing it if
    /// it is expired
    Token {
        /// Host URL or profile name
        #[arg(value_name = "HOST_OR_PROFILE")]
        host_or_profile: Option<String>,

        /// Timeout in seconds for acquiring a token
        #[arg(long, default_value_t = consts::DEFAULT_TOKEN_TIMEOUT.as_secs())]
        timeout: u64,

        #[command(flatten)]
        flags: AuthFlags,
    },

    /// Log in via OAuth and save the result as a profile
    Login {
        /// Host URL
        #[arg(value_name = "HOST")]
        host_arg: Option<String>,

        #[command(flatten)]
        flags: AuthFlags,
    },
}

#[derive(Args)]
struct AuthFlags {
    /// Workspace or account console host
    #[arg(long)]
    host: Option<String>,

    /// Account ID, required for account console hosts
    #[arg(long)]
    account_id: Option<String>,

    /// Workspace ID within a unified host
    #[arg(long)]
    workspace_id: Option<String>,

    /// Treat the host as a unified (account + workspace) host
    #[arg(long)]
    experimental_is_unified_host: bool,
}

impl AuthFlags {
    fn to_auth_arguments(&self, profile: &Option<String>) -> AuthArguments {
        AuthArguments {
            host: self.host.clone().unwrap_or_default(),
            account_id: self.account_id.clone().unwrap_or_default(),
            workspace_id: self.workspace_id.clone().unwrap_or_default(),
            is_unified_host: self.experimental_is_unified_host,
            profile: profile.clone().unwrap_or_default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env = Env::real();
    let cache_path = consts::default_token_cache_path();
    if let Some(parent) = cache_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let cache_path = cache_path
        .to_str()
        .context("token cache path is not valid UTF-8")?
        .to_string();

    let app = App {
        profiler: Box::new(FileProfiler::from_env(&env)),
        store: Arc::new(PersistentAuth::new(Box::new(SqliteTokenCache::open(
            &cache_path,
        )?))),
        prompter: Box::new(TerminalPrompter),
        env,
    };

    match cli.command {
        Command::Auth(AuthCommand::Token {
            host_or_profile,
            timeout,
            flags,
        }) => {
            commands::token::run(
                &app,
                flags.to_auth_arguments(&cli.profile),
                cli.profile.unwrap_or_default(),
                host_or_profile.into_iter().collect(),
                Duration::from_secs(timeout),
            )
            .await
        }
        Command::Auth(AuthCommand::Login { host_arg, flags }) => {
            commands::login::run(&app, flags.to_auth_arguments(&cli.profile), host_arg).await
        }
        Command::Configure { host } => commands::configure::run(&app, host, cli.profile),
    }
}
