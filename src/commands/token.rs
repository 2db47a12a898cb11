//! `databricks auth token`: print a cached (and refreshed if necessary)
//! OAuth token as JSON.

use std::time::Duration;

use anyhow::Result;

use crate::auth::{AuthArguments, LoadTokenArgs, load_token};
use crate::commands::App;

pub async fn run(
    app: &App,
    auth_arguments: AuthArguments,
    profile_name: String,
    args: Vec<String>,
    token_timeout: Duration,
) -> Result<()> {
    let token = load_token(LoadTokenArgs {
        auth_arguments,
        profile_name,
        args,
        token_timeout,
        profiler: app.profiler.as_ref(),
        store: app.store.as_ref(),
        prompter: app.prompter.as_ref(),
        env: &app.env,
    })
    .await?;

    println!("{}", serde_json::to_string_pretty(&token)?);
    Ok(())
}
