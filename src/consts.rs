//! Project-wide constants.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the workspace or account host.
pub const ENV_HOST: &str = "DATABRICKS_HOST";

/// Environment variable overriding the account ID.
pub const ENV_ACCOUNT_ID: &str = "DATABRICKS_ACCOUNT_ID";

/// Environment variable overriding the workspace ID.
pub const ENV_WORKSPACE_ID: &str = "DATABRICKS_WORKSPACE_ID";

/// Environment variable marking the target host as a unified host.
pub const ENV_IS_UNIFIED_HOST: &str = "DATABRICKS_EXPERIMENTAL_IS_UNIFIED_HOST";

/// Environment variable providing a personal access token.
pub const ENV_TOKEN: &str = "DATABRICKS_TOKEN";

/// Environment variable selecting a profile by name.
pub const ENV_CONFIG_PROFILE: &str = "DATABRICKS_CONFIG_PROFILE";

/// Environment variable overriding the profile file path.
pub const ENV_CONFIG_FILE: &str = "DATABRICKS_CONFIG_FILE";

/// The reserved fallback section of the profile file.
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Default timeout for acquiring (and possibly refreshing) a token.
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Default profile file path: `~/.databrickscfg`.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .expect("cannot determine home directory")
        .join(".databrickscfg")
}

/// Default token cache path: `~/.databricks/token-cache.db`.
pub fn default_token_cache_path() -> PathBuf {
    dirs::home_dir()
        .expect("cannot determine home directory")
        .join(".databricks")
        .join("token-cache.db")
}
