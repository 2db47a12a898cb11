//! Per-invocation resolved configuration.

/// Configuration assembled for a single invocation from flags, environment
/// variables, and the profile file. Built incrementally during resolution;
/// only non-empty fields are ever written back to storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub host: String,
    pub profile: String,
    pub account_id: String,
    pub workspace_id: String,
    pub auth_type: String,
    pub token: String,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
    pub cluster_id: String,
    pub serverless_compute_id: String,
    pub scopes: Vec<String>,
    /// Path of the profile file. Empty means the default location.
    pub config_file: String,
    pub is_unified_host: bool,
    /// Disables the background refresh performed by the `databricks-cli`
    /// strategy's caching token source.
    pub disable_async_refresh: bool,
}
