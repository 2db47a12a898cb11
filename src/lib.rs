//! Authentication core for the Databricks command line tool: the profile
//! file store, host/profile matching, the credential-strategy chain, token
//! resolution against the persistent OAuth cache, and 401/403 error
//! enrichment.

pub mod auth;
pub mod cfgfile;
pub mod commands;
pub mod config;
pub mod consts;
pub mod env;
pub mod oauth;
pub mod profile;
pub mod prompt;
