//! Profile records and matching predicates.
//!
//! A profile is a named identity saved in the profile file: host, optional
//! account/workspace IDs, and auth hints. Matchers are pure predicates used
//! by the token resolver and the profile store to pick sections without
//! touching the file format.

pub mod file;

use std::collections::HashSet;

use thiserror::Error;

pub use file::FileProfiler;

/// A saved identity from the profile file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub host: String,
    pub account_id: String,
    pub workspace_id: String,
    pub is_unified_host: bool,
    /// True when the section carries both `client_id` and `client_secret`,
    /// i.e. it authenticates machine-to-machine.
    pub has_client_credentials: bool,
}

impl Profile {
    /// Display form used by interactive pickers: `name (host)`.
    pub fn label(&self) -> String {
        if self.host.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.host)
        }
    }
}

#[derive(Debug, Error)]
pub enum ProfileError {
    /// The profile file does not exist. Callers that can proceed with an
    /// empty configuration treat this as a sentinel, not a failure.
    #[error("no configuration file found at {path}")]
    NoConfiguration { path: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Boxed profile predicate, the unit of composition for profile lookups.
pub type ProfileMatchFn = Box<dyn Fn(&Profile) -> bool + Send + Sync>;

/// Normalize a host string so that scheme, trailing slash, path, and query
/// differences do not affect equality. Scheme-less hosts are assumed https.
/// Idempotent: `canonicalize_host(canonicalize_host(h)) == canonicalize_host(h)`.
pub fn canonicalize_host(host: &str) -> String {
    let host = host.trim();
    if host.is_empty() {
        return String::new();
    }
    let (scheme, rest) = match host.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("https", host),
    };
    let hostname = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    format!("{}://{}", scheme.to_lowercase(), hostname.to_lowercase())
}

/// Whether a canonical host addresses the accounts console rather than a
/// workspace.
pub fn is_account_host(host: &str) -> bool {
    let canonical = canonicalize_host(host);
    let hostname = canonical.split("://").nth(1).unwrap_or_default();
    hostname.starts_with("accounts.") || hostname.starts_with("accounts-dod.")
}

/// Matches profiles whose canonical host equals the canonical form of `host`.
/// Profiles without a host never match.
pub fn with_host(host: &str) -> ProfileMatchFn {
    let target = canonicalize_host(host);
    Box::new(move |p: &Profile| !p.host.is_empty() && canonicalize_host(&p.host) == target)
}

/// Matches by canonical host and exact account ID.
pub fn with_host_and_account_id(host: &str, account_id: &str) -> ProfileMatchFn {
    let target = canonicalize_host(host);
    let account_id = account_id.to_string();
    Box::new(move |p: &Profile| {
        !p.host.is_empty() && canonicalize_host(&p.host) == target && p.account_id == account_id
    })
}

/// Matches profiles by exact name membership. An empty name never matches.
pub fn match_profile_names<I, S>(names: I) -> ProfileMatchFn
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let set: HashSet<String> = names.into_iter().map(Into::into).collect();
    Box::new(move |p: &Profile| !p.name.is_empty() && set.contains(&p.name))
}

/// Matches workspace profiles: regular workspace profiles (no account ID)
/// or unified hosts with a workspace ID.
pub fn match_workspace_profiles(p: &Profile) -> bool {
    (p.account_id.is_empty() && !p.is_unified_host)
        || (p.is_unified_host && !p.workspace_id.is_empty())
}

/// Matches account profiles: regular account profiles (host + account ID)
/// or unified hosts with an account ID but no workspace ID.
pub fn match_account_profiles(p: &Profile) -> bool {
    (!p.host.is_empty() && !p.account_id.is_empty() && !p.is_unified_host)
        || (p.is_unified_host && !p.account_id.is_empty() && p.workspace_id.is_empty())
}

pub fn match_all_profiles(_: &Profile) -> bool {
    true
}

/// Read access to stored profiles. The file-backed implementation reads the
/// profile file; [`InMemoryProfiler`] backs deterministic tests.
pub trait Profiler: Send + Sync {
    fn load_profiles(&self, matcher: &dyn Fn(&Profile) -> bool)
    -> Result<Vec<Profile>, ProfileError>;

    /// Display path of the backing file, used in error messages.
    fn path(&self) -> String;
}

/// Fixed set of profiles, for tests.
#[derive(Debug, Default)]
pub struct InMemoryProfiler {
    pub profiles: Vec<Profile>,
}

impl Profiler for InMemoryProfiler {
    fn load_profiles(
        &self,
        matcher: &dyn Fn(&Profile) -> bool,
    ) -> Result<Vec<Profile>, ProfileError> {
        Ok(self.profiles.iter().filter(|p| matcher(p)).cloned().collect())
    }

    fn path(&self) -> String {
        "<in memory>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_equivalence_class() {
        let canonical = canonicalize_host("https://w.example.com");
        for host in [
            "w.example.com",
            "https://w.example.com/",
            "https://w.example.com/p?q=1",
            "https://w.example.com/some/path#frag",
        ] {
            assert_eq!(canonicalize_host(host), canonical, "host {host}");
        }
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize_host("Accounts.Cloud.Databricks.com/login?x=1");
        assert_eq!(canonicalize_host(&once), once);
    }

    #[test]
    fn canonicalize_empty_stays_empty() {
        assert_eq!(canonicalize_host(""), "");
        assert_eq!(canonicalize_host("  "), "");
    }

    #[test]
    fn account_host_detection() {
        assert!(is_account_host("https://accounts.cloud.databricks.com"));
        assert!(is_account_host("accounts.cloud.databricks.com/login"));
        assert!(is_account_host("https://accounts-dod.cloud.databricks.us"));
        assert!(!is_account_host("https://myworkspace.cloud.databricks.com"));
    }

    #[test]
    fn with_host_matches_across_schemes_and_paths() {
        let p = Profile {
            host: "https://myworkspace.cloud.databricks.com".to_string(),
            ..Default::default()
        };
        assert!(with_host("myworkspace.cloud.databricks.com")(&p));
        assert!(with_host("https://myworkspace.cloud.databricks.com/")(&p));
        assert!(with_host("https://myworkspace.cloud.databricks.com/some/path?query=1")(&p));
        assert!(!with_host("https://other.cloud.databricks.com")(&p));
    }

    #[test]
    fn with_host_skips_empty_profile_host() {
        let p = Profile::default();
        assert!(!with_host("https://myworkspace.cloud.databricks.com")(&p));
    }

    #[test]
    fn with_host_and_account_id_requires_both() {
        let p = Profile {
            host: "https://accounts.cloud.databricks.com".to_string(),
            account_id: "abc123".to_string(),
            ..Default::default()
        };
        assert!(with_host_and_account_id("accounts.cloud.databricks.com", "abc123")(&p));
        assert!(!with_host_and_account_id("accounts.cloud.databricks.com", "xyz789")(&p));
        assert!(!with_host_and_account_id("https://other.cloud.databricks.com", "abc123")(&p));
    }

    #[test]
    fn match_profile_names_is_exact_set_membership() {
        let m = match_profile_names(["dev", "staging"]);
        assert!(m(&Profile { name: "dev".into(), ..Default::default() }));
        assert!(m(&Profile { name: "staging".into(), ..Default::default() }));
        assert!(!m(&Profile { name: "production".into(), ..Default::default() }));
        assert!(!m(&Profile { name: "".into(), ..Default::default() }));
    }

    #[test]
    fn empty_name_never_matches_even_when_passed() {
        let m = match_profile_names([""]);
        assert!(!m(&Profile::default()));
    }

    #[test]
    fn workspace_and_account_classification() {
        let ws = Profile {
            host: "https://w.example.com".into(),
            ..Default::default()
        };
        let acc = Profile {
            host: "https://accounts.example.com".into(),
            account_id: "a1".into(),
            ..Default::default()
        };
        let unified_ws = Profile {
            host: "https://u.example.com".into(),
            account_id: "a1".into(),
            workspace_id: "w1".into(),
            is_unified_host: true,
            ..Default::default()
        };
        let unified_acc = Profile {
            host: "https://u.example.com".into(),
            account_id: "a1".into(),
            is_unified_host: true,
            ..Default::default()
        };

        assert!(match_workspace_profiles(&ws));
        assert!(!match_account_profiles(&ws));

        assert!(match_account_profiles(&acc));
        assert!(!match_workspace_profiles(&acc));

        assert!(match_workspace_profiles(&unified_ws));
        assert!(!match_account_profiles(&unified_ws));

        assert!(match_account_profiles(&unified_acc));
        assert!(!match_workspace_profiles(&unified_acc));

        assert!(match_all_profiles(&ws));
    }
}
