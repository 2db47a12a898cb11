//! File-backed profiler reading the profile file.

use std::path::PathBuf;

use super::{Profile, ProfileError, Profiler};
use crate::cfgfile::ConfigFile;
use crate::consts::{ENV_CONFIG_FILE, default_config_path};
use crate::env::Env;

/// Reads profiles from the profile file on every call, so concurrent edits
/// by `configure` or a login flow are picked up.
#[derive(Debug)]
pub struct FileProfiler {
    path: PathBuf,
}

impl FileProfiler {
    pub fn new(path: PathBuf) -> Self {
        FileProfiler { path }
    }

    /// Resolve the path from the config-file environment variable, falling
    /// back to the default location.
    pub fn from_env(env: &Env) -> Self {
        let path = env
            .get(ENV_CONFIG_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(default_config_path);
        FileProfiler { path }
    }
}

impl Profiler for FileProfiler {
    fn load_profiles(
        &self,
        matcher: &dyn Fn(&Profile) -> bool,
    ) -> Result<Vec<Profile>, ProfileError> {
        if !self.path.exists() {
            return Err(ProfileError::NoConfiguration {
                path: self.path(),
            });
        }
        let file = ConfigFile::load_or_create(&self.path)?;
        Ok(file.profiles().into_iter().filter(|p| matcher(p)).collect())
    }

    fn path(&self) -> String {
        self.path.display().to_string()
    }
}
