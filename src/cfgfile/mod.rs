//! The profile file store.
//!
//! Profiles live in an INI-style file (`~/.databrickscfg` by default) with
//! one section per profile and a reserved, always-present `DEFAULT` section.
//! This module owns the exact wire format: parsing with actionable
//! diagnostics, rendering with aligned `=` signs, and the merge/clear-key
//! write semantics used by `configure` and the inline login flow.
//!
//! There is no inter-process locking: concurrent writers are last-writer-
//! wins. A write is a single `fs::write` of the fully rendered file, so a
//! losing writer never leaves a torn file behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::config::ResolvedConfig;
use crate::consts::{DEFAULT_SECTION, default_config_path};
use crate::profile::{Profile, with_host};

/// Comment emitted above the DEFAULT section when a brand-new profile file
/// is created for a named (non-DEFAULT) profile.
const DEFAULT_SECTION_COMMENT: &str = "; The profile defined in the DEFAULT section is to be used as a fallback when no profile is explicitly specified.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("cannot create new profile: empty section name")]
    EmptySectionName,
    /// More than one stored profile matched the lookup. Never resolved
    /// silently; the candidate names are carried for disambiguation.
    #[error("multiple profiles matched: {}", .names.join(", "))]
    MultipleProfilesMatched { names: Vec<String> },
    #[error("unclosed section: {0}")]
    UnclosedSection(String),
    #[error("invalid line: {0}")]
    InvalidLine(String),
}

/// A named key→value mapping inside the profile file. Key order is
/// preserved so re-renders stay diffable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    name: String,
    keys: Vec<(String, String)>,
}

impl Section {
    fn new(name: impl Into<String>) -> Self {
        Section {
            name: name.into(),
            keys: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &(String, String)> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Insert or overwrite a key, preserving its position when it exists.
    fn set(&mut self, key: &str, value: impl Into<String>) {
        match self.keys.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.into(),
            None => self.keys.push((key.to_string(), value.into())),
        }
    }

    /// Remove a key. Removing an absent key is a no-op.
    fn remove(&mut self, key: &str) {
        self.keys.retain(|(k, _)| k != key);
    }

    /// View this section as a [`Profile`] record.
    pub fn as_profile(&self) -> Profile {
        let get = |key: &str| self.get(key).unwrap_or_default().to_string();
        Profile {
            name: self.name.clone(),
            host: get("host"),
            account_id: get("account_id"),
            workspace_id: get("workspace_id"),
            is_unified_host: self.get("experimental_is_unified_host") == Some("true"),
            has_client_credentials: self.get("client_id").is_some_and(|v| !v.is_empty())
                && self.get("client_secret").is_some_and(|v| !v.is_empty()),
        }
    }
}

/// An in-memory profile file: leading comment, ordered sections, and the
/// path it was loaded from. `DEFAULT` is always present and always first.
#[derive(Debug)]
pub struct ConfigFile {
    path: PathBuf,
    comment: Vec<String>,
    sections: Vec<Section>,
    /// True when the file did not exist before this load.
    created: bool,
}

impl ConfigFile {
    /// Open and parse the file at `path`, creating an empty file containing
    /// only the DEFAULT section if it does not exist.
    pub fn load_or_create(path: &Path) -> Result<ConfigFile> {
        let (contents, created) = match fs::read_to_string(path) {
            Ok(contents) => (contents, false),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                fs::write(path, "").with_context(|| {
                    format!("failed to create config file at {}", path.display())
                })?;
                (String::new(), true)
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config file at {}", path.display()));
            }
        };

        let mut file = Self::parse(&contents)
            .with_context(|| format!("failed to parse config file at {}", path.display()))?;
        file.path = path.to_path_buf();
        file.created = created;
        Ok(file)
    }

    fn parse(contents: &str) -> Result<ConfigFile, StoreError> {
        let mut comment = Vec::new();
        let mut sections = vec![Section::new(DEFAULT_SECTION)];
        let mut current = 0usize;
        let mut seen_section = false;

        for raw in contents.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with(';') || line.starts_with('#') {
                if !seen_section {
                    comment.push(line.to_string());
                }
                continue;
            }
            if let Some(rest) = line.strip_prefix('[') {
                let Some(name) = rest.strip_suffix(']') else {
                    return Err(StoreError::UnclosedSection(line.to_string()));
                };
                seen_section = true;
                current = match sections.iter().position(|s| s.name == name) {
                    Some(i) => i,
                    None => {
                        sections.push(Section::new(name));
                        sections.len() - 1
                    }
                };
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(StoreError::InvalidLine(line.to_string()));
            };
            sections[current].set(key.trim(), value.trim().to_string());
        }

        Ok(ConfigFile {
            path: PathBuf::new(),
            comment,
            sections,
            created: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// All sections as profile records, in stored order. The DEFAULT section
    /// is included only when it has keys.
    pub fn profiles(&self) -> Vec<Profile> {
        self.sections
            .iter()
            .filter(|s| s.name != DEFAULT_SECTION || !s.is_empty())
            .map(Section::as_profile)
            .collect()
    }

    /// Resolve the section targeted by `cfg`, creating it when `cfg.profile`
    /// names one that does not exist yet. Precedence: explicit profile name,
    /// then a single account-ID match, then a single canonical-host match.
    /// Zero or multiple host matches fail; ambiguity is never resolved
    /// silently.
    pub fn match_or_create_section(&mut self, cfg: &ResolvedConfig) -> Result<usize, StoreError> {
        if !cfg.profile.is_empty() {
            if let Some(i) = self.sections.iter().position(|s| s.name == cfg.profile) {
                return Ok(i);
            }
            if self.created && cfg.profile != DEFAULT_SECTION {
                self.comment = vec![DEFAULT_SECTION_COMMENT.to_string()];
            }
            self.sections.push(Section::new(cfg.profile.clone()));
            return Ok(self.sections.len() - 1);
        }

        let profiles = self.profiles();

        if !cfg.account_id.is_empty() {
            let names: Vec<String> = profiles
                .iter()
                .filter(|p| p.account_id == cfg.account_id)
                .map(|p| p.name.clone())
                .collect();
            match names.len() {
                1 => return Ok(self.position_of(&names[0])),
                n if n > 1 => return Err(StoreError::MultipleProfilesMatched { names }),
                _ => {}
            }
        }

        if !cfg.host.is_empty() {
            let matcher = with_host(&cfg.host);
            let names: Vec<String> = profiles
                .iter()
                .filter(|p| matcher(p))
                .map(|p| p.name.clone())
                .collect();
            match names.len() {
                1 => return Ok(self.position_of(&names[0])),
                n if n > 1 => return Err(StoreError::MultipleProfilesMatched { names }),
                _ => {}
            }
        }

        Err(StoreError::EmptySectionName)
    }

    fn position_of(&self, name: &str) -> usize {
        self.sections
            .iter()
            .position(|s| s.name == name)
            .unwrap_or_default()
    }

    /// Render the file with per-section `=` alignment.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.comment {
            out.push_str(line);
            out.push('\n');
        }
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", section.name));
            let width = section
                .keys
                .iter()
                .map(|(k, _)| k.len())
                .max()
                .unwrap_or_default();
            for (key, value) in &section.keys {
                out.push_str(&format!("{key:<width$} = {value}\n"));
            }
        }
        out
    }

    /// Persist the rendered file. No backup file is created.
    pub fn save(&self) -> Result<()> {
        fs::write(&self.path, self.render())
            .with_context(|| format!("failed to write config file at {}", self.path.display()))
    }
}

/// Write every populated field of `cfg` to its target profile section,
/// leave absent fields untouched, remove the keys named in `clear_keys`,
/// and persist. Writing to profile `"DEFAULT"` updates the DEFAULT section
/// directly.
pub fn save_to_profile(cfg: &ResolvedConfig, clear_keys: &[&str]) -> Result<()> {
    let path = if cfg.config_file.is_empty() {
        default_config_path()
    } else {
        PathBuf::from(&cfg.config_file)
    };

    let mut file = ConfigFile::load_or_create(&path)?;
    let idx = file.match_or_create_section(cfg)?;
    let section = &mut file.sections[idx];

    let mut set = |key: &str, value: &str| {
        if !value.is_empty() {
            section.set(key, value);
        }
    };
    set("host", &cfg.host);
    set("token", &cfg.token);
    set("auth_type", &cfg.auth_type);
    set("account_id", &cfg.account_id);
    set("cluster_id", &cfg.cluster_id);
    set("serverless_compute_id", &cfg.serverless_compute_id);
    set("scopes", &cfg.scopes.join(","));
    set("client_id", &cfg.client_id);
    set("client_secret", &cfg.client_secret);
    set(
        "experimental_is_unified_host",
        if cfg.is_unified_host { "true" } else { "" },
    );
    set("workspace_id", &cfg.workspace_id);

    for key in clear_keys {
        section.remove(key);
    }

    file.save()
}
