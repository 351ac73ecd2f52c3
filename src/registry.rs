//! Read-only, merged view over the credentials and config files.
//!
//! A registry is built fresh for every operation from the two parsed files
//! and never outlives it; the files on disk are the only source of truth.

use tracing::debug;

use crate::attributes::AttributeSet;
use crate::error::{ProfileError, Result};
use crate::paths::Paths;
use crate::store::{self, DEFAULT_SECTION, FileKind, ProfileFile};

/// A profile name plus its attributes from each file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    /// Section from the credentials file, if present
    pub credentials: Option<AttributeSet>,
    /// Section from the config file, if present
    pub config: Option<AttributeSet>,
    /// False for a synthetic profile built from `default` that matches no
    /// stored profile
    pub matched: bool,
}

impl Profile {
    /// Merged attributes; a key present in both files keeps its credentials value
    pub fn merged(&self) -> AttributeSet {
        let creds = self.credentials.clone().unwrap_or_default();
        match &self.config {
            Some(config) => creds.merged_with(config),
            None => creds,
        }
    }

    /// True when the profile has a section in both files
    pub fn is_complete(&self) -> bool {
        self.credentials.is_some() && self.config.is_some()
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_SECTION
    }
}

pub struct ProfileRegistry {
    credentials: ProfileFile,
    config: ProfileFile,
}

impl ProfileRegistry {
    pub fn new(credentials: ProfileFile, config: ProfileFile) -> Self {
        Self {
            credentials,
            config,
        }
    }

    /// Load both files from disk
    pub fn load(paths: &Paths) -> Result<Self> {
        let credentials = store::load(&paths.credentials_file, FileKind::Credentials)?;
        let config = store::load(&paths.config_file, FileKind::Config)?;
        Ok(Self::new(credentials, config))
    }

    pub fn into_files(self) -> (ProfileFile, ProfileFile) {
        (self.credentials, self.config)
    }

    /// Whether either file has a section for `name`
    pub fn contains(&self, name: &str) -> bool {
        self.credentials_section(name).is_some() || self.config_section(name).is_some()
    }

    pub fn credentials_section(&self, name: &str) -> Option<&AttributeSet> {
        self.credentials
            .section(&FileKind::Credentials.section_name(name))
    }

    pub fn config_section(&self, name: &str) -> Option<&AttributeSet> {
        self.config.section(&FileKind::Config.section_name(name))
    }

    /// All profile names: credentials-file order first, then names that only
    /// appear in the config file. `default` is left out unless it is the only
    /// profile.
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let from_creds = self
            .credentials
            .section_names()
            .filter_map(|s| FileKind::Credentials.profile_name(s));
        let from_config = self
            .config
            .section_names()
            .filter_map(|s| FileKind::Config.profile_name(s));

        for name in from_creds.chain(from_config) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }

        if names.iter().any(|n| n != DEFAULT_SECTION) {
            names.retain(|n| n != DEFAULT_SECTION);
        }
        names
    }

    /// Every listed profile with its merged attributes
    pub fn list_profiles(&self) -> Vec<Profile> {
        self.profile_names()
            .into_iter()
            .filter_map(|name| self.profile(&name))
            .collect()
    }

    /// Look up a single profile in both files
    pub fn profile(&self, name: &str) -> Option<Profile> {
        let credentials = self.credentials_section(name).cloned();
        let config = self.config_section(name).cloned();
        if credentials.is_none() && config.is_none() {
            return None;
        }
        Some(Profile {
            name: name.to_string(),
            credentials,
            config,
            matched: true,
        })
    }

    /// Merged credential and config attributes for `name`
    pub fn resolve(&self, name: &str) -> Result<AttributeSet> {
        self.profile(name)
            .map(|p| p.merged())
            .ok_or_else(|| ProfileError::ProfileNotFound {
                name: name.to_string(),
            })
    }

    /// The stored profile whose sections equal the `default` sections.
    ///
    /// When `default` exists but matches nothing, a synthetic profile named
    /// `default` with `matched == false` is returned. `None` when neither file
    /// has a `default` section.
    pub fn current_profile(&self) -> Option<Profile> {
        let default = self.profile(DEFAULT_SECTION)?;
        let default_creds = default.credentials.clone().unwrap_or_default();
        let default_config = default.config.clone().unwrap_or_default();

        let found = self
            .profile_names()
            .into_iter()
            .filter(|n| n != DEFAULT_SECTION)
            .filter_map(|n| self.profile(&n))
            .find(|p| {
                p.credentials.clone().unwrap_or_default() == default_creds
                    && p.config.clone().unwrap_or_default() == default_config
            });

        match found {
            Some(profile) => {
                debug!(profile = %profile.name, "default matches stored profile");
                Some(profile)
            }
            None => Some(Profile {
                matched: false,
                ..default
            }),
        }
    }

    /// True when the two `default` sections both point at the same stored
    /// profile, or neither does. A mismatch is what an interrupted switch
    /// leaves behind.
    pub fn defaults_consistent(&self) -> bool {
        let Some(default) = self.profile(DEFAULT_SECTION) else {
            return true;
        };
        let default_creds = default.credentials.unwrap_or_default();
        let default_config = default.config.unwrap_or_default();

        let creds_match = self.matching_names(FileKind::Credentials, &default_creds);
        let config_match = self.matching_names(FileKind::Config, &default_config);
        if creds_match.is_empty() && config_match.is_empty() {
            return true;
        }
        creds_match.iter().any(|n| config_match.contains(n))
    }

    fn matching_names(&self, kind: FileKind, target: &AttributeSet) -> Vec<String> {
        self.profile_names()
            .into_iter()
            .filter(|n| n != DEFAULT_SECTION)
            .filter(|n| {
                let section = match kind {
                    FileKind::Credentials => self.credentials_section(n),
                    FileKind::Config => self.config_section(n),
                };
                section.cloned().unwrap_or_default() == *target
            })
            .collect()
    }
}
