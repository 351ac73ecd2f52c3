//! Profile operations: list, current, switch, create, delete, clear, check.
//!
//! Every call re-reads both files from disk and writes them back whole.
//! Mutations follow one fixed order: back up (where required), then write
//! the credentials file, then the config file.

use tracing::{info, warn};

use crate::attributes::AttributeSet;
use crate::error::{ProfileError, Result};
use crate::paths::Paths;
use crate::registry::{Profile, ProfileRegistry};
use crate::store::{self, BackupArtifact, DEFAULT_SECTION, FileKind};
use crate::validate::{CredentialValidator, Identity};

const MAX_NAME_LEN: usize = 64;

/// Outcome of a switch
#[derive(Debug)]
pub struct SwitchOutcome {
    pub profile: Profile,
    /// Post-switch identity check, when requested
    pub verification: Option<Result<Identity>>,
}

/// Outcome of a create
#[derive(Debug)]
pub struct CreateOutcome {
    pub identity: Identity,
    pub backups: [BackupArtifact; 2],
}

/// Outcome of a delete
#[derive(Debug)]
pub struct DeleteOutcome {
    pub removed_from_credentials: bool,
    pub removed_from_config: bool,
    pub backups: [BackupArtifact; 2],
}

pub struct ProfileOps<'a, V: CredentialValidator> {
    paths: &'a Paths,
    validator: &'a V,
}

impl<'a, V: CredentialValidator> ProfileOps<'a, V> {
    pub fn new(paths: &'a Paths, validator: &'a V) -> Self {
        Self { paths, validator }
    }

    fn registry(&self) -> Result<ProfileRegistry> {
        ProfileRegistry::load(self.paths)
    }

    pub fn list(&self) -> Result<Vec<Profile>> {
        Ok(self.registry()?.list_profiles())
    }

    pub fn current(&self) -> Result<Option<Profile>> {
        Ok(self.registry()?.current_profile())
    }

    /// Merged attributes for `name`
    pub fn resolve(&self, name: &str) -> Result<AttributeSet> {
        self.registry()?.resolve(name)
    }

    /// Run the identity check for a stored profile
    pub fn check(&self, name: &str) -> Result<Identity> {
        let attrs = self.resolve(name)?;
        self.validator.validate(name, &attrs)
    }

    /// Make `name` the active profile by overwriting both `default` sections
    /// with its sections. Safe to re-run after a partial failure.
    pub fn switch(&self, name: &str, verify: bool) -> Result<SwitchOutcome> {
        let registry = self.registry()?;
        let profile = registry
            .profile(name)
            .ok_or_else(|| ProfileError::ProfileNotFound {
                name: name.to_string(),
            })?;

        let (mut creds_file, mut config_file) = registry.into_files();
        replace_default(&mut creds_file, profile.credentials.clone());
        replace_default(&mut config_file, profile.config.clone());

        store::write(&self.paths.credentials_file, &creds_file)?;
        if let Err(e) = store::write(&self.paths.config_file, &config_file) {
            let source = match e {
                ProfileError::WriteFailed { source, .. } => source,
                other => std::io::Error::other(other.to_string()),
            };
            return Err(ProfileError::PartialSwitch {
                name: name.to_string(),
                written: self.paths.credentials_file.clone(),
                failed: self.paths.config_file.clone(),
                source,
            });
        }
        info!(profile = name, "switched default profile");

        let verification = verify.then(|| self.validator.validate(name, &profile.merged()));
        Ok(SwitchOutcome {
            profile,
            verification,
        })
    }

    /// Validate `attrs`, then store them as a new profile in both files.
    ///
    /// Credential keys go to the credentials file, everything else to the
    /// config file under `[profile <name>]`. Nothing is written unless the
    /// identity check passes and both backups are taken.
    pub fn create(&self, name: &str, attrs: &AttributeSet) -> Result<CreateOutcome> {
        validate_profile_name(name)?;

        let registry = self.registry()?;
        if let Some(path) = self.existing_location(&registry, name) {
            return Err(ProfileError::DuplicateProfile {
                name: name.to_string(),
                path,
            });
        }

        let identity =
            self.validator
                .validate(name, attrs)
                .map_err(|e| ProfileError::CreateAborted {
                    name: name.to_string(),
                    source: Box::new(e),
                })?;

        let backups = self.backup_both()?;

        let (creds_part, config_part) = attrs.split_by_file();
        let (mut creds_file, mut config_file) = registry.into_files();
        creds_file.upsert_section(&FileKind::Credentials.section_name(name), creds_part);
        if !config_part.is_empty() {
            config_file.upsert_section(&FileKind::Config.section_name(name), config_part);
        }

        self.write_both_or_rollback(&creds_file, &config_file, &backups)?;
        info!(profile = name, account = %identity.account_id, "created profile");
        Ok(CreateOutcome { identity, backups })
    }

    /// Remove `name` from both files. `default` is never touched, so it keeps
    /// the last switched values even if they came from this profile.
    ///
    /// Deleting the profile that `default` currently matches requires
    /// `confirmed`.
    pub fn delete(&self, name: &str, confirmed: bool) -> Result<DeleteOutcome> {
        if name == DEFAULT_SECTION {
            return Err(ProfileError::InvalidProfileName {
                name: name.to_string(),
                reason: "the default section is removed with 'clear'".to_string(),
            });
        }

        let registry = self.registry()?;
        if !registry.contains(name) {
            return Err(ProfileError::ProfileNotFound {
                name: name.to_string(),
            });
        }

        let is_current = registry
            .current_profile()
            .is_some_and(|p| p.matched && p.name == name);
        if is_current && !confirmed {
            return Err(ProfileError::ConfirmationRequired {
                name: name.to_string(),
            });
        }

        let backups = self.backup_both()?;

        let (mut creds_file, mut config_file) = registry.into_files();
        let removed_from_credentials =
            creds_file.remove_section(&FileKind::Credentials.section_name(name));
        let removed_from_config = config_file.remove_section(&FileKind::Config.section_name(name));

        self.write_both_or_rollback(&creds_file, &config_file, &backups)?;
        info!(profile = name, "deleted profile");
        Ok(DeleteOutcome {
            removed_from_credentials,
            removed_from_config,
            backups,
        })
    }

    /// Remove the `default` section from both files. Returns whether anything
    /// was removed; clearing an absent `default` succeeds.
    pub fn clear(&self) -> Result<bool> {
        let (mut creds_file, mut config_file) = self.registry()?.into_files();

        let creds_removed = creds_file.remove_section(DEFAULT_SECTION);
        let config_removed = config_file.remove_section(DEFAULT_SECTION);

        if creds_removed {
            store::write(&self.paths.credentials_file, &creds_file)?;
        }
        if config_removed {
            store::write(&self.paths.config_file, &config_file)?;
        }
        if creds_removed || config_removed {
            info!("cleared default profile");
        }
        Ok(creds_removed || config_removed)
    }

    fn existing_location(&self, registry: &ProfileRegistry, name: &str) -> Option<std::path::PathBuf> {
        if registry.credentials_section(name).is_some() {
            Some(self.paths.credentials_file.clone())
        } else if registry.config_section(name).is_some() {
            Some(self.paths.config_file.clone())
        } else {
            None
        }
    }

    fn backup_both(&self) -> Result<[BackupArtifact; 2]> {
        let creds = store::backup(&self.paths.credentials_file)?;
        let config = store::backup(&self.paths.config_file)?;
        Ok([creds, config])
    }

    fn write_both_or_rollback(
        &self,
        creds_file: &store::ProfileFile,
        config_file: &store::ProfileFile,
        backups: &[BackupArtifact; 2],
    ) -> Result<()> {
        store::write(&self.paths.credentials_file, creds_file)?;
        if let Err(e) = store::write(&self.paths.config_file, config_file) {
            if let Err(restore_err) = backups[0].restore() {
                warn!(error = %restore_err, "failed to restore credentials file from backup");
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Replace (never merge) the `default` section. An absent source section
/// removes `default` so it mirrors the chosen profile exactly.
fn replace_default(file: &mut store::ProfileFile, section: Option<AttributeSet>) {
    match section {
        Some(attrs) => file.upsert_section(DEFAULT_SECTION, attrs),
        None => {
            file.remove_section(DEFAULT_SECTION);
        }
    }
}

/// Only allows alphanumeric characters, `.`, `_` and `-`, and not the reserved
/// `default` name.
pub fn validate_profile_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(ProfileError::InvalidProfileName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return invalid("name cannot be empty");
    }
    if name.chars().count() > MAX_NAME_LEN {
        return invalid("name cannot be longer than 64 characters");
    }
    if name == DEFAULT_SECTION {
        return invalid("'default' is reserved for the active profile");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return invalid("only alphanumeric characters, '.', '-' and '_' are allowed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{ACCESS_KEY_ID, REGION, SECRET_ACCESS_KEY};
    use crate::test_utils::{FakeValidator, setup_test_paths, write_fixture};
    use std::fs;
    use tempfile::TempDir;

    fn staging_attrs() -> AttributeSet {
        [
            (ACCESS_KEY_ID, "AKIASTAGING"),
            (SECRET_ACCESS_KEY, "x"),
            (REGION, "us-west-2"),
        ]
        .into_iter()
        .collect()
    }

    fn section_names(path: &std::path::Path) -> Vec<String> {
        let content = fs::read_to_string(path).unwrap_or_default();
        store::ProfileFile::parse(&content)
            .section_names()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_profile_name_validation() {
        assert!(validate_profile_name("work").is_ok());
        assert!(validate_profile_name("my-profile.prod").is_ok());
        assert!(validate_profile_name("test_123").is_ok());

        assert!(validate_profile_name("").is_err());
        assert!(validate_profile_name("default").is_err());
        assert!(validate_profile_name("invalid name").is_err());
        assert!(validate_profile_name("a]b").is_err());
        assert!(validate_profile_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_create_switch_delete_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_fixture(&paths);
        let validator = FakeValidator::ok();
        let ops = ProfileOps::new(&paths, &validator);

        // Create
        let outcome = ops.create("staging", &staging_attrs()).unwrap();
        assert_eq!(outcome.identity.account_id, "123456789012");
        assert!(paths.credentials_backup().exists());
        assert!(paths.config_backup().exists());
        // Backups hold the pre-create content
        assert!(!fs::read_to_string(paths.credentials_backup()).unwrap().contains("staging"));

        let creds = fs::read_to_string(&paths.credentials_file).unwrap();
        let config = fs::read_to_string(&paths.config_file).unwrap();
        assert!(creds.contains("[staging]\naws_access_key_id = AKIASTAGING"));
        assert!(config.contains("[profile staging]\nregion = us-west-2"));

        // Switch
        ops.switch("staging", false).unwrap();
        let registry = ProfileRegistry::load(&paths).unwrap();
        assert_eq!(
            registry.credentials_section("default").unwrap().access_key_id(),
            Some("AKIASTAGING")
        );
        assert_eq!(
            registry.config_section("default").unwrap().region(),
            Some("us-west-2")
        );
        assert!(registry.credentials_section("staging").is_some());
        assert!(registry.config_section("staging").is_some());
        assert_eq!(ops.current().unwrap().unwrap().name, "staging");

        // Delete (confirmed, since it is the current default)
        ops.delete("staging", true).unwrap();
        let err = ops.resolve("staging").unwrap_err();
        assert!(matches!(err, ProfileError::ProfileNotFound { .. }));
        // default keeps the last switched values
        let registry = ProfileRegistry::load(&paths).unwrap();
        assert_eq!(
            registry.credentials_section("default").unwrap().access_key_id(),
            Some("AKIASTAGING")
        );
    }

    #[test]
    fn test_create_then_delete_restores_section_set() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_fixture(&paths);
        let validator = FakeValidator::ok();
        let ops = ProfileOps::new(&paths, &validator);

        let creds_before = section_names(&paths.credentials_file);
        let config_before = section_names(&paths.config_file);

        ops.create("temp", &staging_attrs()).unwrap();
        ops.delete("temp", false).unwrap();

        assert_eq!(section_names(&paths.credentials_file), creds_before);
        assert_eq!(section_names(&paths.config_file), config_before);
    }

    #[test]
    fn test_create_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_fixture(&paths);
        let validator = FakeValidator::ok();
        let ops = ProfileOps::new(&paths, &validator);

        let err = ops.create("work", &staging_attrs()).unwrap_err();
        assert!(matches!(err, ProfileError::DuplicateProfile { .. }));

        // Present only in the config file still counts
        fs::write(&paths.config_file, "[profile sso]\nsso_session = corp\n").unwrap();
        let err = ops.create("sso", &staging_attrs()).unwrap_err();
        assert!(matches!(err, ProfileError::DuplicateProfile { ref path, .. } if *path == paths.config_file));
        assert_eq!(validator.calls(), 0);
    }

    #[test]
    fn test_create_aborted_on_validation_failure() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_fixture(&paths);
        let validator = FakeValidator::failing("InvalidClientTokenId");
        let ops = ProfileOps::new(&paths, &validator);

        let creds_before = fs::read_to_string(&paths.credentials_file).unwrap();
        let err = ops.create("staging", &staging_attrs()).unwrap_err();
        match err {
            ProfileError::CreateAborted { name, source } => {
                assert_eq!(name, "staging");
                assert!(source.to_string().contains("InvalidClientTokenId"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read_to_string(&paths.credentials_file).unwrap(), creds_before);
        assert!(!paths.credentials_backup().exists());
    }

    #[test]
    fn test_create_aborted_when_backup_fails() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_fixture(&paths);
        fs::create_dir(paths.config_backup()).unwrap();
        let validator = FakeValidator::ok();
        let ops = ProfileOps::new(&paths, &validator);

        let creds_before = fs::read_to_string(&paths.credentials_file).unwrap();
        let err = ops.create("staging", &staging_attrs()).unwrap_err();
        assert!(matches!(err, ProfileError::BackupFailed { .. }));
        assert_eq!(fs::read_to_string(&paths.credentials_file).unwrap(), creds_before);
    }

    #[test]
    fn test_create_rolls_back_when_config_write_fails() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_fixture(&paths);
        // The temp file used for the atomic write cannot be created
        let mut tmp = paths.config_file.clone().into_os_string();
        tmp.push(".tmp");
        fs::create_dir(&tmp).unwrap();

        let validator = FakeValidator::ok();
        let ops = ProfileOps::new(&paths, &validator);
        let creds_before = fs::read_to_string(&paths.credentials_file).unwrap();

        let err = ops.create("staging", &staging_attrs()).unwrap_err();
        assert!(matches!(err, ProfileError::WriteFailed { ref path, .. } if *path == paths.config_file));
        assert_eq!(fs::read_to_string(&paths.credentials_file).unwrap(), creds_before);
    }

    #[test]
    fn test_create_without_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        fs::create_dir_all(paths.credentials_file.parent().unwrap()).unwrap();
        fs::write(&paths.credentials_file, "").unwrap();
        let validator = FakeValidator::ok();
        let ops = ProfileOps::new(&paths, &validator);

        ops.create("staging", &staging_attrs()).unwrap();
        assert_eq!(fs::read_to_string(paths.config_backup()).unwrap(), "");
        assert_eq!(section_names(&paths.config_file), vec!["profile staging"]);
    }

    #[test]
    fn test_switch_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_fixture(&paths);
        let validator = FakeValidator::ok();
        let ops = ProfileOps::new(&paths, &validator);

        ops.switch("personal", false).unwrap();
        let creds_first = fs::read_to_string(&paths.credentials_file).unwrap();
        let config_first = fs::read_to_string(&paths.config_file).unwrap();

        ops.switch("personal", false).unwrap();
        assert_eq!(fs::read_to_string(&paths.credentials_file).unwrap(), creds_first);
        assert_eq!(fs::read_to_string(&paths.config_file).unwrap(), config_first);
        assert_eq!(validator.calls(), 0);
    }

    #[test]
    fn test_switch_replaces_rather_than_merges() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_fixture(&paths);
        fs::write(
            &paths.credentials_file,
            "[default]\naws_access_key_id = OLD\naws_session_token = stale\n\n[work]\naws_access_key_id = AKIAWORK\naws_secret_access_key = s\n",
        )
        .unwrap();
        let validator = FakeValidator::ok();
        let ops = ProfileOps::new(&paths, &validator);

        ops.switch("work", false).unwrap();
        let registry = ProfileRegistry::load(&paths).unwrap();
        let default = registry.credentials_section("default").unwrap();
        assert!(default.session_token().is_none());
        assert_eq!(default.access_key_id(), Some("AKIAWORK"));
    }

    #[test]
    fn test_switch_with_verification() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_fixture(&paths);
        let validator = FakeValidator::ok();
        let ops = ProfileOps::new(&paths, &validator);

        let outcome = ops.switch("work", true).unwrap();
        assert!(matches!(outcome.verification, Some(Ok(_))));
        assert_eq!(validator.calls(), 1);
    }

    #[test]
    fn test_switch_unknown_profile() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_fixture(&paths);
        let validator = FakeValidator::ok();
        let ops = ProfileOps::new(&paths, &validator);

        let err = ops.switch("nope", false).unwrap_err();
        assert!(matches!(err, ProfileError::ProfileNotFound { .. }));
    }

    #[test]
    fn test_switch_partial_failure_is_retryable() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_fixture(&paths);
        let mut tmp = paths.config_file.clone().into_os_string();
        tmp.push(".tmp");
        fs::create_dir(&tmp).unwrap();

        let validator = FakeValidator::ok();
        let ops = ProfileOps::new(&paths, &validator);

        let err = ops.switch("personal", false).unwrap_err();
        assert!(matches!(err, ProfileError::PartialSwitch { .. }));
        assert!(!ProfileRegistry::load(&paths).unwrap().defaults_consistent());

        fs::remove_dir(&tmp).unwrap();
        ops.switch("personal", false).unwrap();
        let registry = ProfileRegistry::load(&paths).unwrap();
        assert!(registry.defaults_consistent());
        assert_eq!(registry.current_profile().unwrap().name, "personal");
    }

    #[test]
    fn test_delete_current_requires_confirmation() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_fixture(&paths);
        let validator = FakeValidator::ok();
        let ops = ProfileOps::new(&paths, &validator);

        ops.switch("work", false).unwrap();
        let creds_before = fs::read_to_string(&paths.credentials_file).unwrap();
        let config_before = fs::read_to_string(&paths.config_file).unwrap();

        let err = ops.delete("work", false).unwrap_err();
        assert!(matches!(err, ProfileError::ConfirmationRequired { .. }));
        assert_eq!(fs::read_to_string(&paths.credentials_file).unwrap(), creds_before);
        assert_eq!(fs::read_to_string(&paths.config_file).unwrap(), config_before);
        assert!(!paths.credentials_backup().exists());
    }

    #[test]
    fn test_delete_missing_and_reserved() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_fixture(&paths);
        let validator = FakeValidator::ok();
        let ops = ProfileOps::new(&paths, &validator);

        assert!(matches!(
            ops.delete("nope", true).unwrap_err(),
            ProfileError::ProfileNotFound { .. }
        ));
        assert!(matches!(
            ops.delete("default", true).unwrap_err(),
            ProfileError::InvalidProfileName { .. }
        ));
    }

    #[test]
    fn test_delete_config_only_profile() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_fixture(&paths);
        let mut config = fs::read_to_string(&paths.config_file).unwrap();
        config.push_str("\n[profile sso]\nsso_session = corp\n");
        fs::write(&paths.config_file, config).unwrap();

        let validator = FakeValidator::ok();
        let ops = ProfileOps::new(&paths, &validator);
        let outcome = ops.delete("sso", false).unwrap();
        assert!(!outcome.removed_from_credentials);
        assert!(outcome.removed_from_config);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        write_fixture(&paths);
        let validator = FakeValidator::ok();
        let ops = ProfileOps::new(&paths, &validator);

        assert!(ops.clear().unwrap());
        assert!(ops.current().unwrap().is_none());
        assert!(!ops.clear().unwrap());
        assert!(ops.list().unwrap().iter().any(|p| p.name == "work"));
    }

    #[test]
    fn test_missing_credentials_file() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let validator = FakeValidator::ok();
        let ops = ProfileOps::new(&paths, &validator);

        assert!(matches!(ops.list().unwrap_err(), ProfileError::FileNotFound { .. }));
    }
}
