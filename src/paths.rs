use anyhow::{Context, Result};
use directories::BaseDirs;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable the AWS tooling reads for the credentials file location
pub const CREDENTIALS_FILE_ENV: &str = "AWS_SHARED_CREDENTIALS_FILE";
/// Environment variable the AWS tooling reads for the config file location
pub const CONFIG_FILE_ENV: &str = "AWS_CONFIG_FILE";

const BACKUP_SUFFIX: &str = ".backup";

/// Locations of the two profile files
#[derive(Debug, Clone)]
pub struct Paths {
    /// ~/.aws/credentials
    pub credentials_file: PathBuf,
    /// ~/.aws/config
    pub config_file: PathBuf,
}

impl Paths {
    /// Resolve the default locations, honoring the AWS environment overrides.
    pub fn new() -> Result<Self> {
        let base_dirs = BaseDirs::new().context("Failed to determine home directory")?;
        let aws_dir = base_dirs.home_dir().join(".aws");

        let credentials_file = env_path(CREDENTIALS_FILE_ENV)
            .unwrap_or_else(|| aws_dir.join("credentials"));
        let config_file = env_path(CONFIG_FILE_ENV).unwrap_or_else(|| aws_dir.join("config"));

        Ok(Self {
            credentials_file,
            config_file,
        })
    }

    /// Apply explicit overrides (from CLI flags) on top of the resolved defaults
    pub fn with_overrides(mut self, credentials: Option<PathBuf>, config: Option<PathBuf>) -> Self {
        if let Some(path) = credentials {
            self.credentials_file = path;
        }
        if let Some(path) = config {
            self.config_file = path;
        }
        self
    }

    pub fn credentials_backup(&self) -> PathBuf {
        backup_path(&self.credentials_file)
    }

    pub fn config_backup(&self) -> PathBuf {
        backup_path(&self.config_file)
    }
}

/// Sibling path used for the most recent backup of `path`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(BACKUP_SUFFIX);
    path.with_file_name(name)
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_backup_path_appends_suffix() {
        let path = Path::new("/home/user/.aws/credentials");
        assert_eq!(
            backup_path(path),
            PathBuf::from("/home/user/.aws/credentials.backup")
        );
    }

    #[test]
    #[serial]
    fn test_default_paths() {
        // SAFETY: serialized with every other env-mutating test
        unsafe {
            std::env::remove_var(CREDENTIALS_FILE_ENV);
            std::env::remove_var(CONFIG_FILE_ENV);
        }
        let paths = Paths::new().unwrap();
        assert!(paths.credentials_file.ends_with(".aws/credentials"));
        assert!(paths.config_file.ends_with(".aws/config"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        unsafe {
            std::env::set_var(CREDENTIALS_FILE_ENV, "/tmp/creds");
            std::env::set_var(CONFIG_FILE_ENV, "/tmp/cfg");
        }
        let paths = Paths::new().unwrap();
        unsafe {
            std::env::remove_var(CREDENTIALS_FILE_ENV);
            std::env::remove_var(CONFIG_FILE_ENV);
        }
        assert_eq!(paths.credentials_file, PathBuf::from("/tmp/creds"));
        assert_eq!(paths.config_file, PathBuf::from("/tmp/cfg"));
        assert_eq!(paths.config_backup(), PathBuf::from("/tmp/cfg.backup"));
    }

    #[test]
    #[serial]
    fn test_flag_overrides_win() {
        unsafe {
            std::env::set_var(CREDENTIALS_FILE_ENV, "/tmp/creds");
        }
        let paths = Paths::new()
            .unwrap()
            .with_overrides(Some(PathBuf::from("/opt/creds")), None);
        unsafe {
            std::env::remove_var(CREDENTIALS_FILE_ENV);
        }
        assert_eq!(paths.credentials_file, PathBuf::from("/opt/creds"));
    }
}
