//! Test utilities shared across test modules
//!
//! Builds isolated profile files inside a temp dir and provides a validator
//! that never leaves the process.

use std::cell::Cell;
use std::fs;

use tempfile::TempDir;

use crate::attributes::AttributeSet;
use crate::error::{ProfileError, Result};
use crate::paths::Paths;
use crate::validate::{CredentialValidator, Identity};

/// `default` mirrors `work` in both files.
pub const FIXTURE_CREDENTIALS: &str = "\
[default]
aws_access_key_id = AKIA987654321
aws_secret_access_key = secret456

[work]
aws_access_key_id = AKIA987654321
aws_secret_access_key = secret456

[personal]
aws_access_key_id = AKIA555666777
aws_secret_access_key = secret789
";

pub const FIXTURE_CONFIG: &str = "\
[default]
region = us-west-2
output = json

[profile work]
region = us-west-2
output = json

[profile personal]
region = eu-west-1
output = json
";

/// Create a Paths struct for testing using a temporary directory
///
/// Mimics the real ~/.aws/ layout inside the temp dir.
pub fn setup_test_paths(temp_dir: &TempDir) -> Paths {
    let aws_dir = temp_dir.path().join(".aws");
    Paths {
        credentials_file: aws_dir.join("credentials"),
        config_file: aws_dir.join("config"),
    }
}

/// Write the fixture credentials and config files
pub fn write_fixture(paths: &Paths) {
    if let Some(parent) = paths.credentials_file.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&paths.credentials_file, FIXTURE_CREDENTIALS).unwrap();
    fs::write(&paths.config_file, FIXTURE_CONFIG).unwrap();
}

/// Validator returning a canned answer and counting calls
pub struct FakeValidator {
    failure: Option<String>,
    calls: Cell<usize>,
}

impl FakeValidator {
    pub fn ok() -> Self {
        Self {
            failure: None,
            calls: Cell::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl CredentialValidator for FakeValidator {
    fn validate(&self, profile: &str, attrs: &AttributeSet) -> Result<Identity> {
        self.calls.set(self.calls.get() + 1);
        if let Some(reason) = &self.failure {
            return Err(ProfileError::ValidationFailed {
                name: profile.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(Identity {
            account_id: "123456789012".to_string(),
            arn: format!(
                "arn:aws:iam::123456789012:user/{}",
                attrs.access_key_id().unwrap_or(profile)
            ),
            user_id: None,
        })
    }
}
