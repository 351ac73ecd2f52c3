//! High-level command orchestration for the CLI.
//!
//! This module contains the handler functions for each CLI command (`list`,
//! `use`, `add`, `remove`, ...). It is the coordination layer between:
//! - `crate::ui` for output and prompts.
//! - `crate::ops` for the profile operations themselves.
//! - `crate::validate` for identity checks.
//!
//! Each function here generally corresponds to a subcommand in `main.rs`.

use anyhow::{Context, Result, bail};
use comfy_table::Cell;
use inquire::{Confirm, Password, PasswordDisplayMode, Text};

use crate::attributes::{
    ACCESS_KEY_ID, AttributeSet, OUTPUT, REGION, SECRET_ACCESS_KEY, SESSION_TOKEN,
};
use crate::doctor::run_doctor;
use crate::error::ProfileError;
use crate::ops::ProfileOps;
use crate::paths::Paths;
use crate::ui::{Level, Ui};
use crate::validate::{AwsCliValidator, CredentialValidator, Identity};

/// Attribute values supplied on the command line for `add`
#[derive(Debug, Default, Clone)]
pub struct NewProfile {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub region: Option<String>,
    pub output: Option<String>,
}

/// List all available profiles, optionally checking each one's identity
pub fn list<V: CredentialValidator>(
    paths: &Paths,
    validator: &V,
    check: bool,
    ui: &Ui,
) -> Result<()> {
    let ops = ProfileOps::new(paths, validator);
    let profiles = ops.list()?;

    if profiles.is_empty() {
        ui.status(Level::Warn, "No profiles found.");
        ui.newline();
        ui.println("Create one with:");
        ui.println(format!("  {} add <name>", ui.bold("awsprof")));
        return Ok(());
    }

    let current = ops.current()?.filter(|p| p.matched).map(|p| p.name);

    let mut headers = vec!["", "Profile", "Region", "Files"];
    if check {
        headers.extend(["Account", "User / Status"]);
    }
    let mut table = ui.table(&headers);

    for profile in &profiles {
        let is_active = current.as_deref() == Some(profile.name.as_str());
        let merged = profile.merged();

        let mut row = vec![
            if is_active { Cell::new(ui.mark(Level::Ok)) } else { Cell::new("") },
            ui.profile_cell(&profile.name, is_active),
            Cell::new(merged.region().unwrap_or("-")),
            ui.presence_cell(profile.credentials.is_some(), profile.config.is_some()),
        ];

        if check {
            let progress = ui.progress(format!("Checking '{}'...", profile.name));
            let result = validator.validate(&profile.name, &merged);
            progress.clear();
            match result {
                Ok(identity) => {
                    row.push(Cell::new(&identity.account_id));
                    row.push(Cell::new(identity.username()));
                }
                Err(e) => {
                    row.push(ui.level_cell(failure_label(&e), Level::Error));
                    row.push(Cell::new(failure_reason(&e)));
                }
            }
        }
        table.add_row(row);
    }

    ui.section(format!("Profiles ({} total)", profiles.len()));
    ui.println(table.to_string());

    Ok(())
}

fn failure_label(err: &ProfileError) -> &'static str {
    match err {
        ProfileError::Timeout { .. } => "Timeout",
        ProfileError::MissingCredentials { .. } => "Incomplete",
        _ => "Invalid",
    }
}

fn failure_reason(err: &ProfileError) -> String {
    match err {
        ProfileError::ValidationFailed { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

/// Mask all but the first and last four characters of a key
fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

/// Show which profile `default` currently holds
pub fn current<V: CredentialValidator>(paths: &Paths, validator: &V, ui: &Ui) -> Result<()> {
    let ops = ProfileOps::new(paths, validator);

    ui.section("Current Profile");
    ui.newline();

    let mut table = ui.table(&[]);
    match ops.current()? {
        None => {
            table.add_row(vec!["Default profile:", "(none)"]);
        }
        Some(profile) => {
            let merged = profile.merged();
            let name = if profile.matched {
                ui.profile_cell(&profile.name, true)
            } else {
                ui.level_cell("(unmatched: edited by hand?)", Level::Warn)
            };
            table.add_row(vec![Cell::new("Default profile:"), name]);
            if let Some(key) = merged.access_key_id() {
                table.add_row(vec!["Access key:".to_string(), mask(key)]);
            }
            table.add_row(vec!["Region:", merged.region().unwrap_or("(not set)")]);
            if let Some(output) = merged.output() {
                table.add_row(vec!["Output:", output]);
            }
        }
    }

    if let Ok(env_profile) = std::env::var("AWS_PROFILE") {
        table.add_row(vec![
            Cell::new("AWS_PROFILE:"),
            ui.level_cell(
                format!("{} (overrides default for AWS tools)", env_profile),
                Level::Warn,
            ),
        ]);
    }

    ui.println(table.to_string());
    Ok(())
}

/// Switch to a profile by copying it into `default`
pub fn use_profile<V: CredentialValidator>(
    paths: &Paths,
    validator: &V,
    name: &str,
    verify: bool,
    ui: &Ui,
) -> Result<()> {
    let ops = ProfileOps::new(paths, validator);
    let progress = ui.progress(format!("Switching to profile '{}'...", name));

    let outcome = match ops.switch(name, verify) {
        Ok(outcome) => outcome,
        Err(e) => {
            progress.fail(format!("Failed to switch to '{}'", name));
            return Err(with_hint(e));
        }
    };
    progress.succeed(format!("Active profile: {}", name));

    match outcome.verification {
        None => {}
        Some(Ok(identity)) => print_identity(&identity, ui),
        Some(Err(e)) => ui.status(
            Level::Warn,
            format!("Switched, but the identity check failed: {}", e),
        ),
    }
    Ok(())
}

fn print_identity(identity: &Identity, ui: &Ui) {
    ui.println(format!("   Account: {}", identity.account_id));
    ui.println(format!("   User:    {}", identity.username()));
}

/// Attach a hint to errors the user can act on
fn with_hint(err: ProfileError) -> anyhow::Error {
    let name = err.profile().unwrap_or("<name>");
    let hint = match &err {
        ProfileError::ProfileNotFound { .. } => {
            Some("Hint: Use 'awsprof list' to see available profiles.".to_string())
        }
        ProfileError::FileNotFound { .. } => {
            Some("Hint: Run 'aws configure' to set up your first profile.".to_string())
        }
        ProfileError::PartialSwitch { .. } => Some(format!(
            "Hint: Run 'awsprof use {name}' again, or 'awsprof doctor' to inspect both files."
        )),
        ProfileError::ConfirmationRequired { .. } => Some(format!(
            "Hint: Pass --force, or switch away from '{name}' first."
        )),
        ProfileError::MissingCredentials { .. } => Some(format!(
            "Hint: Add the missing keys to [{name}] in the credentials file."
        )),
        _ => None,
    };
    match hint {
        Some(hint) => anyhow::Error::new(err).context(hint),
        None => anyhow::Error::new(err),
    }
}

/// Gather attributes for a new profile, prompting for any that were not given
fn gather_attributes(new: NewProfile) -> Result<AttributeSet> {
    let access_key_id = match new.access_key_id {
        Some(v) => v,
        None => Text::new("AWS Access Key ID:")
            .prompt()
            .context("Input cancelled")?,
    };
    let secret_access_key = match new.secret_access_key {
        Some(v) => v,
        None => Password::new("AWS Secret Access Key:")
            .with_display_mode(PasswordDisplayMode::Masked)
            .without_confirmation()
            .prompt()
            .context("Input cancelled")?,
    };
    let region = match new.region {
        Some(v) => Some(v),
        None => Some(
            Text::new("Default region name:")
                .with_default("us-east-1")
                .prompt()
                .context("Input cancelled")?,
        ),
    };

    let mut attrs = AttributeSet::new();
    attrs.insert(ACCESS_KEY_ID, access_key_id.trim());
    attrs.insert(SECRET_ACCESS_KEY, secret_access_key.trim());
    if let Some(token) = new.session_token.filter(|t| !t.trim().is_empty()) {
        attrs.insert(SESSION_TOKEN, token.trim());
    }
    if let Some(region) = region.filter(|r| !r.trim().is_empty()) {
        attrs.insert(REGION, region.trim());
    }
    if let Some(output) = new.output.filter(|o| !o.trim().is_empty()) {
        attrs.insert(OUTPUT, output.trim());
    }
    Ok(attrs)
}

/// Add a new profile after checking its credentials
pub fn add<V: CredentialValidator>(
    paths: &Paths,
    validator: &V,
    name: &str,
    new: NewProfile,
    ui: &Ui,
) -> Result<()> {
    crate::ops::validate_profile_name(name)?;
    let attrs = gather_attributes(new)?;

    let ops = ProfileOps::new(paths, validator);
    let progress = ui.progress(format!("Validating credentials for '{}'...", name));
    let outcome = match ops.create(name, &attrs) {
        Ok(outcome) => outcome,
        Err(e) => {
            progress.fail(format!("Profile '{}' not created", name));
            return Err(with_hint(e));
        }
    };
    progress.succeed(format!("Created profile '{}'", name));
    print_identity(&outcome.identity, ui);
    ui.newline();
    for backup in &outcome.backups {
        ui.backup_note(backup);
    }
    ui.newline();
    ui.println("To activate it:");
    ui.println(format!("  awsprof use {}", name));

    Ok(())
}

/// Remove a profile from both files
pub fn remove<V: CredentialValidator>(
    paths: &Paths,
    validator: &V,
    name: &str,
    force: bool,
    ui: &Ui,
) -> Result<()> {
    let ops = ProfileOps::new(paths, validator);

    let is_current = ops
        .current()?
        .is_some_and(|p| p.matched && p.name == name);

    let confirmed = if force {
        true
    } else {
        let help = if is_current {
            "This is the active default profile; [default] keeps its values until the next switch"
        } else {
            "The profile is removed from both files (backups are kept)"
        };
        let confirm = Confirm::new(&format!("Are you sure you want to remove profile '{}'?", name))
            .with_default(false)
            .with_help_message(help)
            .prompt()
            .context("Confirmation cancelled")?;

        if !confirm {
            ui.status(Level::Warn, "Removal cancelled.");
            return Ok(());
        }
        true
    };

    let outcome = ops.delete(name, confirmed).map_err(with_hint)?;
    ui.status(Level::Ok, format!("Removed profile '{}'", name));
    for backup in &outcome.backups {
        ui.backup_note(backup);
    }
    if is_current {
        ui.status(
            Level::Info,
            "[default] still holds this profile's values. Run 'awsprof clear' to remove them.",
        );
    }
    Ok(())
}

/// Remove the `default` section from both files
pub fn clear<V: CredentialValidator>(paths: &Paths, validator: &V, ui: &Ui) -> Result<()> {
    let ops = ProfileOps::new(paths, validator);
    if ops.clear().map_err(with_hint)? {
        ui.status(Level::Ok, "Cleared the default profile");
    } else {
        ui.status(Level::Info, "No default profile to clear");
    }
    Ok(())
}

/// Check a stored profile's credentials
pub fn check<V: CredentialValidator>(
    paths: &Paths,
    validator: &V,
    name: &str,
    ui: &Ui,
) -> Result<()> {
    let ops = ProfileOps::new(paths, validator);
    let progress = ui.progress(format!("Testing profile '{}'...", name));
    match ops.check(name) {
        Ok(identity) => {
            progress.succeed(format!("Profile '{}' is valid", name));
            print_identity(&identity, ui);
            Ok(())
        }
        Err(e) => {
            progress.fail(format!("Profile '{}' validation failed", name));
            Err(with_hint(e))
        }
    }
}

/// Run diagnostics
pub fn doctor(paths: &Paths, validator: &AwsCliValidator, ui: &Ui) -> Result<()> {
    if !run_doctor(paths, validator, ui) {
        bail!("Doctor found problems with the profile files");
    }
    Ok(())
}
