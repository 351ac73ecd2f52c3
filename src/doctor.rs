//! Diagnostic tool for awsprof.
//!
//! This module implements the `awsprof doctor` command, which checks the
//! profile files for common issues:
//! - Presence and readability of the credentials and config files.
//! - Lines skipped by the parser.
//! - Config sections that do not name a profile.
//! - Profiles present in only one of the two files.
//! - `default` sections that disagree with each other (an interrupted switch).
//! - Availability of the AWS CLI used for identity checks.
//!
//! Nothing is modified. Each step reports pass/fail/warn.

use crate::paths::Paths;
use crate::registry::ProfileRegistry;
use crate::store::{self, FileKind, ProfileFile};
use crate::ui::{Level, Ui};
use crate::validate::AwsCliValidator;

/// Run the doctor diagnostics. Returns false if any step found a hard failure.
pub fn run_doctor(paths: &Paths, validator: &AwsCliValidator, ui: &Ui) -> bool {
    ui.section("awsprof Doctor");
    ui.newline();

    let mut healthy = true;
    let mut loaded: [Option<ProfileFile>; 2] = [None, None];

    // 1. Files
    for (slot, (kind, path)) in [
        (FileKind::Credentials, &paths.credentials_file),
        (FileKind::Config, &paths.config_file),
    ]
    .into_iter()
    .enumerate()
    {
        let title = format!("{} file", kind.label());
        healthy &= check_step(ui, &title, || {
            if !path.exists() {
                return match kind {
                    FileKind::Credentials => {
                        ui.finding(Level::Error, format!("Missing: {}", path.display()));
                        ui.finding(Level::Info, "Run 'aws configure' to set up your first profile");
                        false
                    }
                    FileKind::Config => {
                        ui.finding(
                            Level::Warn,
                            format!("Missing (treated as empty): {}", path.display()),
                        );
                        true
                    }
                };
            }

            match store::load(path, kind) {
                Ok(file) => {
                    ui.finding(
                        Level::Ok,
                        format!("{} ({} sections)", path.display(), file.sections().len()),
                    );
                    for bad in file.malformed_lines() {
                        ui.finding(
                            Level::Warn,
                            format!("Line {} skipped: {}", bad.line, bad.content),
                        );
                    }
                    if kind == FileKind::Config {
                        for name in file.section_names().filter(|n| kind.profile_name(n).is_none()) {
                            ui.finding(
                                Level::Info,
                                format!("[{}] does not name a profile and is ignored", name),
                            );
                        }
                    }
                    loaded[slot] = Some(file);
                    true
                }
                Err(e) => {
                    let cause = std::error::Error::source(&e)
                        .map(|c| format!(": {c}"))
                        .unwrap_or_default();
                    ui.finding(Level::Error, format!("{e}{cause}"));
                    false
                }
            }
        });
    }

    let [Some(credentials), config] = loaded else {
        return false;
    };
    let registry = ProfileRegistry::new(credentials, config.unwrap_or_default());

    // 2. Profiles
    healthy &= check_step(ui, "Profiles", || {
        let profiles = registry.list_profiles();
        if profiles.is_empty() {
            ui.finding(Level::Warn, "No profiles found");
            return true;
        }

        ui.println(format!("  Found {} profiles:", profiles.len()));
        for profile in &profiles {
            let missing = profile.merged().missing_credentials();
            let (level, note) = if profile.is_default() {
                (Level::Info, String::new())
            } else if profile.credentials.is_none() {
                (Level::Warn, " (config file only)".to_string())
            } else if profile.config.is_none() {
                (Level::Warn, " (credentials file only)".to_string())
            } else if !missing.is_empty() {
                (Level::Warn, format!(" (missing {})", missing.join(", ")))
            } else {
                (Level::Ok, String::new())
            };
            ui.finding_item(level, format!("{}{}", profile.name, note));
        }
        true
    });

    // 3. Default
    healthy &= check_step(ui, "Default Profile", || {
        match registry.current_profile() {
            None => ui.finding(Level::Info, "No default profile set"),
            Some(p) if p.matched => ui.finding(Level::Ok, format!("default matches '{}'", p.name)),
            Some(_) => ui.finding(Level::Warn, "default does not match any stored profile"),
        }
        if registry.defaults_consistent() {
            true
        } else {
            ui.finding(
                Level::Error,
                "[default] differs between credentials and config; re-run 'awsprof use <name>'",
            );
            false
        }
    });

    // 4. Environment
    check_step(ui, "Environment", || {
        if validator.is_available() {
            ui.finding(Level::Ok, format!("AWS CLI: {}", validator.program().display()));
        } else {
            ui.finding(Level::Warn, "AWS CLI not found (identity checks will fail)");
        }
        match std::env::var("AWS_PROFILE") {
            Ok(p) => ui.finding(
                Level::Warn,
                format!("AWS_PROFILE={} overrides [default] for AWS tools", p),
            ),
            Err(_) => ui.finding(Level::Info, "AWS_PROFILE not set"),
        }
        true
    });

    healthy
}

fn check_step<F>(ui: &Ui, name: &str, check_fn: F) -> bool
where
    F: FnOnce() -> bool,
{
    ui.println(ui.bold(format!("Checking {}...", name)));
    let success = check_fn();
    if !success {
        ui.println(ui.tint("  Issues detected!", Level::Error));
    }
    ui.newline();
    success
}
