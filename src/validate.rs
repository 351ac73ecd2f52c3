//! Credential validation against the identity provider.
//!
//! The check is the provider's "who am I" call: given a key pair it returns
//! the account and principal the keys belong to. [`CredentialValidator`] is
//! the seam; [`AwsCliValidator`] runs `aws sts get-caller-identity` with the
//! profile's attributes passed through the environment.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::attributes::AttributeSet;
use crate::error::{ProfileError, Result};

/// Default bound on a single identity call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// stderr fragments the AWS CLI prints for network trouble rather than
/// rejected credentials
const TRANSIENT_MARKERS: &[&str] = &[
    "Could not connect to the endpoint URL",
    "Connection was closed",
    "Connect timeout on endpoint",
    "Read timeout on endpoint",
    "EndpointConnectionError",
    "Temporary failure in name resolution",
];

/// Who a set of credentials belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub account_id: String,
    /// Principal ARN
    pub arn: String,
    pub user_id: Option<String>,
}

impl Identity {
    /// Short principal name: the last `/` segment of the ARN, else the last `:` segment
    pub fn username(&self) -> &str {
        if let Some((_, tail)) = self.arn.rsplit_once('/') {
            tail
        } else if let Some((_, tail)) = self.arn.rsplit_once(':') {
            tail
        } else {
            &self.arn
        }
    }
}

pub trait CredentialValidator {
    /// Confirm `attrs` are accepted by the identity provider. Read-only.
    fn validate(&self, profile: &str, attrs: &AttributeSet) -> Result<Identity>;
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    account: String,
    arn: String,
    user_id: Option<String>,
}

enum Attempt {
    Done(Result<Identity>),
    Transient(String),
}

/// Runs the AWS CLI's `sts get-caller-identity`
#[derive(Debug, Clone)]
pub struct AwsCliValidator {
    program: PathBuf,
    timeout: Duration,
}

impl AwsCliValidator {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Use `program` if given, else the first `aws` on `PATH`
    pub fn locate(program: Option<PathBuf>, timeout: Duration) -> Self {
        let program = program
            .or_else(|| which::which("aws").ok())
            .unwrap_or_else(|| PathBuf::from("aws"));
        Self::new(program, timeout)
    }

    /// Whether the configured program can be found
    pub fn is_available(&self) -> bool {
        self.program.is_file() || which::which(&self.program).is_ok()
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    fn command(&self, attrs: &AttributeSet) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["sts", "get-caller-identity", "--output", "json"])
            .env_remove("AWS_PROFILE")
            .env_remove("AWS_DEFAULT_PROFILE")
            .env("AWS_ACCESS_KEY_ID", attrs.access_key_id().unwrap_or_default())
            .env(
                "AWS_SECRET_ACCESS_KEY",
                attrs.secret_access_key().unwrap_or_default(),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match attrs.session_token() {
            Some(token) => cmd.env("AWS_SESSION_TOKEN", token),
            None => cmd.env_remove("AWS_SESSION_TOKEN"),
        };
        if let Some(region) = attrs.region() {
            cmd.env("AWS_REGION", region).env("AWS_DEFAULT_REGION", region);
        }
        cmd
    }

    fn attempt(&self, profile: &str, attrs: &AttributeSet) -> Attempt {
        let failed = |reason: String| ProfileError::ValidationFailed {
            name: profile.to_string(),
            reason,
        };

        let mut child = match self.command(attrs).spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Attempt::Done(Err(failed(format!(
                    "AWS CLI not found at '{}' - please install it",
                    self.program.display()
                ))));
            }
            Err(e) => {
                return Attempt::Done(Err(failed(format!("failed to run AWS CLI: {e}"))));
            }
        };

        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = match wait_with_deadline(&mut child, self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Attempt::Done(Err(ProfileError::Timeout {
                    name: profile.to_string(),
                    timeout: self.timeout,
                }));
            }
            Err(e) => return Attempt::Done(Err(failed(format!("failed to wait for AWS CLI: {e}")))),
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            let reason = stderr.trim();
            if TRANSIENT_MARKERS.iter().any(|m| reason.contains(m)) {
                return Attempt::Transient(reason.to_string());
            }
            let reason = if reason.is_empty() {
                format!("AWS CLI exited with {status}")
            } else {
                reason.to_string()
            };
            return Attempt::Done(Err(failed(reason)));
        }

        let parsed = serde_json::from_str::<CallerIdentity>(&stdout)
            .map(|id| Identity {
                account_id: id.account,
                arn: id.arn,
                user_id: id.user_id,
            })
            .map_err(|e| failed(format!("Invalid JSON response from AWS: {e}")));
        Attempt::Done(parsed)
    }
}

impl CredentialValidator for AwsCliValidator {
    fn validate(&self, profile: &str, attrs: &AttributeSet) -> Result<Identity> {
        let missing = attrs.missing_credentials();
        if !missing.is_empty() {
            return Err(ProfileError::MissingCredentials {
                name: profile.to_string(),
                missing,
            });
        }

        debug!(profile, program = %self.program.display(), "checking caller identity");
        match self.attempt(profile, attrs) {
            Attempt::Done(result) => result,
            Attempt::Transient(reason) => {
                warn!(profile, %reason, "transient failure, retrying identity check once");
                match self.attempt(profile, attrs) {
                    Attempt::Done(result) => result,
                    Attempt::Transient(reason) => Err(ProfileError::ValidationFailed {
                        name: profile.to_string(),
                        reason,
                    }),
                }
            }
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

/// Wait for `child` to exit, giving up after `timeout`
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
