use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use awsprof::{
    commands::{self, NewProfile},
    paths::Paths,
    ui::{ColorMode, Ui},
    validate::AwsCliValidator,
};

#[derive(Parser)]
#[command(name = "awsprof")]
#[command(about = "AWS Profile Switcher - list, switch, create and delete AWS profiles")]
#[command(version)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// When to use colors: always, auto, never
    #[arg(long, global = true, value_enum, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,

    /// Show debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Credentials file [default: $AWS_SHARED_CREDENTIALS_FILE or ~/.aws/credentials]
    #[arg(long, global = true, value_name = "PATH")]
    credentials_file: Option<PathBuf>,

    /// Config file [default: $AWS_CONFIG_FILE or ~/.aws/config]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<PathBuf>,

    /// AWS CLI used for identity checks [default: `aws` on PATH]
    #[arg(long, global = true, value_name = "PATH", env = "AWSPROF_AWS_CLI")]
    aws_cli: Option<PathBuf>,

    /// Seconds to wait for an identity check
    #[arg(long, global = true, value_name = "SECS", default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all available profiles
    #[command(alias = "ls")]
    List {
        /// Check each profile's credentials against AWS
        #[arg(long)]
        check: bool,
    },

    /// Show which profile [default] currently holds
    Current,

    /// Switch to a profile (copy it into [default])
    #[command(alias = "switch")]
    Use {
        /// Name of the profile to activate
        name: String,

        /// Skip the identity check after switching
        #[arg(long)]
        no_verify: bool,
    },

    /// Add a new profile (prompts for values not given)
    #[command(alias = "create")]
    Add {
        /// Name of the profile to create
        name: String,

        #[arg(long, value_name = "KEY")]
        access_key_id: Option<String>,

        #[arg(long, value_name = "SECRET")]
        secret_access_key: Option<String>,

        #[arg(long, value_name = "TOKEN")]
        session_token: Option<String>,

        #[arg(long)]
        region: Option<String>,

        /// Output format: json, text, table, yaml
        #[arg(long)]
        output: Option<String>,
    },

    /// Remove a profile from both files
    #[command(alias = "rm", alias = "delete")]
    Remove {
        /// Name of the profile to remove
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Remove the [default] section from both files
    Clear,

    /// Check a profile's credentials against AWS
    Check {
        /// Name of the profile to check
        name: String,
    },

    /// Run diagnostics on the profile files
    Doctor,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("AWSPROF_LOG")
                .unwrap_or_else(|_| format!("awsprof={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ui = Ui::new(cli.color, cli.no_color);
    match run(cli, &ui) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui.report(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, ui: &Ui) -> Result<()> {
    let paths = Paths::new()?.with_overrides(cli.credentials_file, cli.config_file);
    let validator = AwsCliValidator::locate(cli.aws_cli, Duration::from_secs(cli.timeout));
    tracing::debug!(
        credentials = %paths.credentials_file.display(),
        config = %paths.config_file.display(),
        "resolved profile files"
    );

    match cli.command {
        Commands::List { check } => commands::list(&paths, &validator, check, ui),
        Commands::Current => commands::current(&paths, &validator, ui),
        Commands::Use { name, no_verify } => {
            commands::use_profile(&paths, &validator, &name, !no_verify, ui)
        }
        Commands::Add {
            name,
            access_key_id,
            secret_access_key,
            session_token,
            region,
            output,
        } => {
            let new = NewProfile {
                access_key_id,
                secret_access_key,
                session_token,
                region,
                output,
            };
            commands::add(&paths, &validator, &name, new, ui)
        }
        Commands::Remove { name, force } => commands::remove(&paths, &validator, &name, force, ui),
        Commands::Clear => commands::clear(&paths, &validator, ui),
        Commands::Check { name } => commands::check(&paths, &validator, &name, ui),
        Commands::Doctor => commands::doctor(&paths, &validator, ui),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "awsprof", &mut std::io::stdout());
            Ok(())
        }
    }
}
