//! crosspost - Post one submission to many social platforms

mod manifest;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use libcrosspost::logging::{LogFormat, LoggingConfig};
use libcrosspost::service::posting::PostRun;
use libcrosspost::service::validation::AccountValidation;
use libcrosspost::service::AccountLogin;
use libcrosspost::types::PostStatus;
use libcrosspost::{Account, CancellationToken, Config, CrosspostError, CrosspostService, Result};
use tracing::{error, warn};

use crate::manifest::Manifest;

/// Exit code when the run was interrupted
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "crosspost")]
#[command(version, about = "Post one submission to many social platforms")]
#[command(long_about = r#"Post one submission to many social platforms.

Accounts come from the configuration file; the submission comes from a
TOML manifest.

EXAMPLES:
    # Check every configured account
    crosspost login

    # Show problems and warnings without posting
    crosspost validate sketch.toml

    # Post to two accounts and print JSON results
    crosspost post sketch.toml --account masto,tw --format json

EXIT CODES:
    0   - Every account succeeded
    1   - At least one account failed
    2   - Authentication error
    3   - Invalid input (bad manifest, unknown account)
    130 - Cancelled with Ctrl-C
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ~/.config/crosspost/config.toml)
    #[arg(short, long, global = true, env = "CROSSPOST_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format: text, json or pretty
    #[arg(long, global = true, env = "CROSSPOST_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check login status of configured accounts
    Login {
        /// Only these accounts (comma-separated ids)
        #[arg(short, long, value_delimiter = ',')]
        account: Vec<String>,
    },

    /// Validate a submission manifest without posting
    Validate {
        manifest: PathBuf,

        #[arg(short, long, value_delimiter = ',')]
        account: Vec<String>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Post a submission manifest
    Post {
        manifest: PathBuf,

        /// Only these accounts (comma-separated ids)
        #[arg(short, long, value_delimiter = ',')]
        account: Vec<String>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = std::env::var(libcrosspost::logging::LOG_LEVEL_ENV)
        .unwrap_or_else(|_| "warn".to_string());
    LoggingConfig::new(cli.log_format, level, cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let service = CrosspostService::from_config(config)?;

    match cli.command {
        Commands::Login { account } => {
            let accounts = select_accounts(&service, &account)?;
            let logins = service.login_all(&accounts).await;
            print_logins(&logins);
            Ok(login_exit_code(&logins))
        }
        Commands::Validate {
            manifest,
            account,
            format,
        } => {
            let accounts = select_accounts(&service, &account)?;
            let submission = load_submission(&manifest)?;
            let results = service.login_and_validate(&submission, &accounts).await;
            print_validation(&results, format)?;
            Ok(if results.iter().all(AccountValidation::is_valid) {
                0
            } else {
                1
            })
        }
        Commands::Post {
            manifest,
            account,
            format,
        } => {
            let accounts = select_accounts(&service, &account)?;
            let submission = Arc::new(load_submission(&manifest)?);

            let token = CancellationToken::new();
            let interrupt = {
                let token = token.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("Interrupted; cancelling remaining posts");
                        token.cancel();
                    }
                })
            };

            let run = service.login_and_post(submission, &accounts, token).await;
            interrupt.abort();

            print_run(&run, format)?;
            Ok(post_exit_code(&run))
        }
    }
}

fn load_submission(path: &Path) -> Result<libcrosspost::Submission> {
    let manifest = Manifest::load(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    manifest.into_submission(base_dir)
}

/// Configured accounts, narrowed to `ids` when any are given
fn select_accounts(service: &CrosspostService, ids: &[String]) -> Result<Vec<Account>> {
    let accounts = service.config().accounts()?;
    if accounts.is_empty() {
        return Err(CrosspostError::InvalidInput(
            "No accounts configured".to_string(),
        ));
    }
    filter_accounts(accounts, ids)
}

fn filter_accounts(accounts: Vec<Account>, ids: &[String]) -> Result<Vec<Account>> {
    if ids.is_empty() {
        return Ok(accounts);
    }
    ids.iter()
        .map(|id| {
            accounts
                .iter()
                .find(|a| &a.id == id || a.alias.as_deref() == Some(id.as_str()))
                .cloned()
                .ok_or_else(|| CrosspostError::InvalidInput(format!("Unknown account '{}'", id)))
        })
        .collect()
}

fn post_exit_code(run: &PostRun) -> i32 {
    if run.any_cancelled() {
        EXIT_CANCELLED
    } else if run.all_succeeded() {
        0
    } else {
        1
    }
}

fn login_exit_code(logins: &[AccountLogin]) -> i32 {
    let all_logged_in = logins
        .iter()
        .all(|l| matches!(&l.result, Ok(login) if login.logged_in));
    if all_logged_in {
        0
    } else {
        1
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CrosspostError::InvalidInput(format!("Failed to serialize output: {}", e)))
}

fn print_logins(logins: &[AccountLogin]) {
    for login in logins {
        match &login.result {
            Ok(status) if status.logged_in => println!(
                "{} ({}): logged in as {}",
                login.account_id,
                login.platform,
                status.username.as_deref().unwrap_or("unknown")
            ),
            Ok(_) => println!("{} ({}): not logged in", login.account_id, login.platform),
            Err(e) => println!("{} ({}): error: {}", login.account_id, login.platform, e),
        }
    }
}

fn print_validation(results: &[AccountValidation], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", to_json(&results)?);
        return Ok(());
    }
    for result in results {
        let verdict = if result.is_valid() { "ok" } else { "blocked" };
        println!("{} ({}): {}", result.account_id, result.platform, verdict);
        for problem in &result.problems {
            println!("  problem: {}", problem);
        }
        for warning in &result.warnings {
            println!("  warning: {}", warning);
        }
    }
    Ok(())
}

fn print_run(run: &PostRun, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", to_json(run)?);
        return Ok(());
    }
    for result in &run.results {
        let line = match result.status {
            PostStatus::Succeeded => format!(
                "posted {}",
                result.source.as_deref().unwrap_or("(no url)")
            ),
            PostStatus::Failed => format!(
                "failed: {}",
                result.message.as_deref().unwrap_or("unknown error")
            ),
            PostStatus::Cancelled => "cancelled".to_string(),
        };
        println!("{} ({}): {}", result.account_id, result.platform, line);
        if let Some(source) = result.source.as_deref().filter(|_| !result.success()) {
            println!("  partial thread: {}", source);
        }
        for warning in &result.warnings {
            println!("  warning: {}", warning);
        }
    }
    Ok(())
}
