use anyhow::{bail, Context, Result};
use checkin_core::config::{ConfigLoader, ACCOUNTS_ENV};
use checkin_core::redact::mask_middle;
use checkin_core::{CheckinConfig, HttpClient, RunLog, RunOutcome, Runner, SessionStore, TokenOptions};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(
    name = "checkin",
    author,
    version,
    about = "Session refresh and daily check-in runs for configured accounts"
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, default_value = "config.yaml", help = "Path to the YAML configuration file")]
    config: String,

    #[clap(long, short, help = "Log level; overrides logging.level from the configuration")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log every account in and store the session cookies
    Login,
    /// Check every account in, reusing stored sessions where possible
    Run,
    /// List API tokens for every stored session and write the token report
    Tokens {
        #[clap(long, help = "Create a token for accounts that have none")]
        create_missing: bool,

        #[clap(long, help = "Write full keys instead of masked ones")]
        reveal_keys: bool,
    },
    /// Manage the configured account list
    Accounts {
        #[clap(subcommand)]
        action: AccountCommands,
    },
    /// Summarise the session store
    Sessions,
}

#[derive(Subcommand, Debug)]
enum AccountCommands {
    /// Merge the accounts in CHECKIN_ACCOUNTS into the configuration file
    MergeEnv,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::from_file(&cli.config)
        .await
        .with_context(|| format!("Could not load configuration from {}", cli.config))?;

    let level = cli.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    let run_log = RunLog::open(&config.logging.dir, &level)?;
    log::info!("Loaded configuration from {} ({} account(s))", cli.config, config.accounts.len());

    let result = dispatch(cli, config).await;
    if let Err(e) = &result {
        log::error!("{:#}", e);
    }
    run_log.close();
    result
}

async fn dispatch(cli: Cli, config: CheckinConfig) -> Result<()> {
    match cli.command {
        Commands::Login => {
            let outcome = runner(config)?.login().await?;
            print_outcome("Login", &outcome);
        }
        Commands::Run => {
            let outcome = runner(config)?.check_in().await?;
            print_outcome("Check-in", &outcome);
        }
        Commands::Tokens {
            create_missing,
            reveal_keys,
        } => {
            let token_report = config.paths.token_report.clone();
            let outcome = runner(config)?
                .tokens(TokenOptions {
                    create_missing,
                    reveal_keys,
                })
                .await?;
            print_outcome("Tokens", &outcome);
            println!("Token report: {}", token_report.display());
        }
        Commands::Accounts {
            action: AccountCommands::MergeEnv,
        } => {
            if std::env::var(ACCOUNTS_ENV).map(|v| v.trim().is_empty()).unwrap_or(true) {
                bail!("{} is not set", ACCOUNTS_ENV);
            }
            let summary = ConfigLoader::merge_env_into_file(&cli.config).await?;
            println!(
                "Merged {}: {} added, {} updated, {} ignored",
                ACCOUNTS_ENV, summary.added, summary.updated, summary.ignored
            );
        }
        Commands::Sessions => show_sessions(&config)?,
    }
    Ok(())
}

fn runner(config: CheckinConfig) -> Result<Runner> {
    let client = HttpClient::new(&config.service)?;
    Ok(Runner::new(config, Arc::new(client)))
}

fn print_outcome(title: &str, outcome: &RunOutcome) {
    println!("{} finished. {}", title, outcome.summary.line());
    println!("Report: {}", outcome.report_path.display());
}

fn show_sessions(config: &CheckinConfig) -> Result<()> {
    let path = &config.paths.sessions;
    if !path.exists() {
        bail!("Session store {} does not exist; run `checkin login` first", path.display());
    }
    let store = SessionStore::load(path)?;
    println!("{} session(s) in {}", store.len(), path.display());
    for session in store.sessions() {
        let user_id = session
            .user_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<24} user {:<8} since {}  {}",
            session.identifier,
            user_id,
            session.acquired_at.format("%Y-%m-%d %H:%M:%S"),
            mask_middle(&session.session_token)
        );
    }

    let missing: Vec<&str> = config
        .accounts
        .iter()
        .filter(|a| store.get(&a.identifier).is_none())
        .map(|a| a.identifier.as_str())
        .collect();
    if !missing.is_empty() {
        println!("{} configured account(s) without a session: {}", missing.len(), missing.join(", "));
    }
    Ok(())
}
