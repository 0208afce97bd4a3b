mod config;
mod show;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory as _, Parser, Subcommand};
use config::Config;
use splitwise_ynab::Direction;
use splitwise_ynab::splitwise::SplitwiseClient;
use splitwise_ynab::state::StateStore;
use splitwise_ynab::sync::{SyncEngine, resolve_settings};
use splitwise_ynab::ynab::YnabClient;

#[derive(Parser)]
#[command(
    name = "splitwise-ynab",
    about = "Keeps a YNAB budget and a Splitwise group in sync"
)]
#[command(disable_help_subcommand = true)]
struct Args {
    /// Config file (default: splitwise-ynab.toml or .splitwise-ynab.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the sync state files
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Export flagged YNAB transactions, then import Splitwise expenses (default)
    Sync,
    /// Only import Splitwise expenses into YNAB
    ToYnab,
    /// Only export flagged YNAB transactions to Splitwise
    ToSplitwise,
    /// Show the saved sync progress without contacting either service
    Status,
}

impl Commands {
    fn directions(self) -> &'static [Direction] {
        match self {
            Commands::Sync => &Direction::ALL,
            Commands::ToYnab => &[Direction::SplitwiseToYnab],
            Commands::ToSplitwise => &[Direction::YnabToSplitwise],
            Commands::Status => &[],
        }
    }
}

pub fn run(args: impl IntoIterator<Item = String>) -> Result<ExitCode> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "splitwise_ynab=info,splitwise_ynab_cli=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    clap_complete::CompleteEnv::with_factory(Args::command).complete();

    let args = Args::parse_from(args);
    let command = args.command.unwrap_or(Commands::Sync);

    let config = Config::load(args.config.as_deref(), |key| std::env::var(key).ok())?;
    let mut state = config.state()?;
    if let Some(dir) = args.state_dir {
        state.dir = dir;
    }
    let timezone = state.timezone;
    let store = StateStore::new(state.dir, timezone);

    if command == Commands::Status {
        show::show_status(&store);
        return Ok(ExitCode::SUCCESS);
    }

    let sync = config.sync()?;
    let splitwise = SplitwiseClient::new(&sync.splitwise, timezone)?;
    let ynab = YnabClient::new(&sync.ynab_access_token)?;
    let settings = resolve_settings(&splitwise, &ynab, sync.names(), sync.flag_color)
        .context("Failed to resolve configured names")?;
    tracing::info!(
        "Syncing budget '{}' account '{}' with group '{}'",
        sync.budget_name,
        sync.account_name,
        sync.group_name
    );

    let engine = SyncEngine::new(splitwise, ynab, store, settings);
    let report = engine.run_directions(command.directions(), engine.now());
    show::show_report(&report);

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
