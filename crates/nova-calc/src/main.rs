//! Command-line host for the Nova calculator.
//!
//! ```bash
//! nova-calc 100 usd in eur
//! nova-calc --copy "1btc + 100usd"
//! echo "9am est to tokyo" | nova-calc
//! ```

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use nova_calc_core::{
    ClipboardAccess, Config, ConverterPlugin, ExecutionAction, FavoriteStore, QueryResult,
    Startup,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "nova-calc")]
#[command(about = "Unit-aware calculator: arithmetic, currencies, crypto and time zones", long_about = None)]
struct Cli {
    /// Expression to evaluate (reads lines from stdin when omitted)
    query: Vec<String>,

    /// Config file (default: ~/.config/nova/converter.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log evaluation steps to stderr
    #[arg(long, short)]
    verbose: bool,

    /// Never fetch rates; currency and crypto stay unavailable
    #[arg(long)]
    offline: bool,

    /// Copy the first result to the clipboard
    #[arg(long)]
    copy: bool,

    /// Save the first result as a favorite
    #[arg(long)]
    favorite: bool,

    /// List saved favorites and exit
    #[arg(long)]
    favorites: bool,
}

/// System clipboard through arboard, opened only when `--copy` is given
enum HostClipboard {
    System(arboard::Clipboard),
    Closed,
}

impl ClipboardAccess for HostClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), String> {
        match self {
            HostClipboard::System(clipboard) => {
                clipboard.set_text(text).map_err(|e| e.to_string())
            }
            HostClipboard::Closed => Err("clipboard is not open".to_string()),
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("nova_calc=debug,nova_calc_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into())
    };
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every query produced a result
fn run(cli: Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let mut favorites = FavoriteStore::load(config.favorites_path());

    if cli.favorites {
        for favorite in favorites.items() {
            println!("{} = {}", favorite.expression, favorite.result);
        }
        return Ok(true);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    // Rates are fetched once, below, before any query runs
    let startup = if cli.offline {
        Startup::Offline
    } else {
        Startup::OnDemand
    };
    let plugin = ConverterPlugin::init(&config, runtime.handle(), startup)
        .context("Failed to initialize converter")?;

    for (cache, outcome) in runtime.block_on(plugin.refresh_all()) {
        match outcome {
            Ok(count) => info!(cache = %cache, rates = count, "rates loaded"),
            Err(e) => warn!(cache = %cache, error = %e, "rates unavailable"),
        }
    }

    let queries = if cli.query.is_empty() {
        io::stdin()
            .lock()
            .lines()
            .collect::<io::Result<Vec<_>>>()
            .context("Failed to read stdin")?
    } else {
        vec![cli.query.join(" ")]
    };

    let mut all_answered = true;
    let mut first: Option<QueryResult> = None;
    for query in queries.iter().filter(|q| !q.trim().is_empty()) {
        let results = plugin.query(query);
        if results.is_empty() {
            if let Err(e) = plugin.evaluate(query) {
                eprintln!("{}: {}", query.trim(), e);
            }
            all_answered = false;
        }
        for result in results {
            println!("{}", result.title);
            first.get_or_insert(result);
        }
    }

    if let Some(result) = first {
        perform(&cli, &result, &mut favorites)?;
    }

    runtime.block_on(plugin.shutdown());
    debug!("shut down");
    Ok(all_answered)
}

/// Run the `--copy` / `--favorite` actions on a result
fn perform(cli: &Cli, result: &QueryResult, favorites: &mut FavoriteStore) -> Result<()> {
    let wanted = |action: &ExecutionAction| match action {
        ExecutionAction::CopyToClipboard { .. } => cli.copy,
        ExecutionAction::AddToFavorite { .. } => cli.favorite,
    };
    if !result.actions.iter().any(wanted) {
        return Ok(());
    }

    let mut clipboard = if cli.copy {
        HostClipboard::System(
            arboard::Clipboard::new().context("Failed to open the system clipboard")?,
        )
    } else {
        HostClipboard::Closed
    };
    for action in result.actions.iter().filter(|a| wanted(a)) {
        let notification = action
            .execute(&mut clipboard, favorites)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("{} failed", action.label()))?;
        eprintln!("{}", notification);
    }
    Ok(())
}
