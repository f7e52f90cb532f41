//! altbot - Twitter accessibility bot CLI
//!
//! Main entry point: parses the use-case flags, wires the store and the API
//! transport together, and notifies the maintainer if a run dies.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use std::time::Instant;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use altbot::api::{OfflineApi, SocialApi};
use altbot::dispatch::Dispatcher;
use altbot::{AltBot, Cli, Config, Store};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_target(false)
        .without_time()
        .init();

    if !cli.has_work() {
        println!(
            "{}",
            "Nothing to do: pass at least one use-case flag (see --help).".yellow()
        );
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.paths.db = Some(db.clone());
    }

    let db_path = config.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create data directory {}", parent.display()))?;
    }
    let store = Store::open(&db_path)?;
    info!("Using database at {}", db_path.display());

    if !cli.live {
        info!("Dry run: outbound actions are logged, not sent");
    }

    let api = OfflineApi;
    let mut bot = AltBot::new(&api, store, config.clone(), None, cli.live);

    let started = Instant::now();
    let outcome = run(&cli, &mut bot);
    info!("Run finished in {:.1?}", started.elapsed());

    if let Err(e) = &outcome {
        error!("Run died: {e:#}");
        notify_maintainer(&api, &config, cli.live, e);
    }
    outcome
}

/// Execute the requested use cases in their natural order: refresh the
/// mirrors first, then everything that reads them.
fn run<A: SocialApi + ?Sized>(cli: &Cli, bot: &mut AltBot<'_, A>) -> Result<()> {
    if cli.update_users {
        bot.update_users(true)?;
    }
    if cli.watch_followers {
        bot.watch_followers()?;
    }
    if cli.watch_friends {
        bot.watch_friends()?;
    }
    if cli.process_mentions {
        let handled = bot.process_mentions()?;
        info!("{handled} mentions handled");
    }
    if let Some(message) = &cli.message {
        let (sent, total) = bot.broadcast(message)?;
        println!("Broadcast sent to {sent} of {total} followers");
    }
    if let Some(top_n) = cli.top_users {
        bot.top_users_report(top_n)?;
    }
    Ok(())
}

/// Best-effort DM to the configured maintainer when a run dies; a failure
/// here is only logged, the original error is what the exit code reports.
fn notify_maintainer<A: SocialApi + ?Sized>(
    api: &A,
    config: &Config,
    live: bool,
    failure: &anyhow::Error,
) {
    if config.bot.maintainer_user_id == 0 {
        warn!("No maintainer configured, skipping failure notification");
        return;
    }

    let dispatcher = Dispatcher::new(api, live);
    let message = format!(
        "AltBot died at {}: {failure:#}",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    dispatcher.direct_message(
        &config.bot.maintainer_screen_name,
        config.bot.maintainer_user_id,
        &message,
    );
}
