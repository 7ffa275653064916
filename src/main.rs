/// Entry point: parses the CLI surface, wires logging, and either runs
/// the one-shot operation a flag asked for or starts the full background
/// system. Logging setup follows the teacher's `main.rs`; the handler
/// composition it drove has moved into `orchestrator::Orchestrator`.
use anyhow::Result;
use badger_core::orchestrator::{InitOverrides, Orchestrator};
use badger_core::types::{Mode, WalletSource};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "badger", about = "Solana copy-trading pipeline")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Override the configured trading mode (live | dry_run | alert_only).
    #[arg(long)]
    mode: Option<String>,

    /// Shorthand for --mode dry_run.
    #[arg(long)]
    dry_run: bool,

    /// Run one token discovery pass and exit.
    #[arg(long)]
    discover: bool,

    /// Disable price-multiplier enrichment during discovery.
    #[arg(long)]
    no_enrich: bool,

    /// Re-score and re-tier monitored wallets once, then exit.
    #[arg(long)]
    analyze: bool,

    /// Run cluster detection from a seed wallet, then exit.
    #[arg(long, value_name = "SEED_WALLET")]
    clusters: Option<String>,

    /// Print the current agent strategy and system status, then exit.
    #[arg(long)]
    agent_status: bool,

    /// Run the Agent Brain's decision cycle continuously (implied by
    /// default; kept for parity with the documented flag surface).
    #[arg(long)]
    agent: bool,

    /// Run the Agent Brain's learning cycle continuously (implied by
    /// default; see --agent).
    #[arg(long)]
    agent_learn: bool,

    /// Print a one-line dashboard snapshot and exit.
    #[arg(long)]
    dashboard: bool,

    /// Import one wallet address per line from a file, then exit.
    #[arg(long, value_name = "PATH")]
    import_smart_money: Option<String>,

    /// Add a single wallet address to the monitored set, then exit.
    #[arg(long, value_name = "ADDRESS")]
    add_wallet: Option<String>,

    /// Add a single wallet address tagged as FOMO-sourced, then exit.
    #[arg(long, value_name = "ADDRESS")]
    add_fomo_wallet: Option<String>,

    /// Restrict --discover to a named source (reserved; see DESIGN.md).
    #[arg(long)]
    source: Option<String>,

    /// Discover candidate wallets from FOMO-style top-trader feeds
    /// (reserved; no concrete discovery source is wired yet).
    #[arg(long)]
    discover_fomo: bool,

    /// Delete all monitored wallets, then exit.
    #[arg(long)]
    wipe_wallets: bool,

    /// Skip the confirmation prompt for destructive flags like --wipe-wallets.
    #[arg(long)]
    yes: bool,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true).with_file(false).with_line_number(false))
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "badger_core=info,warn".into()))
        .init();
}

fn confirm(prompt: &str, skip: bool) -> bool {
    if skip {
        return true;
    }
    use std::io::Write;
    print!("{prompt} [y/N] ");
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let mode = if cli.dry_run {
        Some(Mode::DryRun)
    } else {
        match cli.mode.as_deref() {
            Some(raw) => Some(raw.parse().map_err(|e: badger_core::AppError| anyhow::anyhow!(e))?),
            None => None,
        }
    };
    let overrides = InitOverrides { mode, no_enrich: cli.no_enrich };

    info!("initializing badger trading system");
    let orchestrator = Orchestrator::init_with(&cli.config, overrides).await?;

    if let Some(path) = &cli.import_smart_money {
        let n = orchestrator.import_smart_money(path).await?;
        info!(imported = n, "smart money wallets imported");
        return Ok(());
    }
    if let Some(address) = &cli.add_wallet {
        orchestrator.add_wallet(address, true, WalletSource::Manual).await?;
        info!(address, "wallet added");
        return Ok(());
    }
    if let Some(address) = &cli.add_fomo_wallet {
        orchestrator.add_wallet(address, true, WalletSource::Fomo).await?;
        info!(address, "fomo wallet added");
        return Ok(());
    }
    if cli.wipe_wallets {
        if confirm("this will delete every monitored wallet, continue?", cli.yes) {
            let n = orchestrator.wipe_wallets().await?;
            info!(removed = n, "wallets wiped");
        } else {
            info!("wipe cancelled");
        }
        return Ok(());
    }
    if cli.discover_fomo {
        info!("FOMO-feed discovery has no wired source yet; see DESIGN.md for the known gap");
        return Ok(());
    }
    if cli.discover {
        let n = orchestrator.run_discovery_once().await?;
        info!(discovered = n, "discovery pass complete");
        return Ok(());
    }
    if cli.analyze {
        let summary = orchestrator.run_wallet_refresh_once().await?;
        info!(
            scanned = summary.scanned,
            monitored = summary.monitored,
            promoted = summary.promoted.len(),
            demoted = summary.demoted.len(),
            "wallet analysis complete"
        );
        return Ok(());
    }
    if let Some(seed) = &cli.clusters {
        match orchestrator.run_cluster_detection(seed).await? {
            Some(summary) => info!(cluster_id = summary.cluster_id, members = summary.member_count, "cluster detected"),
            None => info!("no cluster found for seed wallet"),
        }
        return Ok(());
    }
    if cli.agent_status || cli.dashboard {
        println!("{}", orchestrator.status_report().await);
        return Ok(());
    }

    info!("starting background services");
    tokio::select! {
        _ = orchestrator.run_background_tasks() => {
            error!("background task set exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    orchestrator.shutdown().await;
    info!("badger shutdown complete");
    Ok(())
}
