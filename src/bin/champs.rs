//! The orchestrator binary.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::{ArgAction, Parser};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chompchamps::core::config::MIN_DIMENSION;
use chompchamps::{run_game, GameConfig, RunOptions, SchedulerConfig};

/// Grid-conquest orchestrator: creates the shared world, spawns the view
/// and the agents, schedules turns, reports the outcome.
#[derive(Parser, Debug)]
#[command(name = "champs", disable_help_flag = true)]
struct Cli {
    /// Board width in cells.
    #[arg(short = 'w', long, default_value_t = 10)]
    width: u16,

    /// Board height in cells.
    #[arg(short = 'h', long, default_value_t = 10)]
    height: u16,

    /// Delay between ticks, in milliseconds.
    #[arg(short = 'd', long, default_value_t = 200)]
    delay: u64,

    /// Inactivity timeout, in seconds.
    #[arg(short = 't', long, default_value_t = 10)]
    timeout: u64,

    /// Board seed. Defaults to the clock.
    #[arg(short = 's', long)]
    seed: Option<u64>,

    /// View binary. Omit to run headless.
    #[arg(short = 'v', long)]
    view: Option<PathBuf>,

    /// Agent binaries, one per player.
    #[arg(short = 'p', long = "player", num_args = 1.., required = true)]
    players: Vec<PathBuf>,

    #[arg(long = "help", action = ArgAction::Help, help = "Print help")]
    help: Option<bool>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let width = cli.width.max(MIN_DIMENSION);
    let height = cli.height.max(MIN_DIMENSION);
    if width != cli.width || height != cli.height {
        warn!(
            width,
            height, "board dimensions raised to the supported minimum"
        );
    }

    let seed = cli.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    });

    let config = GameConfig::new(width, height, cli.players.len())
        .context("invalid board configuration")?;

    let mut options = RunOptions::new(config, seed, cli.players.clone());
    options.view = cli.view.clone();
    options.scheduler = SchedulerConfig {
        inactivity_timeout: Duration::from_secs(cli.timeout),
        tick_delay: Duration::from_millis(cli.delay),
        ..SchedulerConfig::default()
    };

    info!(
        width,
        height,
        delay_ms = cli.delay,
        timeout_s = cli.timeout,
        seed,
        view = %cli.view.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "-".into()),
        players = cli.players.len(),
        "configuration"
    );
    for path in &cli.players {
        info!("  agent: {}", path.display());
    }

    // SIGINT/SIGTERM request a cooperative stop; the run then winds down
    // through the normal finished path, drain included.
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .context("could not install the signal handler")?;
    }

    let report = run_game(&options, stop).context("game run failed")?;

    report
        .write_to(&mut std::io::stderr())
        .context("could not write the final report")?;
    Ok(())
}
