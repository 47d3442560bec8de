//! The view binary: renders live state until the game finishes.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chompchamps::core::config::{state_shm_name, sync_shm_name};
use chompchamps::view::run_view;
use chompchamps::{ShmSyncSegment, StateReader};

/// Grid-conquest spectator.
#[derive(Parser, Debug)]
#[command(name = "champs-view")]
struct Cli {
    /// Board width (informational; the shared state is authoritative).
    width: Option<u16>,

    /// Board height (informational).
    height: Option<u16>,

    /// Exit as soon as the game finishes instead of waiting for a key.
    #[arg(long)]
    no_hold: bool,
}

fn main() -> anyhow::Result<()> {
    // Stdout is the screen: diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let state = StateReader::open(&state_shm_name()).context("could not attach game state")?;
    let sync = ShmSyncSegment::open(&sync_shm_name(), state.agent_count())
        .context("could not attach synchronization segment")?;
    info!(
        width = state.width(),
        height = state.height(),
        "view attached"
    );

    run_view(&state, &sync, !cli.no_hold)?;
    Ok(())
}
