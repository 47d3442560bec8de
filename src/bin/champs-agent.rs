//! The agent binary.
//!
//! Spawned by the orchestrator with its stdout wired to the move channel.
//! Board dimensions arrive as informational arguments only; everything
//! authoritative comes from the shared state.

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use chompchamps::agent::{self, AutoStrategy};
use chompchamps::core::config::{state_shm_name, sync_shm_name};
use chompchamps::ipc::MoveSender;
use chompchamps::{ShmSyncSegment, StateReader};

/// One grid-conquest player process.
#[derive(Parser, Debug)]
#[command(name = "champs-agent")]
struct Cli {
    /// Board width (informational; the shared state is authoritative).
    width: Option<u16>,

    /// Board height (informational).
    height: Option<u16>,
}

fn main() -> anyhow::Result<()> {
    // Stdout is the move channel: all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    debug!(width = ?cli.width, height = ?cli.height, "argv dimensions");

    let state = StateReader::open(&state_shm_name()).context("could not attach game state")?;
    let sync = ShmSyncSegment::open(&sync_shm_name(), state.agent_count())
        .context("could not attach synchronization segment")?;

    let pid = std::process::id() as i32;
    let index = agent::discover_index(&state, &sync, pid).context("agent self-discovery failed")?;
    info!(pid, index, "agent attached");

    // Take ownership of stdout as the channel; dropping it on exit is the
    // orderly end-of-input the orchestrator expects.
    let channel = unsafe { MoveSender::from_raw_stdout() };

    let mut strategy = AutoStrategy::new(u64::from(std::process::id()) ^ (index as u64) << 32);
    agent::run(&state, &sync, index, channel, &mut strategy)?;

    info!(index, "agent done");
    Ok(())
}
