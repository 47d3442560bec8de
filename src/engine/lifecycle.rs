//! Process lifecycle: create shared resources, spawn children, run the
//! game, tear everything down exactly once.
//!
//! Creation order matters: both named segments exist and the board is
//! fully initialized before any child is spawned, so children attach to a
//! consistent world. Teardown is idempotent and also runs on the unwind
//! path, so a failed startup never leaves named objects behind.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::core::config::{state_shm_name, sync_shm_name};
use crate::core::{board, ConfigError, GameConfig, StateWriter};
use crate::ipc::process::{base_name, spawn_agent, spawn_view};
use crate::ipc::shm::{self, ResourceError};
use crate::ipc::{move_channel, ProcessSet, ProtocolError};
use crate::sync::{enter_read, enter_write, ShmSyncSegment, SyncError};

use super::report::{AgentOutcome, ChildExit, GameReport};
use super::scheduler::{EngineError, Scheduler, SchedulerConfig};

/// Anything that can abort an orchestrated run. All of these are fatal:
/// partially-created shared state is never handed to children.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Channel(#[from] ProtocolError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("could not spawn {what}: {source}")]
    Spawn {
        what: String,
        #[source]
        source: io::Error,
    },
}

/// Everything one run needs to know.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub config: GameConfig,
    pub seed: u64,
    pub scheduler: SchedulerConfig,
    /// View binary; `None` runs headless with the fixed tick delay only.
    pub view: Option<PathBuf>,
    /// One binary path per agent, in index order.
    pub agents: Vec<PathBuf>,
    /// Name of the shared state object.
    pub state_name: String,
    /// Name of the synchronization segment.
    pub sync_name: String,
}

impl RunOptions {
    /// Options with default timing and the well-known segment names.
    #[must_use]
    pub fn new(config: GameConfig, seed: u64, agents: Vec<PathBuf>) -> Self {
        Self {
            config,
            seed,
            scheduler: SchedulerConfig::default(),
            view: None,
            agents,
            state_name: state_shm_name(),
            sync_name: sync_shm_name(),
        }
    }
}

/// Idempotent teardown of the named shared objects.
///
/// Runs at most once no matter how often it is invoked, and also runs on
/// drop so unwinding cannot leak the names.
pub struct Teardown {
    state_name: String,
    sync_name: String,
    done: bool,
}

impl Teardown {
    #[must_use]
    pub fn new(state_name: &str, sync_name: &str) -> Self {
        Self {
            state_name: state_name.to_string(),
            sync_name: sync_name.to_string(),
            done: false,
        }
    }

    /// Unlink both backing objects. Safe to call any number of times.
    pub fn release(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        if let Err(err) = shm::unlink(&self.state_name) {
            warn!(error = %err, "failed to unlink state object");
        }
        if let Err(err) = shm::unlink(&self.sync_name) {
            warn!(error = %err, "failed to unlink sync segment");
        }
    }

    /// Whether release already ran.
    #[must_use]
    pub fn released(&self) -> bool {
        self.done
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.release();
    }
}

/// Create a named resource, unlinking a stale leftover from a crashed run
/// first if one is in the way.
fn create_fresh<T>(
    name: &str,
    create: impl Fn() -> Result<T, ResourceError>,
) -> Result<T, ResourceError> {
    match create() {
        Err(ResourceError::AlreadyExists { .. }) => {
            warn!(name, "removing stale shared object from a previous run");
            shm::unlink(name)?;
            create()
        }
        other => other,
    }
}

/// Run one complete game: segments, children, scheduler, drain, reap,
/// report, release. The stop flag is the cooperative interrupt: a signal
/// handler sets it and the run winds down through the normal finish path.
pub fn run_game(opts: &RunOptions, stop: Arc<AtomicBool>) -> Result<GameReport, OrchestratorError> {
    let config = opts.config;
    let agent_count = config.agent_count();
    assert_eq!(
        opts.agents.len(),
        agent_count,
        "one agent binary per configured agent"
    );

    let mut teardown = Teardown::new(&opts.state_name, &opts.sync_name);

    let state = create_fresh(&opts.state_name, || {
        StateWriter::create(&opts.state_name, &config)
    })?;
    board::initialize(&state, &config, opts.seed);

    let sync = create_fresh(&opts.sync_name, || {
        ShmSyncSegment::create(&opts.sync_name, agent_count)
    })?;

    info!(
        width = config.width(),
        height = config.height(),
        agents = agent_count,
        seed = opts.seed,
        "shared segments created"
    );

    let mut children = ProcessSet::new();
    let has_view = if let Some(view_path) = &opts.view {
        let child = spawn_view(
            view_path,
            config.width(),
            config.height(),
            &opts.state_name,
            &opts.sync_name,
        )
        .map_err(|source| OrchestratorError::Spawn {
            what: view_path.display().to_string(),
            source,
        })?;
        info!(pid = child.id(), "view spawned");
        children.set_view(child);
        true
    } else {
        false
    };

    let mut receivers = Vec::with_capacity(agent_count);
    for (index, agent_path) in opts.agents.iter().enumerate() {
        let (receiver, sender) = move_channel()?;
        let child = spawn_agent(
            agent_path,
            config.width(),
            config.height(),
            sender.into_owned_fd(),
            &opts.state_name,
            &opts.sync_name,
        )
        .map_err(|source| OrchestratorError::Spawn {
            what: agent_path.display().to_string(),
            source,
        })?;

        // Publish identity under the writer lock: the child is already
        // alive and scanning for its pid.
        {
            let _write = enter_write(&sync)?;
            state.set_agent_identity(index, &base_name(agent_path), child.id() as i32);
        }
        info!(index, pid = child.id(), path = %agent_path.display(), "agent spawned");

        children.push_agent(child);
        receivers.push(receiver);
    }

    let summary = Scheduler::new(
        &state,
        &sync,
        receivers,
        opts.scheduler,
        has_view,
        stop,
    )
    .run()?;

    // Every child saw `finished` through its final turn grant; reap them
    // all before releasing anything they might still have mapped.
    let reaped = children.reap();

    let records = {
        let _read = enter_read(&sync)?;
        (0..agent_count).map(|i| state.agent(i)).collect::<Vec<_>>()
    };

    let agents = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| AgentOutcome {
            index,
            name: record.name,
            score: record.score,
            valid_moves: record.valid_moves,
            invalid_moves: record.invalid_moves,
            exit: match &reaped.agents[index] {
                Ok(status) => ChildExit::from_status(status),
                Err(err) => {
                    warn!(index, error = %err, "could not reap agent");
                    ChildExit::Unknown
                }
            },
        })
        .collect();

    let view = reaped.view.map(|status| match status {
        Ok(status) => ChildExit::from_status(&status),
        Err(err) => {
            warn!(error = %err, "could not reap view");
            ChildExit::Unknown
        }
    });

    sync.destroy_primitives();
    teardown.release();

    Ok(GameReport {
        summary,
        agents,
        view,
    })
}
