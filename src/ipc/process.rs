//! Child process bookkeeping for the orchestrator.
//!
//! The process set is orchestrator-local and never shared: it tracks the
//! optional view child and one agent child per index, plus a pid lookup
//! used when reporting reap events.

use std::ffi::OsStr;
use std::io;
use std::os::fd::OwnedFd;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};

use rustc_hash::FxHashMap;

use crate::core::config::{STATE_SHM_ENV, SYNC_SHM_ENV};

/// Spawn one agent child with its channel write end wired to stdout.
///
/// Width and height travel as informational arguments; the authoritative
/// state is located through the shared-object names passed in the
/// environment.
pub fn spawn_agent(
    path: &Path,
    width: u16,
    height: u16,
    channel: OwnedFd,
    state_name: &str,
    sync_name: &str,
) -> io::Result<Child> {
    Command::new(path)
        .arg(width.to_string())
        .arg(height.to_string())
        .env(STATE_SHM_ENV, state_name)
        .env(SYNC_SHM_ENV, sync_name)
        .stdin(Stdio::null())
        .stdout(Stdio::from(channel))
        .spawn()
}

/// Spawn the view child with inherited stdio (it owns the terminal).
pub fn spawn_view(
    path: &Path,
    width: u16,
    height: u16,
    state_name: &str,
    sync_name: &str,
) -> io::Result<Child> {
    Command::new(path)
        .arg(width.to_string())
        .arg(height.to_string())
        .env(STATE_SHM_ENV, state_name)
        .env(SYNC_SHM_ENV, sync_name)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .spawn()
}

/// Last path component, used as the agent's display name.
#[must_use]
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(OsStr::to_string_lossy)
        .map(|s| s.into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Exit statuses collected after every child has been reaped.
#[derive(Debug)]
pub struct ReapedChildren {
    pub view: Option<io::Result<ExitStatus>>,
    pub agents: Vec<io::Result<ExitStatus>>,
}

/// Orchestrator-local set of spawned children.
#[derive(Default)]
pub struct ProcessSet {
    view: Option<Child>,
    agents: Vec<Child>,
    by_pid: FxHashMap<u32, usize>,
}

impl ProcessSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_view(&mut self, child: Child) {
        self.view = Some(child);
    }

    /// Track an agent child; returns its index.
    pub fn push_agent(&mut self, child: Child) -> usize {
        let index = self.agents.len();
        self.by_pid.insert(child.id(), index);
        self.agents.push(child);
        index
    }

    /// Pid recorded for agent `index`.
    #[must_use]
    pub fn agent_pid(&self, index: usize) -> u32 {
        self.agents[index].id()
    }

    /// Which agent a pid belongs to, if any.
    #[must_use]
    pub fn index_of_pid(&self, pid: u32) -> Option<usize> {
        self.by_pid.get(&pid).copied()
    }

    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn has_view(&self) -> bool {
        self.view.is_some()
    }

    /// Wait for every child. Children are never signalled: by the time this
    /// runs each has been granted a final turn and observed `finished`.
    pub fn reap(mut self) -> ReapedChildren {
        let view = self.view.take().map(|mut child| child.wait());
        let agents = self
            .agents
            .iter_mut()
            .map(std::process::Child::wait)
            .collect();
        ReapedChildren { view, agents }
    }
}
