//! Final results: per-child exit status plus score counters.

use std::io::{self, Write};
use std::process::ExitStatus;

use crossterm::style::Stylize;
use serde::Serialize;

use super::scheduler::RunSummary;

/// How one child process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ChildExit {
    Exited(i32),
    Signaled(i32),
    /// The child could not be reaped (wait failed).
    Unknown,
}

impl ChildExit {
    #[must_use]
    pub fn from_status(status: &ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        if let Some(code) = status.code() {
            ChildExit::Exited(code)
        } else if let Some(signal) = status.signal() {
            ChildExit::Signaled(signal)
        } else {
            ChildExit::Unknown
        }
    }
}

impl std::fmt::Display for ChildExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChildExit::Exited(code) => write!(f, "exited ({code})"),
            ChildExit::Signaled(signal) => write!(f, "killed by signal ({signal})"),
            ChildExit::Unknown => write!(f, "not reaped"),
        }
    }
}

/// One agent's final line.
#[derive(Clone, Debug, Serialize)]
pub struct AgentOutcome {
    pub index: usize,
    pub name: String,
    pub score: u32,
    pub valid_moves: u32,
    pub invalid_moves: u32,
    pub exit: ChildExit,
}

/// Everything a finished run reports.
#[derive(Clone, Debug, Serialize)]
pub struct GameReport {
    pub summary: RunSummary,
    pub agents: Vec<AgentOutcome>,
    pub view: Option<ChildExit>,
}

/// Display letter for an agent index: A, B, C...
#[must_use]
pub fn agent_letter(index: usize) -> char {
    (b'A' + (index as u8 % 26)) as char
}

/// Per-agent display color, stable across the view and the report.
#[must_use]
pub fn agent_color(index: usize) -> crossterm::style::Color {
    use crossterm::style::Color;
    const PALETTE: [Color; 9] = [
        Color::Cyan,
        Color::Green,
        Color::Yellow,
        Color::Magenta,
        Color::Blue,
        Color::Red,
        Color::White,
        Color::DarkCyan,
        Color::DarkGreen,
    ];
    PALETTE[index % PALETTE.len()]
}

impl GameReport {
    /// Write the human-readable report, one colored line per child.
    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        if let Some(view) = &self.view {
            writeln!(out, "View {view}")?;
        }
        for agent in &self.agents {
            let label = format!("Agent {} {}", agent_letter(agent.index), agent.name);
            writeln!(
                out,
                "{} ({}) {} with a score of {} / {} valid / {} invalid",
                label.with(agent_color(agent.index)),
                agent.index,
                agent.exit,
                agent.score,
                agent.valid_moves,
                agent.invalid_moves,
            )?;
        }
        Ok(())
    }
}
