//! The spectator renderer.
//!
//! A passive process: it blocks on "state changed", snapshots the board
//! under the reader lock, draws, and posts "render done". It owns the
//! terminal; the orchestrator and agents only ever touch stderr.

use std::io::{self, Write};

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event;
use crossterm::style::{
    Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor,
    Stylize,
};
use crossterm::terminal::{
    self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{execute, queue};
use thiserror::Error;

use crate::core::{GameSnapshot, StateReader};
use crate::engine::report::{agent_color, agent_letter};
use crate::sync::{enter_read, SyncAccess, SyncError};

#[derive(Debug, Error)]
pub enum ViewError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("terminal i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// Dimmed trail color per agent, distinct from the head color.
fn body_color(index: usize) -> Color {
    const PALETTE: [Color; 9] = [
        Color::DarkCyan,
        Color::DarkGreen,
        Color::DarkYellow,
        Color::DarkMagenta,
        Color::DarkBlue,
        Color::DarkRed,
        Color::Grey,
        Color::DarkCyan,
        Color::DarkGreen,
    ];
    PALETTE[index % PALETTE.len()]
}

/// Run the render loop until the game finishes.
///
/// With `hold_at_end` the final frame stays up until a key is pressed, so
/// an interactive spectator can read the outcome.
pub fn run_view<S: SyncAccess>(
    state: &StateReader,
    sync: &S,
    hold_at_end: bool,
) -> Result<(), ViewError> {
    let mut out = io::stdout();
    terminal::enable_raw_mode()?;
    execute!(out, EnterAlternateScreen, Hide)?;

    let result = view_loop(state, sync, hold_at_end, &mut out);

    // Restore the terminal even on the error path.
    let _ = execute!(out, Show, LeaveAlternateScreen);
    let _ = terminal::disable_raw_mode();
    result
}

fn view_loop<S: SyncAccess>(
    state: &StateReader,
    sync: &S,
    hold_at_end: bool,
    out: &mut impl Write,
) -> Result<(), ViewError> {
    loop {
        sync.wait_changed()?;

        let snapshot = {
            let _read = enter_read(sync)?;
            state.snapshot()
        };
        render(out, &snapshot)?;
        sync.ack_rendered()?;

        if snapshot.finished {
            break;
        }
    }

    if hold_at_end {
        // Block until any key, terminal event, or EOF.
        let _ = event::read();
    }
    Ok(())
}

/// Draw one frame: title, board, per-agent stats.
fn render(out: &mut impl Write, snapshot: &GameSnapshot) -> Result<(), ViewError> {
    // Each cell is two characters wide so the grid reads roughly square.
    const CELL_W: u16 = 2;
    const TOP: u16 = 1;
    const LEFT: u16 = 2;

    queue!(out, Clear(ClearType::All), MoveTo(LEFT, 0))?;
    queue!(
        out,
        Print(format!("ChompChamps  {}x{}", snapshot.width, snapshot.height).bold())
    )?;

    for y in 0..snapshot.height {
        queue!(out, MoveTo(LEFT, TOP + y))?;
        for x in 0..snapshot.width {
            let value = snapshot.cell(x, y);
            if value > 0 {
                queue!(
                    out,
                    SetAttribute(Attribute::Dim),
                    Print(format!("{value} ")),
                    SetAttribute(Attribute::Reset)
                )?;
            } else {
                let owner = (-value) as usize;
                queue!(
                    out,
                    SetBackgroundColor(body_color(owner)),
                    Print("  "),
                    ResetColor
                )?;
            }
        }
    }

    // Heads over the trails: bright background, eyes mark blocked agents.
    for (index, agent) in snapshot.agents.iter().enumerate() {
        let eyes = if agent.blocked { "xx" } else { "''" };
        queue!(
            out,
            MoveTo(LEFT + agent.x * CELL_W, TOP + agent.y),
            SetBackgroundColor(agent_color(index)),
            SetForegroundColor(Color::Black),
            Print(eyes),
            ResetColor
        )?;
    }

    let stats_top = TOP + snapshot.height + 1;
    for (index, agent) in snapshot.agents.iter().enumerate() {
        let status = if agent.blocked { "Blocked" } else { "Active" };
        let line = format!(
            "{} name={:<15} score={:<4} valid={:<4} invalid={:<4} pos=({},{}) {}",
            agent_letter(index),
            agent.name,
            agent.score,
            agent.valid_moves,
            agent.invalid_moves,
            agent.x,
            agent.y,
            status,
        );
        queue!(out, MoveTo(LEFT, stats_top + index as u16))?;
        if agent.blocked {
            queue!(out, Print(line.with(Color::Red)))?;
        } else {
            queue!(out, Print(line.with(agent_color(index))))?;
        }
    }

    if snapshot.finished {
        queue!(
            out,
            MoveTo(LEFT, stats_top + snapshot.agents.len() as u16 + 1),
            Print("Game over. Press any key to exit.".bold())
        )?;
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{board, GameConfig, StateWriter};

    #[test]
    fn test_render_writes_board_and_stats() {
        let config = GameConfig::new(10, 10, 2).unwrap();
        let state = StateWriter::create_in_memory(&config);
        board::initialize(&state, &config, 42);
        state.set_agent_identity(0, "greedy", 1);
        state.set_agent_identity(1, "space", 2);

        let snapshot = state.snapshot();
        let mut buf = Vec::new();
        render(&mut buf, &snapshot).unwrap();

        let text = String::from_utf8_lossy(&buf);
        assert!(text.contains("ChompChamps"));
        assert!(text.contains("greedy"));
        assert!(text.contains("Active"));
    }
}
