//! The orchestrator engine: turn scheduling, observer notification,
//! process lifecycle, final reporting.

pub mod lifecycle;
pub mod notify;
pub mod report;
pub mod scheduler;

pub use lifecycle::{run_game, OrchestratorError, RunOptions, Teardown};
pub use notify::ViewNotifier;
pub use report::{AgentOutcome, ChildExit, GameReport};
pub use scheduler::{EngineError, FinishReason, RunSummary, Scheduler, SchedulerConfig};
