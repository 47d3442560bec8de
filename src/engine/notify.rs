//! Observer notification: the two-phase render handshake.
//!
//! After every mutation the orchestrator posts "state changed" and waits
//! for "render done", so the view draws each state exactly once and never
//! observes a half-applied update. At most one notification is ever
//! outstanding. When shutdown has been requested the acknowledgment wait
//! degrades to a try, so a wedged view cannot hang teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::sync::{SyncAccess, SyncError};

/// Orchestrator-side handle for the view handshake.
pub struct ViewNotifier<'a, S: SyncAccess> {
    sync: &'a S,
    has_view: bool,
    tick_delay: Duration,
    stop: &'a AtomicBool,
}

impl<'a, S: SyncAccess> ViewNotifier<'a, S> {
    pub fn new(sync: &'a S, has_view: bool, tick_delay: Duration, stop: &'a AtomicBool) -> Self {
        Self {
            sync,
            has_view,
            tick_delay,
            stop,
        }
    }

    /// Signal one state change and pace the game tick.
    ///
    /// Without a view the handshake is skipped and only the fixed
    /// inter-tick delay remains.
    pub fn notify(&self) -> Result<(), SyncError> {
        if self.has_view {
            self.sync.notify_changed()?;
            if self.stop.load(Ordering::SeqCst) {
                self.sync.try_wait_rendered()?;
            } else {
                self.sync.wait_rendered()?;
            }
        }
        if !self.tick_delay.is_zero() {
            std::thread::sleep(self.tick_delay);
        }
        Ok(())
    }
}
