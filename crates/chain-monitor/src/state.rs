use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Initializing,
    Polling,
    Stopping,
    Stopped,
}

/// A handle to a running chain monitor: lets the supervisor (or a test)
/// observe state transitions and request a stop without reaching into the
/// monitor's task.
#[derive(Clone)]
pub struct ChainMonitorHandle {
    pub(crate) state_rx: watch::Receiver<MonitorState>,
    pub(crate) running: Arc<AtomicBool>,
}

impl ChainMonitorHandle {
    pub fn state(&self) -> MonitorState {
        *self.state_rx.borrow()
    }

    /// Flips `running` to false. The monitor's loop observes this at its
    /// next reschedule point and transitions to `Stopped` instead of
    /// continuing; in-flight network calls are allowed to complete but may
    /// not re-arm a timer.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn wait_for_state(&mut self, target: MonitorState) {
        while *self.state_rx.borrow() != target {
            if self.state_rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Awaits the next state transition. Errs once the monitor task has
    /// dropped its sender (it has fully exited).
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.state_rx.changed().await
    }
}
