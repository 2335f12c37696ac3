//! Run/pause/stop gating for the generator loop.
//!
//! One writer (the control surface), any number of readers. The generator
//! reads the state once per cycle boundary; `Pause` is waited out with a
//! bounded sleep, `Stop` is terminal and cooperative — the in-flight cycle
//! finishes, no further cycle starts.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// How long a paused generator sleeps between state checks.
pub const PAUSE_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    Run,
    #[default]
    Pause,
    Stop,
}

impl ControlState {
    /// Legal transitions: Run↔Pause, both → Stop, Stop terminal.
    fn allows(self, target: ControlState) -> bool {
        match self {
            ControlState::Stop => false,
            _ => self != target,
        }
    }
}

impl std::fmt::Display for ControlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlState::Run => f.write_str("run"),
            ControlState::Pause => f.write_str("pause"),
            ControlState::Stop => f.write_str("stop"),
        }
    }
}

/// Single writer of the control state.
pub struct Controller {
    tx: watch::Sender<ControlState>,
}

impl Controller {
    pub fn new(initial: ControlState) -> (Self, ControlHandle) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx }, ControlHandle { rx })
    }

    /// Request a transition. Illegal requests (anything out of `Stop`,
    /// or a request for the current state) are no-ops, not errors.
    pub fn request(&self, target: ControlState) -> bool {
        let current = *self.tx.borrow();
        if !current.allows(target) {
            tracing::debug!(%current, %target, "control transition ignored");
            return false;
        }
        tracing::info!(from = %current, to = %target, "control transition");
        self.tx.send_replace(target);
        true
    }

    pub fn state(&self) -> ControlState {
        *self.tx.borrow()
    }
}

/// Read side handed to the generator. Cloneable.
#[derive(Clone)]
pub struct ControlHandle {
    rx: watch::Receiver<ControlState>,
}

impl ControlHandle {
    pub fn state(&self) -> ControlState {
        *self.rx.borrow()
    }

    /// Wait out a pause. Returns `Run` or `Stop`; sleeps `PAUSE_POLL`
    /// between checks rather than busy-spinning.
    pub async fn wait_resume(&self) -> ControlState {
        loop {
            match self.state() {
                ControlState::Pause => tokio::time::sleep(PAUSE_POLL).await,
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_pause_cycle() {
        let (ctl, handle) = Controller::new(ControlState::Pause);
        assert_eq!(handle.state(), ControlState::Pause);

        assert!(ctl.request(ControlState::Run));
        assert_eq!(handle.state(), ControlState::Run);

        assert!(ctl.request(ControlState::Pause));
        assert!(ctl.request(ControlState::Run));
        assert_eq!(handle.state(), ControlState::Run);
    }

    #[test]
    fn stop_is_terminal() {
        let (ctl, handle) = Controller::new(ControlState::Run);
        assert!(ctl.request(ControlState::Stop));

        assert!(!ctl.request(ControlState::Run));
        assert!(!ctl.request(ControlState::Pause));
        assert!(!ctl.request(ControlState::Stop));
        assert_eq!(handle.state(), ControlState::Stop);
    }

    #[test]
    fn same_state_request_is_noop() {
        let (ctl, _handle) = Controller::new(ControlState::Pause);
        assert!(!ctl.request(ControlState::Pause));
        assert_eq!(ctl.state(), ControlState::Pause);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_resume_returns_on_transition() {
        let (ctl, handle) = Controller::new(ControlState::Pause);
        let waiter = tokio::spawn({
            let handle = handle.clone();
            async move { handle.wait_resume().await }
        });

        tokio::time::sleep(PAUSE_POLL * 3).await;
        ctl.request(ControlState::Run);
        assert_eq!(waiter.await.unwrap(), ControlState::Run);
    }
}
