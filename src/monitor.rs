use crate::controller::{ControllerInner, TransitionOrigin, categories};
use crate::error::{AuthError, CouplingError};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Lifecycle of the background safety worker.
///
/// Liveness is never inferred from the task object itself; the controller
/// tracks it explicitly and a join-with-grace returns a result the caller
/// must inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    NotStarted,
    Running,
    StopRequested,
    Joined,
}

/// Controller-owned slot for the worker task and its stop signal.
///
/// At most one live worker exists per engagement session. A worker that
/// disengages on its own cannot join itself; it signals stop and exits,
/// leaving the finished task here until a controller-side operation observes
/// it finished and marks the slot joined.
pub(crate) struct MonitorSlot {
    state: MonitorState,
    stop: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl MonitorSlot {
    pub(crate) fn idle() -> Self {
        Self {
            state: MonitorState::NotStarted,
            stop: None,
            task: None,
        }
    }

    pub(crate) fn running(stop: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self {
            state: MonitorState::Running,
            stop: Some(stop),
            task: Some(task),
        }
    }

    pub(crate) fn state(&self) -> MonitorState {
        self.state
    }

    /// No worker is live or pending: safe to start a fresh one.
    pub(crate) fn is_settled(&self) -> bool {
        matches!(self.state, MonitorState::NotStarted | MonitorState::Joined)
    }

    /// Signal stop and hand the task to the caller for joining.
    pub(crate) fn request_stop(&mut self) -> Option<JoinHandle<()>> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(true);
        }
        match self.state {
            MonitorState::Running | MonitorState::StopRequested => {
                self.state = MonitorState::StopRequested;
                self.task.take()
            }
            MonitorState::NotStarted | MonitorState::Joined => None,
        }
    }

    /// Worker-side stop: signal, keep the task for a later reap.
    pub(crate) fn note_self_stop(&mut self) {
        if let Some(stop) = &self.stop {
            let _ = stop.send(true);
        }
        self.stop = None;
        if self.state == MonitorState::Running {
            self.state = MonitorState::StopRequested;
        }
    }

    pub(crate) fn mark_joined(&mut self) {
        self.state = MonitorState::Joined;
        self.stop = None;
        self.task = None;
    }

    /// Observe a self-stopped worker that has since exited.
    pub(crate) fn reap_if_finished(&mut self) {
        if self.state == MonitorState::StopRequested
            && self.task.as_ref().is_some_and(JoinHandle::is_finished)
        {
            self.mark_joined();
        }
    }
}

/// Background safety loop: one tick per interval while the coupling stays
/// engaged.
///
/// Each tick samples stability, appends the outcome to the audit trail, and
/// tracks consecutive instability alerts. At the escalation limit it attempts
/// an authenticated emergency override through the controller and, failing
/// that, forces the unauthenticated safe disengage. The wait between ticks is
/// interruptible: a stop request wakes the loop immediately rather than at
/// the next interval boundary.
pub(crate) async fn run_safety_monitor(
    inner: Arc<ControllerInner>,
    mut stop: watch::Receiver<bool>,
) {
    tracing::info!("Safety monitoring started");
    let mut consecutive_alerts: u32 = 0;

    loop {
        if *stop.borrow() || !inner.session_active() {
            break;
        }

        let sample = inner.sample_stability();
        if sample > inner.config().instability_threshold {
            consecutive_alerts = 0;
            inner.audit_tick(
                categories::MONITOR_STABLE,
                &format!("stability {sample:.3} above threshold"),
            );
            tracing::info!(sample, "Monitor: stable");
        } else {
            consecutive_alerts += 1;
            inner.audit_tick(
                categories::MONITOR_ALERT,
                &format!("instability detected at {sample:.3}"),
            );
            tracing::warn!(sample, consecutive_alerts, "Monitor: instability detected");
        }

        if consecutive_alerts >= inner.config().escalation_alert_limit {
            escalate(&inner).await;
            break;
        }

        tokio::select! {
            () = tokio::time::sleep(inner.config().monitor_interval()) => {}
            _ = stop.changed() => {
                if *stop.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Safety monitoring stopped");
}

/// Escalation after repeated instability.
///
/// The authenticated override is attempted first. A missing credential
/// source, an operator denial, or wrong credentials during this automatic
/// escalation all end the same way: the coupling is released without
/// authentication and the audit trail records the automatic trip distinctly
/// from an operator-authorized override.
async fn escalate(inner: &Arc<ControllerInner>) {
    tracing::warn!("Repeated instability detected: attempting authenticated emergency override");
    match inner.emergency_override_from(TransitionOrigin::Monitor).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::error!(
                "Operator authentication failed during escalation; forcing safe disengage"
            );
            inner.auto_safe_disengage().await;
        }
        Err(CouplingError::Auth(AuthError::SourceUnavailable)) => {
            tracing::error!("No credential source for override; performing safe disengage for safety");
            inner.auto_safe_disengage().await;
        }
        Err(e) => {
            tracing::error!("Emergency override errored during escalation: {e}; forcing safe disengage");
            inner.auto_safe_disengage().await;
        }
    }
}
