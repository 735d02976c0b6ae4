use crate::audit::{AuditEntry, AuditTrail};
use crate::config::CouplingConfig;
use crate::error::{AuthError, MonitorError, Result};
use crate::monitor::{self, MonitorSlot, MonitorState};
use crate::physics::ZeroGravitySimulation;
use crate::security::{CredentialSource, CredentialStore, KeyedTransform, PromptKind};
use crate::stability::StabilitySampler;
use anyhow::Context;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use uuid::Uuid;
use zeroize::Zeroizing;

// ─── Engagement state machine ───────────────────────────────────────────────

/// Coupling state. Exactly one controller instance owns the current value;
/// every transition is serialized through the controller's session lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementState {
    /// Initial and terminal state of each session.
    Disengaged,
    Engaged,
    /// Transient, only while the override routine is authenticating.
    EmergencyOverrideInProgress,
    /// Reached when a monitor worker would not shut down; requires an
    /// explicit [`reset`](CouplingController::reset).
    Failsafe,
}

/// Which thread of control is driving a transition. The monitor worker is,
/// transiently, "the controller thread" while it invokes safety transitions,
/// but it can never join itself.
#[derive(Debug, Clone, Copy)]
pub(crate) enum TransitionOrigin {
    Control,
    Monitor,
}

/// Audit category tags for every safety-relevant event.
pub mod categories {
    pub const ENGAGED: &str = "COUPLING ENGAGED";
    pub const DISENGAGED_CONTROL: &str = "COUPLING DISENGAGED VIA CONTROL";
    pub const DISENGAGE_BLOCKED: &str = "DISENGAGE BLOCKED: SAFETY CHECKS FAILED";
    pub const OVERRIDE_ACTIVATED: &str = "EMERGENCY OVERRIDE ACTIVATED";
    pub const AUTO_DISENGAGE: &str = "AUTO SAFE DISENGAGE DUE TO INSTABILITY";
    pub const POWER_LOSS: &str = "POWER LOSS: FORCED SAFE DISENGAGE";
    pub const MONITOR_STABLE: &str = "MONITOR STABLE";
    pub const MONITOR_ALERT: &str = "MONITOR ALERT";
    pub const DEGRADED_SHUTDOWN: &str = "MONITOR SHUTDOWN TIMEOUT: FAILSAFE";
    pub const MONITOR_PANICKED: &str = "MONITOR WORKER PANICKED";
    pub const FAILSAFE_RESET: &str = "FAILSAFE RESET";
}

struct Session {
    engagement: EngagementState,
    id: Option<Uuid>,
    monitor: MonitorSlot,
}

// ─── Controller internals ───────────────────────────────────────────────────

/// Shared core of the controller. The public [`CouplingController`] and the
/// monitor worker both hold an `Arc` to this, so every transition function
/// here must be safe to invoke from either task; the session lock is the
/// single synchronization boundary for engagement state and the monitor
/// slot, and it is never held across an await.
pub(crate) struct ControllerInner {
    config: CouplingConfig,
    credentials: CredentialStore,
    source: Mutex<Option<Arc<dyn CredentialSource>>>,
    audit: AuditTrail,
    transform: KeyedTransform,
    sampler: StabilitySampler,
    power_ok: AtomicBool,
    session: Mutex<Session>,
}

impl ControllerInner {
    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn config(&self) -> &CouplingConfig {
        &self.config
    }

    /// The monitor keeps running through a transient override attempt; only
    /// Disengaged and Failsafe end its session.
    pub(crate) fn session_active(&self) -> bool {
        matches!(
            self.lock_session().engagement,
            EngagementState::Engaged | EngagementState::EmergencyOverrideInProgress
        )
    }

    fn current_session_id(&self) -> Option<Uuid> {
        self.lock_session().id
    }

    pub(crate) fn sample_stability(&self) -> f64 {
        self.sampler.sample()
    }

    /// Append an audit entry attributed to the live session, with the
    /// descriptive detail passed through the keyed transform.
    pub(crate) fn audit_tick(&self, category: &str, detail: &str) {
        self.audit.append_for_session(
            self.current_session_id(),
            category,
            Some(self.transform.encode_text(detail)),
        );
    }

    fn power_is_ok(&self) -> bool {
        self.power_ok.load(Ordering::SeqCst)
    }

    // ── Authentication ──────────────────────────────────────────────────

    fn request_credential(&self, kind: PromptKind) -> Result<Option<Zeroizing<String>>> {
        let source = {
            let guard = self
                .source
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.clone()
        };
        let Some(source) = source else {
            return Err(AuthError::SourceUnavailable.into());
        };
        Ok(source.request_credential(kind))
    }

    fn verify_biometric_interactive(&self) -> Result<bool> {
        tracing::info!("Scanning biometric (fingerprint)");
        let Some(candidate) = self.request_credential(PromptKind::Biometric)? else {
            tracing::warn!("Biometric verification: FAIL (no input)");
            return Ok(false);
        };
        let ok = self.credentials.verify_biometric(&candidate);
        tracing::info!("Biometric verification: {}", if ok { "PASS" } else { "FAIL" });
        Ok(ok)
    }

    // ── Lifecycle transitions ───────────────────────────────────────────

    pub(crate) async fn engage(self: &Arc<Self>) -> Result<bool> {
        {
            let session = self.lock_session();
            match session.engagement {
                EngagementState::Engaged | EngagementState::EmergencyOverrideInProgress => {
                    tracing::info!("Coupling already engaged");
                    return Ok(false);
                }
                EngagementState::Failsafe => {
                    tracing::warn!("Coupling in failsafe; reset required before engagement");
                    return Ok(false);
                }
                EngagementState::Disengaged => {}
            }
        }

        // A monitor-initiated disengage leaves its worker behind; it must be
        // observed fully shut down before a new one may start.
        if let Err(e) = self.stop_and_join_monitor().await {
            self.note_degraded_shutdown(&e);
            return Ok(false);
        }

        if !self.verify_biometric_interactive()? {
            tracing::warn!("Biometric authentication failed. Engagement denied");
            return Ok(false);
        }
        if !self.power_is_ok() {
            tracing::warn!("Power not OK. Cannot engage");
            return Ok(false);
        }

        tracing::info!("Engaging nano-tether coupling");
        let session_id = {
            let mut session = self.lock_session();
            if session.engagement != EngagementState::Disengaged || !session.monitor.is_settled()
            {
                // lost the race to a concurrent transition
                return Ok(false);
            }
            let (stop_tx, stop_rx) = watch::channel(false);
            let task = tokio::spawn(monitor::run_safety_monitor(Arc::clone(self), stop_rx));
            session.monitor = MonitorSlot::running(stop_tx, task);
            session.engagement = EngagementState::Engaged;
            let id = Uuid::new_v4();
            session.id = Some(id);
            id
        };
        self.audit.append_for_session(
            Some(session_id),
            categories::ENGAGED,
            Some(self.transform.encode_text("tether system active")),
        );
        tracing::debug!(
            cipher = %hex::encode(self.transform.encode_text("system_status: stable")),
            "engagement transform self-sample"
        );
        tracing::info!(%session_id, "Coupling engaged. Tether system active");
        Ok(true)
    }

    pub(crate) async fn disengage_via_control(&self, perform_safety_checks: bool) -> Result<bool> {
        {
            let session = self.lock_session();
            if session.engagement != EngagementState::Engaged {
                tracing::info!("Coupling not engaged");
                return Ok(false);
            }
        }
        tracing::info!("Control input: attempting safe disengage");
        if perform_safety_checks && !self.run_safety_checks() {
            tracing::warn!("Disengagement blocked: safety checks failed");
            self.audit_tick(
                categories::DISENGAGE_BLOCKED,
                "pre-disengage cross-validation failed",
            );
            return Ok(false);
        }
        self.safe_disengage(
            TransitionOrigin::Control,
            categories::DISENGAGED_CONTROL,
            "released by control input",
        )
        .await;
        Ok(true)
    }

    /// Multi-factor override: biometric plus emergency password, both
    /// requested through the injected credential source.
    pub(crate) async fn emergency_override_from(&self, origin: TransitionOrigin) -> Result<bool> {
        {
            let mut session = self.lock_session();
            if session.engagement != EngagementState::Engaged {
                tracing::info!("Coupling not engaged; no override needed");
                return Ok(false);
            }
            session.engagement = EngagementState::EmergencyOverrideInProgress;
        }
        tracing::warn!("Initiating emergency override protocol");

        match self.authenticate_override() {
            Ok(true) => {
                tracing::warn!("Emergency override accepted. Forcing disengage");
                self.safe_disengage(
                    origin,
                    categories::OVERRIDE_ACTIVATED,
                    "operator-authorized release",
                )
                .await;
                Ok(true)
            }
            Ok(false) => {
                self.restore_engaged();
                Ok(false)
            }
            Err(e) => {
                self.restore_engaged();
                Err(e)
            }
        }
    }

    fn authenticate_override(&self) -> Result<bool> {
        if !self.verify_biometric_interactive()? {
            tracing::warn!("Biometric authentication failed. Override denied");
            return Ok(false);
        }
        if !self.credentials.has_emergency() {
            tracing::error!("No emergency password configured; override denied");
            return Ok(false);
        }
        let Some(candidate) = self.request_credential(PromptKind::EmergencyPassword)? else {
            tracing::warn!("No emergency password supplied. Override denied");
            return Ok(false);
        };
        if self.credentials.verify_emergency(&candidate) {
            Ok(true)
        } else {
            tracing::warn!("Incorrect emergency password. Override denied");
            Ok(false)
        }
    }

    fn restore_engaged(&self) {
        let mut session = self.lock_session();
        if session.engagement == EngagementState::EmergencyOverrideInProgress {
            session.engagement = EngagementState::Engaged;
        }
    }

    pub(crate) async fn simulate_power_loss(&self) {
        tracing::warn!("Simulating power loss");
        self.power_ok.store(false, Ordering::SeqCst);
        if self.session_active() {
            tracing::info!("Power loss while engaged: performing safe disengage");
            // power loss is itself the triggering failure; the safety
            // pre-check is bypassed
            self.safe_disengage(
                TransitionOrigin::Control,
                categories::POWER_LOSS,
                "forced release on power loss",
            )
            .await;
        }
    }

    pub(crate) fn set_power_ok(&self, ok: bool) {
        self.power_ok.store(ok, Ordering::SeqCst);
    }

    pub(crate) fn reset(&self) -> bool {
        {
            let mut session = self.lock_session();
            if session.engagement != EngagementState::Failsafe || !session.monitor.is_settled() {
                return false;
            }
            session.engagement = EngagementState::Disengaged;
        }
        self.audit.append(categories::FAILSAFE_RESET, None);
        tracing::warn!("Failsafe reset: coupling returned to disengaged");
        true
    }

    pub(crate) async fn auto_safe_disengage(&self) {
        self.safe_disengage(
            TransitionOrigin::Monitor,
            categories::AUTO_DISENGAGE,
            "forced release after repeated instability",
        )
        .await;
    }

    /// Release the coupling without leaving ambiguous state: flip to
    /// Disengaged, record the event, then make sure the monitor worker is
    /// shut down (or, for a worker-initiated release, signalled and left for
    /// the next operation to reap).
    async fn safe_disengage(&self, origin: TransitionOrigin, category: &str, detail: &str) {
        let session_id = {
            let mut session = self.lock_session();
            if !matches!(
                session.engagement,
                EngagementState::Engaged | EngagementState::EmergencyOverrideInProgress
            ) {
                return;
            }
            session.engagement = EngagementState::Disengaged;
            session.id.take()
        };
        self.audit.append_for_session(
            session_id,
            category,
            Some(self.transform.encode_text(detail)),
        );

        match origin {
            TransitionOrigin::Control => {
                if let Err(e) = self.stop_and_join_monitor().await {
                    self.note_degraded_shutdown(&e);
                }
            }
            TransitionOrigin::Monitor => {
                let mut session = self.lock_session();
                session.monitor.note_self_stop();
            }
        }
        tracing::info!("Coupling safely disengaged");
    }

    // ── Worker shutdown ─────────────────────────────────────────────────

    async fn stop_and_join_monitor(&self) -> std::result::Result<(), MonitorError> {
        let task = {
            let mut session = self.lock_session();
            session.monitor.request_stop()
        };
        let Some(mut task) = task else {
            return Ok(());
        };

        let grace = self.config.monitor_join_grace();
        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(())) => {
                self.lock_session().monitor.mark_joined();
                Ok(())
            }
            Ok(Err(join_error)) => {
                self.lock_session().monitor.mark_joined();
                Err(MonitorError::Panicked(join_error.to_string()))
            }
            Err(_) => {
                task.abort();
                self.lock_session().monitor.mark_joined();
                Err(MonitorError::ShutdownTimeout {
                    grace_secs: grace.as_secs_f64(),
                })
            }
        }
    }

    /// Degraded shutdown is reported, never fatal; the logical state still
    /// lands on a safe terminal value.
    fn note_degraded_shutdown(&self, error: &MonitorError) {
        tracing::error!("Degraded monitor shutdown: {error}");
        match error {
            MonitorError::ShutdownTimeout { .. } => {
                self.audit.append(categories::DEGRADED_SHUTDOWN, None);
                let mut session = self.lock_session();
                session.engagement = EngagementState::Failsafe;
            }
            MonitorError::Panicked(_) => {
                // the worker is dead, so the disengaged state stands
                self.audit.append(categories::MONITOR_PANICKED, None);
            }
        }
    }

    // ── Safety pre-checks ───────────────────────────────────────────────

    fn run_safety_checks(&self) -> bool {
        tracing::info!("Running dual cross-validation and safety checks");
        let gyro_ok = self.gyro_check();
        let transform_ok = self.transform_self_check();
        let power_ok = self.power_is_ok();
        let ok = gyro_ok && transform_ok && power_ok;
        tracing::info!(
            gyro_ok,
            transform_ok,
            power_ok,
            "Safety checks result: {}",
            if ok { "PASS" } else { "FAIL" }
        );
        ok
    }

    fn gyro_check(&self) -> bool {
        let stability = self.sampler.sample();
        let threshold = self.config.gyro_threshold();
        tracing::debug!(stability, threshold, "gyro cross-validation");
        stability > threshold
    }

    fn transform_self_check(&self) -> bool {
        const TEST_PAYLOAD: &[u8] = b"test_payload";
        self.transform.decode(&self.transform.encode(TEST_PAYLOAD)) == TEST_PAYLOAD
    }
}

// ─── Public controller ──────────────────────────────────────────────────────

/// Root of the coupling system: owns the engagement state machine,
/// orchestrates the authentication gates, and starts and stops the
/// background safety monitor. Sole mutator of engagement state.
pub struct CouplingController {
    inner: Arc<ControllerInner>,
}

impl CouplingController {
    pub fn new(config: CouplingConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: CouplingConfig) -> CouplingControllerBuilder {
        CouplingControllerBuilder {
            config,
            credential_source: None,
            sampler: None,
            transform: None,
            biometric: None,
            emergency_password: None,
        }
    }

    /// Request engagement: biometric gate, power gate, then transition and
    /// start the safety monitor. `Ok(false)` leaves the state unchanged.
    pub async fn engage(&self) -> Result<bool> {
        self.inner.engage().await
    }

    /// Request a control-surface disengage. With `perform_safety_checks`
    /// the gyro draw, transform round-trip, and power flag are
    /// cross-validated first; a failed check leaves the coupling engaged.
    pub async fn disengage_via_control(&self, perform_safety_checks: bool) -> Result<bool> {
        self.inner.disengage_via_control(perform_safety_checks).await
    }

    /// Operator-authorized release while engaged. Requires biometric plus
    /// the configured emergency password, both requested through the
    /// injected credential source.
    pub async fn emergency_override(&self) -> Result<bool> {
        self.inner
            .emergency_override_from(TransitionOrigin::Control)
            .await
    }

    /// External power-monitor event: power is gone, and an engaged coupling
    /// is released unconditionally.
    pub async fn simulate_power_loss(&self) {
        self.inner.simulate_power_loss().await;
    }

    /// Settable by an external power-monitoring collaborator.
    pub fn set_power_ok(&self, ok: bool) {
        self.inner.set_power_ok(ok);
    }

    /// Acknowledge a failsafe condition and return to Disengaged. Answers
    /// `false` unless the controller is actually in failsafe.
    pub fn reset(&self) -> bool {
        self.inner.reset()
    }

    pub fn state(&self) -> EngagementState {
        self.inner.lock_session().engagement
    }

    pub fn is_engaged(&self) -> bool {
        self.state() == EngagementState::Engaged
    }

    /// Current lifecycle state of the background worker, observing a
    /// self-stopped worker as joined once its task has finished.
    pub fn monitor_state(&self) -> MonitorState {
        let mut session = self.inner.lock_session();
        session.monitor.reap_if_finished();
        session.monitor.state()
    }

    pub fn set_biometric(&self, reference: &str) {
        self.inner.credentials.set_biometric(reference);
    }

    pub fn set_emergency_password(&self, password: &str) {
        self.inner.credentials.set_emergency(password);
    }

    /// Swap the injected credential source; `None` makes interactive
    /// authentication structurally unavailable.
    pub fn set_credential_source(&self, source: Option<Arc<dyn CredentialSource>>) {
        let mut guard = self
            .inner
            .source
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = source;
    }

    /// Ordered point-in-time copy of the audit trail, for export.
    pub fn audit_snapshot(&self) -> Vec<AuditEntry> {
        self.inner.audit.snapshot()
    }

    /// Recover the descriptive text of an entry's encoded payload.
    pub fn decode_audit_payload(&self, entry: &AuditEntry) -> Result<Option<String>> {
        let Some(payload) = &entry.payload else {
            return Ok(None);
        };
        let bytes = hex::decode(payload).context("audit payload is not valid hex")?;
        Ok(Some(self.inner.transform.decode_text(&bytes)?))
    }

    /// Demonstration collaborator: zero-gravity drift under the current
    /// engagement state. Feeds no safety decision.
    pub fn zero_gravity_simulation(&self, duration: f64, time_step: f64) -> ZeroGravitySimulation {
        let engaged = self.inner.session_active();
        if engaged {
            tracing::info!("Simulating zero-gravity physics with tether stabilization");
        } else {
            tracing::info!("Engage coupling first to demonstrate stabilized zero-gravity drift");
        }
        ZeroGravitySimulation::new(engaged, duration, time_step)
    }

    pub fn config(&self) -> &CouplingConfig {
        self.inner.config()
    }
}

// ─── Builder ────────────────────────────────────────────────────────────────

/// Assembles a controller with its injected collaborators. Everything not
/// supplied falls back to production defaults: entropy-backed sampler, fresh
/// transform key, no credential source.
pub struct CouplingControllerBuilder {
    config: CouplingConfig,
    credential_source: Option<Arc<dyn CredentialSource>>,
    sampler: Option<StabilitySampler>,
    transform: Option<KeyedTransform>,
    biometric: Option<String>,
    emergency_password: Option<String>,
}

impl CouplingControllerBuilder {
    pub fn credential_source(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.credential_source = Some(source);
        self
    }

    pub fn sampler(mut self, sampler: StabilitySampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn transform(mut self, transform: KeyedTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn biometric(mut self, reference: impl Into<String>) -> Self {
        self.biometric = Some(reference.into());
        self
    }

    pub fn emergency_password(mut self, password: impl Into<String>) -> Self {
        self.emergency_password = Some(password.into());
        self
    }

    pub fn build(self) -> CouplingController {
        let credentials = CredentialStore::new();
        if let Some(reference) = &self.biometric {
            credentials.set_biometric(reference);
        }
        if let Some(password) = &self.emergency_password {
            credentials.set_emergency(password);
        }

        let inner = Arc::new(ControllerInner {
            credentials,
            source: Mutex::new(self.credential_source),
            audit: AuditTrail::new(),
            transform: self.transform.unwrap_or_else(KeyedTransform::generate),
            sampler: self.sampler.unwrap_or_else(StabilitySampler::from_entropy),
            power_ok: AtomicBool::new(true),
            session: Mutex::new(Session {
                engagement: EngagementState::Disengaged,
                id: None,
                monitor: MonitorSlot::idle(),
            }),
            config: self.config,
        });
        tracing::info!(
            profile = ?inner.config.user_profile,
            "Tether coupling controller initialized"
        );
        CouplingController { inner }
    }
}
