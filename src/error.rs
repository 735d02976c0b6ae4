use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `NanoTether`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
///
/// Recoverable outcomes (wrong credential, precondition no-op, failed safety
/// pre-check) are reported as `Ok(false)` by the controller operations, not
/// as errors; only structural failures surface here.
#[derive(Debug, Error)]
pub enum CouplingError {
    // ── Authentication ──────────────────────────────────────────────────
    #[error("auth: {0}")]
    Auth(#[from] AuthError),

    // ── Config ──────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Safety monitor ──────────────────────────────────────────────────
    #[error("monitor: {0}")]
    Monitor(#[from] MonitorError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Authentication errors ───────────────────────────────────────────────────

/// Structural authentication failures.
///
/// A wrong credential is not an error: verification answers `false` and the
/// caller decides whether to retry. This covers the case where verification
/// could not even be attempted.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No interactive credential source was injected. Callers must treat
    /// this as "cannot authenticate interactively", never as a denial.
    #[error("no credential source configured for interactive input")]
    SourceUnavailable,
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Safety monitor errors ───────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MonitorError {
    /// The worker did not exit within the join grace period. Non-fatal: the
    /// caller logs the anomaly and forces the logical state to a safe
    /// terminal value.
    #[error("safety monitor did not exit within {grace_secs}s grace period")]
    ShutdownTimeout { grace_secs: f64 },

    #[error("safety monitor task panicked: {0}")]
    Panicked(String),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, CouplingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_source_unavailable_displays_correctly() {
        let err = CouplingError::Auth(AuthError::SourceUnavailable);
        assert!(err.to_string().contains("no credential source"));
    }

    #[test]
    fn shutdown_timeout_displays_grace() {
        let err = CouplingError::Monitor(MonitorError::ShutdownTimeout { grace_secs: 3.0 });
        assert!(err.to_string().contains("3s"));
    }

    #[test]
    fn config_error_displays_correctly() {
        let err = CouplingError::Config(ConfigError::Validation("threshold out of range".into()));
        assert!(err.to_string().contains("validation failed"));
    }

    #[test]
    fn anyhow_interop() {
        let anyhow_err = anyhow::anyhow!("something went wrong");
        let err: CouplingError = anyhow_err.into();
        assert!(err.to_string().contains("something went wrong"));
    }
}
