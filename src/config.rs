use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

// ── Operator profile ─────────────────────────────────────────────

/// Selects the gyro threshold used by the pre-disengage safety check. The
/// restricted profile tolerates less instability before blocking a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserProfile {
    #[default]
    Adult,
    #[serde(alias = "kid")]
    Child,
}

// ── Coupling config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouplingConfig {
    #[serde(default)]
    pub user_profile: UserProfile,

    /// Gyro stability draw must exceed this for an unrestricted profile
    /// before a control disengage is allowed (default: 0.2)
    #[serde(default = "default_gyro_threshold_adult")]
    pub gyro_threshold_adult: f64,

    /// Same gate for the restricted profile (default: 0.1)
    #[serde(default = "default_gyro_threshold_child")]
    pub gyro_threshold_child: f64,

    /// A monitor sample at or below this classifies as an instability alert
    /// (default: 0.1)
    #[serde(default = "default_instability_threshold")]
    pub instability_threshold: f64,

    /// Consecutive alerts before the monitor escalates (default: 2)
    #[serde(default = "default_escalation_alert_limit")]
    pub escalation_alert_limit: u32,

    /// Wait between monitor ticks, interruptible by a stop request
    /// (default: 5s)
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: f64,

    /// How long a disengage waits for the monitor worker to join before
    /// reporting a degraded shutdown (default: 3s)
    #[serde(default = "default_monitor_join_grace_secs")]
    pub monitor_join_grace_secs: f64,
}

fn default_gyro_threshold_adult() -> f64 {
    0.2
}

fn default_gyro_threshold_child() -> f64 {
    0.1
}

fn default_instability_threshold() -> f64 {
    0.1
}

fn default_escalation_alert_limit() -> u32 {
    2
}

fn default_monitor_interval_secs() -> f64 {
    5.0
}

fn default_monitor_join_grace_secs() -> f64 {
    3.0
}

impl Default for CouplingConfig {
    fn default() -> Self {
        Self {
            user_profile: UserProfile::default(),
            gyro_threshold_adult: default_gyro_threshold_adult(),
            gyro_threshold_child: default_gyro_threshold_child(),
            instability_threshold: default_instability_threshold(),
            escalation_alert_limit: default_escalation_alert_limit(),
            monitor_interval_secs: default_monitor_interval_secs(),
            monitor_join_grace_secs: default_monitor_join_grace_secs(),
        }
    }
}

impl CouplingConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("gyro_threshold_adult", self.gyro_threshold_adult),
            ("gyro_threshold_child", self.gyro_threshold_child),
            ("instability_threshold", self.instability_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.escalation_alert_limit == 0 {
            return Err(ConfigError::Validation(
                "escalation_alert_limit must be at least 1".into(),
            ));
        }
        if self.monitor_interval_secs <= 0.0 {
            return Err(ConfigError::Validation(
                "monitor_interval_secs must be positive".into(),
            ));
        }
        if self.monitor_join_grace_secs <= 0.0 {
            return Err(ConfigError::Validation(
                "monitor_join_grace_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Gyro threshold for the configured profile.
    pub fn gyro_threshold(&self) -> f64 {
        match self.user_profile {
            UserProfile::Adult => self.gyro_threshold_adult,
            UserProfile::Child => self.gyro_threshold_child,
        }
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs_f64(self.monitor_interval_secs)
    }

    pub fn monitor_join_grace(&self) -> Duration {
        Duration::from_secs_f64(self.monitor_join_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CouplingConfig::default();
        assert_eq!(config.user_profile, UserProfile::Adult);
        assert_eq!(config.gyro_threshold_adult, 0.2);
        assert_eq!(config.gyro_threshold_child, 0.1);
        assert_eq!(config.instability_threshold, 0.1);
        assert_eq!(config.escalation_alert_limit, 2);
        assert_eq!(config.monitor_interval(), Duration::from_secs(5));
        assert_eq!(config.monitor_join_grace(), Duration::from_secs(3));
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = CouplingConfig::from_toml_str(
            r#"
            user_profile = "child"
            monitor_interval_secs = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.user_profile, UserProfile::Child);
        assert_eq!(config.monitor_interval(), Duration::from_millis(500));
        assert_eq!(config.escalation_alert_limit, 2);
    }

    #[test]
    fn legacy_kid_alias_is_accepted() {
        let config = CouplingConfig::from_toml_str(r#"user_profile = "kid""#).unwrap();
        assert_eq!(config.user_profile, UserProfile::Child);
    }

    #[test]
    fn profile_selects_gyro_threshold() {
        let mut config = CouplingConfig::default();
        assert_eq!(config.gyro_threshold(), 0.2);
        config.user_profile = UserProfile::Child;
        assert_eq!(config.gyro_threshold(), 0.1);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let err = CouplingConfig::from_toml_str("instability_threshold = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn zero_alert_limit_is_rejected() {
        let err = CouplingConfig::from_toml_str("escalation_alert_limit = 0").unwrap_err();
        assert!(err.to_string().contains("escalation_alert_limit"));
    }

    #[test]
    fn load_reads_a_toml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("coupling.toml");
        std::fs::write(&path, "gyro_threshold_adult = 0.3\n").unwrap();
        let config = CouplingConfig::load(&path).unwrap();
        assert_eq!(config.gyro_threshold_adult, 0.3);
    }

    #[test]
    fn load_missing_file_is_an_io_error() {
        let err = CouplingConfig::load(Path::new("/nonexistent/coupling.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
