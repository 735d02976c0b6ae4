#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use,
    clippy::cast_precision_loss
)]

pub mod audit;
pub mod config;
pub mod controller;
pub mod error;
pub mod monitor;
pub mod physics;
pub mod security;
pub mod stability;

pub use audit::{AuditEntry, AuditTrail};
pub use config::{CouplingConfig, UserProfile};
pub use controller::{CouplingController, CouplingControllerBuilder, EngagementState};
pub use error::{AuthError, ConfigError, CouplingError, MonitorError, Result};
pub use monitor::MonitorState;
pub use physics::{PhysicsSample, ZeroGravitySimulation};
#[cfg(feature = "interactive")]
pub use security::PromptCredentialSource;
pub use security::{
    CredentialSource, CredentialStore, KeyedTransform, PromptKind, ScriptedCredentialSource,
};
pub use stability::StabilitySampler;
