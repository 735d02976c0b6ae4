use std::collections::VecDeque;
use std::sync::Mutex;
use zeroize::Zeroizing;

/// What the controller is asking the operator for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Biometric,
    EmergencyPassword,
}

impl PromptKind {
    pub fn prompt(self) -> &'static str {
        match self {
            Self::Biometric => "fingerprint",
            Self::EmergencyPassword => "emergency password",
        }
    }
}

/// Injected capability for requesting credentials from the operator.
///
/// The embedding application decides whether the backing implementation is
/// interactive, scripted, or absent. Absence of the *source* is a
/// configuration state the controller surfaces as
/// [`AuthError::SourceUnavailable`](crate::error::AuthError); a present
/// source answering `None` means the operator produced no input and is
/// treated as a denial.
pub trait CredentialSource: Send + Sync {
    fn request_credential(&self, kind: PromptKind) -> Option<Zeroizing<String>>;
}

/// Queue-backed credential source for test harnesses and headless embeddings.
///
/// Inputs are consumed front-to-back, one per request; an exhausted queue
/// answers `None`.
pub struct ScriptedCredentialSource {
    queue: Mutex<VecDeque<String>>,
}

impl ScriptedCredentialSource {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: Mutex::new(inputs.into_iter().map(Into::into).collect()),
        }
    }

    pub fn push(&self, input: impl Into<String>) {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        queue.push_back(input.into());
    }

    pub fn remaining(&self) -> usize {
        let queue = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        queue.len()
    }
}

impl CredentialSource for ScriptedCredentialSource {
    fn request_credential(&self, kind: PromptKind) -> Option<Zeroizing<String>> {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let input = queue.pop_front();
        if input.is_none() {
            tracing::warn!("Scripted credential source exhausted for {} prompt", kind.prompt());
        }
        input.map(Zeroizing::new)
    }
}

/// Terminal prompt source backed by `dialoguer`, for CLI embeddings.
#[cfg(feature = "interactive")]
pub struct PromptCredentialSource;

#[cfg(feature = "interactive")]
impl CredentialSource for PromptCredentialSource {
    fn request_credential(&self, kind: PromptKind) -> Option<Zeroizing<String>> {
        let input = match kind {
            PromptKind::Biometric => dialoguer::Input::<String>::new()
                .with_prompt(kind.prompt())
                .interact_text()
                .ok(),
            PromptKind::EmergencyPassword => dialoguer::Password::new()
                .with_prompt(kind.prompt())
                .interact()
                .ok(),
        };
        input.map(Zeroizing::new)
    }
}
