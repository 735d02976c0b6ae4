use std::sync::Mutex;
use zeroize::Zeroizing;

/// Registered authentication references for the coupling.
///
/// Holds the biometric reference and the optional emergency password, and
/// answers verification queries. Pure predicate evaluation: no side effects,
/// no history, and nothing here writes to the audit trail (callers log if
/// they need to). Shared between the controller and the safety monitor, so
/// both fields sit behind their own locks.
pub struct CredentialStore {
    biometric: Mutex<Option<Zeroizing<String>>>,
    emergency: Mutex<Option<Zeroizing<String>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self {
            biometric: Mutex::new(None),
            emergency: Mutex::new(None),
        }
    }

    pub fn set_biometric(&self, reference: &str) {
        let mut guard = self
            .biometric
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some(Zeroizing::new(reference.to_string()));
    }

    pub fn set_emergency(&self, password: &str) {
        let mut guard = self
            .emergency
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some(Zeroizing::new(password.to_string()));
    }

    /// `true` iff the candidate equals the stored reference. An absent
    /// reference is a verification failure, not an error.
    pub fn verify_biometric(&self, candidate: &str) -> bool {
        let guard = self
            .biometric
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard
            .as_ref()
            .is_some_and(|reference| reference.as_str() == candidate)
    }

    /// `true` iff an emergency password is configured and the candidate
    /// matches it under constant-time comparison.
    pub fn verify_emergency(&self, candidate: &str) -> bool {
        let guard = self
            .emergency
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard
            .as_ref()
            .is_some_and(|password| constant_time_eq(candidate, password))
    }

    pub fn has_emergency(&self) -> bool {
        let guard = self
            .emergency
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.is_some()
    }
}

/// Constant-time equality comparison for secret strings.
fn constant_time_eq(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
