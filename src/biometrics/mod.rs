//! Biometric unlock
//!
//! Authentication happens outside the lock, possibly on another thread. Each
//! request hands the authenticator a [`BiometricReply`] that must be resolved
//! exactly once; dropping it unresolved reports a cancellation. Replies travel
//! back over a channel that the lock drains on its own thread.

pub mod system;

pub use system::SystemBiometricAuthenticator;

use std::sync::mpsc::Sender;

/// Result of one biometric prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiometricOutcome {
    Success,
    Failure(String),
    Cancelled,
    Unavailable,
}

impl BiometricOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BiometricOutcome::Success)
    }
}

/// One-shot reply handle for a biometric request
pub struct BiometricReply {
    request_id: u64,
    sender: Option<Sender<(u64, BiometricOutcome)>>,
}

impl BiometricReply {
    pub(crate) fn new(request_id: u64, sender: Sender<(u64, BiometricOutcome)>) -> Self {
        Self {
            request_id,
            sender: Some(sender),
        }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Deliver the outcome to the lock
    pub fn resolve(mut self, outcome: BiometricOutcome) {
        self.send(outcome);
    }

    fn send(&mut self, outcome: BiometricOutcome) {
        if let Some(sender) = self.sender.take() {
            // The lock may already be gone
            if sender.send((self.request_id, outcome)).is_err() {
                log::debug!("Biometric reply #{} had no receiver", self.request_id);
            }
        }
    }
}

impl Drop for BiometricReply {
    fn drop(&mut self) {
        self.send(BiometricOutcome::Cancelled);
    }
}

/// Performs a biometric prompt on behalf of the lock
pub trait BiometricAuthenticator: Send + Sync {
    /// Start a prompt; `reply` must eventually be resolved (or dropped)
    fn authenticate(&self, reason: &str, reply: BiometricReply);
}
