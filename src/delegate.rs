use std::fmt;

/// Why a submitted passcode was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// Entry was attempted but no passcode was ever set
    RepositoryHasNoPasscode,
    /// Candidate did not match; the user may retry
    IncorrectPasscode,
    /// Too many failures; the user has to wait for the lockout to end
    Throttled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::RepositoryHasNoPasscode => "no passcode has been set",
            FailureReason::IncorrectPasscode => "incorrect passcode",
            FailureReason::Throttled => "too many attempts",
        };
        f.write_str(text)
    }
}

/// Receives outcomes from a [`PasscodeLock`](crate::PasscodeLock)
///
/// The lock holds a non-owning reference, so implementors use interior
/// mutability for anything they record.
pub trait PasscodeLockDelegate {
    fn on_success(&self);

    fn on_failure(&self, reason: FailureReason);

    /// The active state (or its presentation) changed
    fn on_state_changed(&self);

    fn on_sign_added(&self, index: usize);

    fn on_sign_removed(&self, index: usize);
}
