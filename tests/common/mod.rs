// Shared fakes for integration tests
#![allow(dead_code)]

use anyhow::Result;
use parking_lot::Mutex;
use passcode_lock::{
    BiometricAuthenticator, BiometricOutcome, BiometricReply, FailureReason, Passcode,
    PasscodeLock, PasscodeLockConfiguration, PasscodeLockDelegate, PasscodeLockState,
    PasscodeRepository,
};
use std::sync::Arc;

/// Everything a delegate can be told
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Success,
    Failure(FailureReason),
    StateChanged,
    SignAdded(usize),
    SignRemoved(usize),
}

#[derive(Default)]
pub struct RecordingDelegate {
    events: Mutex<Vec<Event>>,
}

impl RecordingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Outcome events only, without sign notifications
    pub fn outcomes(&self) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| !matches!(e, Event::SignAdded(_) | Event::SignRemoved(_)))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl PasscodeLockDelegate for RecordingDelegate {
    fn on_success(&self) {
        self.events.lock().push(Event::Success);
    }

    fn on_failure(&self, reason: FailureReason) {
        self.events.lock().push(Event::Failure(reason));
    }

    fn on_state_changed(&self) {
        self.events.lock().push(Event::StateChanged);
    }

    fn on_sign_added(&self, index: usize) {
        self.events.lock().push(Event::SignAdded(index));
    }

    fn on_sign_removed(&self, index: usize) {
        self.events.lock().push(Event::SignRemoved(index));
    }
}

/// Repository that counts writes and can be told to fail them
#[derive(Default)]
pub struct FakeRepository {
    passcode: Mutex<Option<Passcode>>,
    saves: Mutex<usize>,
    fail_saves: Mutex<bool>,
}

impl FakeRepository {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_passcode(passcode: &str) -> Arc<Self> {
        let repository = Self::default();
        *repository.passcode.lock() = Some(passcode.parse().expect("Invalid test passcode"));
        Arc::new(repository)
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }

    pub fn fail_saves(&self, fail: bool) {
        *self.fail_saves.lock() = fail;
    }
}

impl PasscodeRepository for FakeRepository {
    fn passcode(&self) -> Option<Passcode> {
        self.passcode.lock().clone()
    }

    fn save_passcode(&self, passcode: &Passcode) -> Result<()> {
        if *self.fail_saves.lock() {
            anyhow::bail!("Disk full");
        }
        *self.saves.lock() += 1;
        *self.passcode.lock() = Some(passcode.clone());
        Ok(())
    }

    fn delete_passcode(&self) -> Result<()> {
        self.passcode.lock().take();
        Ok(())
    }
}

/// Authenticator that parks replies until the test resolves them
#[derive(Default)]
pub struct FakeAuthenticator {
    replies: Mutex<Vec<BiometricReply>>,
    requests: Mutex<Vec<String>>,
}

impl FakeAuthenticator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_reason(&self) -> Option<String> {
        self.requests.lock().last().cloned()
    }

    /// Resolve the oldest outstanding request
    pub fn resolve(&self, outcome: BiometricOutcome) {
        let reply = {
            let mut replies = self.replies.lock();
            assert!(!replies.is_empty(), "No outstanding biometric request");
            replies.remove(0)
        };
        reply.resolve(outcome);
    }

    /// Drop the oldest outstanding request without answering
    pub fn abandon(&self) {
        let reply = self.replies.lock().remove(0);
        drop(reply);
    }
}

impl BiometricAuthenticator for FakeAuthenticator {
    fn authenticate(&self, reason: &str, reply: BiometricReply) {
        self.requests.lock().push(reason.to_string());
        self.replies.lock().push(reply);
    }
}

pub fn configuration() -> PasscodeLockConfiguration {
    PasscodeLockConfiguration::default()
}

/// Lock over `repository` with the default configuration, delegate attached
pub fn lock_for(
    state: PasscodeLockState,
    repository: Arc<FakeRepository>,
    delegate: &Arc<RecordingDelegate>,
) -> PasscodeLock {
    let mut lock = PasscodeLock::new(state, configuration(), repository);
    lock.set_delegate(delegate);
    lock
}

pub fn enter(lock: &mut PasscodeLock, passcode: &str) {
    for sign in passcode.chars() {
        lock.add_sign(sign);
    }
}
