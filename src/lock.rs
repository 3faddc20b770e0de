//! The passcode lock state machine
//!
//! [`PasscodeLock`] collects signs one at a time. When the buffer reaches the
//! configured length it hands the candidate to the active state, clears the
//! buffer, and applies whatever transition the state asked for. Outcomes are
//! reported to a delegate the lock does not own.

use crate::biometrics::{BiometricAuthenticator, BiometricOutcome, BiometricReply};
use crate::config::PasscodeLockConfiguration;
use crate::constants::{PASSCODE_LENGTH_MAX, PASSCODE_LENGTH_MIN};
use crate::delegate::PasscodeLockDelegate;
use crate::passcode::Passcode;
use crate::repository::PasscodeRepository;
use crate::state::{PasscodeLockState, StateContext, StateOutcome};
use crate::throttle::{ThrottleMessage, ThrottlePolicy, ThrottleSnapshot};
use log::{debug, error, info, warn};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Weak};

const DEFAULT_TOUCH_ID_REASON: &str = "Unlock with your fingerprint";

pub struct PasscodeLock {
    state: PasscodeLockState,
    configuration: PasscodeLockConfiguration,
    repository: Arc<dyn PasscodeRepository>,
    throttle: Box<dyn ThrottlePolicy>,
    delegate: Option<Weak<dyn PasscodeLockDelegate>>,
    signs: Vec<char>,
    authenticator: Option<Arc<dyn BiometricAuthenticator>>,
    biometric_tx: Sender<(u64, BiometricOutcome)>,
    biometric_rx: Receiver<(u64, BiometricOutcome)>,
    pending_biometric: Option<u64>,
    next_biometric_id: u64,
}

impl PasscodeLock {
    /// Create a lock whose throttle policy comes from `configuration`
    ///
    /// An out-of-range passcode length is clamped. Throttle counters the
    /// repository kept from an earlier lock are restored.
    pub fn new(
        state: PasscodeLockState,
        mut configuration: PasscodeLockConfiguration,
        repository: Arc<dyn PasscodeRepository>,
    ) -> Self {
        let length = configuration
            .passcode_length
            .clamp(PASSCODE_LENGTH_MIN, PASSCODE_LENGTH_MAX);
        if length != configuration.passcode_length {
            warn!(
                "Passcode length {} out of range, using {}",
                configuration.passcode_length, length
            );
            configuration.passcode_length = length;
        }

        let throttle = configuration.build_throttle_policy();
        let (biometric_tx, biometric_rx) = mpsc::channel();
        let mut lock = Self {
            state,
            signs: Vec::with_capacity(configuration.passcode_length),
            configuration,
            repository,
            throttle,
            delegate: None,
            authenticator: None,
            biometric_tx,
            biometric_rx,
            pending_biometric: None,
            next_biometric_id: 1,
        };
        lock.restore_throttle();
        lock
    }

    /// Replace the throttle policy built from the configuration
    pub fn with_throttle_policy(mut self, throttle: Box<dyn ThrottlePolicy>) -> Self {
        self.throttle = throttle;
        self.restore_throttle();
        self
    }

    fn restore_throttle(&mut self) {
        if let Some(snapshot) = self.repository.throttle_state() {
            self.throttle.restore(&snapshot);
        }
    }

    /// Hand changed throttle counters to the repository
    fn persist_throttle(&self, before: ThrottleSnapshot) {
        let after = self.throttle.snapshot();
        if after == before {
            return;
        }
        if let Err(e) = self.repository.save_throttle_state(&after) {
            error!("Failed to persist throttle state: {:#}", e);
        }
    }

    pub fn with_biometric_authenticator(
        mut self,
        authenticator: Arc<dyn BiometricAuthenticator>,
    ) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Register the delegate; only a weak reference is kept
    pub fn set_delegate<D: PasscodeLockDelegate + 'static>(&mut self, delegate: &Arc<D>) {
        let weak = Arc::downgrade(delegate);
        let weak: Weak<dyn PasscodeLockDelegate> = weak;
        self.delegate = Some(weak);
    }

    pub fn clear_delegate(&mut self) {
        self.delegate = None;
    }

    pub fn state(&self) -> &PasscodeLockState {
        &self.state
    }

    pub fn configuration(&self) -> &PasscodeLockConfiguration {
        &self.configuration
    }

    pub fn repository(&self) -> &Arc<dyn PasscodeRepository> {
        &self.repository
    }

    pub fn throttle(&self) -> &dyn ThrottlePolicy {
        self.throttle.as_ref()
    }

    pub fn throttle_message(&self) -> &ThrottleMessage {
        self.throttle.message()
    }

    /// Signs entered so far for the current candidate
    pub fn entered_signs(&self) -> usize {
        self.signs.len()
    }

    /// Biometrics are offered only if both the configuration and the state allow it
    pub fn is_touch_id_allowed(&self) -> bool {
        self.configuration.touch_id_allowed && self.state.is_touch_id_allowed()
    }

    pub fn is_biometric_pending(&self) -> bool {
        self.pending_biometric.is_some()
    }

    fn delegate(&self) -> Option<Arc<dyn PasscodeLockDelegate>> {
        self.delegate.as_ref().and_then(Weak::upgrade)
    }

    /// Append one sign; submits the candidate once the configured length is reached
    pub fn add_sign(&mut self, sign: char) {
        if !sign.is_ascii_digit() {
            warn!("Ignoring non-digit passcode sign");
            return;
        }

        self.signs.push(sign);
        let index = self.signs.len() - 1;
        if let Some(delegate) = self.delegate() {
            delegate.on_sign_added(index);
        }

        if self.signs.len() >= self.configuration.passcode_length {
            let candidate = Passcode::new(std::mem::take(&mut self.signs));
            self.submit(candidate);
        }
    }

    /// Drop the last sign; does nothing when the buffer is empty
    pub fn remove_sign(&mut self) {
        if self.signs.pop().is_none() {
            return;
        }
        let index = self.signs.len();
        if let Some(delegate) = self.delegate() {
            delegate.on_sign_removed(index);
        }
    }

    /// Replace the active state and start a fresh candidate
    pub fn change_state_to(&mut self, state: PasscodeLockState) {
        debug!(
            "Passcode lock state {:?} -> {:?}",
            self.state.mode(),
            state.mode()
        );
        self.state = state;
        self.signs.clear();
        if let Some(delegate) = self.delegate() {
            delegate.on_state_changed();
        }
    }

    fn submit(&mut self, candidate: Passcode) {
        let before = self.throttle.snapshot();
        let delegate = self.delegate();
        let mut ctx = StateContext {
            repository: self.repository.as_ref(),
            throttle: self.throttle.as_mut(),
            delegate: delegate.as_deref(),
        };
        let outcome = self.state.accept_passcode(candidate, &mut ctx);
        self.persist_throttle(before);
        self.apply(outcome);
    }

    fn apply(&mut self, outcome: StateOutcome) {
        match outcome {
            StateOutcome::Stay => {}
            StateOutcome::Refresh => {
                self.signs.clear();
                if let Some(delegate) = self.delegate() {
                    delegate.on_state_changed();
                }
            }
            StateOutcome::ChangeTo(next) => self.change_state_to(next),
        }
    }

    /// Ask the biometric authenticator to unlock
    ///
    /// Returns false without issuing a request when biometrics are not
    /// allowed, no passcode is stored, no authenticator is installed, or a
    /// previous request is still waiting for its reply.
    pub fn authenticate_with_biometrics(&mut self) -> bool {
        if let Some(id) = self.pending_biometric {
            debug!("Biometric request #{} still pending", id);
            return false;
        }
        if !self.is_touch_id_allowed() {
            debug!("Biometric unlock not allowed in {:?}", self.state.mode());
            return false;
        }
        if !self.repository.has_passcode() {
            debug!("No passcode stored, skipping biometric unlock");
            return false;
        }
        let Some(authenticator) = self.authenticator.clone() else {
            debug!("No biometric authenticator installed");
            return false;
        };

        let id = self.next_biometric_id;
        self.next_biometric_id += 1;
        self.pending_biometric = Some(id);

        let reason = self
            .configuration
            .touch_id_reason
            .as_deref()
            .unwrap_or(DEFAULT_TOUCH_ID_REASON);
        info!("Requesting biometric unlock #{}", id);
        authenticator.authenticate(reason, BiometricReply::new(id, self.biometric_tx.clone()));
        true
    }

    /// Apply the reply to the outstanding biometric request, if it arrived
    ///
    /// Call this from the thread that owns the lock. Replies to requests that
    /// are no longer outstanding are discarded.
    pub fn process_biometric_reply(&mut self) -> Option<BiometricOutcome> {
        loop {
            let (id, outcome) = self.biometric_rx.try_recv().ok()?;

            if self.pending_biometric != Some(id) {
                debug!("Discarding stale biometric reply #{}", id);
                continue;
            }
            self.pending_biometric = None;

            match &outcome {
                BiometricOutcome::Success => {
                    info!("Biometric unlock #{} succeeded", id);
                    self.succeed_with_biometrics();
                }
                BiometricOutcome::Failure(reason) => {
                    info!("Biometric unlock #{} failed: {}", id, reason);
                }
                BiometricOutcome::Cancelled => info!("Biometric unlock #{} cancelled", id),
                BiometricOutcome::Unavailable => warn!("Biometric unlock unavailable"),
            }
            return Some(outcome);
        }
    }

    fn succeed_with_biometrics(&mut self) {
        if !self.state.is_touch_id_allowed() {
            warn!(
                "Ignoring biometric success in {:?}, state changed since the request",
                self.state.mode()
            );
            return;
        }
        if !self.repository.has_passcode() {
            warn!("Ignoring biometric success, the passcode was removed since the request");
            return;
        }
        self.signs.clear();
        let before = self.throttle.snapshot();
        self.throttle.mark_success();
        self.persist_throttle(before);

        let delegate = self.delegate();
        let ctx = StateContext {
            repository: self.repository.as_ref(),
            throttle: self.throttle.as_mut(),
            delegate: delegate.as_deref(),
        };
        let outcome = self.state.on_verified(&ctx);
        self.apply(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use crate::throttle::NoThrottlePolicy;

    fn lock_with(passcode: Option<&str>) -> PasscodeLock {
        let repository = match passcode {
            Some(p) => InMemoryRepository::with_passcode(p.parse().unwrap()),
            None => InMemoryRepository::new(),
        };
        PasscodeLock::new(
            PasscodeLockState::enter(),
            PasscodeLockConfiguration::default(),
            Arc::new(repository),
        )
        .with_throttle_policy(Box::new(NoThrottlePolicy::new()))
    }

    #[test]
    fn test_buffer_clears_after_submission() {
        let mut lock = lock_with(Some("1234"));
        for sign in ['9', '9', '9'] {
            lock.add_sign(sign);
        }
        assert_eq!(lock.entered_signs(), 3);
        lock.add_sign('9');
        assert_eq!(lock.entered_signs(), 0);
    }

    #[test]
    fn test_non_digit_signs_ignored() {
        let mut lock = lock_with(Some("1234"));
        lock.add_sign('x');
        assert_eq!(lock.entered_signs(), 0);
    }

    #[test]
    fn test_remove_sign_on_empty_buffer() {
        let mut lock = lock_with(Some("1234"));
        lock.remove_sign();
        assert_eq!(lock.entered_signs(), 0);
        lock.add_sign('1');
        lock.remove_sign();
        lock.remove_sign();
        assert_eq!(lock.entered_signs(), 0);
    }

    #[test]
    fn test_change_state_clears_buffer() {
        let mut lock = lock_with(Some("1234"));
        lock.add_sign('1');
        lock.add_sign('2');
        lock.change_state_to(PasscodeLockState::set());
        assert_eq!(lock.entered_signs(), 0);
        assert!(!lock.is_touch_id_allowed());
    }

    #[test]
    fn test_out_of_range_length_is_clamped() {
        let configuration = PasscodeLockConfiguration {
            passcode_length: 0,
            ..Default::default()
        };
        let mut lock = PasscodeLock::new(
            PasscodeLockState::enter(),
            configuration,
            Arc::new(InMemoryRepository::with_passcode("1234".parse().unwrap())),
        );
        assert_eq!(lock.configuration().passcode_length, PASSCODE_LENGTH_MIN);

        lock.add_sign('1');
        assert_eq!(lock.entered_signs(), 1, "A single sign must not submit");
    }

    #[test]
    fn test_throttle_restored_from_repository() {
        let repository = Arc::new(InMemoryRepository::with_passcode("1234".parse().unwrap()));
        let mut first = PasscodeLock::new(
            PasscodeLockState::enter(),
            PasscodeLockConfiguration::default(),
            repository.clone(),
        );
        for _ in 0..3 {
            for sign in "0000".chars() {
                first.add_sign(sign);
            }
        }
        assert!(first.throttle().is_throttled());

        let second = PasscodeLock::new(
            PasscodeLockState::enter(),
            PasscodeLockConfiguration::default(),
            repository,
        );
        assert!(second.throttle().is_throttled());
        assert_eq!(second.throttle().failed_attempts(), 3);
    }

    #[test]
    fn test_biometrics_refused_without_authenticator() {
        let mut lock = lock_with(Some("1234"));
        assert!(!lock.authenticate_with_biometrics());
        assert!(!lock.is_biometric_pending());
    }
}
