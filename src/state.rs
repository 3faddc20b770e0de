//! Lock states and their validation logic
//!
//! Every state reacts to a completed candidate passcode. Enter, Change and
//! Remove verify the candidate against the repository under the throttle
//! policy; Set collects a new passcode in two phases and never looks at the
//! stored one.

use crate::delegate::{FailureReason, PasscodeLockDelegate};
use crate::passcode::Passcode;
use crate::repository::PasscodeRepository;
use crate::throttle::ThrottlePolicy;
use log::{debug, error, info};

pub const ENTER_TITLE: &str = "Enter Passcode";
pub const ENTER_DESCRIPTION: &str = "Enter your passcode to proceed.";
pub const SET_TITLE: &str = "Enter Passcode";
pub const SET_DESCRIPTION: &str = "Enter a new passcode.";
pub const CONFIRM_TITLE: &str = "Confirm Passcode";
pub const CONFIRM_DESCRIPTION: &str = "Enter the passcode again.";
pub const MISMATCH_TITLE: &str = "Try again";
pub const MISMATCH_DESCRIPTION: &str = "Passcodes didn't match.";
pub const CHANGE_TITLE: &str = "Enter Passcode";
pub const CHANGE_DESCRIPTION: &str = "Enter your old passcode.";

/// Which flow the lock is presented for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Enter,
    Set,
    Change,
    Remove,
}

/// Collaborators a state may touch while handling a candidate
pub struct StateContext<'a> {
    pub repository: &'a dyn PasscodeRepository,
    pub throttle: &'a mut dyn ThrottlePolicy,
    pub delegate: Option<&'a dyn PasscodeLockDelegate>,
}

impl StateContext<'_> {
    fn succeed(&self) {
        if let Some(delegate) = self.delegate {
            delegate.on_success();
        }
    }

    fn fail(&self, reason: FailureReason) {
        debug!("Passcode rejected: {}", reason);
        if let Some(delegate) = self.delegate {
            delegate.on_failure(reason);
        }
    }
}

/// What the lock should do after a state handled a candidate
#[derive(Debug)]
pub enum StateOutcome {
    /// Nothing changed from the lock's point of view
    Stay,
    /// The state's presentation changed (Set moved between phases)
    Refresh,
    /// Replace the active state
    ChangeTo(PasscodeLockState),
}

/// Run the shared verification against the stored passcode
///
/// Returns true when the candidate matched and the throttle recorded a
/// success. Every other outcome has already been reported to the delegate.
fn verify(candidate: &Passcode, ctx: &mut StateContext<'_>) -> bool {
    let Some(current) = ctx.repository.passcode() else {
        ctx.fail(FailureReason::RepositoryHasNoPasscode);
        return false;
    };

    if ctx.throttle.is_throttled() {
        ctx.fail(FailureReason::Throttled);
        return false;
    }

    if *candidate == current {
        ctx.throttle.mark_success();
        return true;
    }

    ctx.throttle.mark_failure();
    if ctx.throttle.is_throttled() {
        ctx.fail(FailureReason::Throttled);
    } else {
        ctx.fail(FailureReason::IncorrectPasscode);
    }
    false
}

/// Unlock with the current passcode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnterPasscodeState {
    pub title: String,
    pub description: String,
    allow_cancellation: bool,
}

impl EnterPasscodeState {
    pub fn new(allow_cancellation: bool) -> Self {
        Self {
            title: ENTER_TITLE.to_string(),
            description: ENTER_DESCRIPTION.to_string(),
            allow_cancellation,
        }
    }
}

impl Default for EnterPasscodeState {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Phase of the two-step Set flow
#[derive(Debug, Clone, PartialEq, Eq)]
enum SetPhase {
    Choose,
    Confirm(Passcode),
}

/// Choose a new passcode and confirm it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetPasscodeState {
    pub title: String,
    pub description: String,
    phase: SetPhase,
}

impl SetPasscodeState {
    pub fn new() -> Self {
        Self::with_texts(SET_TITLE, SET_DESCRIPTION)
    }

    pub fn with_texts(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            phase: SetPhase::Choose,
        }
    }

    /// Whether a first entry is waiting for confirmation
    pub fn is_confirming(&self) -> bool {
        matches!(self.phase, SetPhase::Confirm(_))
    }

    fn restart(&mut self, title: &str, description: &str) {
        *self = Self::with_texts(title, description);
    }

    fn accept(&mut self, candidate: Passcode, ctx: &mut StateContext<'_>) -> StateOutcome {
        match std::mem::replace(&mut self.phase, SetPhase::Choose) {
            SetPhase::Choose => {
                self.phase = SetPhase::Confirm(candidate);
                self.title = CONFIRM_TITLE.to_string();
                self.description = CONFIRM_DESCRIPTION.to_string();
                StateOutcome::Refresh
            }
            SetPhase::Confirm(pending) if pending == candidate => {
                match ctx.repository.save_passcode(&candidate) {
                    Ok(()) => {
                        info!("New passcode confirmed and saved");
                        self.restart(SET_TITLE, SET_DESCRIPTION);
                        ctx.succeed();
                        StateOutcome::Stay
                    }
                    Err(e) => {
                        error!("Failed to save new passcode: {:#}", e);
                        self.restart(SET_TITLE, SET_DESCRIPTION);
                        StateOutcome::Refresh
                    }
                }
            }
            SetPhase::Confirm(_) => {
                debug!("Passcode confirmation mismatch, restarting");
                self.restart(MISMATCH_TITLE, MISMATCH_DESCRIPTION);
                StateOutcome::Refresh
            }
        }
    }
}

impl Default for SetPasscodeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Verify the old passcode before choosing a new one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePasscodeState {
    pub title: String,
    pub description: String,
}

impl ChangePasscodeState {
    pub fn new() -> Self {
        Self {
            title: CHANGE_TITLE.to_string(),
            description: CHANGE_DESCRIPTION.to_string(),
        }
    }
}

impl Default for ChangePasscodeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Verify the passcode before the caller deletes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovePasscodeState {
    pub title: String,
    pub description: String,
}

impl RemovePasscodeState {
    pub fn new() -> Self {
        Self {
            title: ENTER_TITLE.to_string(),
            description: ENTER_DESCRIPTION.to_string(),
        }
    }
}

impl Default for RemovePasscodeState {
    fn default() -> Self {
        Self::new()
    }
}

/// The active mode of a [`PasscodeLock`](crate::PasscodeLock)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasscodeLockState {
    Enter(EnterPasscodeState),
    Set(SetPasscodeState),
    Change(ChangePasscodeState),
    Remove(RemovePasscodeState),
}

impl PasscodeLockState {
    pub fn enter() -> Self {
        Self::Enter(EnterPasscodeState::default())
    }

    pub fn set() -> Self {
        Self::Set(SetPasscodeState::new())
    }

    pub fn change() -> Self {
        Self::Change(ChangePasscodeState::new())
    }

    pub fn remove() -> Self {
        Self::Remove(RemovePasscodeState::new())
    }

    pub fn for_mode(mode: LockMode) -> Self {
        match mode {
            LockMode::Enter => Self::enter(),
            LockMode::Set => Self::set(),
            LockMode::Change => Self::change(),
            LockMode::Remove => Self::remove(),
        }
    }

    pub fn mode(&self) -> LockMode {
        match self {
            Self::Enter(_) => LockMode::Enter,
            Self::Set(_) => LockMode::Set,
            Self::Change(_) => LockMode::Change,
            Self::Remove(_) => LockMode::Remove,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Enter(s) => &s.title,
            Self::Set(s) => &s.title,
            Self::Change(s) => &s.title,
            Self::Remove(s) => &s.title,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Enter(s) => &s.description,
            Self::Set(s) => &s.description,
            Self::Change(s) => &s.description,
            Self::Remove(s) => &s.description,
        }
    }

    /// Whether the surrounding UI offers a cancel action
    pub fn is_cancellable(&self) -> bool {
        match self {
            Self::Enter(s) => s.allow_cancellation,
            Self::Remove(_) => true,
            Self::Set(_) | Self::Change(_) => false,
        }
    }

    /// Whether this state accepts biometric unlock in place of a passcode
    pub fn is_touch_id_allowed(&self) -> bool {
        matches!(self, Self::Enter(_) | Self::Remove(_))
    }

    /// Handle a completed candidate passcode
    pub fn accept_passcode(
        &mut self,
        candidate: Passcode,
        ctx: &mut StateContext<'_>,
    ) -> StateOutcome {
        match self {
            Self::Set(state) => state.accept(candidate, ctx),
            Self::Enter(_) | Self::Remove(_) | Self::Change(_) => {
                if verify(&candidate, ctx) {
                    self.on_verified(ctx)
                } else {
                    StateOutcome::Stay
                }
            }
        }
    }

    /// Success action once the user proved knowledge of the passcode
    pub(crate) fn on_verified(&self, ctx: &StateContext<'_>) -> StateOutcome {
        match self {
            Self::Enter(_) | Self::Remove(_) => {
                ctx.succeed();
                StateOutcome::Stay
            }
            Self::Change(_) => StateOutcome::ChangeTo(Self::set()),
            Self::Set(_) => StateOutcome::Stay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use crate::throttle::{LockoutSchedule, LockoutThrottlePolicy, ThrottleMessage};
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl PasscodeLockDelegate for Recorder {
        fn on_success(&self) {
            self.events.lock().push("success".into());
        }
        fn on_failure(&self, reason: FailureReason) {
            self.events.lock().push(format!("failure:{:?}", reason));
        }
        fn on_state_changed(&self) {}
        fn on_sign_added(&self, _index: usize) {}
        fn on_sign_removed(&self, _index: usize) {}
    }

    fn passcode(s: &str) -> Passcode {
        s.parse().unwrap()
    }

    fn throttle() -> LockoutThrottlePolicy {
        LockoutThrottlePolicy::new(
            LockoutSchedule::fixed(2, Duration::from_secs(60)),
            ThrottleMessage::default(),
        )
    }

    #[test]
    fn test_enter_accepts_matching_passcode() {
        let repository = InMemoryRepository::with_passcode(passcode("1234"));
        let mut throttle = throttle();
        let recorder = Recorder::default();
        let mut ctx = StateContext {
            repository: &repository,
            throttle: &mut throttle,
            delegate: Some(&recorder),
        };

        let mut state = PasscodeLockState::enter();
        let outcome = state.accept_passcode(passcode("1234"), &mut ctx);

        assert!(matches!(outcome, StateOutcome::Stay));
        assert_eq!(*recorder.events.lock(), vec!["success".to_string()]);
    }

    #[test]
    fn test_change_moves_to_set_on_match() {
        let repository = InMemoryRepository::with_passcode(passcode("1234"));
        let mut throttle = throttle();
        let mut ctx = StateContext {
            repository: &repository,
            throttle: &mut throttle,
            delegate: None,
        };

        let mut state = PasscodeLockState::change();
        let outcome = state.accept_passcode(passcode("1234"), &mut ctx);

        match outcome {
            StateOutcome::ChangeTo(next) => assert_eq!(next.mode(), LockMode::Set),
            other => panic!("Expected a transition, got {:?}", other),
        }
    }

    #[test]
    fn test_set_phases() {
        let repository = InMemoryRepository::new();
        let mut throttle = throttle();
        let mut ctx = StateContext {
            repository: &repository,
            throttle: &mut throttle,
            delegate: None,
        };

        let mut state = SetPasscodeState::new();
        assert!(matches!(
            state.accept(passcode("2468"), &mut ctx),
            StateOutcome::Refresh
        ));
        assert!(state.is_confirming());
        assert_eq!(state.title, CONFIRM_TITLE);

        assert!(matches!(
            state.accept(passcode("1111"), &mut ctx),
            StateOutcome::Refresh
        ));
        assert!(!state.is_confirming());
        assert_eq!(state.title, MISMATCH_TITLE);
        assert_eq!(state.description, MISMATCH_DESCRIPTION);
        assert!(!repository.has_passcode());
    }

    #[test]
    fn test_flags_per_state() {
        assert!(!PasscodeLockState::enter().is_cancellable());
        assert!(PasscodeLockState::Enter(EnterPasscodeState::new(true)).is_cancellable());
        assert!(PasscodeLockState::remove().is_cancellable());
        assert!(!PasscodeLockState::set().is_cancellable());
        assert!(!PasscodeLockState::change().is_cancellable());

        assert!(PasscodeLockState::enter().is_touch_id_allowed());
        assert!(PasscodeLockState::remove().is_touch_id_allowed());
        assert!(!PasscodeLockState::set().is_touch_id_allowed());
        assert!(!PasscodeLockState::change().is_touch_id_allowed());
    }

    #[test]
    fn test_texts_per_mode() {
        assert_eq!(PasscodeLockState::enter().description(), ENTER_DESCRIPTION);
        assert_eq!(PasscodeLockState::set().description(), SET_DESCRIPTION);
        assert_eq!(PasscodeLockState::change().description(), CHANGE_DESCRIPTION);
        assert_eq!(PasscodeLockState::remove().title(), ENTER_TITLE);
    }
}
