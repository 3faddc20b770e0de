//! Presentation logic around a [`PasscodeLock`]
//!
//! The controller owns the lock on behalf of a UI. It decides what the screen
//! shows and when to ask for biometrics, and reacts to lifecycle events from
//! an [`EventHub`]. Rendering stays with the caller.

use crate::config::PasscodeLockConfiguration;
use crate::events::{EventHub, LifecycleEvent, SubscriptionId};
use crate::lock::PasscodeLock;
use crate::repository::PasscodeRepository;
use crate::state::{LockMode, PasscodeLockState};
use anyhow::{bail, Result};
use log::{debug, warn};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// Everything a lock screen needs to draw itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockViewModel {
    pub title: String,
    pub description: String,
    pub cancel_visible: bool,
    pub touch_id_visible: bool,
    pub delete_enabled: bool,
    pub filled_signs: usize,
    pub passcode_length: usize,
}

pub struct PasscodeLockController {
    lock: PasscodeLock,
    should_try_biometrics: bool,
    subscriptions: Vec<SubscriptionId>,
}

impl PasscodeLockController {
    pub fn new(
        mode: LockMode,
        configuration: PasscodeLockConfiguration,
        repository: Arc<dyn PasscodeRepository>,
    ) -> Self {
        Self::from_lock(PasscodeLock::new(
            PasscodeLockState::for_mode(mode),
            configuration,
            repository,
        ))
    }

    /// Refuse a flow that does not fit what `repository` holds
    ///
    /// Set only starts while no passcode is stored, so replacing one always
    /// goes through Change and its throttled verification. Every other flow
    /// needs a stored passcode.
    pub fn check_can_start(mode: LockMode, repository: &dyn PasscodeRepository) -> Result<()> {
        match (mode, repository.has_passcode()) {
            (LockMode::Set, true) => {
                bail!("A passcode is already set; change it instead of setting a new one")
            }
            (LockMode::Enter | LockMode::Change | LockMode::Remove, false) => {
                bail!("No passcode has been set yet")
            }
            _ => Ok(()),
        }
    }

    pub fn from_lock(lock: PasscodeLock) -> Self {
        Self {
            lock,
            should_try_biometrics: true,
            subscriptions: Vec::new(),
        }
    }

    pub fn lock(&self) -> &PasscodeLock {
        &self.lock
    }

    pub fn lock_mut(&mut self) -> &mut PasscodeLock {
        &mut self.lock
    }

    pub fn view_model(&self) -> LockViewModel {
        let state = self.lock.state();
        LockViewModel {
            title: state.title().to_string(),
            description: state.description().to_string(),
            cancel_visible: state.is_cancellable(),
            touch_id_visible: self.lock.is_touch_id_allowed(),
            delete_enabled: self.lock.entered_signs() > 0,
            filled_signs: self.lock.entered_signs(),
            passcode_length: self.lock.configuration().passcode_length,
        }
    }

    /// The lock screen became visible
    ///
    /// Prompts for biometrics if configured to do so immediately, unless the
    /// app went to the background since the controller was created.
    pub fn did_appear(&mut self) -> bool {
        if self.should_try_biometrics && self.lock.configuration().request_touch_id_immediately {
            return self.authenticate_with_biometrics();
        }
        false
    }

    /// Prompt for biometrics if a passcode exists and the state allows it
    pub fn authenticate_with_biometrics(&mut self) -> bool {
        if !self.lock.repository().has_passcode() {
            return false;
        }
        if !self.lock.is_touch_id_allowed() {
            return false;
        }
        self.lock.authenticate_with_biometrics()
    }

    pub fn handle_event(&mut self, event: LifecycleEvent) {
        debug!("Passcode lock controller received {:?}", event);
        match event {
            LifecycleEvent::WillEnterForeground => {
                if self.lock.configuration().request_touch_id_immediately {
                    self.authenticate_with_biometrics();
                }
            }
            LifecycleEvent::DidEnterBackground => {
                self.should_try_biometrics = false;
            }
        }
    }

    /// Register foreground/background handlers for `controller` on `hub`
    ///
    /// The handlers only hold a weak reference, so a dropped controller
    /// simply stops reacting.
    pub fn subscribe(controller: &Rc<RefCell<Self>>, hub: &mut EventHub) {
        let mut ids = Vec::with_capacity(2);
        for event in [
            LifecycleEvent::WillEnterForeground,
            LifecycleEvent::DidEnterBackground,
        ] {
            let weak: Weak<RefCell<Self>> = Rc::downgrade(controller);
            ids.push(hub.register(event, move |event| {
                let Some(controller) = weak.upgrade() else {
                    return;
                };
                match controller.try_borrow_mut() {
                    Ok(mut controller) => controller.handle_event(event),
                    Err(_) => warn!("Passcode lock controller busy, dropping {:?}", event),
                };
            }));
        }
        controller.borrow_mut().subscriptions.extend(ids);
    }

    /// Remove every handler registered by [`subscribe`](Self::subscribe)
    pub fn unsubscribe(&mut self, hub: &mut EventHub) {
        for id in self.subscriptions.drain(..) {
            hub.unregister(id);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        !self.subscriptions.is_empty()
    }
}
