//! Storage for the reference passcode
//!
//! The lock only ever talks to [`PasscodeRepository`]. How the passcode is
//! persisted is up to the implementation.

pub mod file;

pub use file::FileRepository;

use crate::passcode::Passcode;
use crate::throttle::ThrottleSnapshot;
use anyhow::Result;
use parking_lot::Mutex;

/// Stores and retrieves the reference passcode
pub trait PasscodeRepository: Send + Sync {
    fn passcode(&self) -> Option<Passcode>;

    fn has_passcode(&self) -> bool {
        self.passcode().is_some()
    }

    fn save_passcode(&self, passcode: &Passcode) -> Result<()>;

    fn delete_passcode(&self) -> Result<()>;

    /// Throttle counters saved by an earlier lock, if the repository keeps them
    fn throttle_state(&self) -> Option<ThrottleSnapshot> {
        None
    }

    /// Remember throttle counters for the next lock over this repository
    fn save_throttle_state(&self, _state: &ThrottleSnapshot) -> Result<()> {
        Ok(())
    }
}

/// Repository that keeps the passcode in memory only
#[derive(Default)]
pub struct InMemoryRepository {
    passcode: Mutex<Option<Passcode>>,
    throttle: Mutex<Option<ThrottleSnapshot>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_passcode(passcode: Passcode) -> Self {
        Self {
            passcode: Mutex::new(Some(passcode)),
            throttle: Mutex::new(None),
        }
    }
}

impl PasscodeRepository for InMemoryRepository {
    fn passcode(&self) -> Option<Passcode> {
        self.passcode.lock().clone()
    }

    fn has_passcode(&self) -> bool {
        self.passcode.lock().is_some()
    }

    fn save_passcode(&self, passcode: &Passcode) -> Result<()> {
        *self.passcode.lock() = Some(passcode.clone());
        Ok(())
    }

    fn delete_passcode(&self) -> Result<()> {
        self.passcode.lock().take();
        self.throttle.lock().take();
        Ok(())
    }

    fn throttle_state(&self) -> Option<ThrottleSnapshot> {
        *self.throttle.lock()
    }

    fn save_throttle_state(&self, state: &ThrottleSnapshot) -> Result<()> {
        *self.throttle.lock() = Some(*state);
        Ok(())
    }
}
