// Library interface for passcode-lock
// The lock core plus the adapters the CLI and tests build on

pub mod biometrics;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crypto;
pub mod delegate;
pub mod events;
pub mod lock;
pub mod passcode;
pub mod repository;
pub mod state;
pub mod throttle;

pub use biometrics::{BiometricAuthenticator, BiometricOutcome, BiometricReply};
pub use config::PasscodeLockConfiguration;
pub use crypto::PasscodeCipher;
pub use controller::{LockViewModel, PasscodeLockController};
pub use delegate::{FailureReason, PasscodeLockDelegate};
pub use events::{EventHub, LifecycleEvent, SubscriptionId};
pub use lock::PasscodeLock;
pub use passcode::Passcode;
pub use repository::{FileRepository, InMemoryRepository, PasscodeRepository};
pub use state::{LockMode, PasscodeLockState};
pub use throttle::{
    LockoutSchedule, LockoutThrottlePolicy, NoThrottlePolicy, ThrottleMessage, ThrottlePolicy,
    ThrottleSnapshot,
};
