//! Centralized constants for the passcode lock
//!
//! This module contains all configurable numerical values used throughout
//! the crate. Each constant includes documentation on its purpose,
//! unit, and recommended value range.

// ============================================================================
// PASSCODE SHAPE
// ============================================================================

/// Default number of signs in a passcode.
/// Unit: signs
/// Recommended range: 4-6
pub const PASSCODE_LENGTH_DEFAULT: usize = 4;

/// Shortest passcode a configuration may ask for.
/// Unit: signs
pub const PASSCODE_LENGTH_MIN: usize = 4;

/// Longest passcode a configuration may ask for.
/// Unit: signs
pub const PASSCODE_LENGTH_MAX: usize = 8;

// ============================================================================
// THROTTLING
// ============================================================================

/// Default number of incorrect attempts before the lock throttles.
/// Unit: attempts
/// Recommended range: 3-10
pub const MAX_ATTEMPTS_DEFAULT: u32 = 3;

/// Minimum allowed value for the incorrect attempt limit.
/// Unit: attempts
pub const MAX_ATTEMPTS_MIN: u32 = 1;

/// Maximum allowed value for the incorrect attempt limit.
/// Unit: attempts
pub const MAX_ATTEMPTS_MAX: u32 = 20;

/// Default lockout window once the attempt limit is reached.
/// Unit: seconds
/// Recommended range: 30-300
pub const LOCKOUT_DEFAULT_SECONDS: u64 = 30;

/// Minimum lockout window.
/// Unit: seconds
pub const LOCKOUT_MIN_SECONDS: u64 = 1;

/// Maximum lockout window (24 hours).
/// Unit: seconds
pub const LOCKOUT_MAX_SECONDS: u64 = 24 * 60 * 60;

/// Default throttle alert title.
pub const THROTTLE_TITLE_DEFAULT: &str = "Too many attempts";

/// Default throttle alert body.
pub const THROTTLE_BODY_DEFAULT: &str = "Please wait before trying again.";

// ============================================================================
// FILE PERMISSIONS
// ============================================================================

/// Passcode store and config file permissions (user read/write only).
/// Unit: Unix permission bits (octal)
pub const STORE_FILE_PERMISSIONS: u32 = 0o600;

/// Permission mask to check for group/other access (security check).
/// Unit: Unix permission bits (octal)
pub const PERMISSION_MASK_GROUP_OTHER: u32 = 0o077;

// ============================================================================
// CRYPTOGRAPHY
// ============================================================================

/// AES-256-GCM nonce length.
/// Unit: bytes
/// Range: Fixed at 12 bytes (96 bits), the standard GCM nonce size
pub const NONCE_LENGTH_BYTES: usize = 12;

/// On-disk passcode store format. Bound into the cipher's associated data.
/// Unit: version number
pub const STORE_FORMAT_VERSION: u32 = 1;
