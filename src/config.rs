//! Configuration for the passcode lock
//!
//! Settings are read from `config.toml` in the standard config directory.
//! Environment variables can optionally override the throttling settings:
//! - PASSCODE_LOCK_MAX_ATTEMPTS: incorrect attempts before throttling
//! - PASSCODE_LOCK_LOCKOUT_SECONDS: length of the lockout window

use crate::constants::{
    LOCKOUT_DEFAULT_SECONDS, LOCKOUT_MAX_SECONDS, LOCKOUT_MIN_SECONDS, MAX_ATTEMPTS_DEFAULT,
    MAX_ATTEMPTS_MAX, MAX_ATTEMPTS_MIN, PASSCODE_LENGTH_DEFAULT, PASSCODE_LENGTH_MAX,
    PASSCODE_LENGTH_MIN, STORE_FILE_PERMISSIONS,
};
use crate::throttle::{
    LockoutSchedule, LockoutThrottlePolicy, NoThrottlePolicy, ThrottleMessage, ThrottlePolicy,
};
use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

pub const ENV_MAX_ATTEMPTS: &str = "PASSCODE_LOCK_MAX_ATTEMPTS";
pub const ENV_LOCKOUT_SECONDS: &str = "PASSCODE_LOCK_LOCKOUT_SECONDS";

/// Settings consumed by the lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasscodeLockConfiguration {
    /// Number of signs in a passcode
    pub passcode_length: usize,
    /// Incorrect attempts allowed before the lock throttles
    pub maximum_incorrect_attempts: u32,
    /// Lockout window in seconds once throttled
    pub lockout_seconds: u64,
    /// Disable to never throttle
    pub throttling_enabled: bool,
    /// Whether biometric unlock may be offered at all
    pub touch_id_allowed: bool,
    /// Prompt for biometrics as soon as the lock appears
    pub request_touch_id_immediately: bool,
    /// Reason shown by the biometric prompt
    pub touch_id_reason: Option<String>,
    pub throttle_message: ThrottleMessage,
}

impl Default for PasscodeLockConfiguration {
    fn default() -> Self {
        Self {
            passcode_length: PASSCODE_LENGTH_DEFAULT,
            maximum_incorrect_attempts: MAX_ATTEMPTS_DEFAULT,
            lockout_seconds: LOCKOUT_DEFAULT_SECONDS,
            throttling_enabled: true,
            touch_id_allowed: true,
            request_touch_id_immediately: false,
            touch_id_reason: None,
            throttle_message: ThrottleMessage::default(),
        }
    }
}

impl PasscodeLockConfiguration {
    /// Get the standard config file path
    ///
    /// - macOS: `~/Library/Application Support/passcode-lock/config.toml`
    /// - Linux: `~/.config/passcode-lock/config.toml`
    pub fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("passcode-lock");
        Ok(dir.join("config.toml"))
    }

    /// Load config from the standard location, falling back to defaults
    /// when no file exists
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&path)
    }

    /// Load config from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Config file doesn't exist
    /// - Failed to read file
    /// - TOML parsing fails
    /// - A value is out of range
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Configuration file not found at: {}", path.display());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&contents).context("Failed to parse config file")?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Save config to a specific path with 600 permissions
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        #[cfg(unix)]
        {
            let mut permissions = fs::metadata(path)?.permissions();
            permissions.set_mode(STORE_FILE_PERMISSIONS);
            fs::set_permissions(path, permissions)
                .context("Failed to set config file permissions")?;
        }

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Check every value against its allowed range
    pub fn validate(&self) -> Result<()> {
        if !(PASSCODE_LENGTH_MIN..=PASSCODE_LENGTH_MAX).contains(&self.passcode_length) {
            anyhow::bail!(
                "passcode_length must be {}-{} (got {})",
                PASSCODE_LENGTH_MIN,
                PASSCODE_LENGTH_MAX,
                self.passcode_length
            );
        }
        if !(MAX_ATTEMPTS_MIN..=MAX_ATTEMPTS_MAX).contains(&self.maximum_incorrect_attempts) {
            anyhow::bail!(
                "maximum_incorrect_attempts must be {}-{} (got {})",
                MAX_ATTEMPTS_MIN,
                MAX_ATTEMPTS_MAX,
                self.maximum_incorrect_attempts
            );
        }
        if !(LOCKOUT_MIN_SECONDS..=LOCKOUT_MAX_SECONDS).contains(&self.lockout_seconds) {
            anyhow::bail!(
                "lockout_seconds must be {}-{} (got {})",
                LOCKOUT_MIN_SECONDS,
                LOCKOUT_MAX_SECONDS,
                self.lockout_seconds
            );
        }
        Ok(())
    }

    /// Apply environment variable overrides; invalid values are ignored
    pub fn apply_env_overrides(&mut self) {
        if let Some(attempts) = parse_max_attempts() {
            self.maximum_incorrect_attempts = attempts;
        }
        if let Some(seconds) = parse_lockout_seconds() {
            self.lockout_seconds = seconds;
        }
    }

    pub fn lockout_duration(&self) -> Duration {
        Duration::from_secs(self.lockout_seconds)
    }

    /// Build the throttle policy these settings describe
    pub fn build_throttle_policy(&self) -> Box<dyn ThrottlePolicy> {
        if !self.throttling_enabled {
            return Box::new(NoThrottlePolicy::new());
        }
        Box::new(LockoutThrottlePolicy::new(
            LockoutSchedule::fixed(self.maximum_incorrect_attempts, self.lockout_duration()),
            self.throttle_message.clone(),
        ))
    }
}

/// Parse the PASSCODE_LOCK_MAX_ATTEMPTS environment variable
///
/// Returns Some(attempts) if set to a value in range, None otherwise
pub fn parse_max_attempts() -> Option<u32> {
    let val = env::var(ENV_MAX_ATTEMPTS).ok()?;
    match val.parse::<u32>() {
        Ok(attempts) if (MAX_ATTEMPTS_MIN..=MAX_ATTEMPTS_MAX).contains(&attempts) => {
            info!("Maximum incorrect attempts overridden: {}", attempts);
            Some(attempts)
        }
        Ok(attempts) => {
            warn!(
                "Invalid {}: {} (must be {}-{}). Ignoring.",
                ENV_MAX_ATTEMPTS, attempts, MAX_ATTEMPTS_MIN, MAX_ATTEMPTS_MAX
            );
            None
        }
        Err(e) => {
            warn!("Failed to parse {}: {}. Ignoring.", ENV_MAX_ATTEMPTS, e);
            None
        }
    }
}

/// Parse the PASSCODE_LOCK_LOCKOUT_SECONDS environment variable
///
/// Returns Some(seconds) if set to a value in range, None otherwise
pub fn parse_lockout_seconds() -> Option<u64> {
    let val = env::var(ENV_LOCKOUT_SECONDS).ok()?;
    match val.parse::<u64>() {
        Ok(seconds) if (LOCKOUT_MIN_SECONDS..=LOCKOUT_MAX_SECONDS).contains(&seconds) => {
            info!("Lockout window overridden: {} seconds", seconds);
            Some(seconds)
        }
        Ok(seconds) => {
            warn!(
                "Invalid {}: {} (must be {}-{}). Ignoring.",
                ENV_LOCKOUT_SECONDS, seconds, LOCKOUT_MIN_SECONDS, LOCKOUT_MAX_SECONDS
            );
            None
        }
        Err(e) => {
            warn!("Failed to parse {}: {}. Ignoring.", ENV_LOCKOUT_SECONDS, e);
            None
        }
    }
}
