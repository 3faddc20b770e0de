//! File-backed passcode repository
//!
//! The passcode is encrypted (see the `crypto` module) and written to a TOML
//! file readable by the owner only.

use super::PasscodeRepository;
use crate::constants::{PERMISSION_MASK_GROUP_OTHER, STORE_FILE_PERMISSIONS, STORE_FORMAT_VERSION};
use crate::crypto::PasscodeCipher;
use crate::passcode::Passcode;
use crate::throttle::ThrottleSnapshot;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// On-disk layout of the passcode store
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    /// Sealed with [`PasscodeCipher`] for `version`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    passcode: Option<String>,
    #[serde(default)]
    throttle: ThrottleSnapshot,
}

/// Decrypted contents of the store
#[derive(Debug, Clone, Default)]
struct StoreState {
    passcode: Option<Passcode>,
    throttle: ThrottleSnapshot,
}

/// Repository persisting the passcode to an encrypted file
///
/// The throttle counters live in the same file so a lockout outlasts the
/// process. The file is read once on open; afterwards the cached state answers
/// reads and every write goes through to disk before the cache is updated.
pub struct FileRepository {
    path: PathBuf,
    cipher: PasscodeCipher,
    state: Mutex<StoreState>,
}

impl FileRepository {
    /// Get the standard store path
    ///
    /// - macOS: `~/Library/Application Support/passcode-lock/passcode.toml`
    /// - Linux: `~/.config/passcode-lock/passcode.toml`
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("passcode-lock");
        Ok(dir.join("passcode.toml"))
    }

    /// Open the store at its standard location
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    /// Open a store at a specific path
    ///
    /// A missing file means no passcode has been set yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, has
    /// an unsupported version, or its passcode does not decrypt.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cipher = PasscodeCipher::for_version(STORE_FORMAT_VERSION);
        let state = Self::read(&path, &cipher)?;
        Ok(Self {
            path,
            cipher,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(path: &Path, cipher: &PasscodeCipher) -> Result<StoreState> {
        if !path.exists() {
            log::debug!("No passcode store at {}", path.display());
            return Ok(StoreState::default());
        }

        #[cfg(unix)]
        {
            let metadata = fs::metadata(path).context("Failed to read passcode store metadata")?;
            let mode = metadata.permissions().mode();
            if mode & PERMISSION_MASK_GROUP_OTHER != 0 {
                log::warn!(
                    "Passcode store has permissive permissions: {:o}. Should be 600 (user read/write only).",
                    mode & 0o777
                );
            }
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read passcode store: {}", path.display()))?;
        let file: StoreFile =
            toml::from_str(&contents).context("Failed to parse passcode store")?;
        if file.version != STORE_FORMAT_VERSION {
            anyhow::bail!(
                "Unsupported passcode store version {} (expected {})",
                file.version,
                STORE_FORMAT_VERSION
            );
        }

        let passcode = file
            .passcode
            .as_deref()
            .map(|sealed| cipher.open(sealed))
            .transpose()
            .context("Failed to decrypt stored passcode")?;

        Ok(StoreState {
            passcode,
            throttle: file.throttle,
        })
    }

    fn write(&self, state: &StoreState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create passcode store directory")?;
        }

        let passcode = state
            .passcode
            .as_ref()
            .map(|passcode| self.cipher.seal(passcode))
            .transpose()
            .context("Failed to encrypt passcode")?;
        let file = StoreFile {
            version: STORE_FORMAT_VERSION,
            passcode,
            throttle: state.throttle,
        };
        let contents =
            toml::to_string_pretty(&file).context("Failed to serialize passcode store")?;

        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write passcode store: {}", self.path.display()))?;

        #[cfg(unix)]
        {
            let mut permissions = fs::metadata(&self.path)?.permissions();
            permissions.set_mode(STORE_FILE_PERMISSIONS);
            fs::set_permissions(&self.path, permissions)
                .context("Failed to set passcode store permissions")?;
        }

        Ok(())
    }
}

impl PasscodeRepository for FileRepository {
    fn passcode(&self) -> Option<Passcode> {
        self.state.lock().passcode.clone()
    }

    fn has_passcode(&self) -> bool {
        self.state.lock().passcode.is_some()
    }

    fn save_passcode(&self, passcode: &Passcode) -> Result<()> {
        let mut state = self.state.lock();
        let next = StoreState {
            passcode: Some(passcode.clone()),
            throttle: state.throttle,
        };
        self.write(&next)?;
        *state = next;
        log::info!("Passcode saved to: {}", self.path.display());
        Ok(())
    }

    fn delete_passcode(&self) -> Result<()> {
        let mut state = self.state.lock();
        if self.path.exists() {
            fs::remove_file(&self.path).with_context(|| {
                format!("Failed to remove passcode store: {}", self.path.display())
            })?;
        }
        *state = StoreState::default();
        log::info!("Passcode removed");
        Ok(())
    }

    fn throttle_state(&self) -> Option<ThrottleSnapshot> {
        Some(self.state.lock().throttle)
    }

    fn save_throttle_state(&self, throttle: &ThrottleSnapshot) -> Result<()> {
        let mut state = self.state.lock();
        let next = StoreState {
            passcode: state.passcode.clone(),
            throttle: *throttle,
        };
        // Without a passcode there is nothing to throttle and no file to keep
        if next.passcode.is_some() {
            self.write(&next)?;
        }
        *state = next;
        Ok(())
    }
}
