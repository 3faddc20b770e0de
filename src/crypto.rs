//! Sealing of the stored passcode with AES-256-GCM
//!
//! A sealed passcode is `base64(nonce || ciphertext || tag)`. The store format
//! version is bound in as associated data, so a value sealed for another
//! format version (or for anything other than a passcode) does not open.

use crate::constants::NONCE_LENGTH_BYTES;
use crate::passcode::Passcode;
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm,
};
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha256};

/// Static seed for key derivation
///
/// Stable across builds so that stores stay readable after upgrades.
const KEY_SEED: &str = "passcode-lock.store.encryption.v1";

fn derive_key() -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(KEY_SEED.as_bytes());
    hasher.finalize().into()
}

/// Seals and opens passcodes for one store format version
pub struct PasscodeCipher {
    cipher: Aes256Gcm,
    associated_data: Vec<u8>,
}

impl PasscodeCipher {
    pub fn for_version(version: u32) -> Self {
        let key = derive_key();
        Self {
            cipher: Aes256Gcm::new(&key.into()),
            associated_data: format!("passcode-lock/store/v{}/passcode", version).into_bytes(),
        }
    }

    /// Encrypt `passcode` under a fresh random nonce
    pub fn seal(&self, passcode: &Passcode) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH_BYTES];
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|e| anyhow!("No randomness available for the nonce: {:?}", e))?;

        let plaintext = passcode.expose();
        let sealed = self
            .cipher
            .encrypt(
                &nonce_bytes.into(),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: &self.associated_data,
                },
            )
            .map_err(|_| anyhow!("Could not seal passcode"))?;

        let mut blob = Vec::with_capacity(NONCE_LENGTH_BYTES + sealed.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&sealed);
        Ok(BASE64.encode(blob))
    }

    /// Decrypt a value produced by [`seal`](Self::seal) with the same version
    ///
    /// # Errors
    ///
    /// Fails when the value is not base64, is truncated, was sealed for a
    /// different version, was tampered with, or does not hold a digit passcode.
    pub fn open(&self, sealed: &str) -> Result<Passcode> {
        let blob = BASE64
            .decode(sealed.trim())
            .context("Sealed passcode is not valid base64")?;
        if blob.len() <= NONCE_LENGTH_BYTES {
            bail!("Sealed passcode is truncated ({} bytes)", blob.len());
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LENGTH_BYTES);
        let nonce: [u8; NONCE_LENGTH_BYTES] = nonce_bytes
            .try_into()
            .context("Sealed passcode has a malformed nonce")?;

        let plaintext = self
            .cipher
            .decrypt(
                &nonce.into(),
                Payload {
                    msg: ciphertext,
                    aad: &self.associated_data,
                },
            )
            .map_err(|_| {
                anyhow!("Could not decrypt passcode: wrong store version or corrupted data")
            })?;

        let text = String::from_utf8(plaintext).context("Decrypted passcode is not UTF-8")?;
        text.parse::<Passcode>()
            .context("Decrypted value is not a digit passcode")
    }
}
