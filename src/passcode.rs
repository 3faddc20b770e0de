//! Passcode value type
//!
//! A passcode is an ordered sequence of single-digit signs. Comparison runs in
//! constant time over the encoded signs, so two passcodes are equal only when
//! they have the same length and the same sign at every position.

use anyhow::{bail, Result};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

/// Ordered sequence of entered signs
#[derive(Clone, Default)]
pub struct Passcode {
    signs: Vec<char>,
}

impl Passcode {
    pub fn new(signs: Vec<char>) -> Self {
        Self { signs }
    }

    pub fn signs(&self) -> &[char] {
        &self.signs
    }

    pub fn len(&self) -> usize {
        self.signs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signs.is_empty()
    }

    /// Plain string form, used by repositories that persist the passcode
    pub fn expose(&self) -> String {
        self.signs.iter().collect()
    }

    fn encoded(&self) -> Vec<u8> {
        self.expose().into_bytes()
    }
}

impl PartialEq for Passcode {
    fn eq(&self, other: &Self) -> bool {
        if self.signs.len() != other.signs.len() {
            return false;
        }
        self.encoded().ct_eq(&other.encoded()).into()
    }
}

impl Eq for Passcode {}

impl FromStr for Passcode {
    type Err = anyhow::Error;

    /// Parse a passcode made of ASCII digits
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            bail!("Passcode cannot be empty");
        }
        if !s.chars().all(|c| c.is_ascii_digit()) {
            bail!("Passcode must contain only digits");
        }
        Ok(Self::new(s.chars().collect()))
    }
}

impl From<&[char]> for Passcode {
    fn from(signs: &[char]) -> Self {
        Self::new(signs.to_vec())
    }
}

// Never print the signs themselves
impl fmt::Display for Passcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in &self.signs {
            f.write_str("•")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Passcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Passcode")
            .field("len", &self.signs.len())
            .finish_non_exhaustive()
    }
}
