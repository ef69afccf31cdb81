//! Random credentials for one exchange server instance
//!
//! Keys only live as long as the process that issued them. They keep stray
//! pods from talking to a server they were not handed credentials for.

use crate::{ExchangeError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Alphabet keys are drawn from
pub const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Length of generated access and secret keys
pub const KEY_LENGTH: usize = 12;

/// Generate a random alphanumeric string of length `n`.
///
/// Each byte from the OS RNG is reduced modulo 62. Since 256 is not a
/// multiple of 62 the first eight characters are slightly more likely; fine
/// for throwaway identifiers, switch to rejection sampling before reusing
/// this for long-lived secrets.
pub fn random_string(n: usize) -> Result<String> {
    let mut bits = vec![0u8; n];
    OsRng
        .try_fill_bytes(&mut bits)
        .map_err(|e| ExchangeError::Entropy(e.to_string()))?;

    Ok(bits
        .into_iter()
        .map(|b| ALPHABET[(b % ALPHABET.len() as u8) as usize] as char)
        .collect())
}

/// Access/secret key pair
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "accesskey", alias = "access_key")]
    pub access_key: String,
    #[serde(rename = "secretkey", alias = "secret_key")]
    pub secret_key: String,
}

impl Credentials {
    /// Issue a fresh key pair
    pub fn generate() -> Result<Self> {
        Ok(Self {
            access_key: random_string(KEY_LENGTH)?,
            secret_key: random_string(KEY_LENGTH)?,
        })
    }

    /// Use an existing key pair, e.g. one handed to a remote pod
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}
