//! `[security]` configuration shared by the controller and workers.

use crate::{
    ProtocolError,
    crypto::{Credentials, DEFAULT_KEY_BITS},
};
use serde::{Deserialize, Serialize};

/// Fleet password and RSA modulus size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Fleet password (supports `${ENV_VAR}` expansion). Must not be empty.
    #[serde(default)]
    pub password: String,
    /// RSA modulus size, at least 2048.
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            key_bits: DEFAULT_KEY_BITS,
        }
    }
}

impl SecurityConfig {
    /// Hash the password once and validate the key size.
    pub fn credentials(&self) -> Result<Credentials, ProtocolError> {
        Credentials::from_password(&self.password, self.key_bits)
    }
}

fn default_key_bits() -> usize {
    DEFAULT_KEY_BITS
}
