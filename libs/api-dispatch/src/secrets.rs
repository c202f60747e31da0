//! Secret values and the capability that resolves stored proxy passwords.
//!
//! The dispatcher never decrypts anything itself. Stored proxy passwords are
//! encrypted with the proxy user name as key material; a [`SecretResolver`]
//! supplied by the application turns them into usable credentials once, when
//! the dispatcher is built. A resolution failure is a configuration error and
//! is returned to the caller as such.

use std::fmt;

use serde::{Deserialize, Deserializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::BoxError;

/// A proxy password, in stored or resolved form.
///
/// Formats as `[REDACTED]` and wipes its buffer when dropped. Configuration
/// deserializes it from a plain string but never serializes it back.
#[derive(Default, Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The password itself, for building the `Basic` credential.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

const REDACTED: &str = "[REDACTED]";

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// Turns a stored (encrypted) proxy password into its clear form.
///
/// Implementations own whatever key handling the application uses; the
/// user name is passed because it is the key material for stored passwords.
pub trait SecretResolver: Send + Sync {
    /// Resolve `stored` for `username`.
    ///
    /// # Errors
    /// Returns the underlying failure when the stored value cannot be
    /// decrypted; it surfaces as `ConfigError::Secret`.
    fn resolve(&self, username: &str, stored: &SecretString) -> Result<SecretString, BoxError>;
}

/// Resolver for passwords that are stored in clear text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextSecrets;

impl SecretResolver for PlaintextSecrets {
    fn resolve(&self, _username: &str, stored: &SecretString) -> Result<SecretString, BoxError> {
        Ok(stored.clone())
    }
}

impl<F> SecretResolver for F
where
    F: Fn(&str, &SecretString) -> Result<SecretString, BoxError> + Send + Sync,
{
    fn resolve(&self, username: &str, stored: &SecretString) -> Result<SecretString, BoxError> {
        self(username, stored)
    }
}
