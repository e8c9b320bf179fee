//! Error types for the credential access engine.

use crate::role::{Action, ResourceType, Role};
use thiserror::Error;

/// The main error type for credential access operations.
///
/// Variants are `Clone` because the result of a coalesced fetch is shared
/// between every caller awaiting it. A cache miss is not an error but an
/// internal signal that triggers a fetch, so no variant exists for it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The role lacks the requested action on the resource. Fails closed
    /// with zero side effects.
    #[error("permission denied: role '{role}' may not {action} resource '{resource}'")]
    PermissionDenied {
        /// The role that was checked.
        role: Role,
        /// The action that was requested.
        action: Action,
        /// The resource type the action targeted.
        resource: ResourceType,
    },

    /// The AEAD seal operation itself failed. Terminal for the operation;
    /// there is no fallback to plaintext storage.
    #[error("encryption failed: {0}")]
    EncryptionFailure(String),

    /// Authentication-tag verification failed: wrong key, tampered
    /// ciphertext, or corrupted data. No partial plaintext is ever released.
    #[error("decryption failed: {0}")]
    DecryptionFailure(String),

    /// The platform's secure random number generator was unavailable.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// The password generator was configured with an empty character set.
    #[error("invalid password options: {0}")]
    InvalidOptions(String),

    /// The external store reported a failure. Propagated verbatim, never
    /// retried inside this crate, and never carrying secret material.
    #[error("remote store error: {0}")]
    RemoteStore(String),
}

/// Result type alias for credential access operations.
pub type Result<T> = std::result::Result<T, Error>;
