//! # Credgate
//!
//! Credential access, authenticated encryption, and cache consistency for a
//! browser-based credential manager. The hosted backend owns the data; this
//! crate owns the three things that must never go wrong in front of it:
//!
//! - **Authorization**: a static role × resource × action matrix evaluated
//!   by a pure engine that denies by default.
//! - **Secrecy**: AES-256-GCM sealing of credential secrets under a
//!   per-session key that is zeroized at sign-out and can never be
//!   serialized.
//! - **Consistency**: a TTL'd cache of the client → application →
//!   credential tree with cascading invalidation, request coalescing, and
//!   generation counters that make invalidation win every race against an
//!   in-flight fetch.
//!
//! [`AccessGate`] is the single entry point composing the three around the
//! external [`RemoteStore`].
//!
//! ## Quick start
//!
//! ```rust
//! use credgate::{
//!     generate_secure_password, score_password_strength, PasswordOptions,
//!     PermissionEngine, ResourceType, Role,
//! };
//!
//! let engine = PermissionEngine::with_defaults();
//! assert!(engine.can_read(Role::Viewer, ResourceType::Credential));
//! assert!(!engine.can_delete(Role::Viewer, ResourceType::Credential));
//!
//! let password = generate_secure_password(16, &PasswordOptions::default())?;
//! assert_eq!(password.chars().count(), 16);
//! assert!(score_password_strength(&password).is_acceptable());
//! # Ok::<(), credgate::Error>(())
//! ```
//!
//! Reads and mutations go through the gate:
//!
//! ```rust
//! use credgate::{AccessGate, MemoryStore, ResourceType, Role};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let gate = AccessGate::new(MemoryStore::new());
//! gate.session().sign_in(Role::Admin)?;
//!
//! let clients = gate.read(Role::Admin, ResourceType::Client, None).await?;
//! assert!(clients.is_empty());
//! # Ok::<(), credgate::Error>(())
//! # }).unwrap();
//! ```
//!
//! ## Audit logging
//!
//! With the `audit` feature (default), permission decisions, session
//! events, and cache invalidations are logged through the standard logging
//! facade. Secret material is never logged.
//!
//! ```rust
//! credgate::init_audit_logger();
//! // Configure via RUST_LOG, e.g. RUST_LOG=info,credgate=debug
//! ```

/// Initialize the audit logger (must be called early, at most once).
#[cfg(feature = "audit")]
pub fn init_audit_logger() {
    let _ = env_logger::Builder::from_default_env().try_init();
}

pub mod cache;
pub mod cipher;
pub mod entity;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod password;
pub mod permission;


pub mod role;
pub mod session;
pub mod store;

// Re-export main types for convenience
pub use crate::{
    cache::{CacheConfig, EntityCache, DEFAULT_TTL},
    cipher::{decrypt, encrypt, generate_key, CipherBlob, SessionKey},
    entity::{
        Application, ApplicationDraft, CacheKey, Client, ClientDraft, Credential,
        CredentialDraft, Entity, EntityDraft,
    },
    error::{Error, Result},
    gate::{AccessGate, AccessGateBuilder, Mutation},
    metrics::{EngineMetrics, FlightGuard},
    password::{
        generate_secure_password, score_password_strength, PasswordOptions, StrengthReport,
        StrengthTier,
    },
    permission::{PermissionEngine, PermissionMatrix, PermissionMatrixBuilder},
    role::{Action, ResourceType, Role},
    session::{AuthEvent, AuthProvider, ListenerId, SessionContext},
    store::{MemoryStore, RemoteStore},
};
