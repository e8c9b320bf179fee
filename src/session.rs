//! Session state and auth-event notification.
//!
//! The auth handshake itself happens outside this crate; what arrives here
//! is an already-resolved [`Role`]. A session owns the one encryption key
//! used to seal and open credential secrets. The key is created at sign-in
//! and cleared synchronously at sign-out, before any further cache or store
//! operation can proceed for the session.
//!
//! Auth-state changes are delivered as explicit [`AuthEvent`]s through a
//! single id-keyed listener registry, so a listener is attached exactly once
//! and can be detached by id.

use crate::{
    cipher::{self, SessionKey},
    error::Result,
    role::Role,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

#[cfg(feature = "audit")]
use log::info;

/// Source of the session's resolved role.
///
/// Consumed by callers that parameterize [`crate::gate::AccessGate`] calls;
/// `None` means no user is signed in.
pub trait AuthProvider: Send + Sync {
    /// The current session's role, if signed in.
    fn current_role(&self) -> Option<Role>;
}

/// Auth-state transitions observable by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// A user signed in with the given role.
    SignedIn {
        /// The resolved role.
        role: Role,
    },
    /// The session ended; the session key has already been destroyed.
    SignedOut,
    /// An existing session was restored (e.g. page reload) with the role.
    SessionRestored {
        /// The resolved role.
        role: Role,
    },
}

/// Handle for detaching a listener.
pub type ListenerId = u64;

type Listener = std::sync::Arc<dyn Fn(&AuthEvent) + Send + Sync>;

/// The active session: resolved role, session key, and event listeners.
pub struct SessionContext {
    role: RwLock<Option<Role>>,
    key: Mutex<Option<SessionKey>>,
    listeners: DashMap<ListenerId, Listener>,
    next_listener: AtomicU64,
}

impl SessionContext {
    /// Create a signed-out session.
    pub fn new() -> Self {
        Self {
            role: RwLock::new(None),
            key: Mutex::new(None),
            listeners: DashMap::new(),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Establish a session for `role`, minting a fresh session key.
    pub fn sign_in(&self, role: Role) -> Result<()> {
        self.establish(role)?;
        #[cfg(feature = "audit")]
        info!("session signed in with role '{role}'");
        self.emit(AuthEvent::SignedIn { role });
        Ok(())
    }

    /// Restore a previously-established session for `role`. The old key is
    /// gone with the old process; a fresh one is minted.
    pub fn restore(&self, role: Role) -> Result<()> {
        self.establish(role)?;
        #[cfg(feature = "audit")]
        info!("session restored with role '{role}'");
        self.emit(AuthEvent::SessionRestored { role });
        Ok(())
    }

    /// End the session. The key is dropped, and thereby zeroized, before the
    /// event fires, so no listener can observe a signed-out session with a
    /// live key.
    pub fn sign_out(&self) {
        drop(lock_recovering(&self.key).take());
        *write_recovering(&self.role) = None;
        #[cfg(feature = "audit")]
        info!("session signed out");
        self.emit(AuthEvent::SignedOut);
    }

    /// Whether a user is signed in.
    pub fn is_signed_in(&self) -> bool {
        read_recovering(&self.role).is_some()
    }

    /// Run `f` with the session key, if one exists. The key never leaves
    /// the closure.
    pub fn with_key<R>(&self, f: impl FnOnce(&SessionKey) -> R) -> Option<R> {
        lock_recovering(&self.key).as_ref().map(f)
    }

    /// Attach an auth-event listener; returns the id for detaching.
    pub fn subscribe(&self, listener: impl Fn(&AuthEvent) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, std::sync::Arc::new(listener));
        id
    }

    /// Detach a listener. Returns whether it was attached.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn establish(&self, role: Role) -> Result<()> {
        let key = cipher::generate_key()?;
        *lock_recovering(&self.key) = Some(key);
        *write_recovering(&self.role) = Some(role);
        Ok(())
    }

    fn emit(&self, event: AuthEvent) {
        // Snapshot first: a listener may subscribe or unsubscribe from
        // inside its callback without deadlocking on the registry.
        let snapshot: Vec<Listener> = self
            .listeners
            .iter()
            .map(|entry| std::sync::Arc::clone(entry.value()))
            .collect();
        for listener in snapshot {
            listener(&event);
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthProvider for SessionContext {
    fn current_role(&self) -> Option<Role> {
        *read_recovering(&self.role)
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("role", &self.current_role())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Lock, recovering the value if a panicking listener poisoned it.
fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_recovering<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_recovering<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
