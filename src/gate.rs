//! The access gate: the sole orchestrator in front of the permission
//! engine, the cipher, the cache, and the remote store.
//!
//! Callers outside this module never touch the other components directly.
//! Every operation checks permission first (a denial has zero side
//! effects) and every successful mutation invalidates exactly the cache
//! keys whose contents it changed.

use crate::{
    cache::{CacheConfig, EntityCache},
    cipher::{self, CipherBlob},
    entity::{CacheKey, Credential, Entity, EntityDraft},
    error::{Error, Result},
    metrics::EngineMetrics,
    permission::{PermissionEngine, PermissionMatrix},
    role::{Action, ResourceType, Role},
    session::SessionContext,
    store::RemoteStore,
};
use std::sync::Arc;

#[cfg(feature = "audit")]
use log::{info, warn};

/// A write operation and its payload.
///
/// Create and Update carry a draft; Update and Delete name the target id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Create a new entity from a draft.
    Create {
        /// Fields of the new entity.
        draft: EntityDraft,
    },
    /// Replace an existing entity's fields.
    Update {
        /// Target entity id.
        id: String,
        /// Replacement fields.
        draft: EntityDraft,
    },
    /// Delete an entity and its subtree.
    Delete {
        /// Target entity id.
        id: String,
    },
}

impl Mutation {
    /// The action this mutation requires permission for.
    pub fn action(&self) -> Action {
        match self {
            Mutation::Create { .. } => Action::Create,
            Mutation::Update { .. } => Action::Update,
            Mutation::Delete { .. } => Action::Delete,
        }
    }
}

/// Orchestrator composing permission checks, the entity cache, the secret
/// cipher, and the remote store.
pub struct AccessGate<S>
where
    S: RemoteStore,
{
    store: S,
    engine: PermissionEngine,
    cache: EntityCache,
    session: Arc<SessionContext>,
    metrics: Arc<EngineMetrics>,
}

impl<S> AccessGate<S>
where
    S: RemoteStore,
{
    /// Create a gate with the default permission matrix, cache
    /// configuration, and a fresh (signed-out) session.
    pub fn new(store: S) -> Self {
        Self::builder(store).build()
    }

    /// Start building a gate with custom configuration.
    pub fn builder(store: S) -> AccessGateBuilder<S> {
        AccessGateBuilder {
            store,
            matrix: PermissionMatrix::credential_manager_defaults(),
            cache_config: CacheConfig::default(),
            session: None,
        }
    }

    /// Read the listing of `resource` under `parent`, through the cache.
    ///
    /// Denied roles get [`Error::PermissionDenied`] without any cache or
    /// store activity. Concurrent reads of the same key share one store
    /// call.
    pub async fn read(
        &self,
        role: Role,
        resource: ResourceType,
        parent: Option<&str>,
    ) -> Result<Vec<Entity>> {
        self.authorize(role, resource, Action::Read)?;
        let key = CacheKey::listing(resource, parent);
        self.cache
            .get_or_fetch(&key, || {
                let guard = self.metrics.flight_guard();
                self.metrics.record_remote_call();
                async move {
                    let _guard = guard;
                    self.store.list(resource, parent).await
                }
            })
            .await
    }

    /// Read a single entity by id, through the cache.
    pub async fn read_one(
        &self,
        role: Role,
        resource: ResourceType,
        parent: Option<&str>,
        id: &str,
    ) -> Result<Entity> {
        self.authorize(role, resource, Action::Read)?;
        let key = CacheKey::point(resource, parent, id);
        let entities = self
            .cache
            .get_or_fetch(&key, || {
                let guard = self.metrics.flight_guard();
                self.metrics.record_remote_call();
                async move {
                    let _guard = guard;
                    self.store.get(resource, id).await.map(|entity| vec![entity])
                }
            })
            .await?;
        entities
            .into_iter()
            .next()
            .ok_or_else(|| Error::RemoteStore(format!("{resource} '{id}' not found")))
    }

    /// Apply a mutation.
    ///
    /// Permission is checked before anything else; a denial performs no
    /// store call and no invalidation. On store success the affected cache
    /// keys are invalidated: the parent-scoped listing cascade for Create
    /// and Delete (child listings change, and the parent entry with them),
    /// the entity's own subtree plus a precise listing invalidation for
    /// Update. On store failure the error propagates and the cache keeps
    /// the last known-good state.
    pub async fn mutate(
        &self,
        role: Role,
        resource: ResourceType,
        parent: Option<&str>,
        mutation: Mutation,
    ) -> Result<Option<Entity>> {
        self.authorize(role, resource, mutation.action())?;

        let _guard = self.metrics.flight_guard();
        self.metrics.record_remote_call();
        let listing = CacheKey::listing(resource, parent);

        match mutation {
            Mutation::Create { draft } => {
                let entity = self.store.create(resource, draft).await?;
                self.cache.invalidate_cascade(&listing);
                #[cfg(feature = "audit")]
                info!("created {resource} '{}'", entity.id());
                Ok(Some(entity))
            }
            Mutation::Update { id, draft } => {
                let entity = self.store.update(resource, &id, draft).await?;
                self.cache
                    .invalidate_cascade(&CacheKey::point(resource, parent, &id));
                self.cache.invalidate(&listing);
                #[cfg(feature = "audit")]
                info!("updated {resource} '{id}'");
                Ok(Some(entity))
            }
            Mutation::Delete { id } => {
                self.store.delete(resource, &id).await?;
                self.cache.invalidate_cascade(&listing);
                #[cfg(feature = "audit")]
                info!("deleted {resource} '{id}'");
                Ok(None)
            }
        }
    }

    /// Decrypt a credential's secret for display.
    ///
    /// Requires Read on Credential; the plaintext is returned to the caller
    /// and retained nowhere else.
    pub fn decrypt_for_display(&self, role: Role, credential: &Credential) -> Result<String> {
        self.authorize(role, ResourceType::Credential, Action::Read)?;
        let blob = CipherBlob::decode(&credential.secret_ciphertext)?;
        self.session
            .with_key(|key| cipher::decrypt(key, &blob))
            .ok_or_else(|| Error::DecryptionFailure("no active session key".to_string()))?
    }

    /// Seal a plaintext secret under the session key, producing the opaque
    /// string a [`crate::entity::CredentialDraft`] carries. Secrets are
    /// always ciphertext by the time they reach a draft.
    pub fn seal_secret(&self, plaintext: &str) -> Result<String> {
        self.session
            .with_key(|key| cipher::encrypt(key, plaintext))
            .ok_or_else(|| Error::EncryptionFailure("no active session key".to_string()))?
            .map(|blob| blob.encode())
    }

    /// Whether `role` may create entities of `resource`. For render-time
    /// gating of UI affordances.
    pub fn can_create(&self, role: Role, resource: ResourceType) -> bool {
        self.engine.can_create(role, resource)
    }

    /// Whether `role` may read entities of `resource`.
    pub fn can_read(&self, role: Role, resource: ResourceType) -> bool {
        self.engine.can_read(role, resource)
    }

    /// Whether `role` may update entities of `resource`.
    pub fn can_update(&self, role: Role, resource: ResourceType) -> bool {
        self.engine.can_update(role, resource)
    }

    /// Whether `role` may delete entities of `resource`.
    pub fn can_delete(&self, role: Role, resource: ResourceType) -> bool {
        self.engine.can_delete(role, resource)
    }

    /// The session this gate seals and opens secrets for.
    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Engine metrics, including the in-flight gauge UI loading state
    /// should project from.
    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// The entity cache (exposed for maintenance like `purge_expired`).
    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn authorize(&self, role: Role, resource: ResourceType, action: Action) -> Result<()> {
        let granted = self.engine.check(role, resource, action);
        self.metrics.record_permission_check(granted);
        if granted {
            #[cfg(feature = "audit")]
            info!("permission granted: role '{role}' {action} on '{resource}'");
            Ok(())
        } else {
            #[cfg(feature = "audit")]
            warn!("permission denied: role '{role}' {action} on '{resource}'");
            Err(Error::PermissionDenied {
                role,
                action,
                resource,
            })
        }
    }
}

impl<S> std::fmt::Debug for AccessGate<S>
where
    S: RemoteStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("cache", &self.cache)
            .field("session", &self.session)
            .finish()
    }
}

/// Builder for [`AccessGate`].
pub struct AccessGateBuilder<S>
where
    S: RemoteStore,
{
    store: S,
    matrix: PermissionMatrix,
    cache_config: CacheConfig,
    session: Option<Arc<SessionContext>>,
}

impl<S> AccessGateBuilder<S>
where
    S: RemoteStore,
{
    /// Use a custom permission matrix.
    pub fn matrix(mut self, matrix: PermissionMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    /// Use a custom cache configuration.
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Share an existing session (e.g. one owned by the auth layer).
    pub fn session(mut self, session: Arc<SessionContext>) -> Self {
        self.session = Some(session);
        self
    }

    /// Build the gate.
    pub fn build(self) -> AccessGate<S> {
        let metrics = Arc::new(EngineMetrics::new());
        AccessGate {
            store: self.store,
            engine: PermissionEngine::new(self.matrix),
            cache: EntityCache::new(self.cache_config, Arc::clone(&metrics)),
            session: self
                .session
                .unwrap_or_else(|| Arc::new(SessionContext::new())),
            metrics,
        }
    }
}
