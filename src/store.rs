//! The remote persistence seam and an in-memory double.
//!
//! The real backend is an opaque hosted service; this crate only sees the
//! [`RemoteStore`] trait. [`MemoryStore`] is the in-process implementation
//! used by tests and demos. It enforces the same strict tree the hosted
//! backend does and counts calls per operation so tests can assert on
//! traffic.

use crate::{
    entity::{Application, Client, Credential, Entity, EntityDraft},
    error::{Error, Result},
    role::ResourceType,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Asynchronous interface to the external entity store.
///
/// Every call is a potential suspension point; any error is surfaced as
/// [`Error::RemoteStore`] and the caller performs no cache mutation for it.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List entities of `resource` under `parent` (all roots when `None`).
    async fn list(&self, resource: ResourceType, parent: Option<&str>) -> Result<Vec<Entity>>;

    /// Fetch a single entity by id.
    async fn get(&self, resource: ResourceType, id: &str) -> Result<Entity>;

    /// Create an entity from a draft; the store assigns the id.
    async fn create(&self, resource: ResourceType, draft: EntityDraft) -> Result<Entity>;

    /// Replace an entity's fields.
    async fn update(&self, resource: ResourceType, id: &str, draft: EntityDraft) -> Result<Entity>;

    /// Delete an entity and its subtree.
    async fn delete(&self, resource: ResourceType, id: &str) -> Result<()>;
}

/// In-memory store double with per-operation call counters and one-shot
/// failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    clients: DashMap<String, Client>,
    applications: DashMap<String, Application>,
    credentials: DashMap<String, Credential>,
    list_calls: AtomicU64,
    get_calls: AtomicU64,
    create_calls: AtomicU64,
    update_calls: AtomicU64,
    delete_calls: AtomicU64,
    fail_next: Mutex<Option<String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next store call fail with `message`, then recover.
    pub fn fail_next(&self, message: impl Into<String>) {
        *lock_recovering(&self.fail_next) = Some(message.into());
    }

    /// Calls made to `list`.
    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Calls made to `get`.
    pub fn get_calls(&self) -> u64 {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Calls made to `create`.
    pub fn create_calls(&self) -> u64 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Calls made to `update`.
    pub fn update_calls(&self) -> u64 {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Calls made to `delete`.
    pub fn delete_calls(&self) -> u64 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Total calls across all operations.
    pub fn total_calls(&self) -> u64 {
        self.list_calls()
            + self.get_calls()
            + self.create_calls()
            + self.update_calls()
            + self.delete_calls()
    }

    fn take_injected_failure(&self) -> Result<()> {
        match lock_recovering(&self.fail_next).take() {
            Some(message) => Err(Error::RemoteStore(message)),
            None => Ok(()),
        }
    }

    fn mint_id() -> String {
        Uuid::new_v4().to_string()
    }
}

/// Lock a mutex, recovering the value if a panicking test poisoned it.
fn lock_recovering<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list(&self, resource: ResourceType, parent: Option<&str>) -> Result<Vec<Entity>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.take_injected_failure()?;
        match resource {
            ResourceType::Client => Ok(self
                .clients
                .iter()
                .map(|entry| Entity::Client(entry.value().clone()))
                .collect()),
            ResourceType::Application => Ok(self
                .applications
                .iter()
                .filter(|entry| parent.map_or(true, |p| entry.value().client_id == p))
                .map(|entry| Entity::Application(entry.value().clone()))
                .collect()),
            ResourceType::Credential => Ok(self
                .credentials
                .iter()
                .filter(|entry| parent.map_or(true, |p| entry.value().app_id == p))
                .map(|entry| Entity::Credential(entry.value().clone()))
                .collect()),
            ResourceType::User => Err(Error::RemoteStore(
                "user records are managed by the auth backend".to_string(),
            )),
        }
    }

    async fn get(&self, resource: ResourceType, id: &str) -> Result<Entity> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.take_injected_failure()?;
        let entity = match resource {
            ResourceType::Client => self
                .clients
                .get(id)
                .map(|entry| Entity::Client(entry.value().clone())),
            ResourceType::Application => self
                .applications
                .get(id)
                .map(|entry| Entity::Application(entry.value().clone())),
            ResourceType::Credential => self
                .credentials
                .get(id)
                .map(|entry| Entity::Credential(entry.value().clone())),
            ResourceType::User => {
                return Err(Error::RemoteStore(
                    "user records are managed by the auth backend".to_string(),
                ))
            }
        };
        entity.ok_or_else(|| Error::RemoteStore(format!("{resource} '{id}' not found")))
    }

    async fn create(&self, resource: ResourceType, draft: EntityDraft) -> Result<Entity> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.take_injected_failure()?;
        match (resource, draft) {
            (ResourceType::Client, EntityDraft::Client(fields)) => {
                let client = Client {
                    id: Self::mint_id(),
                    name: fields.name,
                    company_name: fields.company_name,
                    notes: fields.notes,
                };
                self.clients.insert(client.id.clone(), client.clone());
                Ok(Entity::Client(client))
            }
            (ResourceType::Application, EntityDraft::Application(fields)) => {
                if !self.clients.contains_key(&fields.client_id) {
                    return Err(Error::RemoteStore(format!(
                        "client '{}' not found",
                        fields.client_id
                    )));
                }
                let application = Application {
                    id: Self::mint_id(),
                    client_id: fields.client_id,
                    name: fields.name,
                    url: fields.url,
                    description: fields.description,
                };
                self.applications
                    .insert(application.id.clone(), application.clone());
                Ok(Entity::Application(application))
            }
            (ResourceType::Credential, EntityDraft::Credential(fields)) => {
                if !self.applications.contains_key(&fields.app_id) {
                    return Err(Error::RemoteStore(format!(
                        "application '{}' not found",
                        fields.app_id
                    )));
                }
                let credential = Credential {
                    id: Self::mint_id(),
                    app_id: fields.app_id,
                    username: fields.username,
                    secret_ciphertext: fields.secret_ciphertext,
                    role: fields.role,
                    notes: fields.notes,
                };
                self.credentials
                    .insert(credential.id.clone(), credential.clone());
                Ok(Entity::Credential(credential))
            }
            (resource, draft) => Err(Error::RemoteStore(format!(
                "draft kind '{}' does not match resource type '{resource}'",
                draft.resource_type()
            ))),
        }
    }

    async fn update(&self, resource: ResourceType, id: &str, draft: EntityDraft) -> Result<Entity> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.take_injected_failure()?;
        match (resource, draft) {
            (ResourceType::Client, EntityDraft::Client(fields)) => {
                let mut entry = self
                    .clients
                    .get_mut(id)
                    .ok_or_else(|| Error::RemoteStore(format!("client '{id}' not found")))?;
                entry.name = fields.name;
                entry.company_name = fields.company_name;
                entry.notes = fields.notes;
                Ok(Entity::Client(entry.clone()))
            }
            (ResourceType::Application, EntityDraft::Application(fields)) => {
                if !self.clients.contains_key(&fields.client_id) {
                    return Err(Error::RemoteStore(format!(
                        "client '{}' not found",
                        fields.client_id
                    )));
                }
                let mut entry = self
                    .applications
                    .get_mut(id)
                    .ok_or_else(|| Error::RemoteStore(format!("application '{id}' not found")))?;
                entry.client_id = fields.client_id;
                entry.name = fields.name;
                entry.url = fields.url;
                entry.description = fields.description;
                Ok(Entity::Application(entry.clone()))
            }
            (ResourceType::Credential, EntityDraft::Credential(fields)) => {
                if !self.applications.contains_key(&fields.app_id) {
                    return Err(Error::RemoteStore(format!(
                        "application '{}' not found",
                        fields.app_id
                    )));
                }
                let mut entry = self
                    .credentials
                    .get_mut(id)
                    .ok_or_else(|| Error::RemoteStore(format!("credential '{id}' not found")))?;
                entry.app_id = fields.app_id;
                entry.username = fields.username;
                entry.secret_ciphertext = fields.secret_ciphertext;
                entry.role = fields.role;
                entry.notes = fields.notes;
                Ok(Entity::Credential(entry.clone()))
            }
            (resource, draft) => Err(Error::RemoteStore(format!(
                "draft kind '{}' does not match resource type '{resource}'",
                draft.resource_type()
            ))),
        }
    }

    async fn delete(&self, resource: ResourceType, id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.take_injected_failure()?;
        match resource {
            ResourceType::Client => {
                self.clients
                    .remove(id)
                    .ok_or_else(|| Error::RemoteStore(format!("client '{id}' not found")))?;
                let orphaned_apps: Vec<String> = self
                    .applications
                    .iter()
                    .filter(|entry| entry.value().client_id == id)
                    .map(|entry| entry.key().clone())
                    .collect();
                for app_id in orphaned_apps {
                    self.applications.remove(&app_id);
                    self.credentials
                        .retain(|_, credential| credential.app_id != app_id);
                }
                Ok(())
            }
            ResourceType::Application => {
                self.applications
                    .remove(id)
                    .ok_or_else(|| Error::RemoteStore(format!("application '{id}' not found")))?;
                self.credentials.retain(|_, credential| credential.app_id != id);
                Ok(())
            }
            ResourceType::Credential => {
                self.credentials
                    .remove(id)
                    .ok_or_else(|| Error::RemoteStore(format!("credential '{id}' not found")))?;
                Ok(())
            }
            ResourceType::User => Err(Error::RemoteStore(
                "user records are managed by the auth backend".to_string(),
            )),
        }
    }
}
