//! The hierarchical entity model and cache keys.
//!
//! Entities form a strict tree: client → application → credential. Parent
//! references are enforced by the remote store on every write; the cache
//! holds non-owning, time-bounded copies only.

use crate::role::ResourceType;
use serde::{Deserialize, Serialize};

/// Top-level client organisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Store-assigned identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Legal or trading company name.
    pub company_name: String,
    /// Free-form notes.
    pub notes: Option<String>,
}

/// Application belonging to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Store-assigned identifier.
    pub id: String,
    /// Parent client id.
    pub client_id: String,
    /// Display name.
    pub name: String,
    /// Login or dashboard URL.
    pub url: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
}

/// Stored credential belonging to an application.
///
/// The secret is present only as an AEAD ciphertext blob (see
/// [`crate::cipher::CipherBlob`]); there is no plaintext field anywhere in
/// the data model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Store-assigned identifier.
    pub id: String,
    /// Parent application id.
    pub app_id: String,
    /// Account username or login.
    pub username: String,
    /// Encoded cipher blob (nonce, ciphertext, and tag in one opaque string).
    pub secret_ciphertext: String,
    /// Role label of the stored account at its target system.
    pub role: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
}

/// Any entity in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entity {
    /// A client row.
    Client(Client),
    /// An application row.
    Application(Application),
    /// A credential row.
    Credential(Credential),
}

impl Entity {
    /// The entity's identifier.
    pub fn id(&self) -> &str {
        match self {
            Entity::Client(c) => &c.id,
            Entity::Application(a) => &a.id,
            Entity::Credential(x) => &x.id,
        }
    }

    /// The parent entity's identifier, if any (clients are roots).
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Entity::Client(_) => None,
            Entity::Application(a) => Some(&a.client_id),
            Entity::Credential(x) => Some(&x.app_id),
        }
    }

    /// The resource type of this entity.
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Entity::Client(_) => ResourceType::Client,
            Entity::Application(_) => ResourceType::Application,
            Entity::Credential(_) => ResourceType::Credential,
        }
    }
}

/// Fields for creating or replacing a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDraft {
    /// Display name.
    pub name: String,
    /// Legal or trading company name.
    pub company_name: String,
    /// Free-form notes.
    pub notes: Option<String>,
}

/// Fields for creating or replacing an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationDraft {
    /// Parent client id; must exist.
    pub client_id: String,
    /// Display name.
    pub name: String,
    /// Login or dashboard URL.
    pub url: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
}

/// Fields for creating or replacing a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDraft {
    /// Parent application id; must exist.
    pub app_id: String,
    /// Account username or login.
    pub username: String,
    /// Encoded cipher blob produced by [`crate::gate::AccessGate::seal_secret`].
    pub secret_ciphertext: String,
    /// Role label of the stored account at its target system.
    pub role: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
}

/// Payload for create and update mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntityDraft {
    /// Client fields.
    Client(ClientDraft),
    /// Application fields.
    Application(ApplicationDraft),
    /// Credential fields.
    Credential(CredentialDraft),
}

impl EntityDraft {
    /// The resource type this draft produces.
    pub fn resource_type(&self) -> ResourceType {
        match self {
            EntityDraft::Client(_) => ResourceType::Client,
            EntityDraft::Application(_) => ResourceType::Application,
            EntityDraft::Credential(_) => ResourceType::Credential,
        }
    }

    /// The parent id the draft references, if any.
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            EntityDraft::Client(_) => None,
            EntityDraft::Application(a) => Some(&a.client_id),
            EntityDraft::Credential(x) => Some(&x.app_id),
        }
    }
}

/// Composite cache key: resource type, parent scope, and an optional id for
/// point lookups.
///
/// A key with `id: None` addresses the listing of `resource` under `parent`;
/// a key with `id: Some(..)` addresses a single entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Resource type of the cached value.
    pub resource: ResourceType,
    /// Parent entity id, or `None` for root-level listings.
    pub parent: Option<String>,
    /// Entity id for point lookups, `None` for listings.
    pub id: Option<String>,
}

impl CacheKey {
    /// Key for the listing of `resource` under `parent`.
    pub fn listing(resource: ResourceType, parent: Option<&str>) -> Self {
        Self {
            resource,
            parent: parent.map(str::to_string),
            id: None,
        }
    }

    /// Key for a single entity.
    pub fn point(resource: ResourceType, parent: Option<&str>, id: &str) -> Self {
        Self {
            resource,
            parent: parent.map(str::to_string),
            id: Some(id.to_string()),
        }
    }

    /// Whether this key addresses a listing rather than a point lookup.
    pub fn is_listing(&self) -> bool {
        self.id.is_none()
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.resource,
            self.parent.as_deref().unwrap_or("-"),
            self.id.as_deref().unwrap_or("*"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_application() -> Application {
        Application {
            id: "app-1".to_string(),
            client_id: "client-1".to_string(),
            name: "Billing".to_string(),
            url: Some("https://billing.example.com".to_string()),
            description: None,
        }
    }

    #[test]
    fn test_entity_accessors() {
        let entity = Entity::Application(sample_application());
        assert_eq!(entity.id(), "app-1");
        assert_eq!(entity.parent_id(), Some("client-1"));
        assert_eq!(entity.resource_type(), ResourceType::Application);
    }

    #[test]
    fn test_clients_are_roots() {
        let entity = Entity::Client(Client {
            id: "client-1".to_string(),
            name: "Acme".to_string(),
            company_name: "Acme Corp".to_string(),
            notes: None,
        });
        assert_eq!(entity.parent_id(), None);
    }

    #[test]
    fn test_cache_key_display() {
        let listing = CacheKey::listing(ResourceType::Credential, Some("app-5"));
        assert_eq!(listing.to_string(), "credential:app-5:*");
        assert!(listing.is_listing());

        let point = CacheKey::point(ResourceType::Client, None, "client-1");
        assert_eq!(point.to_string(), "client:-:client-1");
        assert!(!point.is_listing());
    }

    #[test]
    fn test_entity_serde_is_tagged() {
        let entity = Entity::Application(sample_application());
        let json = serde_json::to_string(&entity).unwrap();
        assert!(json.contains("\"kind\":\"application\""));
        let back: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entity);
    }
}
