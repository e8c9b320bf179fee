//! Role, resource type, and action enumerations.
//!
//! These are the three axes of the permission matrix. A session's role is
//! resolved once by the auth layer and is immutable for the session's
//! lifetime; a role change requires re-resolution (sign-out and sign-in).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// The role a session operates under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full management access.
    Admin,
    /// Read-only access to the entity tree.
    Viewer,
}

impl Role {
    /// String form used in logs and wire payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Viewer => "viewer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "viewer" => Ok(Role::Viewer),
            other => Err(Error::RemoteStore(format!("unknown role '{other}'"))),
        }
    }
}

/// The kinds of resources the permission matrix covers.
///
/// `Client`, `Application`, and `Credential` form the entity tree; `User`
/// exists only for authorization of account management, which the external
/// auth backend performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// Top-level client organisation.
    Client,
    /// Application belonging to a client.
    Application,
    /// Stored credential belonging to an application.
    Credential,
    /// User account (managed by the auth backend).
    User,
}

impl ResourceType {
    /// String form used in logs and cache-key displays.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Client => "client",
            ResourceType::Application => "application",
            ResourceType::Credential => "credential",
            ResourceType::User => "user",
        }
    }

    /// All resource types, for exhaustive matrix construction and tests.
    pub fn all() -> [ResourceType; 4] {
        [
            ResourceType::Client,
            ResourceType::Application,
            ResourceType::Credential,
            ResourceType::User,
        ]
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(ResourceType::Client),
            "application" => Ok(ResourceType::Application),
            "credential" => Ok(ResourceType::Credential),
            "user" => Ok(ResourceType::User),
            other => Err(Error::RemoteStore(format!("unknown resource type '{other}'"))),
        }
    }
}

/// The actions a role may be granted on a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Create a new entity.
    Create,
    /// Read an entity or listing.
    Read,
    /// Update an existing entity.
    Update,
    /// Delete an entity (and its subtree).
    Delete,
}

impl Action {
    /// String form used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    /// All actions, for exhaustive matrix construction and tests.
    pub fn all() -> [Action; 4] {
        [Action::Create, Action::Read, Action::Update, Action::Delete]
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Action::Create),
            "read" => Ok(Action::Read),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(Error::RemoteStore(format!("unknown action '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in [Role::Admin, Role::Viewer] {
            let parsed: Role = role.as_str().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_resource_type_round_trip() {
        for resource in ResourceType::all() {
            let parsed: ResourceType = resource.as_str().parse().unwrap();
            assert_eq!(parsed, resource);
        }
        assert!("tenant".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_action_parsing_is_case_insensitive() {
        assert_eq!("READ".parse::<Action>().unwrap(), Action::Read);
        assert_eq!(" delete ".parse::<Action>().unwrap(), Action::Delete);
        assert!("touch".parse::<Action>().is_err());
    }

    #[test]
    fn test_serde_forms_are_lowercase() {
        let json = serde_json::to_string(&Role::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
        let json = serde_json::to_string(&ResourceType::Application).unwrap();
        assert_eq!(json, "\"application\"");
    }
}
