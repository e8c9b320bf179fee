//! Static permission matrix and the engine that evaluates it.

use crate::role::{Action, ResourceType, Role};
use std::collections::{HashMap, HashSet};

/// An immutable mapping from (role, resource type) to a set of allowed
/// actions.
///
/// The matrix is built once through [`PermissionMatrixBuilder`] and injected
/// into the [`PermissionEngine`] at construction. It is never mutated at
/// runtime: absence of an entry is equivalent to an empty action set, so the
/// engine denies by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionMatrix {
    grants: HashMap<(Role, ResourceType), HashSet<Action>>,
}

impl PermissionMatrix {
    /// Start building a matrix.
    pub fn builder() -> PermissionMatrixBuilder {
        PermissionMatrixBuilder {
            grants: HashMap::new(),
        }
    }

    /// An empty matrix that denies every action for every role.
    pub fn deny_all() -> Self {
        Self {
            grants: HashMap::new(),
        }
    }

    /// The default policy of the credential manager: admins hold every
    /// action on every resource type; viewers may read the entity tree and
    /// nothing else.
    pub fn credential_manager_defaults() -> Self {
        let mut builder = Self::builder();
        for resource in ResourceType::all() {
            builder = builder.allow(Role::Admin, resource, Action::all());
        }
        builder
            .allow(Role::Viewer, ResourceType::Client, [Action::Read])
            .allow(Role::Viewer, ResourceType::Application, [Action::Read])
            .allow(Role::Viewer, ResourceType::Credential, [Action::Read])
            .build()
    }

    /// Whether the matrix grants `action` on `resource` to `role`.
    pub fn allows(&self, role: Role, resource: ResourceType, action: Action) -> bool {
        self.grants
            .get(&(role, resource))
            .is_some_and(|actions| actions.contains(&action))
    }

    /// The set of actions granted to `role` on `resource` (empty if none).
    pub fn actions_for(&self, role: Role, resource: ResourceType) -> HashSet<Action> {
        self.grants
            .get(&(role, resource))
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for PermissionMatrix {
    fn default() -> Self {
        Self::credential_manager_defaults()
    }
}

/// Builder for [`PermissionMatrix`]. Consumed by `build`, after which the
/// matrix is frozen.
#[derive(Debug)]
pub struct PermissionMatrixBuilder {
    grants: HashMap<(Role, ResourceType), HashSet<Action>>,
}

impl PermissionMatrixBuilder {
    /// Grant a set of actions to a role on a resource type. Repeated calls
    /// for the same pair are additive.
    pub fn allow(
        mut self,
        role: Role,
        resource: ResourceType,
        actions: impl IntoIterator<Item = Action>,
    ) -> Self {
        self.grants
            .entry((role, resource))
            .or_default()
            .extend(actions);
        self
    }

    /// Freeze the matrix.
    pub fn build(self) -> PermissionMatrix {
        PermissionMatrix {
            grants: self.grants,
        }
    }
}

/// Pure role-based authorization over a static matrix.
///
/// `check` is a total function: it never panics, never consults external
/// state, and never branches on resource instance data. Per-row
/// authorization is the remote store's concern; this engine assumes the
/// store's row-level policy is consistent with the matrix.
#[derive(Debug, Clone)]
pub struct PermissionEngine {
    matrix: PermissionMatrix,
}

impl PermissionEngine {
    /// Create an engine over the given matrix.
    pub fn new(matrix: PermissionMatrix) -> Self {
        Self { matrix }
    }

    /// Create an engine over the default credential-manager policy.
    pub fn with_defaults() -> Self {
        Self::new(PermissionMatrix::credential_manager_defaults())
    }

    /// Whether `role` may perform `action` on `resource`.
    pub fn check(&self, role: Role, resource: ResourceType, action: Action) -> bool {
        self.matrix.allows(role, resource, action)
    }

    /// Whether `role` may create entities of `resource`.
    pub fn can_create(&self, role: Role, resource: ResourceType) -> bool {
        self.check(role, resource, Action::Create)
    }

    /// Whether `role` may read entities of `resource`.
    pub fn can_read(&self, role: Role, resource: ResourceType) -> bool {
        self.check(role, resource, Action::Read)
    }

    /// Whether `role` may update entities of `resource`.
    pub fn can_update(&self, role: Role, resource: ResourceType) -> bool {
        self.check(role, resource, Action::Update)
    }

    /// Whether `role` may delete entities of `resource`.
    pub fn can_delete(&self, role: Role, resource: ResourceType) -> bool {
        self.check(role, resource, Action::Delete)
    }

    /// The matrix the engine evaluates.
    pub fn matrix(&self) -> &PermissionMatrix {
        &self.matrix
    }
}

impl Default for PermissionEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_has_full_access() {
        let engine = PermissionEngine::with_defaults();
        for resource in ResourceType::all() {
            for action in Action::all() {
                assert!(
                    engine.check(Role::Admin, resource, action),
                    "admin should hold {action} on {resource}"
                );
            }
        }
    }

    #[test]
    fn test_viewer_is_read_only() {
        let engine = PermissionEngine::with_defaults();
        for resource in [
            ResourceType::Client,
            ResourceType::Application,
            ResourceType::Credential,
        ] {
            assert!(engine.can_read(Role::Viewer, resource));
            assert!(!engine.can_create(Role::Viewer, resource));
            assert!(!engine.can_update(Role::Viewer, resource));
            assert!(!engine.can_delete(Role::Viewer, resource));
        }
    }

    #[test]
    fn test_viewer_has_nothing_on_users() {
        let engine = PermissionEngine::with_defaults();
        for action in Action::all() {
            assert!(!engine.check(Role::Viewer, ResourceType::User, action));
        }
    }

    #[test]
    fn test_absent_entries_deny() {
        let engine = PermissionEngine::new(PermissionMatrix::deny_all());
        for resource in ResourceType::all() {
            for action in Action::all() {
                assert!(!engine.check(Role::Admin, resource, action));
                assert!(!engine.check(Role::Viewer, resource, action));
            }
        }
    }

    #[test]
    fn test_builder_grants_are_additive() {
        let matrix = PermissionMatrix::builder()
            .allow(Role::Viewer, ResourceType::Client, [Action::Read])
            .allow(Role::Viewer, ResourceType::Client, [Action::Update])
            .build();
        assert!(matrix.allows(Role::Viewer, ResourceType::Client, Action::Read));
        assert!(matrix.allows(Role::Viewer, ResourceType::Client, Action::Update));
        assert!(!matrix.allows(Role::Viewer, ResourceType::Client, Action::Delete));
        assert_eq!(matrix.actions_for(Role::Viewer, ResourceType::Client).len(), 2);
    }
}
