//! Domain types for the role graph and its derived closure tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use warden_core::Action;

/// A role in the tenant's role tree.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Role {
    /// Unique identifier.
    pub id: Uuid,

    /// The tenant this role belongs to.
    pub tenant_id: Uuid,

    /// Role display name, unique per tenant.
    pub name: String,

    /// Parent role (`None` = child of the virtual root).
    pub parent_role_id: Option<Uuid>,

    /// Whether this role is a tree container; only catalog roles are descended
    /// into during closure rebuild.
    pub is_catalog: bool,

    /// System roles cannot be deleted.
    pub is_system: bool,

    /// Ordering among siblings (before name).
    pub sort_key: i32,

    /// When the role was created.
    pub created_at: DateTime<Utc>,

    /// When the role was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoleInput {
    /// Role display name.
    pub name: String,

    /// Parent role (`None` = root level).
    pub parent_role_id: Option<Uuid>,

    /// Whether this role is a tree container.
    #[serde(default)]
    pub is_catalog: bool,

    /// Whether this role is protected from deletion.
    #[serde(default)]
    pub is_system: bool,

    /// Ordering among siblings.
    #[serde(default)]
    pub sort_key: i32,
}

/// Non-topological role updates (name, ordering, catalog flag).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRoleInput {
    /// New display name.
    pub name: Option<String>,

    /// New sibling ordering.
    pub sort_key: Option<i32>,

    /// New catalog flag.
    pub is_catalog: Option<bool>,
}

/// A cross-branch inheritance edge: `role_id` inherits the rights of
/// `included_role_id` regardless of tree position.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RoleInclude {
    /// Unique identifier.
    pub id: Uuid,

    /// The tenant this edge belongs to.
    pub tenant_id: Uuid,

    /// Inheriting role.
    pub role_id: Uuid,

    /// Role whose rights are inherited.
    pub included_role_id: Uuid,

    /// When the edge was created.
    pub created_at: DateTime<Utc>,
}

/// Derived: one row per (role, ancestor) pair, self included at level 0,
/// level increasing toward the root.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RoleAncestor {
    /// The tenant this row belongs to.
    pub tenant_id: Uuid,

    /// The role whose ancestry this row is part of.
    pub role_id: Uuid,

    /// The ancestor (equals `role_id` at level 0).
    pub ancestor_id: Uuid,

    /// Distance from `role_id` (0 = self).
    pub level: i32,
}

/// Derived: include edges reachable from a role's ancestry — declared by the
/// role itself or by one of its ancestors.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RoleIncludeRef {
    /// The tenant this row belongs to.
    pub tenant_id: Uuid,

    /// The role inheriting through the edge.
    pub role_id: Uuid,

    /// Role whose rights are pulled in.
    pub included_role_id: Uuid,

    /// The ancestor (or self) that declared the include.
    pub source_role_id: Uuid,
}

/// Derived: the effective rights-source set of a role — its ancestors (self
/// included) united with the roles included by those ancestors.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RoleExpand {
    /// The tenant this row belongs to.
    pub tenant_id: Uuid,

    /// The role whose effective set this row is part of.
    pub role_id: Uuid,

    /// A role whose rights `role_id` inherits.
    pub base_role_id: Uuid,
}

/// A right grant: `role_id` may perform `action` on entities of
/// `entity_class_id`, optionally restricted to entities owned by the scope
/// roles (or roles inheriting from them).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRight {
    /// Unique identifier.
    pub id: Uuid,

    /// The tenant this grant belongs to.
    pub tenant_id: Uuid,

    /// Granted role.
    pub role_id: Uuid,

    /// Entity class the grant applies to.
    pub entity_class_id: Uuid,

    /// Granted action.
    pub action: Action,

    /// Owner-role restriction; `None` = unrestricted.
    pub scope: Option<Vec<Uuid>>,

    /// When the grant was created.
    pub created_at: DateTime<Utc>,
}

/// Input for creating a right grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddRoleRightInput {
    /// Granted role.
    pub role_id: Uuid,

    /// Entity class the grant applies to.
    pub entity_class_id: Uuid,

    /// Granted action.
    pub action: Action,

    /// Owner-role restriction; `None` or empty = unrestricted.
    pub scope: Option<Vec<Uuid>>,
}

/// Denormalized companion of [`RoleRight::scope`]: one row per scope member,
/// kept in lockstep with the owning right.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RoleRightScopeRef {
    /// The tenant this row belongs to.
    pub tenant_id: Uuid,

    /// The owning right.
    pub right_id: Uuid,

    /// Granted role (copied from the right).
    pub role_id: Uuid,

    /// Entity class (copied from the right).
    pub entity_class_id: Uuid,

    /// Action code (copied from the right).
    pub action: i32,

    /// One member of the scope set.
    pub scope_role_id: Uuid,
}

/// A function capability grant.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RoleFunction {
    /// Unique identifier.
    pub id: Uuid,

    /// The tenant this grant belongs to.
    pub tenant_id: Uuid,

    /// Granted role.
    pub role_id: Uuid,

    /// The granted function.
    pub function_id: Uuid,

    /// The right this grant was derived from; `None` for manual grants.
    pub originating_right_id: Option<Uuid>,

    /// When the grant was created.
    pub created_at: DateTime<Utc>,
}

/// A user's membership in a role.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserRole {
    /// Unique identifier.
    pub id: Uuid,

    /// The tenant this membership belongs to.
    pub tenant_id: Uuid,

    /// Member user.
    pub user_id: Uuid,

    /// Role the user belongs to.
    pub role_id: Uuid,

    /// When the membership was created.
    pub created_at: DateTime<Utc>,
}

/// Persisted per-tenant rebuild state. Lazily clean until the first
/// topology mutation.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct BuildState {
    /// The tenant this record belongs to.
    pub tenant_id: Uuid,

    /// Whether the derived tables are stale.
    pub dirty: bool,

    /// When the flag last changed.
    pub updated_at: DateTime<Utc>,
}

/// Pagination for list operations.
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Maximum number of results.
    pub limit: i64,

    /// Number of results to skip.
    pub offset: i64,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// Declarative right grant resolved by names, for batch assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRightSpec {
    /// Name of the granted role.
    pub role_name: String,

    /// Granted action.
    pub action: Action,

    /// Names of the scope roles; `None` or empty = unrestricted.
    pub scope_names: Option<Vec<String>>,
}

/// Declarative function grant resolved by names, for batch assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleFunctionSpec {
    /// Name of the granted role.
    pub role_name: String,

    /// Function name within the module being granted.
    pub name: String,
}
