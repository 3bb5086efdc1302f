//! Storage contracts for the role graph and its derived tables.
//!
//! Two traits split the write-heavy mutable graph ([`RoleStore`]) from the
//! rebuild-owned derived tables ([`ClosureStore`]). [`InMemoryAuthzStore`]
//! implements both behind a single lock and backs the service tests; the
//! PostgreSQL implementation lives in `warden-db`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::closure::RoleClosureRows;
use crate::error::Result;
use crate::types::{
    AddRoleRightInput, BuildState, CreateRoleInput, ListOptions, Role, RoleAncestor, RoleFunction,
    RoleInclude, RoleIncludeRef, RoleRight, RoleRightScopeRef, UpdateRoleInput, UserRole,
};

/// Storage for roles, includes, memberships, rights, and function grants.
///
/// Mutations are individually atomic; multi-row operations
/// (`delete_role_cascade`, `insert_right`, `delete_right`) are atomic as a
/// whole where the backend supports transactions.
#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    // -- roles ---------------------------------------------------------------

    /// Insert a role.
    async fn insert_role(&self, tenant_id: Uuid, input: CreateRoleInput) -> Result<Role>;

    /// Get a role by id.
    async fn get_role(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Role>>;

    /// Get a role by name.
    async fn get_role_by_name(&self, tenant_id: Uuid, name: &str) -> Result<Option<Role>>;

    /// Apply non-topological updates to a role.
    async fn update_role(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateRoleInput,
    ) -> Result<Option<Role>>;

    /// Reparent a role.
    async fn set_role_parent(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        parent_role_id: Option<Uuid>,
    ) -> Result<Option<Role>>;

    /// Delete a role together with its includes (both directions),
    /// memberships, rights (and their scope refs), and function grants.
    async fn delete_role_cascade(&self, tenant_id: Uuid, id: Uuid) -> Result<bool>;

    /// All roles of a tenant (rebuild snapshot).
    async fn list_roles(&self, tenant_id: Uuid) -> Result<Vec<Role>>;

    /// Children of a parent (`None` = root level), ordered by sort key then
    /// name.
    async fn list_children(
        &self,
        tenant_id: Uuid,
        parent_role_id: Option<Uuid>,
        options: &ListOptions,
    ) -> Result<Vec<Role>>;

    // -- includes ------------------------------------------------------------

    /// Insert an include edge.
    async fn insert_include(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        included_role_id: Uuid,
    ) -> Result<RoleInclude>;

    /// Get an include edge by id.
    async fn get_include(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<RoleInclude>>;

    /// Delete an include edge by id.
    async fn delete_include(&self, tenant_id: Uuid, id: Uuid) -> Result<bool>;

    /// Include edges declared by a role, ordered by creation time.
    async fn list_includes_for_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        options: &ListOptions,
    ) -> Result<Vec<RoleInclude>>;

    /// All include edges of a tenant (rebuild snapshot).
    async fn list_includes(&self, tenant_id: Uuid) -> Result<Vec<RoleInclude>>;

    // -- memberships ---------------------------------------------------------

    /// Insert a membership.
    async fn insert_user_role(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<UserRole>;

    /// Get a membership by (user, role) pair.
    async fn get_user_role(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<Option<UserRole>>;

    /// Delete a membership by id.
    async fn delete_user_role(&self, tenant_id: Uuid, id: Uuid) -> Result<bool>;

    /// Delete all memberships of a user; returns how many were removed.
    async fn delete_user_roles_for_user(&self, tenant_id: Uuid, user_id: Uuid) -> Result<u64>;

    /// Ids of the roles a user directly belongs to.
    async fn list_role_ids_for_user(&self, tenant_id: Uuid, user_id: Uuid) -> Result<Vec<Uuid>>;

    // -- rights --------------------------------------------------------------

    /// Insert a right grant together with one scope ref per scope member.
    async fn insert_right(&self, tenant_id: Uuid, input: AddRoleRightInput) -> Result<RoleRight>;

    /// Get a right grant by id.
    async fn get_right(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<RoleRight>>;

    /// Delete a right grant together with its scope refs and the function
    /// grants derived from it.
    async fn delete_right(&self, tenant_id: Uuid, id: Uuid) -> Result<bool>;

    /// Right grants held by a role, ordered by creation time.
    async fn list_rights_for_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        options: &ListOptions,
    ) -> Result<Vec<RoleRight>>;

    /// Right grants matching any of `role_ids` for (class, action).
    async fn find_rights(
        &self,
        tenant_id: Uuid,
        role_ids: &[Uuid],
        entity_class_id: Uuid,
        action_code: i32,
    ) -> Result<Vec<RoleRight>>;

    /// Scope refs of a right grant.
    async fn list_scope_refs(&self, tenant_id: Uuid, right_id: Uuid)
        -> Result<Vec<RoleRightScopeRef>>;

    // -- function grants -----------------------------------------------------

    /// Insert a function grant.
    async fn insert_role_function(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        function_id: Uuid,
        originating_right_id: Option<Uuid>,
    ) -> Result<RoleFunction>;

    /// Get a function grant by id.
    async fn get_role_function(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<RoleFunction>>;

    /// Delete a function grant by id.
    async fn delete_role_function(&self, tenant_id: Uuid, id: Uuid) -> Result<bool>;

    /// Function grants held by a role, ordered by creation time.
    async fn list_functions_for_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        options: &ListOptions,
    ) -> Result<Vec<RoleFunction>>;

    /// Whether any of `role_ids` holds a grant for the function.
    async fn has_role_function(
        &self,
        tenant_id: Uuid,
        role_ids: &[Uuid],
        function_id: Uuid,
    ) -> Result<bool>;

    // -- rebuild state -------------------------------------------------------

    /// Whether the tenant's derived tables are stale. Tenants without a
    /// persisted record read as clean.
    async fn get_dirty(&self, tenant_id: Uuid) -> Result<bool>;

    /// Set the tenant's dirty flag.
    async fn set_dirty(&self, tenant_id: Uuid, dirty: bool) -> Result<()>;
}

/// Storage for the derived closure tables.
///
/// The tables are only ever replaced wholesale: `clear_closures` followed by
/// one `insert_role_closure` per role. A failure between those calls leaves
/// the tables partially populated; re-running the build is the repair path.
#[async_trait::async_trait]
pub trait ClosureStore: Send + Sync {
    /// Truncate all derived rows of a tenant.
    async fn clear_closures(&self, tenant_id: Uuid) -> Result<()>;

    /// Append the derived rows of one role.
    async fn insert_role_closure(&self, tenant_id: Uuid, rows: &RoleClosureRows) -> Result<()>;

    /// Ancestry of a role, ordered by level.
    async fn ancestors(&self, tenant_id: Uuid, role_id: Uuid) -> Result<Vec<RoleAncestor>>;

    /// Include refs of a role.
    async fn include_refs(&self, tenant_id: Uuid, role_id: Uuid) -> Result<Vec<RoleIncludeRef>>;

    /// The effective rights-source set of a role.
    async fn expand_set(&self, tenant_id: Uuid, role_id: Uuid) -> Result<Vec<Uuid>>;

    /// Union of the effective sets of several roles.
    async fn expand_union(&self, tenant_id: Uuid, role_ids: &[Uuid]) -> Result<HashSet<Uuid>>;
}

#[derive(Debug, Default)]
struct Tables {
    roles: HashMap<Uuid, Role>,
    includes: HashMap<Uuid, RoleInclude>,
    user_roles: HashMap<Uuid, UserRole>,
    rights: HashMap<Uuid, RoleRight>,
    scope_refs: Vec<RoleRightScopeRef>,
    role_functions: HashMap<Uuid, RoleFunction>,
    ancestors: Vec<RoleAncestor>,
    include_refs: Vec<RoleIncludeRef>,
    expands: Vec<crate::types::RoleExpand>,
    build_states: HashMap<Uuid, BuildState>,
}

/// In-memory store for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemoryAuthzStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryAuthzStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data.
    pub async fn clear(&self) {
        *self.tables.write().await = Tables::default();
    }
}

fn paginate<T>(mut items: Vec<T>, options: &ListOptions) -> Vec<T> {
    let offset = usize::try_from(options.offset).unwrap_or(0);
    let limit = usize::try_from(options.limit).unwrap_or(usize::MAX);
    if offset >= items.len() {
        return Vec::new();
    }
    items.drain(..offset);
    items.truncate(limit);
    items
}

#[async_trait::async_trait]
impl RoleStore for InMemoryAuthzStore {
    async fn insert_role(&self, tenant_id: Uuid, input: CreateRoleInput) -> Result<Role> {
        let now = Utc::now();
        let role = Role {
            id: Uuid::new_v4(),
            tenant_id,
            name: input.name,
            parent_role_id: input.parent_role_id,
            is_catalog: input.is_catalog,
            is_system: input.is_system,
            sort_key: input.sort_key,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .roles
            .insert(role.id, role.clone());
        Ok(role)
    }

    async fn get_role(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Role>> {
        let tables = self.tables.read().await;
        Ok(tables
            .roles
            .get(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned())
    }

    async fn get_role_by_name(&self, tenant_id: Uuid, name: &str) -> Result<Option<Role>> {
        let tables = self.tables.read().await;
        Ok(tables
            .roles
            .values()
            .find(|r| r.tenant_id == tenant_id && r.name == name)
            .cloned())
    }

    async fn update_role(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateRoleInput,
    ) -> Result<Option<Role>> {
        let mut tables = self.tables.write().await;
        let Some(role) = tables.roles.get_mut(&id).filter(|r| r.tenant_id == tenant_id) else {
            return Ok(None);
        };
        if let Some(name) = input.name {
            role.name = name;
        }
        if let Some(sort_key) = input.sort_key {
            role.sort_key = sort_key;
        }
        if let Some(is_catalog) = input.is_catalog {
            role.is_catalog = is_catalog;
        }
        role.updated_at = Utc::now();
        Ok(Some(role.clone()))
    }

    async fn set_role_parent(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        parent_role_id: Option<Uuid>,
    ) -> Result<Option<Role>> {
        let mut tables = self.tables.write().await;
        let Some(role) = tables.roles.get_mut(&id).filter(|r| r.tenant_id == tenant_id) else {
            return Ok(None);
        };
        role.parent_role_id = parent_role_id;
        role.updated_at = Utc::now();
        Ok(Some(role.clone()))
    }

    async fn delete_role_cascade(&self, tenant_id: Uuid, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if !tables
            .roles
            .get(&id)
            .is_some_and(|r| r.tenant_id == tenant_id)
        {
            return Ok(false);
        }
        tables
            .includes
            .retain(|_, e| !(e.tenant_id == tenant_id && (e.role_id == id || e.included_role_id == id)));
        tables
            .user_roles
            .retain(|_, m| !(m.tenant_id == tenant_id && m.role_id == id));
        tables
            .rights
            .retain(|_, r| !(r.tenant_id == tenant_id && r.role_id == id));
        tables
            .scope_refs
            .retain(|s| !(s.tenant_id == tenant_id && s.role_id == id));
        tables
            .role_functions
            .retain(|_, f| !(f.tenant_id == tenant_id && f.role_id == id));
        tables.roles.remove(&id);
        Ok(true)
    }

    async fn list_roles(&self, tenant_id: Uuid) -> Result<Vec<Role>> {
        let tables = self.tables.read().await;
        Ok(tables
            .roles
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn list_children(
        &self,
        tenant_id: Uuid,
        parent_role_id: Option<Uuid>,
        options: &ListOptions,
    ) -> Result<Vec<Role>> {
        let tables = self.tables.read().await;
        let mut children: Vec<Role> = tables
            .roles
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.parent_role_id == parent_role_id)
            .cloned()
            .collect();
        children.sort_by(|a, b| a.sort_key.cmp(&b.sort_key).then_with(|| a.name.cmp(&b.name)));
        Ok(paginate(children, options))
    }

    async fn insert_include(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        included_role_id: Uuid,
    ) -> Result<RoleInclude> {
        let include = RoleInclude {
            id: Uuid::new_v4(),
            tenant_id,
            role_id,
            included_role_id,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .includes
            .insert(include.id, include.clone());
        Ok(include)
    }

    async fn get_include(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<RoleInclude>> {
        let tables = self.tables.read().await;
        Ok(tables
            .includes
            .get(&id)
            .filter(|e| e.tenant_id == tenant_id)
            .cloned())
    }

    async fn delete_include(&self, tenant_id: Uuid, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables
            .includes
            .get(&id)
            .is_some_and(|e| e.tenant_id == tenant_id)
        {
            tables.includes.remove(&id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn list_includes_for_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        options: &ListOptions,
    ) -> Result<Vec<RoleInclude>> {
        let tables = self.tables.read().await;
        let mut edges: Vec<RoleInclude> = tables
            .includes
            .values()
            .filter(|e| e.tenant_id == tenant_id && e.role_id == role_id)
            .cloned()
            .collect();
        edges.sort_by_key(|e| e.created_at);
        Ok(paginate(edges, options))
    }

    async fn list_includes(&self, tenant_id: Uuid) -> Result<Vec<RoleInclude>> {
        let tables = self.tables.read().await;
        Ok(tables
            .includes
            .values()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn insert_user_role(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<UserRole> {
        let membership = UserRole {
            id: Uuid::new_v4(),
            tenant_id,
            user_id,
            role_id,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .user_roles
            .insert(membership.id, membership.clone());
        Ok(membership)
    }

    async fn get_user_role(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<Option<UserRole>> {
        let tables = self.tables.read().await;
        Ok(tables
            .user_roles
            .values()
            .find(|m| m.tenant_id == tenant_id && m.user_id == user_id && m.role_id == role_id)
            .cloned())
    }

    async fn delete_user_role(&self, tenant_id: Uuid, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables
            .user_roles
            .get(&id)
            .is_some_and(|m| m.tenant_id == tenant_id)
        {
            tables.user_roles.remove(&id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn delete_user_roles_for_user(&self, tenant_id: Uuid, user_id: Uuid) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.user_roles.len();
        tables
            .user_roles
            .retain(|_, m| !(m.tenant_id == tenant_id && m.user_id == user_id));
        Ok((before - tables.user_roles.len()) as u64)
    }

    async fn list_role_ids_for_user(&self, tenant_id: Uuid, user_id: Uuid) -> Result<Vec<Uuid>> {
        let tables = self.tables.read().await;
        Ok(tables
            .user_roles
            .values()
            .filter(|m| m.tenant_id == tenant_id && m.user_id == user_id)
            .map(|m| m.role_id)
            .collect())
    }

    async fn insert_right(&self, tenant_id: Uuid, input: AddRoleRightInput) -> Result<RoleRight> {
        let right = RoleRight {
            id: Uuid::new_v4(),
            tenant_id,
            role_id: input.role_id,
            entity_class_id: input.entity_class_id,
            action: input.action,
            scope: input.scope,
            created_at: Utc::now(),
        };
        let mut tables = self.tables.write().await;
        if let Some(scope) = &right.scope {
            for scope_role_id in scope {
                tables.scope_refs.push(RoleRightScopeRef {
                    tenant_id,
                    right_id: right.id,
                    role_id: right.role_id,
                    entity_class_id: right.entity_class_id,
                    action: right.action.code(),
                    scope_role_id: *scope_role_id,
                });
            }
        }
        tables.rights.insert(right.id, right.clone());
        Ok(right)
    }

    async fn get_right(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<RoleRight>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rights
            .get(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned())
    }

    async fn delete_right(&self, tenant_id: Uuid, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if !tables
            .rights
            .get(&id)
            .is_some_and(|r| r.tenant_id == tenant_id)
        {
            return Ok(false);
        }
        tables.rights.remove(&id);
        tables
            .scope_refs
            .retain(|s| !(s.tenant_id == tenant_id && s.right_id == id));
        tables
            .role_functions
            .retain(|_, f| !(f.tenant_id == tenant_id && f.originating_right_id == Some(id)));
        Ok(true)
    }

    async fn list_rights_for_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        options: &ListOptions,
    ) -> Result<Vec<RoleRight>> {
        let tables = self.tables.read().await;
        let mut rights: Vec<RoleRight> = tables
            .rights
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.role_id == role_id)
            .cloned()
            .collect();
        rights.sort_by_key(|r| r.created_at);
        Ok(paginate(rights, options))
    }

    async fn find_rights(
        &self,
        tenant_id: Uuid,
        role_ids: &[Uuid],
        entity_class_id: Uuid,
        action_code: i32,
    ) -> Result<Vec<RoleRight>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rights
            .values()
            .filter(|r| {
                r.tenant_id == tenant_id
                    && r.entity_class_id == entity_class_id
                    && r.action.code() == action_code
                    && role_ids.contains(&r.role_id)
            })
            .cloned()
            .collect())
    }

    async fn list_scope_refs(
        &self,
        tenant_id: Uuid,
        right_id: Uuid,
    ) -> Result<Vec<RoleRightScopeRef>> {
        let tables = self.tables.read().await;
        Ok(tables
            .scope_refs
            .iter()
            .filter(|s| s.tenant_id == tenant_id && s.right_id == right_id)
            .cloned()
            .collect())
    }

    async fn insert_role_function(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        function_id: Uuid,
        originating_right_id: Option<Uuid>,
    ) -> Result<RoleFunction> {
        let grant = RoleFunction {
            id: Uuid::new_v4(),
            tenant_id,
            role_id,
            function_id,
            originating_right_id,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .role_functions
            .insert(grant.id, grant.clone());
        Ok(grant)
    }

    async fn get_role_function(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<RoleFunction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .role_functions
            .get(&id)
            .filter(|f| f.tenant_id == tenant_id)
            .cloned())
    }

    async fn delete_role_function(&self, tenant_id: Uuid, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables
            .role_functions
            .get(&id)
            .is_some_and(|f| f.tenant_id == tenant_id)
        {
            tables.role_functions.remove(&id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn list_functions_for_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        options: &ListOptions,
    ) -> Result<Vec<RoleFunction>> {
        let tables = self.tables.read().await;
        let mut grants: Vec<RoleFunction> = tables
            .role_functions
            .values()
            .filter(|f| f.tenant_id == tenant_id && f.role_id == role_id)
            .cloned()
            .collect();
        grants.sort_by_key(|f| f.created_at);
        Ok(paginate(grants, options))
    }

    async fn has_role_function(
        &self,
        tenant_id: Uuid,
        role_ids: &[Uuid],
        function_id: Uuid,
    ) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables.role_functions.values().any(|f| {
            f.tenant_id == tenant_id
                && f.function_id == function_id
                && role_ids.contains(&f.role_id)
        }))
    }

    async fn get_dirty(&self, tenant_id: Uuid) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .build_states
            .get(&tenant_id)
            .map(|s| s.dirty)
            .unwrap_or(false))
    }

    async fn set_dirty(&self, tenant_id: Uuid, dirty: bool) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.build_states.insert(
            tenant_id,
            BuildState {
                tenant_id,
                dirty,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl ClosureStore for InMemoryAuthzStore {
    async fn clear_closures(&self, tenant_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.ancestors.retain(|a| a.tenant_id != tenant_id);
        tables.include_refs.retain(|r| r.tenant_id != tenant_id);
        tables.expands.retain(|e| e.tenant_id != tenant_id);
        Ok(())
    }

    async fn insert_role_closure(&self, tenant_id: Uuid, rows: &RoleClosureRows) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .ancestors
            .extend(rows.ancestors.iter().cloned().map(|mut a| {
                a.tenant_id = tenant_id;
                a
            }));
        tables
            .include_refs
            .extend(rows.include_refs.iter().cloned().map(|mut r| {
                r.tenant_id = tenant_id;
                r
            }));
        tables.expands.extend(rows.expands.iter().cloned().map(|mut e| {
            e.tenant_id = tenant_id;
            e
        }));
        Ok(())
    }

    async fn ancestors(&self, tenant_id: Uuid, role_id: Uuid) -> Result<Vec<RoleAncestor>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<RoleAncestor> = tables
            .ancestors
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.role_id == role_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.level);
        Ok(rows)
    }

    async fn include_refs(&self, tenant_id: Uuid, role_id: Uuid) -> Result<Vec<RoleIncludeRef>> {
        let tables = self.tables.read().await;
        Ok(tables
            .include_refs
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.role_id == role_id)
            .cloned()
            .collect())
    }

    async fn expand_set(&self, tenant_id: Uuid, role_id: Uuid) -> Result<Vec<Uuid>> {
        let tables = self.tables.read().await;
        Ok(tables
            .expands
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.role_id == role_id)
            .map(|e| e.base_role_id)
            .collect())
    }

    async fn expand_union(&self, tenant_id: Uuid, role_ids: &[Uuid]) -> Result<HashSet<Uuid>> {
        let tables = self.tables.read().await;
        Ok(tables
            .expands
            .iter()
            .filter(|e| e.tenant_id == tenant_id && role_ids.contains(&e.role_id))
            .map(|e| e.base_role_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role_input(name: &str) -> CreateRoleInput {
        CreateRoleInput {
            name: name.to_string(),
            parent_role_id: None,
            is_catalog: false,
            is_system: false,
            sort_key: 0,
        }
    }

    #[tokio::test]
    async fn test_dirty_defaults_to_clean() {
        let store = InMemoryAuthzStore::new();
        let tenant_id = Uuid::new_v4();

        assert!(!store.get_dirty(tenant_id).await.unwrap());
        store.set_dirty(tenant_id, true).await.unwrap();
        assert!(store.get_dirty(tenant_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let store = InMemoryAuthzStore::new();
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();

        let role = store.insert_role(tenant_a, role_input("admins")).await.unwrap();
        assert!(store.get_role(tenant_a, role.id).await.unwrap().is_some());
        assert!(store.get_role(tenant_b, role.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_role_cascade_removes_related_rows() {
        let store = InMemoryAuthzStore::new();
        let tenant_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let class_id = Uuid::new_v4();

        let role = store.insert_role(tenant_id, role_input("editors")).await.unwrap();
        let other = store.insert_role(tenant_id, role_input("writers")).await.unwrap();

        store.insert_include(tenant_id, role.id, other.id).await.unwrap();
        let inbound = store.insert_include(tenant_id, other.id, role.id).await.unwrap();
        store.insert_user_role(tenant_id, user_id, role.id).await.unwrap();
        let right = store
            .insert_right(
                tenant_id,
                AddRoleRightInput {
                    role_id: role.id,
                    entity_class_id: class_id,
                    action: warden_core::Action::Read,
                    scope: Some(vec![other.id]),
                },
            )
            .await
            .unwrap();
        store
            .insert_role_function(tenant_id, role.id, Uuid::new_v4(), Some(right.id))
            .await
            .unwrap();

        assert!(store.delete_role_cascade(tenant_id, role.id).await.unwrap());

        assert!(store.get_role(tenant_id, role.id).await.unwrap().is_none());
        assert!(store.get_include(tenant_id, inbound.id).await.unwrap().is_none());
        assert!(store
            .list_role_ids_for_user(tenant_id, user_id)
            .await
            .unwrap()
            .is_empty());
        assert!(store.get_right(tenant_id, right.id).await.unwrap().is_none());
        assert!(store.list_scope_refs(tenant_id, right.id).await.unwrap().is_empty());
        assert!(store
            .list_functions_for_role(tenant_id, role.id, &ListOptions::default())
            .await
            .unwrap()
            .is_empty());
        // the surviving role keeps its own rows
        assert!(store.get_role(tenant_id, other.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_children_ordering_and_pagination() {
        let store = InMemoryAuthzStore::new();
        let tenant_id = Uuid::new_v4();

        for (name, sort_key) in [("zeta", 0), ("alpha", 0), ("first", -1)] {
            store
                .insert_role(
                    tenant_id,
                    CreateRoleInput {
                        name: name.to_string(),
                        parent_role_id: None,
                        is_catalog: false,
                        is_system: false,
                        sort_key,
                    },
                )
                .await
                .unwrap();
        }

        let all = store
            .list_children(tenant_id, None, &ListOptions::default())
            .await
            .unwrap();
        let names: Vec<&str> = all.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["first", "alpha", "zeta"]);

        let page = store
            .list_children(tenant_id, None, &ListOptions { limit: 1, offset: 1 })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "alpha");
    }

    #[tokio::test]
    async fn test_delete_right_removes_refs_and_derived_grants() {
        let store = InMemoryAuthzStore::new();
        let tenant_id = Uuid::new_v4();
        let role = store.insert_role(tenant_id, role_input("editors")).await.unwrap();
        let scope_role = Uuid::new_v4();

        let right = store
            .insert_right(
                tenant_id,
                AddRoleRightInput {
                    role_id: role.id,
                    entity_class_id: Uuid::new_v4(),
                    action: warden_core::Action::Read,
                    scope: Some(vec![scope_role]),
                },
            )
            .await
            .unwrap();
        let derived = store
            .insert_role_function(tenant_id, role.id, Uuid::new_v4(), Some(right.id))
            .await
            .unwrap();
        let manual = store
            .insert_role_function(tenant_id, role.id, Uuid::new_v4(), None)
            .await
            .unwrap();

        assert!(store.delete_right(tenant_id, right.id).await.unwrap());
        assert!(store.list_scope_refs(tenant_id, right.id).await.unwrap().is_empty());
        assert!(store
            .get_role_function(tenant_id, derived.id)
            .await
            .unwrap()
            .is_none());
        // manual grants survive
        assert!(store
            .get_role_function(tenant_id, manual.id)
            .await
            .unwrap()
            .is_some());
    }
}
