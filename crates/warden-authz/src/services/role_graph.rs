//! Role graph mutations: tree, include edges, memberships.
//!
//! Every topology change (add/move/delete role, add/remove include) marks the
//! tenant dirty after the mutation is committed, so a dirty check observed
//! after a rebuild reliably detects writes the rebuild missed. Membership and
//! naming changes do not require a rebuild.

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::cache::EffectiveRoleCache;
use crate::error::{AuthzError, Result};
use crate::store::{ClosureStore, RoleStore};
use crate::types::{CreateRoleInput, ListOptions, Role, RoleInclude, UpdateRoleInput, UserRole};

/// Service for role-graph mutations and membership management.
pub struct RoleGraphService {
    store: Arc<dyn RoleStore>,
    closures: Arc<dyn ClosureStore>,
    cache: Option<EffectiveRoleCache>,
}

impl RoleGraphService {
    /// Create a new role graph service.
    pub fn new(store: Arc<dyn RoleStore>, closures: Arc<dyn ClosureStore>) -> Self {
        Self {
            store,
            closures,
            cache: None,
        }
    }

    /// Attach the effective-role-set cache so membership changes invalidate it.
    #[must_use]
    pub fn with_cache(mut self, cache: EffectiveRoleCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Add a role.
    pub async fn add(&self, tenant_id: Uuid, input: CreateRoleInput) -> Result<Role> {
        if input.name.trim().is_empty() {
            return Err(AuthzError::Validation("Role name cannot be empty".into()));
        }
        if let Some(parent_id) = input.parent_role_id {
            self.get(tenant_id, parent_id).await?;
        }

        let role = self.store.insert_role(tenant_id, input).await?;
        self.store.set_dirty(tenant_id, true).await?;
        tracing::info!(%tenant_id, role_id = %role.id, name = %role.name, "role added");
        Ok(role)
    }

    /// Get a role by id.
    pub async fn get(&self, tenant_id: Uuid, role_id: Uuid) -> Result<Role> {
        self.store
            .get_role(tenant_id, role_id)
            .await?
            .ok_or(AuthzError::RoleNotFound(role_id))
    }

    /// Get a role by name.
    pub async fn get_by_name(&self, tenant_id: Uuid, name: &str) -> Result<Role> {
        self.store
            .get_role_by_name(tenant_id, name)
            .await?
            .ok_or_else(|| AuthzError::RoleNameNotFound(name.to_string()))
    }

    /// Update a role's name, ordering, or catalog flag. Does not touch
    /// topology and therefore does not mark the tenant dirty.
    pub async fn save(&self, tenant_id: Uuid, role_id: Uuid, input: UpdateRoleInput) -> Result<Role> {
        if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AuthzError::Validation("Role name cannot be empty".into()));
        }
        self.store
            .update_role(tenant_id, role_id, input)
            .await?
            .ok_or(AuthzError::RoleNotFound(role_id))
    }

    /// Move a role under a new parent. A no-op when the parent is unchanged.
    pub async fn move_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        new_parent_id: Option<Uuid>,
    ) -> Result<Role> {
        let role = self.get(tenant_id, role_id).await?;
        if role.parent_role_id == new_parent_id {
            return Ok(role);
        }

        if let Some(parent_id) = new_parent_id {
            if parent_id == role_id {
                return Err(AuthzError::Validation(
                    "A role cannot be its own parent".into(),
                ));
            }
            self.get(tenant_id, parent_id).await?;
            if self.is_in_ancestry(tenant_id, role_id, parent_id).await? {
                return Err(AuthzError::Validation(
                    "Moving the role under its own descendant would create a cycle".into(),
                ));
            }
        }

        let moved = self
            .store
            .set_role_parent(tenant_id, role_id, new_parent_id)
            .await?
            .ok_or(AuthzError::RoleNotFound(role_id))?;
        self.store.set_dirty(tenant_id, true).await?;
        tracing::info!(%tenant_id, %role_id, parent = ?new_parent_id, "role moved");
        Ok(moved)
    }

    /// Delete a role and cascade its includes, memberships, rights, and
    /// function grants.
    pub async fn delete(&self, tenant_id: Uuid, role_id: Uuid, force: bool) -> Result<()> {
        let role = self.get(tenant_id, role_id).await?;

        if role.is_system {
            return Err(AuthzError::SystemRoleProtected(role_id));
        }
        if role.is_catalog && !force {
            let children = self
                .store
                .list_children(tenant_id, Some(role_id), &ListOptions { limit: 1, offset: 0 })
                .await?;
            if !children.is_empty() {
                return Err(AuthzError::CatalogNotEmpty(role_id));
            }
        }

        self.store.delete_role_cascade(tenant_id, role_id).await?;
        self.store.set_dirty(tenant_id, true).await?;
        if let Some(cache) = &self.cache {
            cache.invalidate_tenant(tenant_id).await;
        }
        tracing::info!(%tenant_id, %role_id, name = %role.name, "role deleted");
        Ok(())
    }

    /// Children of a parent (`None` = root level), ordered by sort key then
    /// name.
    pub async fn children(
        &self,
        tenant_id: Uuid,
        parent_role_id: Option<Uuid>,
        options: &ListOptions,
    ) -> Result<Vec<Role>> {
        self.store
            .list_children(tenant_id, parent_role_id, options)
            .await
    }

    /// Add an include edge: `role_id` inherits `included_role_id`'s rights.
    pub async fn add_include(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        included_role_id: Uuid,
    ) -> Result<RoleInclude> {
        if role_id == included_role_id {
            return Err(AuthzError::Validation("A role cannot include itself".into()));
        }
        self.get(tenant_id, role_id).await?;
        self.get(tenant_id, included_role_id).await?;

        let include = self
            .store
            .insert_include(tenant_id, role_id, included_role_id)
            .await?;
        self.store.set_dirty(tenant_id, true).await?;
        tracing::info!(%tenant_id, %role_id, %included_role_id, "role include added");
        Ok(include)
    }

    /// Remove an include edge.
    pub async fn remove_include(&self, tenant_id: Uuid, include_id: Uuid) -> Result<()> {
        self.store
            .get_include(tenant_id, include_id)
            .await?
            .ok_or(AuthzError::IncludeNotFound(include_id))?;

        self.store.delete_include(tenant_id, include_id).await?;
        self.store.set_dirty(tenant_id, true).await?;
        Ok(())
    }

    /// Include edges declared by a role.
    pub async fn includes(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        options: &ListOptions,
    ) -> Result<Vec<RoleInclude>> {
        self.store
            .list_includes_for_role(tenant_id, role_id, options)
            .await
    }

    /// Add a user to a role. Idempotent for an existing membership.
    pub async fn add_user_role(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<UserRole> {
        self.get(tenant_id, role_id).await?;
        if let Some(existing) = self.store.get_user_role(tenant_id, user_id, role_id).await? {
            return Ok(existing);
        }

        let membership = self
            .store
            .insert_user_role(tenant_id, user_id, role_id)
            .await?;
        if let Some(cache) = &self.cache {
            cache.invalidate_user(tenant_id, user_id).await;
        }
        Ok(membership)
    }

    /// Remove a user from a role. A no-op when the membership does not exist.
    pub async fn remove_user_role(&self, tenant_id: Uuid, user_id: Uuid, role_id: Uuid) -> Result<()> {
        let Some(membership) = self.store.get_user_role(tenant_id, user_id, role_id).await? else {
            return Ok(());
        };
        self.store.delete_user_role(tenant_id, membership.id).await?;
        if let Some(cache) = &self.cache {
            cache.invalidate_user(tenant_id, user_id).await;
        }
        Ok(())
    }

    /// Remove all memberships of a user; returns how many were removed.
    pub async fn remove_all_user_roles(&self, tenant_id: Uuid, user_id: Uuid) -> Result<u64> {
        let removed = self
            .store
            .delete_user_roles_for_user(tenant_id, user_id)
            .await?;
        if let Some(cache) = &self.cache {
            cache.invalidate_user(tenant_id, user_id).await;
        }
        Ok(removed)
    }

    /// Ids of the roles a user directly belongs to.
    pub async fn user_roles(&self, tenant_id: Uuid, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.store.list_role_ids_for_user(tenant_id, user_id).await
    }

    /// Whether the user directly belongs to the role.
    pub async fn user_in_role_direct(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<bool> {
        Ok(self
            .store
            .list_role_ids_for_user(tenant_id, user_id)
            .await?
            .contains(&role_id))
    }

    /// Whether the role is in the user's effective set (direct memberships
    /// plus their expand sets).
    pub async fn user_in_role_expanded(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<bool> {
        let direct = self.store.list_role_ids_for_user(tenant_id, user_id).await?;
        if direct.contains(&role_id) {
            return Ok(true);
        }
        let expanded = self.closures.expand_union(tenant_id, &direct).await?;
        Ok(expanded.contains(&role_id))
    }

    /// Whether the tenant's derived tables are stale.
    pub async fn is_dirty(&self, tenant_id: Uuid) -> Result<bool> {
        self.store.get_dirty(tenant_id).await
    }

    async fn is_in_ancestry(
        &self,
        tenant_id: Uuid,
        needle: Uuid,
        start: Uuid,
    ) -> Result<bool> {
        let mut seen = HashSet::new();
        let mut current = Some(start);
        while let Some(id) = current {
            if id == needle {
                return Ok(true);
            }
            if !seen.insert(id) {
                break;
            }
            current = self
                .store
                .get_role(tenant_id, id)
                .await?
                .and_then(|r| r.parent_role_id);
        }
        Ok(false)
    }
}
