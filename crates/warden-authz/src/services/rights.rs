//! Right grants.
//!
//! A right grants an action on an entity class to a role, optionally scoped
//! to owner roles. Granting create or read also materializes the class's
//! auto-associated function grants, so that e.g. a content-read right
//! implicitly carries the matching listing capability; deleting the right
//! removes them again.

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use warden_core::{Action, EntityClassRegistry};

use crate::error::{AuthzError, Result};
use crate::store::RoleStore;
use crate::types::{AddRoleRightInput, ListOptions, RoleRight, RoleRightSpec};

/// Service for managing right grants.
pub struct RightService {
    store: Arc<dyn RoleStore>,
    registry: Arc<dyn EntityClassRegistry>,
}

impl RightService {
    /// Create a new right service.
    pub fn new(store: Arc<dyn RoleStore>, registry: Arc<dyn EntityClassRegistry>) -> Self {
        Self { store, registry }
    }

    /// Grant an action on an entity class to a role.
    pub async fn add(&self, tenant_id: Uuid, mut input: AddRoleRightInput) -> Result<RoleRight> {
        self.store
            .get_role(tenant_id, input.role_id)
            .await?
            .ok_or(AuthzError::RoleNotFound(input.role_id))?;

        let class = self
            .registry
            .class_by_id(input.entity_class_id)
            .ok_or(AuthzError::EntityClassNotFound(input.entity_class_id))?;
        self.registry
            .action(class.id, input.action.code())
            .ok_or(AuthzError::ActionNotDefined {
                class_id: class.id,
                code: input.action.code(),
            })?;

        input.scope = normalize_scope(input.scope);

        let action = input.action;
        let right = self.store.insert_right(tenant_id, input).await?;

        // create/read grants carry the class's associated UI capabilities
        if matches!(action, Action::Create | Action::Read) {
            for function in self.registry.auto_right_functions(class.id, action) {
                self.store
                    .insert_role_function(tenant_id, right.role_id, function.id, Some(right.id))
                    .await?;
            }
        }

        tracing::info!(
            %tenant_id,
            right_id = %right.id,
            role_id = %right.role_id,
            class = %class.name,
            action = %action,
            "role right added"
        );
        Ok(right)
    }

    /// Remove a right grant together with its scope refs and the function
    /// grants derived from it.
    pub async fn delete(&self, tenant_id: Uuid, right_id: Uuid) -> Result<()> {
        self.store
            .get_right(tenant_id, right_id)
            .await?
            .ok_or(AuthzError::RightNotFound(right_id))?;

        self.store.delete_right(tenant_id, right_id).await?;
        tracing::info!(%tenant_id, %right_id, "role right deleted");
        Ok(())
    }

    /// Right grants held by a role.
    pub async fn rights_for_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        options: &ListOptions,
    ) -> Result<Vec<RoleRight>> {
        self.store
            .list_rights_for_role(tenant_id, role_id, options)
            .await
    }

    /// Declarative bulk grant against a named entity class: roles and scope
    /// members are resolved by name.
    pub async fn add_batch(
        &self,
        tenant_id: Uuid,
        module: &str,
        class_name: &str,
        specs: &[RoleRightSpec],
    ) -> Result<Vec<RoleRight>> {
        let class = self
            .registry
            .class_by_name(module, class_name)
            .ok_or_else(|| AuthzError::EntityClassNameNotFound {
                module: module.to_string(),
                name: class_name.to_string(),
            })?;

        let mut granted = Vec::with_capacity(specs.len());
        for spec in specs {
            let role = self
                .store
                .get_role_by_name(tenant_id, &spec.role_name)
                .await?
                .ok_or_else(|| AuthzError::RoleNameNotFound(spec.role_name.clone()))?;

            let scope = match &spec.scope_names {
                None => None,
                Some(names) if names.is_empty() => None,
                Some(names) => {
                    let mut ids = Vec::with_capacity(names.len());
                    for name in names {
                        let scope_role = self
                            .store
                            .get_role_by_name(tenant_id, name)
                            .await?
                            .ok_or_else(|| AuthzError::RoleNameNotFound(name.clone()))?;
                        ids.push(scope_role.id);
                    }
                    Some(ids)
                }
            };

            granted.push(
                self.add(
                    tenant_id,
                    AddRoleRightInput {
                        role_id: role.id,
                        entity_class_id: class.id,
                        action: spec.action,
                        scope,
                    },
                )
                .await?,
            );
        }
        Ok(granted)
    }
}

fn normalize_scope(scope: Option<Vec<Uuid>>) -> Option<Vec<Uuid>> {
    let scope = scope?;
    if scope.is_empty() {
        return None;
    }
    let mut seen = HashSet::new();
    let deduped: Vec<Uuid> = scope.into_iter().filter(|id| seen.insert(*id)).collect();
    Some(deduped)
}
