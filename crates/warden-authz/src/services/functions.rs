//! Manual function grants.
//!
//! Function grants derived from rights are owned by [`RightService`]; this
//! service manages the manually assigned ones (`originating_right_id = None`),
//! including declarative batch assignment by role name.
//!
//! [`RightService`]: crate::services::RightService

use std::sync::Arc;

use uuid::Uuid;

use warden_core::EntityClassRegistry;

use crate::error::{AuthzError, Result};
use crate::store::RoleStore;
use crate::types::{ListOptions, RoleFunction, RoleFunctionSpec};

/// Service for managing manual function grants.
pub struct FunctionService {
    store: Arc<dyn RoleStore>,
    registry: Arc<dyn EntityClassRegistry>,
}

impl FunctionService {
    /// Create a new function service.
    pub fn new(store: Arc<dyn RoleStore>, registry: Arc<dyn EntityClassRegistry>) -> Self {
        Self { store, registry }
    }

    /// Grant a function to a role.
    pub async fn add(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        function_id: Uuid,
    ) -> Result<RoleFunction> {
        self.store
            .get_role(tenant_id, role_id)
            .await?
            .ok_or(AuthzError::RoleNotFound(role_id))?;
        self.registry
            .function_by_id(function_id)
            .ok_or_else(|| AuthzError::FunctionNotFound(function_id.to_string()))?;

        self.store
            .insert_role_function(tenant_id, role_id, function_id, None)
            .await
    }

    /// Remove a function grant.
    pub async fn delete(&self, tenant_id: Uuid, grant_id: Uuid) -> Result<()> {
        self.store
            .get_role_function(tenant_id, grant_id)
            .await?
            .ok_or(AuthzError::FunctionGrantNotFound(grant_id))?;
        self.store.delete_role_function(tenant_id, grant_id).await?;
        Ok(())
    }

    /// Function grants held by a role.
    pub async fn functions_for_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        options: &ListOptions,
    ) -> Result<Vec<RoleFunction>> {
        self.store
            .list_functions_for_role(tenant_id, role_id, options)
            .await
    }

    /// Declarative bulk assignment: functions and roles resolved by name
    /// within one module.
    pub async fn add_batch(
        &self,
        tenant_id: Uuid,
        module: &str,
        specs: &[RoleFunctionSpec],
    ) -> Result<Vec<RoleFunction>> {
        let mut granted = Vec::with_capacity(specs.len());
        for spec in specs {
            let function = self
                .registry
                .function_by_name(module, &spec.name)
                .ok_or_else(|| AuthzError::FunctionNotFound(format!("{module}/{}", spec.name)))?;
            let role = self
                .store
                .get_role_by_name(tenant_id, &spec.role_name)
                .await?
                .ok_or_else(|| AuthzError::RoleNameNotFound(spec.role_name.clone()))?;

            granted.push(self.add(tenant_id, role.id, function.id).await?);
        }
        Ok(granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::StaticRegistry;

    use crate::store::{InMemoryAuthzStore, RoleStore};
    use crate::types::CreateRoleInput;

    async fn fixture() -> (FunctionService, Arc<InMemoryAuthzStore>, Uuid, Uuid, Uuid) {
        let mut builder = StaticRegistry::builder();
        let report_fn = builder.add_function("cms", "renderReport");
        let registry = Arc::new(builder.build());

        let store = Arc::new(InMemoryAuthzStore::new());
        let tenant_id = Uuid::new_v4();
        let role = store
            .insert_role(
                tenant_id,
                CreateRoleInput {
                    name: "analysts".to_string(),
                    parent_role_id: None,
                    is_catalog: false,
                    is_system: false,
                    sort_key: 0,
                },
            )
            .await
            .unwrap();

        let service = FunctionService::new(store.clone(), registry);
        (service, store, tenant_id, role.id, report_fn)
    }

    #[tokio::test]
    async fn test_manual_grant_lifecycle() {
        let (service, _, tenant_id, role_id, function_id) = fixture().await;

        let grant = service.add(tenant_id, role_id, function_id).await.unwrap();
        assert_eq!(grant.originating_right_id, None);

        service.delete(tenant_id, grant.id).await.unwrap();
        let err = service.delete(tenant_id, grant.id).await.unwrap_err();
        assert!(matches!(err, AuthzError::FunctionGrantNotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_function_rejected() {
        let (service, _, tenant_id, role_id, _) = fixture().await;

        let err = service
            .add(tenant_id, role_id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::FunctionNotFound(_)));
    }

    #[tokio::test]
    async fn test_add_batch_by_names() {
        let (service, _, tenant_id, role_id, function_id) = fixture().await;

        let granted = service
            .add_batch(
                tenant_id,
                "cms",
                &[RoleFunctionSpec {
                    role_name: "analysts".to_string(),
                    name: "renderReport".to_string(),
                }],
            )
            .await
            .unwrap();

        assert_eq!(granted.len(), 1);
        assert_eq!(granted[0].role_id, role_id);
        assert_eq!(granted[0].function_id, function_id);

        let err = service
            .add_batch(
                tenant_id,
                "cms",
                &[RoleFunctionSpec {
                    role_name: "analysts".to_string(),
                    name: "unknown".to_string(),
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::FunctionNotFound(_)));
    }
}
