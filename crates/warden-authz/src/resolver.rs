//! Entity resolution for authorization checks.
//!
//! Instance-targeted checks need two facts about the target entity: its class
//! and its owning role. The CRUD layer that stores entities is outside this
//! engine, so the lookup goes through this trait.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// The authorization-relevant facts of an entity instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRef {
    /// Entity id.
    pub id: Uuid,

    /// The entity's class.
    pub class_id: Uuid,

    /// The role owning the entity; `None` when ownership is unassigned, in
    /// which case scoped rights never match.
    pub owner_role_id: Option<Uuid>,
}

/// Trait for resolving entity instances.
#[async_trait::async_trait]
pub trait EntityResolver: Send + Sync {
    /// Resolve an entity by id; `None` when it does not exist.
    async fn resolve(&self, tenant_id: Uuid, entity_id: Uuid) -> Result<Option<EntityRef>>;
}

/// In-memory entity resolver for testing.
#[derive(Debug, Default)]
pub struct InMemoryEntityResolver {
    entities: Arc<RwLock<HashMap<(Uuid, Uuid), EntityRef>>>,
}

impl InMemoryEntityResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity.
    pub async fn add_entity(
        &self,
        tenant_id: Uuid,
        class_id: Uuid,
        owner_role_id: Option<Uuid>,
    ) -> Uuid {
        let entity = EntityRef {
            id: Uuid::new_v4(),
            class_id,
            owner_role_id,
        };
        self.entities
            .write()
            .await
            .insert((tenant_id, entity.id), entity);
        entity.id
    }
}

#[async_trait::async_trait]
impl EntityResolver for InMemoryEntityResolver {
    async fn resolve(&self, tenant_id: Uuid, entity_id: Uuid) -> Result<Option<EntityRef>> {
        Ok(self
            .entities
            .read()
            .await
            .get(&(tenant_id, entity_id))
            .copied())
    }
}
