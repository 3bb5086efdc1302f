//! Role-graph authorization engine.
//!
//! Maintains a per-tenant role hierarchy (a tree plus an auxiliary
//! cross-branch include graph), derives transitive-closure tables from it,
//! and answers "can this user perform this action on this entity" from those
//! closures combined with scoped right grants.
//!
//! # Architecture
//!
//! - [`store`] - storage contracts ([`RoleStore`], [`ClosureStore`]) with an
//!   in-memory implementation; the PostgreSQL backend lives in `warden-db`
//! - [`closure`] - the [`ClosureBuilder`] batch rebuild of the derived
//!   ancestry / include-ref / expand tables
//! - [`services`] - mutation services ([`RoleGraphService`], [`RightService`],
//!   [`FunctionService`]) and the read-side [`AuthorizationService`]
//! - [`cache`] - TTL cache of per-user effective role sets
//! - [`resolver`] - lookup contract for entity instances owned by the
//!   external CRUD layer
//!
//! Mutations mark the owning tenant dirty; the rebuild recomputes the derived
//! tables wholesale and clears the flag. Authorization reads never walk the
//! raw graph.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use uuid::Uuid;
//! use warden_core::{Action, StaticRegistry};
//! use warden_authz::{
//!     AuthorizationService, AuthorizeTarget, ClosureBuilder, InMemoryAuthzStore,
//!     InMemoryEntityResolver, RightService, RoleGraphService,
//! };
//! use warden_authz::types::{AddRoleRightInput, CreateRoleInput};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), warden_authz::AuthzError> {
//! let mut registry = StaticRegistry::builder();
//! let article = registry.add_class("cms", "article");
//! registry.add_standard_actions(article);
//! let registry = Arc::new(registry.build());
//!
//! let store = Arc::new(InMemoryAuthzStore::new());
//! let resolver = Arc::new(InMemoryEntityResolver::new());
//! let tenant = Uuid::new_v4();
//! let user = Uuid::new_v4();
//!
//! let roles = RoleGraphService::new(store.clone(), store.clone());
//! let editors = roles
//!     .add(tenant, CreateRoleInput {
//!         name: "editors".into(),
//!         parent_role_id: None,
//!         is_catalog: false,
//!         is_system: false,
//!         sort_key: 0,
//!     })
//!     .await?;
//! roles.add_user_role(tenant, user, editors.id).await?;
//!
//! RightService::new(store.clone(), registry.clone())
//!     .add(tenant, AddRoleRightInput {
//!         role_id: editors.id,
//!         entity_class_id: article,
//!         action: Action::Create,
//!         scope: None,
//!     })
//!     .await?;
//!
//! ClosureBuilder::new(store.clone(), store.clone())
//!     .build(tenant, None)
//!     .await?;
//!
//! let authz = AuthorizationService::new(store.clone(), store, registry, resolver);
//! assert!(authz
//!     .authorize(tenant, user, AuthorizeTarget::EntityClass(article), Action::Create)
//!     .await?);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod closure;
pub mod error;
pub mod resolver;
pub mod services;
pub mod store;
pub mod types;

pub use cache::EffectiveRoleCache;
pub use closure::{compute_closures, BuildSummary, ClosureBuilder, RoleClosureRows};
pub use error::{AuthzError, Result};
pub use resolver::{EntityRef, EntityResolver, InMemoryEntityResolver};
pub use services::{
    AuthorizationService, AuthorizeTarget, FunctionService, RightService, RoleGraphService,
};
pub use store::{ClosureStore, InMemoryAuthzStore, RoleStore};
