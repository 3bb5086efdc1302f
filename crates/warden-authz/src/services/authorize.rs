//! The authorization decision.
//!
//! The decision never walks the raw role graph: it combines the actor's
//! effective role set (direct memberships plus the pre-computed expand sets)
//! with the right grants. Absence of a matching grant is an explicit deny —
//! there is no implicit allow and no default-permissive role. Errors are
//! reserved for missing referents (entity, entity class, function), so callers
//! can decide whether to present them as 404 or as a denial.

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use warden_core::{Action, EntityClassRegistry};

use crate::cache::EffectiveRoleCache;
use crate::error::{AuthzError, Result};
use crate::resolver::{EntityRef, EntityResolver};
use crate::store::{ClosureStore, RoleStore};
use crate::types::RoleRight;

/// What an authorization check is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizeTarget {
    /// An entity class; the only valid target of `create`.
    EntityClass(Uuid),
    /// A concrete entity instance; the target of every other action.
    Entity(Uuid),
}

/// Read-side service answering "can this user perform this action here".
pub struct AuthorizationService {
    store: Arc<dyn RoleStore>,
    closures: Arc<dyn ClosureStore>,
    registry: Arc<dyn EntityClassRegistry>,
    entities: Arc<dyn EntityResolver>,
    cache: Option<EffectiveRoleCache>,
}

impl AuthorizationService {
    /// Create a new authorization service.
    pub fn new(
        store: Arc<dyn RoleStore>,
        closures: Arc<dyn ClosureStore>,
        registry: Arc<dyn EntityClassRegistry>,
        entities: Arc<dyn EntityResolver>,
    ) -> Self {
        Self {
            store,
            closures,
            registry,
            entities,
            cache: None,
        }
    }

    /// Serve effective role sets from a TTL cache.
    #[must_use]
    pub fn with_cache(mut self, cache: EffectiveRoleCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Decide whether `user_id` may perform `action` on `target`.
    pub async fn authorize(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        target: AuthorizeTarget,
        action: Action,
    ) -> Result<bool> {
        match (action, target) {
            (Action::Create, AuthorizeTarget::EntityClass(class_id)) => {
                self.check_create(tenant_id, user_id, class_id).await
            }
            (Action::Create, AuthorizeTarget::Entity(_)) => Err(AuthzError::Validation(
                "create targets an entity class, not an entity".into(),
            )),
            (_, AuthorizeTarget::EntityClass(_)) => Err(AuthzError::Validation(
                "only create targets an entity class".into(),
            )),
            (_, AuthorizeTarget::Entity(entity_id)) => {
                self.check_instance(tenant_id, user_id, entity_id, action).await
            }
        }
    }

    /// Decide whether `user_id` holds the named function capability.
    pub async fn function_allowed(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        module: &str,
        name: &str,
    ) -> Result<bool> {
        let function = self
            .registry
            .function_by_name(module, name)
            .ok_or_else(|| AuthzError::FunctionNotFound(format!("{module}/{name}")))?;

        let effective = self.effective_roles(tenant_id, user_id).await?;
        let role_ids: Vec<Uuid> = effective.iter().copied().collect();
        self.store
            .has_role_function(tenant_id, &role_ids, function.id)
            .await
    }

    /// The actor's effective role set: direct memberships united with their
    /// expand sets.
    pub async fn effective_roles(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Arc<HashSet<Uuid>>> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(tenant_id, user_id).await {
                return Ok(cached);
            }
        }

        let direct = self.store.list_role_ids_for_user(tenant_id, user_id).await?;
        let mut effective = self.closures.expand_union(tenant_id, &direct).await?;
        effective.extend(direct);
        let effective = Arc::new(effective);

        if let Some(cache) = &self.cache {
            cache
                .insert(tenant_id, user_id, effective.clone())
                .await;
        }
        Ok(effective)
    }

    async fn check_create(&self, tenant_id: Uuid, user_id: Uuid, class_id: Uuid) -> Result<bool> {
        self.registry
            .class_by_id(class_id)
            .ok_or(AuthzError::EntityClassNotFound(class_id))?;

        let candidates = self
            .candidate_rights(tenant_id, user_id, class_id, Action::Create)
            .await?;
        // create has no owning entity, so scope does not restrict it
        Ok(!candidates.is_empty())
    }

    async fn check_instance(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        entity_id: Uuid,
        action: Action,
    ) -> Result<bool> {
        let entity = self
            .entities
            .resolve(tenant_id, entity_id)
            .await?
            .ok_or(AuthzError::EntityNotFound(entity_id))?;
        self.registry
            .class_by_id(entity.class_id)
            .ok_or(AuthzError::EntityClassNotFound(entity.class_id))?;

        if matches!(action, Action::Write | Action::Delete | Action::Custom(_)) {
            let class_action = self
                .registry
                .action(entity.class_id, action.code())
                .ok_or(AuthzError::ActionNotDefined {
                    class_id: entity.class_id,
                    code: action.code(),
                })?;
            if !class_action.authorize {
                return Err(AuthzError::Validation(format!(
                    "action {action} is authorized through its carrier grant, not directly"
                )));
            }
        } else if matches!(action, Action::Save | Action::Submit) {
            return Err(AuthzError::Validation(format!(
                "action {action} is authorized through the write grant, not directly"
            )));
        }

        let candidates = self
            .candidate_rights(tenant_id, user_id, entity.class_id, action)
            .await?;
        self.any_grant_applies(tenant_id, &entity, &candidates).await
    }

    async fn candidate_rights(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        class_id: Uuid,
        action: Action,
    ) -> Result<Vec<RoleRight>> {
        let effective = self.effective_roles(tenant_id, user_id).await?;
        if effective.is_empty() {
            return Ok(Vec::new());
        }
        let role_ids: Vec<Uuid> = effective.iter().copied().collect();
        self.store
            .find_rights(tenant_id, &role_ids, class_id, action.code())
            .await
    }

    /// A candidate grants when it is unscoped, or when the entity's owning
    /// role is in scope directly or through its own expand set — ownership
    /// inheritance mirrors rights inheritance.
    async fn any_grant_applies(
        &self,
        tenant_id: Uuid,
        entity: &EntityRef,
        candidates: &[RoleRight],
    ) -> Result<bool> {
        let mut owner_expand: Option<HashSet<Uuid>> = None;

        for right in candidates {
            let Some(scope) = &right.scope else {
                return Ok(true);
            };
            let Some(owner_role_id) = entity.owner_role_id else {
                continue;
            };
            if scope.contains(&owner_role_id) {
                return Ok(true);
            }
            if owner_expand.is_none() {
                owner_expand = Some(
                    self.closures
                        .expand_set(tenant_id, owner_role_id)
                        .await?
                        .into_iter()
                        .collect(),
                );
            }
            let expand = owner_expand.as_ref().unwrap();
            if scope.iter().any(|scope_role| expand.contains(scope_role)) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use warden_core::StaticRegistry;

    use crate::closure::ClosureBuilder;
    use crate::resolver::InMemoryEntityResolver;
    use crate::store::InMemoryAuthzStore;
    use crate::types::{AddRoleRightInput, CreateRoleInput};

    struct Fixture {
        service: AuthorizationService,
        store: Arc<InMemoryAuthzStore>,
        resolver: Arc<InMemoryEntityResolver>,
        tenant_id: Uuid,
        article_class: Uuid,
        user_id: Uuid,
        root: Uuid,
        editor: Uuid,
        writer: Uuid,
        contributor: Uuid,
    }

    fn role_input(name: &str, parent: Option<Uuid>, catalog: bool) -> CreateRoleInput {
        CreateRoleInput {
            name: name.to_string(),
            parent_role_id: parent,
            is_catalog: catalog,
            is_system: false,
            sort_key: 0,
        }
    }

    /// root (catalog) -> editor (catalog) -> writer; include writer ->
    /// contributor; the user belongs to writer.
    async fn fixture() -> Fixture {
        let mut builder = StaticRegistry::builder();
        let article_class = builder.add_class("cms", "article");
        builder.add_standard_actions(article_class);
        builder.add_action(
            article_class,
            warden_core::ClassAction::new(Action::Custom(101), "Publish"),
        );
        let list_fn = builder.add_function("cms", "listArticle");
        builder.add_auto_right(article_class, Action::Read, list_fn);
        let registry = Arc::new(builder.build());

        let store = Arc::new(InMemoryAuthzStore::new());
        let resolver = Arc::new(InMemoryEntityResolver::new());
        let tenant_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let root = store
            .insert_role(tenant_id, role_input("root", None, true))
            .await
            .unwrap();
        let editor = store
            .insert_role(tenant_id, role_input("editor", Some(root.id), true))
            .await
            .unwrap();
        let writer = store
            .insert_role(tenant_id, role_input("writer", Some(editor.id), false))
            .await
            .unwrap();
        let contributor = store
            .insert_role(tenant_id, role_input("contributor", None, false))
            .await
            .unwrap();
        store
            .insert_include(tenant_id, writer.id, contributor.id)
            .await
            .unwrap();
        store
            .insert_user_role(tenant_id, user_id, writer.id)
            .await
            .unwrap();

        ClosureBuilder::new(store.clone(), store.clone())
            .build(tenant_id, None)
            .await
            .unwrap();

        let service = AuthorizationService::new(
            store.clone(),
            store.clone(),
            registry,
            resolver.clone(),
        );

        Fixture {
            service,
            store,
            resolver,
            tenant_id,
            article_class,
            user_id,
            root: root.id,
            editor: editor.id,
            writer: writer.id,
            contributor: contributor.id,
        }
    }

    async fn grant(f: &Fixture, role_id: Uuid, action: Action, scope: Option<Vec<Uuid>>) {
        f.store
            .insert_right(
                f.tenant_id,
                AddRoleRightInput {
                    role_id,
                    entity_class_id: f.article_class,
                    action,
                    scope,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deny_without_any_grant() {
        let f = fixture().await;
        let article = f.resolver.add_entity(f.tenant_id, f.article_class, None).await;

        let allowed = f
            .service
            .authorize(f.tenant_id, f.user_id, AuthorizeTarget::Entity(article), Action::Read)
            .await
            .unwrap();
        assert!(!allowed);
    }

    #[tokio::test]
    async fn test_grant_through_included_role() {
        let f = fixture().await;
        // the right sits on the included contributor role, the user belongs
        // to writer only
        grant(&f, f.contributor, Action::Read, None).await;
        let article = f.resolver.add_entity(f.tenant_id, f.article_class, None).await;

        let allowed = f
            .service
            .authorize(f.tenant_id, f.user_id, AuthorizeTarget::Entity(article), Action::Read)
            .await
            .unwrap();
        assert!(allowed);
    }

    #[tokio::test]
    async fn test_grant_through_ancestor_role() {
        let f = fixture().await;
        grant(&f, f.root, Action::Write, None).await;
        let article = f.resolver.add_entity(f.tenant_id, f.article_class, None).await;

        let allowed = f
            .service
            .authorize(f.tenant_id, f.user_id, AuthorizeTarget::Entity(article), Action::Write)
            .await
            .unwrap();
        assert!(allowed);
    }

    #[tokio::test]
    async fn test_unrelated_role_grant_denies() {
        let f = fixture().await;
        let stranger = f
            .store
            .insert_role(f.tenant_id, role_input("stranger", None, false))
            .await
            .unwrap();
        grant(&f, stranger.id, Action::Read, None).await;
        let article = f.resolver.add_entity(f.tenant_id, f.article_class, None).await;

        let allowed = f
            .service
            .authorize(f.tenant_id, f.user_id, AuthorizeTarget::Entity(article), Action::Read)
            .await
            .unwrap();
        assert!(!allowed);
    }

    #[tokio::test]
    async fn test_create_targets_the_class() {
        let f = fixture().await;
        grant(&f, f.writer, Action::Create, None).await;

        let allowed = f
            .service
            .authorize(
                f.tenant_id,
                f.user_id,
                AuthorizeTarget::EntityClass(f.article_class),
                Action::Create,
            )
            .await
            .unwrap();
        assert!(allowed);

        let err = f
            .service
            .authorize(
                f.tenant_id,
                f.user_id,
                AuthorizeTarget::Entity(Uuid::new_v4()),
                Action::Create,
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_scoped_right_matches_owner_directly() {
        let f = fixture().await;
        grant(&f, f.writer, Action::Read, Some(vec![f.contributor])).await;

        let owned = f
            .resolver
            .add_entity(f.tenant_id, f.article_class, Some(f.contributor))
            .await;
        let foreign_owner = f
            .store
            .insert_role(f.tenant_id, role_input("outsider", None, false))
            .await
            .unwrap();
        let foreign = f
            .resolver
            .add_entity(f.tenant_id, f.article_class, Some(foreign_owner.id))
            .await;
        let unowned = f.resolver.add_entity(f.tenant_id, f.article_class, None).await;

        assert!(f
            .service
            .authorize(f.tenant_id, f.user_id, AuthorizeTarget::Entity(owned), Action::Read)
            .await
            .unwrap());
        assert!(!f
            .service
            .authorize(f.tenant_id, f.user_id, AuthorizeTarget::Entity(foreign), Action::Read)
            .await
            .unwrap());
        // entities without an owning role never match a scoped right
        assert!(!f
            .service
            .authorize(f.tenant_id, f.user_id, AuthorizeTarget::Entity(unowned), Action::Read)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_scoped_right_matches_owner_through_expand() {
        let f = fixture().await;
        // scope = editor; the owning role is writer, whose expand set
        // contains editor
        grant(&f, f.writer, Action::Read, Some(vec![f.editor])).await;

        let owned_by_writer = f
            .resolver
            .add_entity(f.tenant_id, f.article_class, Some(f.writer))
            .await;
        assert!(f
            .service
            .authorize(
                f.tenant_id,
                f.user_id,
                AuthorizeTarget::Entity(owned_by_writer),
                Action::Read
            )
            .await
            .unwrap());

        // owner editor does not inherit from contributor: scope misses
        let scope_only = f
            .store
            .insert_role(f.tenant_id, role_input("isolated", None, false))
            .await
            .unwrap();
        grant(&f, f.writer, Action::Write, Some(vec![scope_only.id])).await;
        let owned_by_editor = f
            .resolver
            .add_entity(f.tenant_id, f.article_class, Some(f.editor))
            .await;
        assert!(!f
            .service
            .authorize(
                f.tenant_id,
                f.user_id,
                AuthorizeTarget::Entity(owned_by_editor),
                Action::Write
            )
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_missing_entity_is_an_error_not_a_denial() {
        let f = fixture().await;
        let err = f
            .service
            .authorize(
                f.tenant_id,
                f.user_id,
                AuthorizeTarget::Entity(Uuid::new_v4()),
                Action::Read,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::EntityNotFound(_)));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_custom_action_requires_definition() {
        let f = fixture().await;
        let article = f.resolver.add_entity(f.tenant_id, f.article_class, None).await;

        grant(&f, f.writer, Action::Custom(101), None).await;
        assert!(f
            .service
            .authorize(
                f.tenant_id,
                f.user_id,
                AuthorizeTarget::Entity(article),
                Action::Custom(101)
            )
            .await
            .unwrap());

        let err = f
            .service
            .authorize(
                f.tenant_id,
                f.user_id,
                AuthorizeTarget::Entity(article),
                Action::Custom(140),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::ActionNotDefined { code: 140, .. }));
    }

    #[tokio::test]
    async fn test_save_is_not_directly_authorizable() {
        let f = fixture().await;
        let article = f.resolver.add_entity(f.tenant_id, f.article_class, None).await;

        let err = f
            .service
            .authorize(f.tenant_id, f.user_id, AuthorizeTarget::Entity(article), Action::Save)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_function_allowed_follows_effective_roles() {
        let f = fixture().await;
        let mut builder = StaticRegistry::builder();
        let list_fn = builder.add_function("cms", "listArticle");
        let registry = Arc::new(builder.build());
        let service = AuthorizationService::new(
            f.store.clone(),
            f.store.clone(),
            registry,
            f.resolver.clone(),
        );

        // the grant sits on an ancestor of the user's role
        f.store
            .insert_role_function(f.tenant_id, f.editor, list_fn, None)
            .await
            .unwrap();

        assert!(service
            .function_allowed(f.tenant_id, f.user_id, "cms", "listArticle")
            .await
            .unwrap());

        let other_user = Uuid::new_v4();
        assert!(!service
            .function_allowed(f.tenant_id, other_user, "cms", "listArticle")
            .await
            .unwrap());

        let err = service
            .function_allowed(f.tenant_id, f.user_id, "cms", "unknown")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::FunctionNotFound(_)));
    }

    #[tokio::test]
    async fn test_effective_roles_are_cached() {
        let f = fixture().await;
        let cache = EffectiveRoleCache::new(Duration::from_secs(300));

        let mut builder = StaticRegistry::builder();
        let class = builder.add_class("cms", "article");
        builder.add_standard_actions(class);
        let registry = Arc::new(builder.build());

        let service = AuthorizationService::new(
            f.store.clone(),
            f.store.clone(),
            registry,
            f.resolver.clone(),
        )
        .with_cache(cache.clone());

        let first = service.effective_roles(f.tenant_id, f.user_id).await.unwrap();
        assert!(first.contains(&f.writer));
        assert!(first.contains(&f.root));
        assert!(first.contains(&f.contributor));

        // a membership added behind the cache's back is not seen until
        // invalidation
        let late_role = f
            .store
            .insert_role(f.tenant_id, role_input("late", None, false))
            .await
            .unwrap();
        f.store
            .insert_user_role(f.tenant_id, f.user_id, late_role.id)
            .await
            .unwrap();

        let cached = service.effective_roles(f.tenant_id, f.user_id).await.unwrap();
        assert!(!cached.contains(&late_role.id));

        cache.invalidate_user(f.tenant_id, f.user_id).await;
        let refreshed = service.effective_roles(f.tenant_id, f.user_id).await.unwrap();
        assert!(refreshed.contains(&late_role.id));
    }
}
