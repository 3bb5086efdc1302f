//! End-to-end engine tests: the full mutation -> rebuild -> decision cycle
//! against the in-memory store.

use std::sync::Arc;

use uuid::Uuid;

use warden_authz::types::{AddRoleRightInput, CreateRoleInput, ListOptions, RoleRightSpec};
use warden_authz::{
    AuthorizationService, AuthorizeTarget, ClosureBuilder, FunctionService, InMemoryAuthzStore,
    InMemoryEntityResolver, RightService, RoleGraphService, RoleStore,
};
use warden_core::{Action, InMemoryProgressReporter, ProgressState, StaticRegistry};

struct Harness {
    store: Arc<InMemoryAuthzStore>,
    resolver: Arc<InMemoryEntityResolver>,
    registry: Arc<StaticRegistry>,
    roles: RoleGraphService,
    rights: RightService,
    functions: FunctionService,
    builder: ClosureBuilder,
    tenant: Uuid,
    article: Uuid,
}

fn harness() -> Harness {
    let mut builder = StaticRegistry::builder();
    let article = builder.add_class("cms", "article");
    builder.add_standard_actions(article);
    let list_fn = builder.add_function("cms", "listArticle");
    builder.add_auto_right(article, Action::Read, list_fn);
    let registry = Arc::new(builder.build());

    let store = Arc::new(InMemoryAuthzStore::new());
    let resolver = Arc::new(InMemoryEntityResolver::new());

    Harness {
        roles: RoleGraphService::new(store.clone(), store.clone()),
        rights: RightService::new(store.clone(), registry.clone()),
        functions: FunctionService::new(store.clone(), registry.clone()),
        builder: ClosureBuilder::new(store.clone(), store.clone()),
        store,
        resolver,
        registry,
        tenant: Uuid::new_v4(),
        article,
    }
}

fn authz(h: &Harness) -> AuthorizationService {
    AuthorizationService::new(
        h.store.clone(),
        h.store.clone(),
        h.registry.clone(),
        h.resolver.clone(),
    )
}

fn role(name: &str, parent: Option<Uuid>, catalog: bool) -> CreateRoleInput {
    CreateRoleInput {
        name: name.to_string(),
        parent_role_id: parent,
        is_catalog: catalog,
        is_system: false,
        sort_key: 0,
    }
}

/// The canonical hierarchy: root -> editor -> writer, include
/// writer -> contributor, user in writer. A right on contributor reaches the
/// user through the expand set.
#[tokio::test]
async fn test_inherited_grant_through_include() {
    let h = harness();
    let user = Uuid::new_v4();

    let root = h.roles.add(h.tenant, role("root", None, true)).await.unwrap();
    let editor = h
        .roles
        .add(h.tenant, role("editor", Some(root.id), true))
        .await
        .unwrap();
    let writer = h
        .roles
        .add(h.tenant, role("writer", Some(editor.id), false))
        .await
        .unwrap();
    let contributor = h.roles.add(h.tenant, role("contributor", None, false)).await.unwrap();
    h.roles
        .add_include(h.tenant, writer.id, contributor.id)
        .await
        .unwrap();
    h.roles.add_user_role(h.tenant, user, writer.id).await.unwrap();

    h.rights
        .add(
            h.tenant,
            AddRoleRightInput {
                role_id: contributor.id,
                entity_class_id: h.article,
                action: Action::Read,
                scope: None,
            },
        )
        .await
        .unwrap();

    assert!(h.roles.is_dirty(h.tenant).await.unwrap());
    h.builder.build(h.tenant, None).await.unwrap();
    assert!(!h.roles.is_dirty(h.tenant).await.unwrap());

    let service = authz(&h);
    let any_article = h.resolver.add_entity(h.tenant, h.article, None).await;
    assert!(service
        .authorize(h.tenant, user, AuthorizeTarget::Entity(any_article), Action::Read)
        .await
        .unwrap());

    // the same setup with a scope that neither matches the owner nor its
    // expand set denies
    let scoped_role = Uuid::new_v4();
    h.store
        .insert_right(
            h.tenant,
            AddRoleRightInput {
                role_id: writer.id,
                entity_class_id: h.article,
                action: Action::Write,
                scope: Some(vec![scoped_role]),
            },
        )
        .await
        .unwrap();
    assert!(!service
        .authorize(h.tenant, user, AuthorizeTarget::Entity(any_article), Action::Write)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_rebuild_after_topology_change_updates_decisions() {
    let h = harness();
    let user = Uuid::new_v4();

    let staff = h.roles.add(h.tenant, role("staff", None, true)).await.unwrap();
    let intern = h.roles.add(h.tenant, role("intern", None, false)).await.unwrap();
    h.roles.add_user_role(h.tenant, user, intern.id).await.unwrap();
    h.rights
        .add(
            h.tenant,
            AddRoleRightInput {
                role_id: staff.id,
                entity_class_id: h.article,
                action: Action::Read,
                scope: None,
            },
        )
        .await
        .unwrap();
    h.builder.build(h.tenant, None).await.unwrap();

    let service = authz(&h);
    let entity = h.resolver.add_entity(h.tenant, h.article, None).await;
    assert!(!service
        .authorize(h.tenant, user, AuthorizeTarget::Entity(entity), Action::Read)
        .await
        .unwrap());

    // move intern under staff: the grant flows down once rebuilt
    h.roles.move_role(h.tenant, intern.id, Some(staff.id)).await.unwrap();
    assert!(h.roles.is_dirty(h.tenant).await.unwrap());

    // decisions still reflect the stale closures until the rebuild runs
    assert!(!service
        .authorize(h.tenant, user, AuthorizeTarget::Entity(entity), Action::Read)
        .await
        .unwrap());

    h.builder.build(h.tenant, None).await.unwrap();
    assert!(service
        .authorize(h.tenant, user, AuthorizeTarget::Entity(entity), Action::Read)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_auto_right_function_follows_grant_lifecycle() {
    let h = harness();
    let user = Uuid::new_v4();

    let editors = h.roles.add(h.tenant, role("editors", None, false)).await.unwrap();
    h.roles.add_user_role(h.tenant, user, editors.id).await.unwrap();
    h.builder.build(h.tenant, None).await.unwrap();

    let service = authz(&h);
    assert!(!service
        .function_allowed(h.tenant, user, "cms", "listArticle")
        .await
        .unwrap());

    let right = h
        .rights
        .add(
            h.tenant,
            AddRoleRightInput {
                role_id: editors.id,
                entity_class_id: h.article,
                action: Action::Read,
                scope: None,
            },
        )
        .await
        .unwrap();
    assert!(service
        .function_allowed(h.tenant, user, "cms", "listArticle")
        .await
        .unwrap());

    h.rights.delete(h.tenant, right.id).await.unwrap();
    assert!(!service
        .function_allowed(h.tenant, user, "cms", "listArticle")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_batch_grants_by_name() {
    let h = harness();
    let user = Uuid::new_v4();

    h.roles.add(h.tenant, role("cms-writer", None, false)).await.unwrap();
    let authenticated = h
        .roles
        .add(h.tenant, role("authenticated", None, false))
        .await
        .unwrap();

    h.rights
        .add_batch(
            h.tenant,
            "cms",
            "article",
            &[
                RoleRightSpec {
                    role_name: "cms-writer".to_string(),
                    action: Action::Create,
                    scope_names: None,
                },
                RoleRightSpec {
                    role_name: "cms-writer".to_string(),
                    action: Action::Read,
                    scope_names: Some(vec!["authenticated".to_string()]),
                },
            ],
        )
        .await
        .unwrap();

    h.functions
        .add_batch(
            h.tenant,
            "cms",
            &[warden_authz::types::RoleFunctionSpec {
                role_name: "cms-writer".to_string(),
                name: "listArticle".to_string(),
            }],
        )
        .await
        .unwrap();

    let writer = h.roles.get_by_name(h.tenant, "cms-writer").await.unwrap();
    h.roles.add_user_role(h.tenant, user, writer.id).await.unwrap();
    h.builder.build(h.tenant, None).await.unwrap();

    let service = authz(&h);
    assert!(service
        .authorize(h.tenant, user, AuthorizeTarget::EntityClass(h.article), Action::Create)
        .await
        .unwrap());

    // the scoped read right only reaches entities owned by "authenticated"
    let owned = h
        .resolver
        .add_entity(h.tenant, h.article, Some(authenticated.id))
        .await;
    let unowned = h.resolver.add_entity(h.tenant, h.article, None).await;
    assert!(service
        .authorize(h.tenant, user, AuthorizeTarget::Entity(owned), Action::Read)
        .await
        .unwrap());
    assert!(!service
        .authorize(h.tenant, user, AuthorizeTarget::Entity(unowned), Action::Read)
        .await
        .unwrap());

    assert!(service
        .function_allowed(h.tenant, user, "cms", "listArticle")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_role_deletion_revokes_access() {
    let h = harness();
    let user = Uuid::new_v4();

    let editors = h.roles.add(h.tenant, role("editors", None, false)).await.unwrap();
    h.roles.add_user_role(h.tenant, user, editors.id).await.unwrap();
    h.rights
        .add(
            h.tenant,
            AddRoleRightInput {
                role_id: editors.id,
                entity_class_id: h.article,
                action: Action::Read,
                scope: None,
            },
        )
        .await
        .unwrap();
    h.builder.build(h.tenant, None).await.unwrap();

    let service = authz(&h);
    let entity = h.resolver.add_entity(h.tenant, h.article, None).await;
    assert!(service
        .authorize(h.tenant, user, AuthorizeTarget::Entity(entity), Action::Read)
        .await
        .unwrap());

    h.roles.delete(h.tenant, editors.id, false).await.unwrap();
    h.builder.build(h.tenant, None).await.unwrap();

    assert!(!service
        .authorize(h.tenant, user, AuthorizeTarget::Entity(entity), Action::Read)
        .await
        .unwrap());
    assert!(h
        .store
        .list_role_ids_for_user(h.tenant, user)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_rebuild_progress_is_pollable() {
    let h = harness();
    let reporter = Arc::new(InMemoryProgressReporter::new());
    let progress_id = Uuid::new_v4();

    let parent = h.roles.add(h.tenant, role("parent", None, true)).await.unwrap();
    for name in ["a", "b", "c"] {
        h.roles
            .add(h.tenant, role(name, Some(parent.id), false))
            .await
            .unwrap();
    }

    let builder = ClosureBuilder::new(h.store.clone(), h.store.clone())
        .with_progress(reporter.clone());
    builder.build(h.tenant, Some(progress_id)).await.unwrap();

    assert_eq!(reporter.get(progress_id).await, Some(ProgressState::Done));

    // a build without a progress id leaves no trace
    let silent_id = Uuid::new_v4();
    builder.build(h.tenant, None).await.unwrap();
    assert_eq!(reporter.get(silent_id).await, None);
}

#[tokio::test]
async fn test_children_listing_is_ordered_and_paginated() {
    let h = harness();

    let parent = h.roles.add(h.tenant, role("parent", None, true)).await.unwrap();
    for (name, sort_key) in [("gamma", 2), ("beta", 1), ("alpha", 1)] {
        h.roles
            .add(
                h.tenant,
                CreateRoleInput {
                    sort_key,
                    ..role(name, Some(parent.id), false)
                },
            )
            .await
            .unwrap();
    }

    let all = h
        .roles
        .children(h.tenant, Some(parent.id), &ListOptions::default())
        .await
        .unwrap();
    let names: Vec<&str> = all.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["alpha", "beta", "gamma"]);

    let second_page = h
        .roles
        .children(h.tenant, Some(parent.id), &ListOptions { limit: 2, offset: 1 })
        .await
        .unwrap();
    let names: Vec<&str> = second_page.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["beta", "gamma"]);
}
