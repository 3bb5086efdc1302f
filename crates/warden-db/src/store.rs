//! PostgreSQL implementation of the engine's storage contracts.
//!
//! Queries are tenant-scoped without exception. Multi-row mutations (the role
//! delete cascade, right insertion with scope refs, per-role closure inserts)
//! run inside a transaction.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use warden_authz::types::{
    AddRoleRightInput, CreateRoleInput, ListOptions, Role, RoleAncestor, RoleFunction,
    RoleInclude, RoleIncludeRef, RoleRight, RoleRightScopeRef, UpdateRoleInput, UserRole,
};
use warden_authz::{AuthzError, ClosureStore, Result, RoleClosureRows, RoleStore};
use warden_core::Action;

/// PostgreSQL-backed store for the role graph and its derived tables.
#[derive(Debug, Clone)]
pub struct PgAuthzStore {
    pool: PgPool,
}

impl PgAuthzStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleRightRow {
    id: Uuid,
    tenant_id: Uuid,
    role_id: Uuid,
    entity_class_id: Uuid,
    action: i32,
    scope: Option<Json<Vec<Uuid>>>,
    created_at: DateTime<Utc>,
}

impl RoleRightRow {
    fn into_right(self) -> Result<RoleRight> {
        let action = Action::from_code(self.action)
            .ok_or_else(|| AuthzError::Validation(format!("unknown action code {}", self.action)))?;
        Ok(RoleRight {
            id: self.id,
            tenant_id: self.tenant_id,
            role_id: self.role_id,
            entity_class_id: self.entity_class_id,
            action,
            scope: self.scope.map(|s| s.0),
            created_at: self.created_at,
        })
    }
}

#[async_trait::async_trait]
impl RoleStore for PgAuthzStore {
    async fn insert_role(&self, tenant_id: Uuid, input: CreateRoleInput) -> Result<Role> {
        let role = sqlx::query_as::<_, Role>(
            r"
            INSERT INTO roles (tenant_id, name, parent_role_id, is_catalog, is_system, sort_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            ",
        )
        .bind(tenant_id)
        .bind(&input.name)
        .bind(input.parent_role_id)
        .bind(input.is_catalog)
        .bind(input.is_system)
        .bind(input.sort_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(role)
    }

    async fn get_role(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            r"SELECT * FROM roles WHERE id = $1 AND tenant_id = $2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    async fn get_role_by_name(&self, tenant_id: Uuid, name: &str) -> Result<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            r"SELECT * FROM roles WHERE tenant_id = $1 AND name = $2",
        )
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    async fn update_role(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateRoleInput,
    ) -> Result<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            r"
            UPDATE roles SET
                name = COALESCE($3, name),
                sort_key = COALESCE($4, sort_key),
                is_catalog = COALESCE($5, is_catalog),
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(input.name)
        .bind(input.sort_key)
        .bind(input.is_catalog)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    async fn set_role_parent(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        parent_role_id: Option<Uuid>,
    ) -> Result<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            r"
            UPDATE roles SET parent_role_id = $3, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(parent_role_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    async fn delete_role_cascade(&self, tenant_id: Uuid, id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"DELETE FROM role_right_scope_refs WHERE tenant_id = $1 AND role_id = $2",
        )
        .bind(tenant_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(r"DELETE FROM role_functions WHERE tenant_id = $1 AND role_id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r"DELETE FROM user_roles WHERE tenant_id = $1 AND role_id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r"
            DELETE FROM role_includes
            WHERE tenant_id = $1 AND (role_id = $2 OR included_role_id = $2)
            ",
        )
        .bind(tenant_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(r"DELETE FROM role_rights WHERE tenant_id = $1 AND role_id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query(r"DELETE FROM roles WHERE id = $2 AND tenant_id = $1")
            .bind(tenant_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_roles(&self, tenant_id: Uuid) -> Result<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(r"SELECT * FROM roles WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(roles)
    }

    async fn list_children(
        &self,
        tenant_id: Uuid,
        parent_role_id: Option<Uuid>,
        options: &ListOptions,
    ) -> Result<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            r"
            SELECT * FROM roles
            WHERE tenant_id = $1 AND parent_role_id IS NOT DISTINCT FROM $2
            ORDER BY sort_key, name
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(tenant_id)
        .bind(parent_role_id)
        .bind(options.limit)
        .bind(options.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn insert_include(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        included_role_id: Uuid,
    ) -> Result<RoleInclude> {
        let include = sqlx::query_as::<_, RoleInclude>(
            r"
            INSERT INTO role_includes (tenant_id, role_id, included_role_id)
            VALUES ($1, $2, $3)
            RETURNING *
            ",
        )
        .bind(tenant_id)
        .bind(role_id)
        .bind(included_role_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(include)
    }

    async fn get_include(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<RoleInclude>> {
        let include = sqlx::query_as::<_, RoleInclude>(
            r"SELECT * FROM role_includes WHERE id = $1 AND tenant_id = $2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(include)
    }

    async fn delete_include(&self, tenant_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query(r"DELETE FROM role_includes WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_includes_for_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        options: &ListOptions,
    ) -> Result<Vec<RoleInclude>> {
        let includes = sqlx::query_as::<_, RoleInclude>(
            r"
            SELECT * FROM role_includes
            WHERE tenant_id = $1 AND role_id = $2
            ORDER BY created_at
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(tenant_id)
        .bind(role_id)
        .bind(options.limit)
        .bind(options.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(includes)
    }

    async fn list_includes(&self, tenant_id: Uuid) -> Result<Vec<RoleInclude>> {
        let includes = sqlx::query_as::<_, RoleInclude>(
            r"SELECT * FROM role_includes WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(includes)
    }

    async fn insert_user_role(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<UserRole> {
        let membership = sqlx::query_as::<_, UserRole>(
            r"
            INSERT INTO user_roles (tenant_id, user_id, role_id)
            VALUES ($1, $2, $3)
            RETURNING *
            ",
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(role_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(membership)
    }

    async fn get_user_role(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<Option<UserRole>> {
        let membership = sqlx::query_as::<_, UserRole>(
            r"
            SELECT * FROM user_roles
            WHERE tenant_id = $1 AND user_id = $2 AND role_id = $3
            ",
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(membership)
    }

    async fn delete_user_role(&self, tenant_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query(r"DELETE FROM user_roles WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user_roles_for_user(&self, tenant_id: Uuid, user_id: Uuid) -> Result<u64> {
        let result =
            sqlx::query(r"DELETE FROM user_roles WHERE tenant_id = $1 AND user_id = $2")
                .bind(tenant_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn list_role_ids_for_user(&self, tenant_id: Uuid, user_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r"SELECT role_id FROM user_roles WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn insert_right(&self, tenant_id: Uuid, input: AddRoleRightInput) -> Result<RoleRight> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, RoleRightRow>(
            r"
            INSERT INTO role_rights (tenant_id, role_id, entity_class_id, action, scope)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            ",
        )
        .bind(tenant_id)
        .bind(input.role_id)
        .bind(input.entity_class_id)
        .bind(input.action.code())
        .bind(input.scope.clone().map(Json))
        .fetch_one(&mut *tx)
        .await?;

        if let Some(scope) = &input.scope {
            for scope_role_id in scope {
                sqlx::query(
                    r"
                    INSERT INTO role_right_scope_refs
                        (tenant_id, right_id, role_id, entity_class_id, action, scope_role_id)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ",
                )
                .bind(tenant_id)
                .bind(row.id)
                .bind(input.role_id)
                .bind(input.entity_class_id)
                .bind(input.action.code())
                .bind(scope_role_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        row.into_right()
    }

    async fn get_right(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<RoleRight>> {
        let row = sqlx::query_as::<_, RoleRightRow>(
            r"SELECT * FROM role_rights WHERE id = $1 AND tenant_id = $2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RoleRightRow::into_right).transpose()
    }

    async fn delete_right(&self, tenant_id: Uuid, id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"DELETE FROM role_right_scope_refs WHERE tenant_id = $1 AND right_id = $2",
        )
        .bind(tenant_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r"DELETE FROM role_functions WHERE tenant_id = $1 AND originating_right_id = $2",
        )
        .bind(tenant_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query(r"DELETE FROM role_rights WHERE id = $2 AND tenant_id = $1")
            .bind(tenant_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_rights_for_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        options: &ListOptions,
    ) -> Result<Vec<RoleRight>> {
        let rows = sqlx::query_as::<_, RoleRightRow>(
            r"
            SELECT * FROM role_rights
            WHERE tenant_id = $1 AND role_id = $2
            ORDER BY created_at
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(tenant_id)
        .bind(role_id)
        .bind(options.limit)
        .bind(options.offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RoleRightRow::into_right).collect()
    }

    async fn find_rights(
        &self,
        tenant_id: Uuid,
        role_ids: &[Uuid],
        entity_class_id: Uuid,
        action_code: i32,
    ) -> Result<Vec<RoleRight>> {
        let rows = sqlx::query_as::<_, RoleRightRow>(
            r"
            SELECT * FROM role_rights
            WHERE tenant_id = $1
              AND entity_class_id = $2
              AND action = $3
              AND role_id = ANY($4)
            ",
        )
        .bind(tenant_id)
        .bind(entity_class_id)
        .bind(action_code)
        .bind(role_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RoleRightRow::into_right).collect()
    }

    async fn list_scope_refs(
        &self,
        tenant_id: Uuid,
        right_id: Uuid,
    ) -> Result<Vec<RoleRightScopeRef>> {
        let refs = sqlx::query_as::<_, RoleRightScopeRef>(
            r"SELECT * FROM role_right_scope_refs WHERE tenant_id = $1 AND right_id = $2",
        )
        .bind(tenant_id)
        .bind(right_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(refs)
    }

    async fn insert_role_function(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        function_id: Uuid,
        originating_right_id: Option<Uuid>,
    ) -> Result<RoleFunction> {
        let grant = sqlx::query_as::<_, RoleFunction>(
            r"
            INSERT INTO role_functions (tenant_id, role_id, function_id, originating_right_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            ",
        )
        .bind(tenant_id)
        .bind(role_id)
        .bind(function_id)
        .bind(originating_right_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(grant)
    }

    async fn get_role_function(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<RoleFunction>> {
        let grant = sqlx::query_as::<_, RoleFunction>(
            r"SELECT * FROM role_functions WHERE id = $1 AND tenant_id = $2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(grant)
    }

    async fn delete_role_function(&self, tenant_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query(r"DELETE FROM role_functions WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_functions_for_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        options: &ListOptions,
    ) -> Result<Vec<RoleFunction>> {
        let grants = sqlx::query_as::<_, RoleFunction>(
            r"
            SELECT * FROM role_functions
            WHERE tenant_id = $1 AND role_id = $2
            ORDER BY created_at
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(tenant_id)
        .bind(role_id)
        .bind(options.limit)
        .bind(options.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(grants)
    }

    async fn has_role_function(
        &self,
        tenant_id: Uuid,
        role_ids: &[Uuid],
        function_id: Uuid,
    ) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS(
                SELECT 1 FROM role_functions
                WHERE tenant_id = $1 AND function_id = $2 AND role_id = ANY($3)
            )
            ",
        )
        .bind(tenant_id)
        .bind(function_id)
        .bind(role_ids.to_vec())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn get_dirty(&self, tenant_id: Uuid) -> Result<bool> {
        let dirty = sqlx::query_scalar::<_, bool>(
            r"SELECT dirty FROM role_build_states WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        // tenants without a record have never been mutated: clean
        Ok(dirty.unwrap_or(false))
    }

    async fn set_dirty(&self, tenant_id: Uuid, dirty: bool) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO role_build_states (tenant_id, dirty, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (tenant_id)
            DO UPDATE SET dirty = EXCLUDED.dirty, updated_at = NOW()
            ",
        )
        .bind(tenant_id)
        .bind(dirty)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ClosureStore for PgAuthzStore {
    async fn clear_closures(&self, tenant_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(r"DELETE FROM role_ancestors WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r"DELETE FROM role_include_refs WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r"DELETE FROM role_expands WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_role_closure(&self, tenant_id: Uuid, rows: &RoleClosureRows) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let (ancestor_ids, levels): (Vec<Uuid>, Vec<i32>) = rows
            .ancestors
            .iter()
            .map(|a| (a.ancestor_id, a.level))
            .unzip();
        sqlx::query(
            r"
            INSERT INTO role_ancestors (tenant_id, role_id, ancestor_id, level)
            SELECT $1, $2, u.ancestor_id, u.level
            FROM UNNEST($3::uuid[], $4::int4[]) AS u(ancestor_id, level)
            ",
        )
        .bind(tenant_id)
        .bind(rows.role_id)
        .bind(ancestor_ids)
        .bind(levels)
        .execute(&mut *tx)
        .await?;

        let (included_ids, source_ids): (Vec<Uuid>, Vec<Uuid>) = rows
            .include_refs
            .iter()
            .map(|r| (r.included_role_id, r.source_role_id))
            .unzip();
        sqlx::query(
            r"
            INSERT INTO role_include_refs (tenant_id, role_id, included_role_id, source_role_id)
            SELECT $1, $2, u.included_role_id, u.source_role_id
            FROM UNNEST($3::uuid[], $4::uuid[]) AS u(included_role_id, source_role_id)
            ",
        )
        .bind(tenant_id)
        .bind(rows.role_id)
        .bind(included_ids)
        .bind(source_ids)
        .execute(&mut *tx)
        .await?;

        let base_ids: Vec<Uuid> = rows.expands.iter().map(|e| e.base_role_id).collect();
        sqlx::query(
            r"
            INSERT INTO role_expands (tenant_id, role_id, base_role_id)
            SELECT $1, $2, u.base_role_id
            FROM UNNEST($3::uuid[]) AS u(base_role_id)
            ",
        )
        .bind(tenant_id)
        .bind(rows.role_id)
        .bind(base_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn ancestors(&self, tenant_id: Uuid, role_id: Uuid) -> Result<Vec<RoleAncestor>> {
        let rows = sqlx::query_as::<_, RoleAncestor>(
            r"
            SELECT * FROM role_ancestors
            WHERE tenant_id = $1 AND role_id = $2
            ORDER BY level
            ",
        )
        .bind(tenant_id)
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn include_refs(&self, tenant_id: Uuid, role_id: Uuid) -> Result<Vec<RoleIncludeRef>> {
        let rows = sqlx::query_as::<_, RoleIncludeRef>(
            r"SELECT * FROM role_include_refs WHERE tenant_id = $1 AND role_id = $2",
        )
        .bind(tenant_id)
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn expand_set(&self, tenant_id: Uuid, role_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r"SELECT base_role_id FROM role_expands WHERE tenant_id = $1 AND role_id = $2",
        )
        .bind(tenant_id)
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn expand_union(&self, tenant_id: Uuid, role_ids: &[Uuid]) -> Result<HashSet<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r"
            SELECT DISTINCT base_role_id FROM role_expands
            WHERE tenant_id = $1 AND role_id = ANY($2)
            ",
        )
        .bind(tenant_id)
        .bind(role_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }
}
