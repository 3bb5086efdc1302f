//! Rebuild of the derived closure tables.
//!
//! The closure of a tenant's role graph is recomputed wholesale from a
//! snapshot loaded once per rebuild: an adjacency structure over the role tree
//! plus the include edges. The computation itself is pure
//! ([`compute_closures`]); [`ClosureBuilder`] drives it against the stores,
//! reports progress through the side channel, and clears the tenant's dirty
//! flag on success.
//!
//! The expand set deliberately takes a single hop through includes: a role
//! inherits the includes declared by itself and its ancestors, but not the
//! includes of the roles it includes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use warden_core::ProgressReporter;

use crate::cache::EffectiveRoleCache;
use crate::error::{AuthzError, Result};
use crate::store::{ClosureStore, RoleStore};
use crate::types::{Role, RoleAncestor, RoleExpand, RoleInclude, RoleIncludeRef};

/// The derived rows of one role, produced by [`compute_closures`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleClosureRows {
    /// The role these rows belong to.
    pub role_id: Uuid,

    /// Role name, used as the progress label.
    pub role_name: String,

    /// Ancestry path, self at level 0.
    pub ancestors: Vec<RoleAncestor>,

    /// Include edges declared by the role or its ancestors.
    pub include_refs: Vec<RoleIncludeRef>,

    /// Effective rights-source set, ancestors first, de-duplicated.
    pub expands: Vec<RoleExpand>,
}

/// Compute the full closure of a role graph snapshot.
///
/// Roles are visited depth-first from the virtual root, siblings ordered by
/// sort key then name. Children of non-catalog roles are not descended into
/// and therefore produce no rows; the non-catalog role itself is still fully
/// processed. The result depends only on the snapshot, so two computations
/// over the same graph yield identical rows.
#[must_use]
pub fn compute_closures(
    tenant_id: Uuid,
    roles: &[Role],
    includes: &[RoleInclude],
) -> Vec<RoleClosureRows> {
    let by_id: HashMap<Uuid, &Role> = roles.iter().map(|r| (r.id, r)).collect();

    let mut children: HashMap<Option<Uuid>, Vec<&Role>> = HashMap::new();
    for role in roles {
        children.entry(role.parent_role_id).or_default().push(role);
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| a.sort_key.cmp(&b.sort_key).then_with(|| a.name.cmp(&b.name)));
    }

    let mut includes_by_source: HashMap<Uuid, Vec<&RoleInclude>> = HashMap::new();
    for edge in includes {
        includes_by_source.entry(edge.role_id).or_default().push(edge);
    }
    for edges in includes_by_source.values_mut() {
        edges.sort_by_key(|e| e.created_at);
    }

    let mut out = Vec::new();
    let mut stack: Vec<&Role> = children
        .get(&None)
        .map(|roots| roots.iter().rev().copied().collect())
        .unwrap_or_default();

    while let Some(role) = stack.pop() {
        out.push(close_one(tenant_id, role, &by_id, &includes_by_source));
        if role.is_catalog {
            if let Some(kids) = children.get(&Some(role.id)) {
                stack.extend(kids.iter().rev().copied());
            }
        }
    }
    out
}

fn close_one(
    tenant_id: Uuid,
    role: &Role,
    by_id: &HashMap<Uuid, &Role>,
    includes_by_source: &HashMap<Uuid, Vec<&RoleInclude>>,
) -> RoleClosureRows {
    // ancestry: self at level 0, then the parent chain up to the virtual root
    let mut ancestors = Vec::new();
    let mut seen = HashSet::new();
    let mut current = role;
    let mut level = 0;
    loop {
        // the tree is acyclic by invariant; stop the walk on corrupted data
        if !seen.insert(current.id) {
            break;
        }
        ancestors.push(RoleAncestor {
            tenant_id,
            role_id: role.id,
            ancestor_id: current.id,
            level,
        });
        match current.parent_role_id.and_then(|p| by_id.get(&p).copied()) {
            Some(parent) => {
                current = parent;
                level += 1;
            }
            None => break,
        }
    }

    let mut include_refs = Vec::new();
    for ancestor in &ancestors {
        if let Some(edges) = includes_by_source.get(&ancestor.ancestor_id) {
            for edge in edges {
                include_refs.push(RoleIncludeRef {
                    tenant_id,
                    role_id: role.id,
                    included_role_id: edge.included_role_id,
                    source_role_id: edge.role_id,
                });
            }
        }
    }

    let mut expands = Vec::new();
    let mut expanded = HashSet::new();
    for ancestor in &ancestors {
        if expanded.insert(ancestor.ancestor_id) {
            expands.push(RoleExpand {
                tenant_id,
                role_id: role.id,
                base_role_id: ancestor.ancestor_id,
            });
        }
    }
    for include_ref in &include_refs {
        if expanded.insert(include_ref.included_role_id) {
            expands.push(RoleExpand {
                tenant_id,
                role_id: role.id,
                base_role_id: include_ref.included_role_id,
            });
        }
    }

    RoleClosureRows {
        role_id: role.id,
        role_name: role.name.clone(),
        ancestors,
        include_refs,
        expands,
    }
}

/// Result of a completed rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    /// How many roles were processed.
    pub roles_processed: u64,
}

/// Rebuilds a tenant's derived closure tables.
///
/// The rebuild is a batch job: it truncates the tenant's derived rows and
/// repopulates them role by role. A failure part-way leaves the tables
/// partially populated — re-running the build is the repair path. Two
/// rebuilds for the same tenant must not run concurrently; callers serialize
/// per tenant.
pub struct ClosureBuilder {
    roles: Arc<dyn RoleStore>,
    closures: Arc<dyn ClosureStore>,
    progress: Option<Arc<dyn ProgressReporter>>,
    cache: Option<EffectiveRoleCache>,
}

impl ClosureBuilder {
    /// Create a builder over the given stores.
    pub fn new(roles: Arc<dyn RoleStore>, closures: Arc<dyn ClosureStore>) -> Self {
        Self {
            roles,
            closures,
            progress: None,
            cache: None,
        }
    }

    /// Attach a progress reporter; it is only consulted for builds that carry
    /// a progress id.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Attach the effective-role-set cache to invalidate after a rebuild.
    #[must_use]
    pub fn with_cache(mut self, cache: EffectiveRoleCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Rebuild the derived tables for a tenant.
    pub async fn build(&self, tenant_id: Uuid, progress_id: Option<Uuid>) -> Result<BuildSummary> {
        let reporter = match (&self.progress, progress_id) {
            (Some(reporter), Some(id)) => Some((reporter.clone(), id)),
            _ => None,
        };

        match self.run(tenant_id, reporter.as_ref()).await {
            Ok(summary) => {
                if let Some((reporter, id)) = reporter {
                    reporter.done(id).await;
                }
                if let Some(cache) = &self.cache {
                    cache.invalidate_tenant(tenant_id).await;
                }
                tracing::info!(
                    %tenant_id,
                    roles = summary.roles_processed,
                    "role closures rebuilt"
                );
                Ok(summary)
            }
            Err(err) => {
                tracing::error!(%tenant_id, error = %err, "role closure rebuild failed");
                if let Some((reporter, id)) = reporter {
                    reporter.error(id, &err.to_string()).await;
                }
                Err(AuthzError::Build(Box::new(err)))
            }
        }
    }

    async fn run(
        &self,
        tenant_id: Uuid,
        reporter: Option<&(Arc<dyn ProgressReporter>, Uuid)>,
    ) -> Result<BuildSummary> {
        let roles = self.roles.list_roles(tenant_id).await?;
        let includes = self.roles.list_includes(tenant_id).await?;
        let computed = compute_closures(tenant_id, &roles, &includes);
        let total = roles.len() as u64;

        if let Some((reporter, id)) = reporter {
            reporter.start(*id, total).await;
        }

        self.closures.clear_closures(tenant_id).await?;

        let mut processed = 0;
        for rows in &computed {
            self.closures.insert_role_closure(tenant_id, rows).await?;
            processed += 1;
            if let Some((reporter, id)) = reporter {
                reporter.update(*id, processed, total, &rows.role_name).await;
            }
        }

        self.roles.set_dirty(tenant_id, false).await?;
        Ok(BuildSummary {
            roles_processed: processed,
        })
    }
}
