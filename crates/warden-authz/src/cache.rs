//! Caching of per-user effective role sets.
//!
//! The effective set (direct memberships plus their expand sets) is resolved
//! on every authorization check; this TTL cache keeps the hot path off the
//! store. Entries are invalidated on membership changes and after a closure
//! rebuild, so staleness is bounded by the TTL in the worst case.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use uuid::Uuid;

/// TTL cache of per-user effective role sets, keyed by (tenant, user).
#[derive(Clone)]
pub struct EffectiveRoleCache {
    cache: Cache<(Uuid, Uuid), Arc<HashSet<Uuid>>>,
    ttl: Duration,
}

impl EffectiveRoleCache {
    /// Create a cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(10_000)
            .build();
        Self { cache, ttl }
    }

    /// Get a user's cached effective set.
    pub async fn get(&self, tenant_id: Uuid, user_id: Uuid) -> Option<Arc<HashSet<Uuid>>> {
        self.cache.get(&(tenant_id, user_id)).await
    }

    /// Cache a user's effective set.
    pub async fn insert(&self, tenant_id: Uuid, user_id: Uuid, roles: Arc<HashSet<Uuid>>) {
        self.cache.insert((tenant_id, user_id), roles).await;
    }

    /// Drop the cached set of a single user.
    pub async fn invalidate_user(&self, tenant_id: Uuid, user_id: Uuid) {
        self.cache.invalidate(&(tenant_id, user_id)).await;
    }

    /// Drop all cached sets of a tenant.
    ///
    /// Note: entries are not indexed by tenant, so this clears the whole
    /// cache; acceptable because rebuilds are rare administrative events.
    pub async fn invalidate_tenant(&self, _tenant_id: Uuid) {
        self.cache.invalidate_all();
    }

    /// The configured TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
