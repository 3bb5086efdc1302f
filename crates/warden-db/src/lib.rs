//! PostgreSQL storage backend for the warden authorization engine.
//!
//! Implements the `warden-authz` store contracts over sqlx, with embedded
//! migrations and a thin pool wrapper.
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_db::{DbPool, PgAuthzStore, run_migrations};
//!
//! let pool = DbPool::connect("postgres://localhost/warden").await?;
//! run_migrations(&pool).await?;
//! let store = std::sync::Arc::new(PgAuthzStore::new(pool.inner().clone()));
//! ```
//!
//! Integration tests require a running PostgreSQL instance and are gated
//! behind the `integration` feature.

pub mod error;
pub mod migrations;
pub mod pool;
pub mod store;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::DbPool;
pub use store::PgAuthzStore;
