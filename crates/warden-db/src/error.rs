//! Error types for the warden-db crate.

use thiserror::Error;

/// Database bootstrap errors.
///
/// Query-level failures surface through `warden_authz::AuthzError::Database`;
/// this type covers connecting and migrating.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish or acquire a database connection.
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A database migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),
}
