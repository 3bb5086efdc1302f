//! Error types for the authorization engine.

use thiserror::Error;
use uuid::Uuid;

/// Authorization engine errors.
///
/// Denied authorization is never an error: `authorize` and `function_allowed`
/// return `Ok(false)`. Errors signal missing referents, rejected mutations, or
/// backend failures.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Input rejected before reaching storage.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Role not found by id.
    #[error("Role not found: {0}")]
    RoleNotFound(Uuid),

    /// Role not found by name.
    #[error("Role not found: {0}")]
    RoleNameNotFound(String),

    /// Include edge not found.
    #[error("Role include not found: {0}")]
    IncludeNotFound(Uuid),

    /// Right grant not found.
    #[error("Role right not found: {0}")]
    RightNotFound(Uuid),

    /// Function grant not found.
    #[error("Role function grant not found: {0}")]
    FunctionGrantNotFound(Uuid),

    /// Entity instance not found.
    #[error("Entity not found: {0}")]
    EntityNotFound(Uuid),

    /// Entity class not found by id.
    #[error("Entity class not found: {0}")]
    EntityClassNotFound(Uuid),

    /// Entity class not found by (module, name).
    #[error("Entity class not found: {module}/{name}")]
    EntityClassNameNotFound {
        /// Owning module.
        module: String,
        /// Class name.
        name: String,
    },

    /// Function not found, by id or by `module/name`.
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    /// The action code is not defined for the entity class.
    #[error("Action {code} is not defined for entity class {class_id}")]
    ActionNotDefined {
        /// Entity class id.
        class_id: Uuid,
        /// Requested action code.
        code: i32,
    },

    /// System roles cannot be deleted.
    #[error("Role {0} is a system role and cannot be deleted")]
    SystemRoleProtected(Uuid),

    /// A catalog role still has children and `force` was not set.
    #[error("Role {0} is a catalog with children; pass force to delete")]
    CatalogNotEmpty(Uuid),

    /// The closure rebuild failed; derived tables may be partially populated
    /// until the build is re-run.
    #[error("Role closure rebuild failed")]
    Build(#[source] Box<AuthzError>),

    /// Database error.
    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

impl AuthzError {
    /// Whether this error denotes a missing referent (maps to HTTP 404).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::RoleNotFound(_)
                | Self::RoleNameNotFound(_)
                | Self::IncludeNotFound(_)
                | Self::RightNotFound(_)
                | Self::FunctionGrantNotFound(_)
                | Self::EntityNotFound(_)
                | Self::EntityClassNotFound(_)
                | Self::EntityClassNameNotFound { .. }
                | Self::FunctionNotFound(_)
                | Self::ActionNotDefined { .. }
        )
    }

    /// Whether this error denotes a state conflict (maps to HTTP 409).
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::CatalogNotEmpty(_))
    }

    /// Whether this error denotes a refused operation (maps to HTTP 403).
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::SystemRoleProtected(_))
    }

    /// Whether this error denotes rejected input (maps to HTTP 400).
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(AuthzError::RoleNotFound(Uuid::new_v4()).is_not_found());
        assert!(AuthzError::CatalogNotEmpty(Uuid::new_v4()).is_conflict());
        assert!(AuthzError::SystemRoleProtected(Uuid::new_v4()).is_forbidden());
        assert!(AuthzError::Validation("empty name".into()).is_validation());

        let build = AuthzError::Build(Box::new(AuthzError::RoleNotFound(Uuid::new_v4())));
        assert!(!build.is_not_found());
        assert!(!build.is_conflict());
    }
}
