//! Engine services.
//!
//! - [`RoleGraphService`] - role tree, include edges, memberships, dirty flag
//! - [`RightService`] - scoped right grants with auto-derived function grants
//! - [`FunctionService`] - manual and batch function grants
//! - [`AuthorizationService`] - the read-side authorization decision

pub mod authorize;
pub mod functions;
pub mod rights;
pub mod role_graph;

pub use authorize::{AuthorizationService, AuthorizeTarget};
pub use functions::FunctionService;
pub use rights::RightService;
pub use role_graph::RoleGraphService;
