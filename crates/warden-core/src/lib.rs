//! Warden Core Library
//!
//! Shared contracts consumed by the warden authorization engine.
//!
//! # Modules
//!
//! - [`actions`] - Numeric action codes and per-action metadata
//! - [`registry`] - Entity-class registry contract and static implementation
//! - [`progress`] - Pollable progress-reporting contract for batch jobs
//!
//! # Example
//!
//! ```
//! use warden_core::{Action, EntityClassRegistry, StaticRegistry};
//!
//! let mut builder = StaticRegistry::builder();
//! let article = builder.add_class("cms", "article");
//! builder.add_standard_actions(article);
//! let registry = builder.build();
//!
//! assert!(registry.action(article, Action::Read.code()).is_some());
//! ```

pub mod actions;
pub mod progress;
pub mod registry;

pub use actions::Action;
pub use progress::{InMemoryProgressReporter, ProgressReporter, ProgressState};
pub use registry::{
    ClassAction, EntityClass, EntityClassRegistry, FunctionDef, StaticRegistry,
    StaticRegistryBuilder,
};
