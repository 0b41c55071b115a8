//! Storage collaborator traits.
//!
//! The services in [`crate::service`] never talk to a database directly.
//! They depend on the traits defined here, one per entity:
//!
//! - [`NodeStore`] - tree nodes, including path-prefix queries
//! - [`BindingStore`] - resource bindings, unique per `(tenant, type, resource)`
//! - [`RuleStore`] - binding rules
//! - [`EnvironmentStore`] - environments, unique per `(tenant, code)`
//! - [`ResourceInventory`] - the external asset inventory (read only)
//!
//! Implementations live in [`crate::backends`]. Stores are expected to
//! enforce the uniqueness constraints themselves and report violations as
//! [`BackendError::UniqueViolation`](crate::error::BackendError::UniqueViolation),
//! which the services surface as a conflict.
//!
//! # Conventions
//!
//! - `get_*` methods return `Ok(None)` when the entity does not exist.
//! - `update` fails with the entity's `NotFound` error when it does not exist.
//! - `delete*` methods are no-ops for missing entities.
//! - `count` ignores the filter's `offset` and `limit`.

mod binding;
mod environment;
mod inventory;
mod node;
mod rule;

pub use binding::BindingStore;
pub use environment::EnvironmentStore;
pub use inventory::ResourceInventory;
pub use node::NodeStore;
pub use rule::RuleStore;

/// A backend that stores every service tree entity.
///
/// Blanket-implemented for any type implementing all four store traits.
pub trait ServiceTreeStore: NodeStore + BindingStore + RuleStore + EnvironmentStore {}

impl<T> ServiceTreeStore for T where T: NodeStore + BindingStore + RuleStore + EnvironmentStore {}
