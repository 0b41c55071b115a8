//! Cloud asset service tree.
//!
//! This crate organizes cloud resources (virtual machines, databases,
//! storage, ...) into a tenant-scoped hierarchy of business lines, products,
//! modules and clusters. Every resource is bound to exactly one node in one
//! deployment environment, and binding rules bind newly discovered resources
//! automatically.
//!
//! # Architecture
//!
//! - [`tenant`] - the tenant identifier every entity is scoped to
//! - [`types`] - nodes, bindings, rules, environments and inventory instances
//! - [`error`] - error types and their [`ErrorKind`] classification
//! - [`core`] - storage traits the services depend on
//! - [`backends`] - in-memory and SQLite implementations of those traits
//! - [`service`] - tree, binding, rule and environment services
//!
//! # Backend Features
//!
//! - `sqlite` (default) - SQLite backend with in-memory and file modes
//!
//! The in-memory backend is always available.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use cam_servicetree::backends::memory::{MemoryBackend, MemoryInventory};
//! use cam_servicetree::service::{ServiceTree, ServiceTreeConfig};
//! use cam_servicetree::types::{BindingRule, Instance, Operator, RuleCondition, TreeNode};
//! use cam_servicetree::TenantId;
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let tenant = TenantId::new("acme");
//! let inventory = Arc::new(MemoryInventory::with_instances(vec![
//!     Instance::new(100, "acme", "web-01").with_attribute("region", "us-east-1"),
//! ]));
//! let st = ServiceTree::new(
//!     Arc::new(MemoryBackend::new()),
//!     inventory,
//!     ServiceTreeConfig::default(),
//! );
//!
//! st.environments().init_default_envs(&tenant).await.unwrap();
//! let prod = st.environments().get_by_code(&tenant, "prod").await.unwrap();
//! let web = st.tree().create_node(TreeNode::new(tenant.clone(), "web")).await.unwrap();
//!
//! st.rules()
//!     .create_rule(
//!         BindingRule::new(tenant.clone(), "us-east", web.id, prod.id).with_condition(
//!             RuleCondition::new("attributes.region", Operator::Equals, "us-east-1"),
//!         ),
//!     )
//!     .await
//!     .unwrap();
//!
//! assert_eq!(st.rules().execute_rules(&tenant).await.unwrap(), 1);
//! assert_eq!(st.bindings().get_node_resource_count(web.id).await.unwrap(), 1);
//! # });
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod core;
pub mod error;
pub mod service;
pub mod tenant;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ErrorKind, ServiceTreeError, ServiceTreeResult};
pub use service::{
    BindingService, EnvironmentService, RuleEngine, ServiceTree, ServiceTreeConfig, TreeService,
};
pub use tenant::TenantId;

// Re-export core traits
pub use core::{
    BindingStore, EnvironmentStore, NodeStore, ResourceInventory, RuleStore, ServiceTreeStore,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
