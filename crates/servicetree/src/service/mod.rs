//! Service layer.
//!
//! Four services sit on top of the store traits in [`crate::core`]:
//!
//! | Service | Responsibility |
//! |---------|----------------|
//! | [`TreeService`] | node CRUD, moves, tree/subtree/ancestor queries |
//! | [`BindingService`] | binding resources to nodes, counts and lookups |
//! | [`RuleEngine`] | binding rules, matching and batch execution |
//! | [`EnvironmentService`] | environments and the default set |
//!
//! [`ServiceTree`] wires all four from a single backend.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use cam_servicetree::backends::memory::{MemoryBackend, MemoryInventory};
//! use cam_servicetree::service::{ServiceTree, ServiceTreeConfig};
//! use cam_servicetree::tenant::TenantId;
//! use cam_servicetree::types::TreeNode;
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let tree = ServiceTree::new(
//!     Arc::new(MemoryBackend::new()),
//!     Arc::new(MemoryInventory::new()),
//!     ServiceTreeConfig::default(),
//! );
//!
//! let tenant = TenantId::new("acme");
//! let shop = tree.tree().create_node(TreeNode::new(tenant.clone(), "shop")).await.unwrap();
//! let orders = tree
//!     .tree()
//!     .create_node(TreeNode::new(tenant.clone(), "orders").with_parent(shop.id))
//!     .await
//!     .unwrap();
//!
//! assert_eq!(orders.level, 2);
//! assert_eq!(orders.path, format!("/{}/{}/", shop.id, orders.id));
//! # });
//! ```

mod binding;
mod config;
mod environment;
pub mod matcher;
mod rules;
mod tree;

use std::sync::Arc;

pub use binding::BindingService;
pub use config::ServiceTreeConfig;
pub use environment::EnvironmentService;
pub use rules::RuleEngine;
pub use tree::TreeService;

use crate::core::{
    BindingStore, EnvironmentStore, NodeStore, ResourceInventory, RuleStore, ServiceTreeStore,
};

/// All services of a service tree, sharing one backend.
#[derive(Debug, Clone)]
pub struct ServiceTree {
    tree: TreeService,
    bindings: BindingService,
    rules: RuleEngine,
    environments: EnvironmentService,
}

impl ServiceTree {
    /// Wires every service to `backend`, with `inventory` feeding the rule
    /// engine.
    pub fn new<B>(
        backend: Arc<B>,
        inventory: Arc<dyn ResourceInventory>,
        config: ServiceTreeConfig,
    ) -> Self
    where
        B: ServiceTreeStore + 'static,
    {
        let nodes: Arc<dyn NodeStore> = backend.clone();
        let bindings: Arc<dyn BindingStore> = backend.clone();
        let rules: Arc<dyn RuleStore> = backend.clone();
        let envs: Arc<dyn EnvironmentStore> = backend;

        Self {
            tree: TreeService::new(nodes.clone(), bindings.clone(), rules.clone()),
            bindings: BindingService::new(bindings.clone(), nodes.clone()),
            rules: RuleEngine::new(rules, bindings.clone(), nodes, inventory, config),
            environments: EnvironmentService::new(envs, bindings),
        }
    }

    /// The tree manager.
    pub fn tree(&self) -> &TreeService {
        &self.tree
    }

    /// The binding manager.
    pub fn bindings(&self) -> &BindingService {
        &self.bindings
    }

    /// The rule engine.
    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    /// The environment registry.
    pub fn environments(&self) -> &EnvironmentService {
        &self.environments
    }
}
