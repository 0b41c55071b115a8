//! In-memory backend state.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::ResourceInventory;
use crate::error::{BackendError, ServiceTreeError, ServiceTreeResult};
use crate::types::{BindingRule, Environment, Instance, InstanceFilter, ResourceBinding, TreeNode};

pub(super) const BACKEND_NAME: &str = "memory";

/// In-memory backend for every service tree store.
#[derive(Default)]
pub struct MemoryBackend {
    pub(super) state: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
pub(super) struct MemoryState {
    pub(super) nodes: BTreeMap<i64, TreeNode>,
    pub(super) bindings: BTreeMap<i64, ResourceBinding>,
    pub(super) rules: BTreeMap<i64, BindingRule>,
    pub(super) environments: BTreeMap<i64, Environment>,
    last_node_id: i64,
    last_binding_id: i64,
    last_rule_id: i64,
    last_environment_id: i64,
}

impl MemoryState {
    pub(super) fn next_node_id(&mut self) -> i64 {
        self.last_node_id += 1;
        self.last_node_id
    }

    pub(super) fn next_binding_id(&mut self) -> i64 {
        self.last_binding_id += 1;
        self.last_binding_id
    }

    pub(super) fn next_rule_id(&mut self) -> i64 {
        self.last_rule_id += 1;
        self.last_rule_id
    }

    pub(super) fn next_environment_id(&mut self) -> i64 {
        self.last_environment_id += 1;
        self.last_environment_id
    }

    /// Returns `true` if another binding already holds the binding's
    /// natural key.
    pub(super) fn binding_key_taken(&self, binding: &ResourceBinding) -> bool {
        self.bindings.values().any(|b| {
            b.id != binding.id
                && b.tenant_id == binding.tenant_id
                && b.resource_type == binding.resource_type
                && b.resource_id == binding.resource_id
        })
    }

    /// Returns `true` if another node of the same tenant uses the node's uid.
    pub(super) fn node_uid_taken(&self, node: &TreeNode) -> bool {
        let Some(uid) = node.uid() else {
            return false;
        };
        self.nodes
            .values()
            .any(|n| n.id != node.id && n.tenant_id == node.tenant_id && n.uid() == Some(uid))
    }

    /// Returns `true` if another environment of the same tenant uses the
    /// environment's code.
    pub(super) fn env_code_taken(&self, env: &Environment) -> bool {
        self.environments
            .values()
            .any(|e| e.id != env.id && e.tenant_id == env.tenant_id && e.code == env.code)
    }
}

impl Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("MemoryBackend")
            .field("nodes", &state.nodes.len())
            .field("bindings", &state.bindings.len())
            .field("rules", &state.rules.len())
            .field("environments", &state.environments.len())
            .finish_non_exhaustive()
    }
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

pub(super) fn unique_violation(constraint: &str) -> ServiceTreeError {
    ServiceTreeError::Backend(BackendError::UniqueViolation {
        backend_name: BACKEND_NAME.to_string(),
        constraint: constraint.to_string(),
    })
}

/// Applies offset/limit pagination to an already ordered list.
pub(super) fn paginate<T>(items: Vec<T>, offset: u64, limit: Option<u64>) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let limit = limit
        .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);
    items.into_iter().skip(offset).take(limit).collect()
}

/// In-memory resource inventory.
#[derive(Debug, Default)]
pub struct MemoryInventory {
    instances: RwLock<BTreeMap<i64, Instance>>,
}

impl MemoryInventory {
    /// Creates an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an inventory holding `instances`.
    ///
    /// A later instance replaces an earlier one with the same identity.
    pub fn with_instances(instances: impl IntoIterator<Item = Instance>) -> Self {
        let inventory = Self::new();
        for instance in instances {
            inventory.insert(instance);
        }
        inventory
    }

    /// Inserts or replaces an instance.
    pub fn insert(&self, instance: Instance) {
        self.instances.write().insert(instance.id, instance);
    }

    /// Removes an instance.
    pub fn remove(&self, id: i64) -> Option<Instance> {
        self.instances.write().remove(&id)
    }

    /// Number of instances across all tenants.
    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    /// Returns `true` if the inventory holds no instances.
    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}

#[async_trait]
impl ResourceInventory for MemoryInventory {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn list_instances(&self, filter: &InstanceFilter) -> ServiceTreeResult<Vec<Instance>> {
        let instances = self.instances.read();
        let matching: Vec<Instance> = instances
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        Ok(paginate(matching, filter.offset, filter.limit))
    }
}
