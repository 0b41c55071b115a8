//! Shared test infrastructure for the service tree.
//!
//! Provides a [`Harness`] wiring every service to one in-memory backend,
//! node fixtures, and store wrappers that inject failures into chosen calls
//! so the best-effort code paths can be exercised.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use cam_servicetree::backends::memory::{MemoryBackend, MemoryInventory};
use cam_servicetree::core::{BindingStore, NodeStore, RuleStore};
use cam_servicetree::error::{BackendError, ServiceTreeError, ServiceTreeResult};
use cam_servicetree::service::{ServiceTree, ServiceTreeConfig};
use cam_servicetree::tenant::TenantId;
use cam_servicetree::types::{
    BindingFilter, BindingRule, Instance, NodeFilter, ResourceBinding, ResourceType, RuleFilter,
    TreeNode,
};

/// The tenant most tests run in.
pub fn tenant() -> TenantId {
    TenantId::new("t1")
}

/// Another tenant, for isolation checks.
pub fn other_tenant() -> TenantId {
    TenantId::new("t2")
}

/// Every service wired to one in-memory backend and inventory.
pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub inventory: Arc<MemoryInventory>,
    pub st: ServiceTree,
}

impl Harness {
    /// Creates a harness with an empty inventory.
    pub fn new() -> Self {
        Self::with_instances(Vec::new())
    }

    /// Creates a harness whose inventory holds `instances`.
    pub fn with_instances(instances: Vec<Instance>) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let inventory = Arc::new(MemoryInventory::with_instances(instances));
        let st = ServiceTree::new(
            backend.clone(),
            inventory.clone(),
            ServiceTreeConfig::default(),
        );
        Self {
            backend,
            inventory,
            st,
        }
    }

    /// Creates a node named `name` under `parent_id` in the default tenant.
    pub async fn node(&self, name: &str, parent_id: i64) -> TreeNode {
        self.node_in(tenant(), name, parent_id).await
    }

    /// Creates a node named `name` under `parent_id` in `tenant_id`.
    pub async fn node_in(&self, tenant_id: TenantId, name: &str, parent_id: i64) -> TreeNode {
        self.st
            .tree()
            .create_node(TreeNode::new(tenant_id, name).with_parent(parent_id))
            .await
            .expect("Failed to create node")
    }

    /// Reads a node straight from the backend.
    pub async fn stored(&self, id: i64) -> TreeNode {
        NodeStore::get_by_id(self.backend.as_ref(), id)
            .await
            .expect("Failed to read node")
            .expect("Node not found")
    }
}

/// An instance in the default tenant.
pub fn instance(id: i64, name: &str) -> Instance {
    Instance::new(id, tenant(), name)
}

/// A path-consistency check: every node's path is its parent's path plus
/// its own identity, and its level is the number of path segments.
pub async fn assert_tree_consistent(backend: &MemoryBackend, tenant_id: &TenantId) {
    let nodes = NodeStore::list(backend, &NodeFilter::for_tenant(tenant_id.clone()))
        .await
        .unwrap();
    for node in &nodes {
        assert!(node.path.starts_with('/') && node.path.ends_with('/'));
        assert_eq!(
            node.level as usize,
            cam_servicetree::types::path_depth(&node.path),
            "level mismatch on node {}",
            node.id
        );
        let expected = if node.parent_id == 0 {
            format!("/{}/", node.id)
        } else {
            let parent = nodes
                .iter()
                .find(|p| p.id == node.parent_id)
                .expect("parent missing");
            format!("{}{}/", parent.path, node.id)
        };
        assert_eq!(node.path, expected, "path mismatch on node {}", node.id);
    }
}

fn injected(what: &str) -> ServiceTreeError {
    ServiceTreeError::Backend(BackendError::QueryError {
        message: format!("injected failure: {what}"),
    })
}

/// Node store whose `update` fails for chosen node ids.
pub struct FailingNodeUpdates {
    pub inner: Arc<MemoryBackend>,
    pub fail_ids: HashSet<i64>,
}

#[async_trait]
impl NodeStore for FailingNodeUpdates {
    fn backend_name(&self) -> &'static str {
        "failing-nodes"
    }

    async fn create(&self, node: TreeNode) -> ServiceTreeResult<TreeNode> {
        NodeStore::create(self.inner.as_ref(), node).await
    }

    async fn update(&self, node: &TreeNode) -> ServiceTreeResult<()> {
        if self.fail_ids.contains(&node.id) {
            return Err(injected("node update"));
        }
        NodeStore::update(self.inner.as_ref(), node).await
    }

    async fn update_path(&self, id: i64, path: &str) -> ServiceTreeResult<()> {
        self.inner.update_path(id, path).await
    }

    async fn get_by_id(&self, id: i64) -> ServiceTreeResult<Option<TreeNode>> {
        NodeStore::get_by_id(self.inner.as_ref(), id).await
    }

    async fn get_by_uid(
        &self,
        tenant_id: &TenantId,
        uid: &str,
    ) -> ServiceTreeResult<Option<TreeNode>> {
        self.inner.get_by_uid(tenant_id, uid).await
    }

    async fn list(&self, filter: &NodeFilter) -> ServiceTreeResult<Vec<TreeNode>> {
        NodeStore::list(self.inner.as_ref(), filter).await
    }

    async fn list_by_path(
        &self,
        tenant_id: &TenantId,
        path_prefix: &str,
    ) -> ServiceTreeResult<Vec<TreeNode>> {
        self.inner.list_by_path(tenant_id, path_prefix).await
    }

    async fn count(&self, filter: &NodeFilter) -> ServiceTreeResult<u64> {
        NodeStore::count(self.inner.as_ref(), filter).await
    }

    async fn count_children(&self, parent_id: i64) -> ServiceTreeResult<u64> {
        self.inner.count_children(parent_id).await
    }

    async fn delete(&self, id: i64) -> ServiceTreeResult<()> {
        NodeStore::delete(self.inner.as_ref(), id).await
    }
}

/// Binding store with optional failures on lookups of chosen resources and
/// on `delete_by_rule`.
pub struct FailingBindings {
    pub inner: Arc<MemoryBackend>,
    pub fail_lookup_ids: HashSet<i64>,
    pub fail_delete_by_rule: bool,
}

#[async_trait]
impl BindingStore for FailingBindings {
    fn backend_name(&self) -> &'static str {
        "failing-bindings"
    }

    async fn create(&self, binding: ResourceBinding) -> ServiceTreeResult<ResourceBinding> {
        BindingStore::create(self.inner.as_ref(), binding).await
    }

    async fn create_batch(&self, bindings: Vec<ResourceBinding>) -> ServiceTreeResult<u64> {
        BindingStore::create_batch(self.inner.as_ref(), bindings).await
    }

    async fn get_by_id(&self, id: i64) -> ServiceTreeResult<Option<ResourceBinding>> {
        BindingStore::get_by_id(self.inner.as_ref(), id).await
    }

    async fn get_by_resource(
        &self,
        tenant_id: &TenantId,
        resource_type: ResourceType,
        resource_id: i64,
    ) -> ServiceTreeResult<Option<ResourceBinding>> {
        if self.fail_lookup_ids.contains(&resource_id) {
            return Err(injected("binding lookup"));
        }
        self.inner
            .get_by_resource(tenant_id, resource_type, resource_id)
            .await
    }

    async fn list(&self, filter: &BindingFilter) -> ServiceTreeResult<Vec<ResourceBinding>> {
        BindingStore::list(self.inner.as_ref(), filter).await
    }

    async fn count(&self, filter: &BindingFilter) -> ServiceTreeResult<u64> {
        BindingStore::count(self.inner.as_ref(), filter).await
    }

    async fn delete(&self, id: i64) -> ServiceTreeResult<()> {
        BindingStore::delete(self.inner.as_ref(), id).await
    }

    async fn delete_by_node(&self, node_id: i64) -> ServiceTreeResult<u64> {
        BindingStore::delete_by_node(self.inner.as_ref(), node_id).await
    }

    async fn delete_by_rule(&self, rule_id: i64) -> ServiceTreeResult<u64> {
        if self.fail_delete_by_rule {
            return Err(injected("binding delete_by_rule"));
        }
        self.inner.delete_by_rule(rule_id).await
    }
}

/// Rule store whose `delete_by_node` always fails.
pub struct FailingRuleCascade {
    pub inner: Arc<MemoryBackend>,
}

#[async_trait]
impl RuleStore for FailingRuleCascade {
    fn backend_name(&self) -> &'static str {
        "failing-rules"
    }

    async fn create(&self, rule: BindingRule) -> ServiceTreeResult<BindingRule> {
        RuleStore::create(self.inner.as_ref(), rule).await
    }

    async fn update(&self, rule: &BindingRule) -> ServiceTreeResult<()> {
        RuleStore::update(self.inner.as_ref(), rule).await
    }

    async fn get_by_id(&self, id: i64) -> ServiceTreeResult<Option<BindingRule>> {
        RuleStore::get_by_id(self.inner.as_ref(), id).await
    }

    async fn list(&self, filter: &RuleFilter) -> ServiceTreeResult<Vec<BindingRule>> {
        RuleStore::list(self.inner.as_ref(), filter).await
    }

    async fn list_enabled(&self, tenant_id: &TenantId) -> ServiceTreeResult<Vec<BindingRule>> {
        self.inner.list_enabled(tenant_id).await
    }

    async fn count(&self, filter: &RuleFilter) -> ServiceTreeResult<u64> {
        RuleStore::count(self.inner.as_ref(), filter).await
    }

    async fn delete(&self, id: i64) -> ServiceTreeResult<()> {
        RuleStore::delete(self.inner.as_ref(), id).await
    }

    async fn delete_by_node(&self, _node_id: i64) -> ServiceTreeResult<u64> {
        Err(injected("rule delete_by_node"))
    }
}
