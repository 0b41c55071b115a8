//! Tree node storage.

use async_trait::async_trait;

use crate::error::ServiceTreeResult;
use crate::tenant::TenantId;
use crate::types::{NodeFilter, TreeNode};

/// Storage for tree nodes.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Returns a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;

    /// Persists a new node and returns it with its assigned identity.
    ///
    /// The node is stored as given; computing `path` is the caller's job
    /// (see [`update_path`](Self::update_path)).
    ///
    /// # Errors
    ///
    /// * `BackendError::UniqueViolation` - if the node's uid is already used
    ///   within its tenant
    async fn create(&self, node: TreeNode) -> ServiceTreeResult<TreeNode>;

    /// Overwrites every stored field of an existing node.
    async fn update(&self, node: &TreeNode) -> ServiceTreeResult<()>;

    /// Overwrites only the path of an existing node.
    async fn update_path(&self, id: i64, path: &str) -> ServiceTreeResult<()>;

    /// Reads a node by identity.
    async fn get_by_id(&self, id: i64) -> ServiceTreeResult<Option<TreeNode>>;

    /// Reads a node by its tenant-scoped uid.
    async fn get_by_uid(&self, tenant_id: &TenantId, uid: &str)
    -> ServiceTreeResult<Option<TreeNode>>;

    /// Lists nodes matching `filter`, ordered by `(order, create_time)`.
    async fn list(&self, filter: &NodeFilter) -> ServiceTreeResult<Vec<TreeNode>>;

    /// Lists every node of a tenant whose path starts with `path_prefix`,
    /// ordered by `(level, order)`.
    ///
    /// The node owning the prefix itself is included.
    async fn list_by_path(
        &self,
        tenant_id: &TenantId,
        path_prefix: &str,
    ) -> ServiceTreeResult<Vec<TreeNode>>;

    /// Counts nodes matching `filter`.
    async fn count(&self, filter: &NodeFilter) -> ServiceTreeResult<u64>;

    /// Counts the direct children of a node.
    async fn count_children(&self, parent_id: i64) -> ServiceTreeResult<u64>;

    /// Deletes a node.
    async fn delete(&self, id: i64) -> ServiceTreeResult<()>;
}
