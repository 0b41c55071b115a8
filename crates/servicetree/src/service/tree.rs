//! Tree manager: node CRUD, moves and tree queries.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::core::{BindingStore, NodeStore, RuleStore};
use crate::error::{NodeError, ServiceTreeResult, ValidationError, missing_field};
use crate::tenant::TenantId;
use crate::types::{
    BindingFilter, LEVEL_BUSINESS_LINE, NodeFilter, NodeWithChildren, ROOT_PARENT_ID, Tree,
    TreeNode, build_path, is_valid_path, path_ids, rebase_path,
};

/// Manages the structure of a tenant's service tree.
///
/// Paths are materialized on every node (see [`crate::types`]), so subtree
/// reads are a single prefix query against the [`NodeStore`]. Deleting a
/// node consults the [`BindingStore`] and cleans up the [`RuleStore`].
#[derive(Clone)]
pub struct TreeService {
    nodes: Arc<dyn NodeStore>,
    bindings: Arc<dyn BindingStore>,
    rules: Arc<dyn RuleStore>,
}

impl TreeService {
    /// Creates a tree service over the given stores.
    pub fn new(
        nodes: Arc<dyn NodeStore>,
        bindings: Arc<dyn BindingStore>,
        rules: Arc<dyn RuleStore>,
    ) -> Self {
        Self {
            nodes,
            bindings,
            rules,
        }
    }

    /// Creates a node under `node.parent_id` (or at the top when it is 0).
    ///
    /// The node's identity, level and path are computed here; whatever the
    /// caller put in those fields is ignored.
    ///
    /// # Errors
    ///
    /// * `ValidationError::MissingRequiredField` - name or tenant is empty
    /// * `NodeError::UidExists` - the uid is already used within the tenant
    /// * `NodeError::InvalidParent` - the parent does not exist in the tenant
    pub async fn create_node(&self, mut node: TreeNode) -> ServiceTreeResult<TreeNode> {
        node.validate()?;

        if let Some(uid) = node.uid() {
            if self.nodes.get_by_uid(&node.tenant_id, uid).await?.is_some() {
                return Err(NodeError::UidExists {
                    tenant_id: node.tenant_id.clone(),
                    uid: uid.to_string(),
                }
                .into());
            }
        }

        let parent_path = if node.parent_id > ROOT_PARENT_ID {
            let parent = self.parent_of(&node.tenant_id, node.parent_id).await?;
            node.level = parent.level + 1;
            parent.path
        } else {
            node.parent_id = ROOT_PARENT_ID;
            node.level = LEVEL_BUSINESS_LINE;
            String::new()
        };

        let now = Utc::now();
        node.id = 0;
        node.path = String::new();
        node.create_time = now;
        node.update_time = now;

        let mut created = self.nodes.create(node).await?;

        // The path embeds the node's own identity, so it can only be written
        // once the store has assigned one.
        let path = build_path(&parent_path, created.id);
        self.nodes.update_path(created.id, &path).await?;
        created.path = path;

        info!(
            node_id = created.id,
            tenant_id = %created.tenant_id,
            path = %created.path,
            "Created tree node"
        );
        Ok(created)
    }

    /// Updates the descriptive fields of a node.
    ///
    /// Tenant, parent, level and path always keep their stored values; use
    /// [`move_node`](Self::move_node) to change the structure.
    pub async fn update_node(&self, node: TreeNode) -> ServiceTreeResult<TreeNode> {
        let existing = self.get_node(node.id).await?;

        if node.name.trim().is_empty() {
            return Err(missing_field("name"));
        }

        if let Some(uid) = node.uid() {
            if existing.uid() != Some(uid) {
                let taken = self
                    .nodes
                    .get_by_uid(&existing.tenant_id, uid)
                    .await?
                    .is_some_and(|other| other.id != existing.id);
                if taken {
                    return Err(NodeError::UidExists {
                        tenant_id: existing.tenant_id.clone(),
                        uid: uid.to_string(),
                    }
                    .into());
                }
            }
        }

        let updated = TreeNode {
            id: existing.id,
            parent_id: existing.parent_id,
            level: existing.level,
            path: existing.path,
            tenant_id: existing.tenant_id,
            create_time: existing.create_time,
            update_time: Utc::now(),
            ..node
        };
        self.nodes.update(&updated).await?;

        debug!(node_id = updated.id, "Updated tree node");
        Ok(updated)
    }

    /// Deletes a leaf node with no bound resources.
    ///
    /// Binding rules targeting the node are removed afterwards; a failure
    /// there is logged and does not fail the delete.
    pub async fn delete_node(&self, id: i64) -> ServiceTreeResult<()> {
        let node = self.get_node(id).await?;

        let children = self.nodes.count_children(id).await?;
        if children > 0 {
            return Err(NodeError::HasChildren {
                id,
                count: children,
            }
            .into());
        }

        let bound = self.bindings.count(&BindingFilter::for_node(id)).await?;
        if bound > 0 {
            return Err(NodeError::HasBindings { id, count: bound }.into());
        }

        self.nodes.delete(id).await?;

        if let Err(e) = self.rules.delete_by_node(id).await {
            warn!(node_id = id, error = %e, "Failed to delete rules of deleted node");
        }

        info!(node_id = id, tenant_id = %node.tenant_id, "Deleted tree node");
        Ok(())
    }

    /// Reads a node.
    pub async fn get_node(&self, id: i64) -> ServiceTreeResult<TreeNode> {
        self.nodes
            .get_by_id(id)
            .await?
            .ok_or_else(|| NodeError::NotFound { id }.into())
    }

    /// Reads a node by its tenant-scoped uid.
    pub async fn get_node_by_uid(
        &self,
        tenant_id: &TenantId,
        uid: &str,
    ) -> ServiceTreeResult<TreeNode> {
        self.nodes.get_by_uid(tenant_id, uid).await?.ok_or_else(|| {
            NodeError::UidNotFound {
                tenant_id: tenant_id.clone(),
                uid: uid.to_string(),
            }
            .into()
        })
    }

    /// Moves a node, with its whole subtree, under `new_parent_id`
    /// (0 moves it to the top).
    ///
    /// The node itself is rewritten first and any failure there is returned.
    /// Descendants are then rewritten one by one; a failed descendant is
    /// logged and skipped, leaving the rest of the move in place.
    ///
    /// # Errors
    ///
    /// * `NodeError::CyclicReference` - the target is the node itself or one
    ///   of its descendants
    /// * `NodeError::NotFound` - the node does not exist
    /// * `NodeError::InvalidParent` - the target does not exist in the tenant
    pub async fn move_node(&self, id: i64, new_parent_id: i64) -> ServiceTreeResult<TreeNode> {
        if id == new_parent_id {
            return Err(NodeError::CyclicReference { id, new_parent_id }.into());
        }

        let mut node = self.get_node(id).await?;
        if !is_valid_path(&node.path) {
            return Err(ValidationError::InvalidPath {
                path: node.path.clone(),
                message: format!("node {id} has no materialized path"),
            }
            .into());
        }

        let (new_parent_id, new_level, new_path) = if new_parent_id > ROOT_PARENT_ID {
            let parent = self.parent_of(&node.tenant_id, new_parent_id).await?;
            if parent.path.starts_with(&node.path) {
                return Err(NodeError::CyclicReference { id, new_parent_id }.into());
            }
            (parent.id, parent.level + 1, build_path(&parent.path, id))
        } else {
            (ROOT_PARENT_ID, LEVEL_BUSINESS_LINE, build_path("", id))
        };

        let old_path = std::mem::replace(&mut node.path, new_path);
        let old_level = std::mem::replace(&mut node.level, new_level);
        let level_delta = new_level - old_level;

        let subtree = self.nodes.list_by_path(&node.tenant_id, &old_path).await?;

        node.parent_id = new_parent_id;
        node.update_time = Utc::now();
        self.nodes.update(&node).await?;

        let mut moved = 0usize;
        for mut member in subtree.into_iter().filter(|n| n.id != id) {
            let Some(path) = rebase_path(&member.path, &old_path, &node.path) else {
                continue;
            };
            member.path = path;
            member.level += level_delta;
            member.update_time = node.update_time;

            if let Err(e) = self.nodes.update(&member).await {
                error!(
                    node_id = member.id,
                    moved_node_id = id,
                    error = %e,
                    "Failed to rewrite subtree node during move"
                );
                continue;
            }
            moved += 1;
        }

        info!(
            node_id = id,
            new_parent_id,
            old_path = %old_path,
            new_path = %node.path,
            descendants = moved,
            "Moved tree node"
        );
        Ok(node)
    }

    /// Lists one page of nodes and the total number of matches.
    pub async fn list_nodes(&self, filter: &NodeFilter) -> ServiceTreeResult<(Vec<TreeNode>, u64)> {
        let nodes = self.nodes.list(filter).await?;
        let total = self.nodes.count(filter).await?;
        Ok((nodes, total))
    }

    /// Assembles a tree.
    ///
    /// With `root_id == 0` the result is a synthetic root (no node) whose
    /// children are the tenant's top-level nodes. Otherwise the result is
    /// rooted at `root_id`, which must belong to the tenant.
    pub async fn get_tree(
        &self,
        tenant_id: &TenantId,
        root_id: i64,
    ) -> ServiceTreeResult<NodeWithChildren> {
        Ok(self.build_tree(tenant_id, root_id).await?.to_nested())
    }

    /// Like [`get_tree`](Self::get_tree), with every node's bound resource
    /// count filled in.
    pub async fn get_tree_with_counts(
        &self,
        tenant_id: &TenantId,
        root_id: i64,
    ) -> ServiceTreeResult<NodeWithChildren> {
        let mut tree = self.build_tree(tenant_id, root_id).await?;
        for id in tree.node_ids() {
            let count = self.bindings.count(&BindingFilter::for_node(id)).await?;
            tree.set_resource_count(id, count);
        }
        Ok(tree.to_nested())
    }

    /// Returns a node and all of its descendants, ordered by
    /// `(level, order)`.
    pub async fn get_sub_tree(
        &self,
        tenant_id: &TenantId,
        id: i64,
    ) -> ServiceTreeResult<Vec<TreeNode>> {
        let node = self.tenant_node(tenant_id, id).await?;
        self.nodes.list_by_path(tenant_id, &node.path).await
    }

    /// Returns the ancestors of a node from the top down, excluding the node
    /// itself. Ancestors that cannot be read are left out.
    pub async fn get_ancestors(&self, id: i64) -> ServiceTreeResult<Vec<TreeNode>> {
        let node = self.get_node(id).await?;

        let mut ancestors = Vec::new();
        for ancestor_id in path_ids(&node.path).into_iter().filter(|&a| a != id) {
            match self.nodes.get_by_id(ancestor_id).await {
                Ok(Some(ancestor)) => ancestors.push(ancestor),
                Ok(None) => debug!(node_id = id, ancestor_id, "Skipping missing ancestor"),
                Err(e) => debug!(
                    node_id = id,
                    ancestor_id,
                    error = %e,
                    "Skipping unreadable ancestor"
                ),
            }
        }
        Ok(ancestors)
    }

    async fn build_tree(&self, tenant_id: &TenantId, root_id: i64) -> ServiceTreeResult<Tree> {
        if root_id <= ROOT_PARENT_ID {
            let nodes = self.nodes.list(&NodeFilter::for_tenant(tenant_id.clone())).await?;
            return Ok(Tree::with_synthetic_root(nodes));
        }

        let root = self.tenant_node(tenant_id, root_id).await?;
        let nodes = self.nodes.list_by_path(tenant_id, &root.path).await?;
        Tree::rooted_at(root_id, nodes).ok_or_else(|| NodeError::NotFound { id: root_id }.into())
    }

    /// Reads a node, treating nodes of other tenants as missing.
    async fn tenant_node(&self, tenant_id: &TenantId, id: i64) -> ServiceTreeResult<TreeNode> {
        match self.nodes.get_by_id(id).await? {
            Some(node) if &node.tenant_id == tenant_id => Ok(node),
            _ => Err(NodeError::NotFound { id }.into()),
        }
    }

    async fn parent_of(&self, tenant_id: &TenantId, parent_id: i64) -> ServiceTreeResult<TreeNode> {
        match self.nodes.get_by_id(parent_id).await? {
            Some(parent) if &parent.tenant_id == tenant_id => Ok(parent),
            _ => Err(NodeError::InvalidParent { parent_id }.into()),
        }
    }
}

impl std::fmt::Debug for TreeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeService")
            .field("nodes", &self.nodes.backend_name())
            .finish_non_exhaustive()
    }
}
