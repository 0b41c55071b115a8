//! Binding manager: attaching resources to tree nodes.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::{BindingStore, NodeStore};
use crate::error::{BindingError, NodeError, ServiceTreeResult, missing_field};
use crate::tenant::TenantId;
use crate::types::{
    BatchBindRequest, BindingFilter, ResourceBinding, ResourceType, ResourceWithNode, TreeNode,
};

/// Attaches resources to tree nodes, one binding per resource.
#[derive(Clone)]
pub struct BindingService {
    bindings: Arc<dyn BindingStore>,
    nodes: Arc<dyn NodeStore>,
}

impl BindingService {
    /// Creates a binding service over the given stores.
    pub fn new(bindings: Arc<dyn BindingStore>, nodes: Arc<dyn NodeStore>) -> Self {
        Self { bindings, nodes }
    }

    /// Binds a resource to a node in an environment.
    ///
    /// Binding a resource again to the node and environment it is already
    /// bound to returns the existing binding.
    ///
    /// # Errors
    ///
    /// * `NodeError::NotFound` - the node does not exist in the tenant
    /// * `BindingError::AlreadyBound` - the resource is bound elsewhere
    pub async fn bind_resource(
        &self,
        tenant_id: &TenantId,
        node_id: i64,
        env_id: i64,
        resource_type: ResourceType,
        resource_id: i64,
    ) -> ServiceTreeResult<ResourceBinding> {
        if tenant_id.is_empty() {
            return Err(missing_field("tenant_id"));
        }
        self.target_node(tenant_id, node_id).await?;

        if let Some(existing) = self
            .bindings
            .get_by_resource(tenant_id, resource_type, resource_id)
            .await?
        {
            if existing.targets(node_id, env_id) {
                debug!(
                    binding_id = existing.id,
                    resource_id, "Resource already bound to target"
                );
                return Ok(existing);
            }
            return Err(BindingError::AlreadyBound {
                resource_type: resource_type.to_string(),
                resource_id,
                node_id: existing.node_id,
                env_id: existing.env_id,
            }
            .into());
        }

        let binding = self
            .bindings
            .create(ResourceBinding::manual(
                tenant_id.clone(),
                node_id,
                env_id,
                resource_type,
                resource_id,
            ))
            .await?;

        info!(
            binding_id = binding.id,
            node_id,
            env_id,
            resource_type = %resource_type,
            resource_id,
            "Bound resource"
        );
        Ok(binding)
    }

    /// Binds many resources to one node and environment.
    ///
    /// Resources that are already bound anywhere are skipped, as are
    /// resources whose binding could not be looked up (logged). Returns the
    /// number of bindings created, which may be zero.
    pub async fn bind_resource_batch(&self, request: &BatchBindRequest) -> ServiceTreeResult<u64> {
        if request.resource_ids.is_empty() {
            return Ok(0);
        }
        if request.tenant_id.is_empty() {
            return Err(missing_field("tenant_id"));
        }
        self.target_node(&request.tenant_id, request.node_id).await?;

        let mut seen = HashSet::with_capacity(request.resource_ids.len());
        let mut staged = Vec::new();
        for &resource_id in &request.resource_ids {
            if !seen.insert(resource_id) {
                continue;
            }

            match self
                .bindings
                .get_by_resource(&request.tenant_id, request.resource_type, resource_id)
                .await
            {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    warn!(resource_id, error = %e, "Failed to look up binding, skipping resource");
                    continue;
                }
            }

            staged.push(ResourceBinding::manual(
                request.tenant_id.clone(),
                request.node_id,
                request.env_id,
                request.resource_type,
                resource_id,
            ));
        }

        if staged.is_empty() {
            return Ok(0);
        }

        let created = self.bindings.create_batch(staged).await?;
        info!(
            node_id = request.node_id,
            env_id = request.env_id,
            requested = request.resource_ids.len(),
            created,
            "Batch bound resources"
        );
        Ok(created)
    }

    /// Removes the binding of a resource.
    pub async fn unbind_resource(
        &self,
        tenant_id: &TenantId,
        resource_type: ResourceType,
        resource_id: i64,
    ) -> ServiceTreeResult<()> {
        let binding = self
            .get_resource_binding(tenant_id, resource_type, resource_id)
            .await?;
        self.bindings.delete(binding.id).await?;

        info!(binding_id = binding.id, resource_id, "Unbound resource");
        Ok(())
    }

    /// Removes a binding by identity.
    pub async fn unbind_by_id(&self, id: i64) -> ServiceTreeResult<()> {
        let binding = self.get_binding(id).await?;
        self.bindings.delete(binding.id).await?;

        info!(binding_id = id, "Unbound resource");
        Ok(())
    }

    /// Reads a binding.
    pub async fn get_binding(&self, id: i64) -> ServiceTreeResult<ResourceBinding> {
        self.bindings
            .get_by_id(id)
            .await?
            .ok_or_else(|| BindingError::NotFound { id }.into())
    }

    /// Reads the binding of a resource.
    pub async fn get_resource_binding(
        &self,
        tenant_id: &TenantId,
        resource_type: ResourceType,
        resource_id: i64,
    ) -> ServiceTreeResult<ResourceBinding> {
        self.bindings
            .get_by_resource(tenant_id, resource_type, resource_id)
            .await?
            .ok_or_else(|| {
                BindingError::ResourceNotBound {
                    resource_type: resource_type.to_string(),
                    resource_id,
                }
                .into()
            })
    }

    /// Lists one page of bindings and the total number of matches.
    pub async fn list_bindings(
        &self,
        filter: &BindingFilter,
    ) -> ServiceTreeResult<(Vec<ResourceBinding>, u64)> {
        let bindings = self.bindings.list(filter).await?;
        let total = self.bindings.count(filter).await?;
        Ok((bindings, total))
    }

    /// Reads the binding of a resource together with the node it is bound
    /// to.
    pub async fn get_resource_node(
        &self,
        tenant_id: &TenantId,
        resource_type: ResourceType,
        resource_id: i64,
    ) -> ServiceTreeResult<ResourceWithNode> {
        let binding = self
            .get_resource_binding(tenant_id, resource_type, resource_id)
            .await?;
        let node = self
            .nodes
            .get_by_id(binding.node_id)
            .await?
            .ok_or(NodeError::NotFound {
                id: binding.node_id,
            })?;

        Ok(ResourceWithNode {
            resource_type: binding.resource_type,
            resource_id: binding.resource_id,
            env_id: binding.env_id,
            bind_type: binding.bind_type,
            node,
        })
    }

    /// Number of resources bound to a node, across environments.
    pub async fn get_node_resource_count(&self, node_id: i64) -> ServiceTreeResult<u64> {
        self.bindings.count(&BindingFilter::for_node(node_id)).await
    }

    /// Number of resources bound to a node in one environment.
    pub async fn get_node_env_resource_count(
        &self,
        node_id: i64,
        env_id: i64,
    ) -> ServiceTreeResult<u64> {
        let filter = BindingFilter {
            env_id: Some(env_id),
            ..BindingFilter::for_node(node_id)
        };
        self.bindings.count(&filter).await
    }

    async fn target_node(&self, tenant_id: &TenantId, node_id: i64) -> ServiceTreeResult<TreeNode> {
        match self.nodes.get_by_id(node_id).await? {
            Some(node) if &node.tenant_id == tenant_id => Ok(node),
            _ => Err(NodeError::NotFound { id: node_id }.into()),
        }
    }
}

impl std::fmt::Debug for BindingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingService")
            .field("bindings", &self.bindings.backend_name())
            .finish_non_exhaustive()
    }
}
