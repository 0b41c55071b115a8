//! Resource binding storage.

use async_trait::async_trait;

use crate::error::ServiceTreeResult;
use crate::tenant::TenantId;
use crate::types::{BindingFilter, ResourceBinding, ResourceType};

/// Storage for resource bindings.
///
/// Implementations must reject a second binding for the same
/// `(tenant_id, resource_type, resource_id)` with
/// `BackendError::UniqueViolation`.
#[async_trait]
pub trait BindingStore: Send + Sync {
    /// Returns a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;

    /// Persists a new binding and returns it with its assigned identity.
    async fn create(&self, binding: ResourceBinding) -> ServiceTreeResult<ResourceBinding>;

    /// Persists several bindings at once and returns how many were created.
    ///
    /// Either every binding is created or none is.
    async fn create_batch(&self, bindings: Vec<ResourceBinding>) -> ServiceTreeResult<u64>;

    /// Reads a binding by identity.
    async fn get_by_id(&self, id: i64) -> ServiceTreeResult<Option<ResourceBinding>>;

    /// Reads the binding of a resource.
    async fn get_by_resource(
        &self,
        tenant_id: &TenantId,
        resource_type: ResourceType,
        resource_id: i64,
    ) -> ServiceTreeResult<Option<ResourceBinding>>;

    /// Lists bindings matching `filter`, newest first.
    async fn list(&self, filter: &BindingFilter) -> ServiceTreeResult<Vec<ResourceBinding>>;

    /// Counts bindings matching `filter`.
    async fn count(&self, filter: &BindingFilter) -> ServiceTreeResult<u64>;

    /// Deletes a binding.
    async fn delete(&self, id: i64) -> ServiceTreeResult<()>;

    /// Deletes every binding on a node and returns how many were removed.
    async fn delete_by_node(&self, node_id: i64) -> ServiceTreeResult<u64>;

    /// Deletes every binding created by a rule and returns how many were
    /// removed.
    async fn delete_by_rule(&self, rule_id: i64) -> ServiceTreeResult<u64>;
}
