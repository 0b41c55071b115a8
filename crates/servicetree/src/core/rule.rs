//! Binding rule storage.

use async_trait::async_trait;

use crate::error::ServiceTreeResult;
use crate::tenant::TenantId;
use crate::types::{BindingRule, RuleFilter};

/// Storage for binding rules.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Returns a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;

    /// Persists a new rule and returns it with its assigned identity.
    async fn create(&self, rule: BindingRule) -> ServiceTreeResult<BindingRule>;

    /// Overwrites an existing rule.
    async fn update(&self, rule: &BindingRule) -> ServiceTreeResult<()>;

    /// Reads a rule by identity.
    async fn get_by_id(&self, id: i64) -> ServiceTreeResult<Option<BindingRule>>;

    /// Lists rules matching `filter`, ordered by `(priority, id)`.
    async fn list(&self, filter: &RuleFilter) -> ServiceTreeResult<Vec<BindingRule>>;

    /// Lists the enabled rules of a tenant, ordered by `(priority, id)`.
    async fn list_enabled(&self, tenant_id: &TenantId) -> ServiceTreeResult<Vec<BindingRule>>;

    /// Counts rules matching `filter`.
    async fn count(&self, filter: &RuleFilter) -> ServiceTreeResult<u64>;

    /// Deletes a rule.
    async fn delete(&self, id: i64) -> ServiceTreeResult<()>;

    /// Deletes every rule targeting a node and returns how many were removed.
    async fn delete_by_node(&self, node_id: i64) -> ServiceTreeResult<u64>;
}
