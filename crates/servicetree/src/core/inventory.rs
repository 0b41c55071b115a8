//! The external resource inventory.

use async_trait::async_trait;

use crate::error::ServiceTreeResult;
use crate::types::{Instance, InstanceFilter};

/// Read access to the asset inventory, used by batch rule execution.
#[async_trait]
pub trait ResourceInventory: Send + Sync {
    /// Returns a human-readable name for this inventory.
    fn backend_name(&self) -> &'static str;

    /// Lists one page of instances, ordered by identity.
    async fn list_instances(&self, filter: &InstanceFilter) -> ServiceTreeResult<Vec<Instance>>;
}
