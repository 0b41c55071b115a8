//! Environment storage.

use async_trait::async_trait;

use crate::error::ServiceTreeResult;
use crate::tenant::TenantId;
use crate::types::{Environment, EnvironmentFilter};

/// Storage for environments.
///
/// Implementations must reject a second environment with the same
/// `(tenant_id, code)` with `BackendError::UniqueViolation`.
#[async_trait]
pub trait EnvironmentStore: Send + Sync {
    /// Returns a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;

    /// Persists a new environment and returns it with its assigned identity.
    async fn create(&self, env: Environment) -> ServiceTreeResult<Environment>;

    /// Persists several environments at once and returns how many were
    /// created. Either every environment is created or none is.
    async fn create_batch(&self, envs: Vec<Environment>) -> ServiceTreeResult<u64>;

    /// Overwrites an existing environment.
    async fn update(&self, env: &Environment) -> ServiceTreeResult<()>;

    /// Reads an environment by identity.
    async fn get_by_id(&self, id: i64) -> ServiceTreeResult<Option<Environment>>;

    /// Reads an environment by its tenant-scoped code.
    async fn get_by_code(
        &self,
        tenant_id: &TenantId,
        code: &str,
    ) -> ServiceTreeResult<Option<Environment>>;

    /// Lists environments matching `filter`, ordered by `(order, id)`.
    async fn list(&self, filter: &EnvironmentFilter) -> ServiceTreeResult<Vec<Environment>>;

    /// Counts environments matching `filter`.
    async fn count(&self, filter: &EnvironmentFilter) -> ServiceTreeResult<u64>;

    /// Deletes an environment.
    async fn delete(&self, id: i64) -> ServiceTreeResult<()>;
}
