//! Environment registry.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::core::{BindingStore, EnvironmentStore};
use crate::error::{EnvironmentError, ServiceTreeResult};
use crate::tenant::TenantId;
use crate::types::{BindingFilter, Environment, EnvironmentFilter, default_environments};

/// Manages a tenant's deployment environments.
#[derive(Clone)]
pub struct EnvironmentService {
    envs: Arc<dyn EnvironmentStore>,
    bindings: Arc<dyn BindingStore>,
}

impl EnvironmentService {
    /// Creates an environment service over the given stores.
    pub fn new(envs: Arc<dyn EnvironmentStore>, bindings: Arc<dyn BindingStore>) -> Self {
        Self { envs, bindings }
    }

    /// Creates an environment. Codes are unique within a tenant.
    pub async fn create(&self, mut env: Environment) -> ServiceTreeResult<Environment> {
        env.validate()?;
        self.ensure_code_free(&env.tenant_id, &env.code, None).await?;

        let now = Utc::now();
        env.id = 0;
        env.create_time = now;
        env.update_time = now;

        let created = self.envs.create(env).await?;
        info!(
            env_id = created.id,
            tenant_id = %created.tenant_id,
            code = %created.code,
            "Created environment"
        );
        Ok(created)
    }

    /// Updates an environment. The tenant keeps its stored value.
    pub async fn update(&self, env: Environment) -> ServiceTreeResult<Environment> {
        let existing = self.get_by_id(env.id).await?;

        let updated = Environment {
            tenant_id: existing.tenant_id,
            create_time: existing.create_time,
            update_time: Utc::now(),
            ..env
        };
        updated.validate()?;
        if updated.code != existing.code {
            self.ensure_code_free(&updated.tenant_id, &updated.code, Some(updated.id))
                .await?;
        }

        self.envs.update(&updated).await?;
        debug!(env_id = updated.id, "Updated environment");
        Ok(updated)
    }

    /// Deletes an environment that no binding references.
    pub async fn delete(&self, id: i64) -> ServiceTreeResult<()> {
        self.get_by_id(id).await?;

        let bound = self.bindings.count(&BindingFilter::for_env(id)).await?;
        if bound > 0 {
            return Err(EnvironmentError::HasBindings { id, count: bound }.into());
        }

        self.envs.delete(id).await?;
        info!(env_id = id, "Deleted environment");
        Ok(())
    }

    /// Reads an environment.
    pub async fn get_by_id(&self, id: i64) -> ServiceTreeResult<Environment> {
        self.envs
            .get_by_id(id)
            .await?
            .ok_or_else(|| EnvironmentError::NotFound { id }.into())
    }

    /// Reads an environment by code.
    pub async fn get_by_code(
        &self,
        tenant_id: &TenantId,
        code: &str,
    ) -> ServiceTreeResult<Environment> {
        self.envs.get_by_code(tenant_id, code).await?.ok_or_else(|| {
            EnvironmentError::CodeNotFound {
                tenant_id: tenant_id.clone(),
                code: code.to_string(),
            }
            .into()
        })
    }

    /// Lists one page of environments and the total number of matches.
    pub async fn list(
        &self,
        filter: &EnvironmentFilter,
    ) -> ServiceTreeResult<(Vec<Environment>, u64)> {
        let envs = self.envs.list(filter).await?;
        let total = self.envs.count(filter).await?;
        Ok((envs, total))
    }

    /// Creates the default environments for a tenant that has none.
    ///
    /// Returns the number created, `0` when the tenant already has any
    /// environment.
    pub async fn init_default_envs(&self, tenant_id: &TenantId) -> ServiceTreeResult<u64> {
        let existing = self
            .envs
            .count(&EnvironmentFilter::for_tenant(tenant_id.clone()))
            .await?;
        if existing > 0 {
            debug!(tenant_id = %tenant_id, existing, "Tenant already has environments");
            return Ok(0);
        }

        let created = self
            .envs
            .create_batch(default_environments(tenant_id))
            .await?;
        info!(tenant_id = %tenant_id, created, "Initialized default environments");
        Ok(created)
    }

    async fn ensure_code_free(
        &self,
        tenant_id: &TenantId,
        code: &str,
        except_id: Option<i64>,
    ) -> ServiceTreeResult<()> {
        match self.envs.get_by_code(tenant_id, code).await? {
            Some(other) if Some(other.id) != except_id => Err(EnvironmentError::CodeExists {
                tenant_id: tenant_id.clone(),
                code: code.to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for EnvironmentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentService")
            .field("envs", &self.envs.backend_name())
            .finish_non_exhaustive()
    }
}
