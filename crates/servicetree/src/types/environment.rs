//! Deployment environments (dev, test, staging, prod, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceTreeResult, missing_field};
use crate::tenant::TenantId;

/// Code of the development environment.
pub const ENV_CODE_DEV: &str = "dev";
/// Code of the test environment.
pub const ENV_CODE_TEST: &str = "test";
/// Code of the pre-release environment.
pub const ENV_CODE_STAGING: &str = "staging";
/// Code of the production environment.
pub const ENV_CODE_PROD: &str = "prod";

/// Whether an environment is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvStatus {
    /// Active environment.
    #[default]
    Enabled,
    /// Inactive environment.
    Disabled,
}

impl EnvStatus {
    /// Numeric code used by storage backends.
    pub fn code(self) -> i32 {
        match self {
            EnvStatus::Enabled => 1,
            EnvStatus::Disabled => 0,
        }
    }

    /// Inverse of [`code`](Self::code). Unknown codes read as disabled.
    pub fn from_code(code: i32) -> Self {
        if code == 1 {
            EnvStatus::Enabled
        } else {
            EnvStatus::Disabled
        }
    }
}

/// A tenant-scoped deployment environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Environment identity, assigned by the store.
    pub id: i64,
    /// Short code, unique within the tenant.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Display color (e.g. `#f5222d`).
    #[serde(default)]
    pub color: String,
    /// Sort weight.
    #[serde(default)]
    pub order: i32,
    /// Enabled/disabled status.
    #[serde(default)]
    pub status: EnvStatus,
    /// Creation time.
    pub create_time: DateTime<Utc>,
    /// Last update time.
    pub update_time: DateTime<Utc>,
}

impl Environment {
    /// Creates an enabled environment draft.
    pub fn new(
        tenant_id: impl Into<TenantId>,
        code: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            code: code.into(),
            name: name.into(),
            tenant_id: tenant_id.into(),
            description: String::new(),
            color: String::new(),
            order: 0,
            status: EnvStatus::Enabled,
            create_time: now,
            update_time: now,
        }
    }

    /// Checks that code, name and tenant are present.
    pub fn validate(&self) -> ServiceTreeResult<()> {
        if self.code.trim().is_empty() {
            return Err(missing_field("code"));
        }
        if self.name.trim().is_empty() {
            return Err(missing_field("name"));
        }
        if self.tenant_id.is_empty() {
            return Err(missing_field("tenant_id"));
        }
        Ok(())
    }

    /// Returns `true` for the production environment.
    pub fn is_production(&self) -> bool {
        self.code == ENV_CODE_PROD
    }
}

/// Static description of a default environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentTemplate {
    /// Environment code.
    pub code: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Display color.
    pub color: &'static str,
    /// Sort weight.
    pub order: i32,
}

impl EnvironmentTemplate {
    /// Instantiates the template for a tenant.
    pub fn instantiate(&self, tenant_id: &TenantId) -> Environment {
        Environment {
            color: self.color.to_string(),
            order: self.order,
            ..Environment::new(tenant_id.clone(), self.code, self.name)
        }
    }
}

/// Environments created for a tenant that has none.
pub const DEFAULT_ENVIRONMENTS: [EnvironmentTemplate; 4] = [
    EnvironmentTemplate {
        code: ENV_CODE_DEV,
        name: "Development",
        color: "#52c41a",
        order: 1,
    },
    EnvironmentTemplate {
        code: ENV_CODE_TEST,
        name: "Testing",
        color: "#1890ff",
        order: 2,
    },
    EnvironmentTemplate {
        code: ENV_CODE_STAGING,
        name: "Staging",
        color: "#faad14",
        order: 3,
    },
    EnvironmentTemplate {
        code: ENV_CODE_PROD,
        name: "Production",
        color: "#f5222d",
        order: 4,
    },
];

/// Returns the default environments for a tenant.
pub fn default_environments(tenant_id: &TenantId) -> Vec<Environment> {
    DEFAULT_ENVIRONMENTS
        .iter()
        .map(|template| template.instantiate(tenant_id))
        .collect()
}

/// Filter for listing environments. Unset fields do not filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentFilter {
    /// Tenant to list.
    pub tenant_id: Option<TenantId>,
    /// Exact code.
    pub code: Option<String>,
    /// Only environments with this status.
    pub status: Option<EnvStatus>,
    /// Number of matching environments to skip.
    #[serde(default)]
    pub offset: u64,
    /// Maximum number of environments to return.
    pub limit: Option<u64>,
}

impl EnvironmentFilter {
    /// Filter matching every environment of a tenant.
    pub fn for_tenant(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Default::default()
        }
    }

    /// Returns `true` if the environment satisfies every set criterion.
    pub fn matches(&self, env: &Environment) -> bool {
        self.tenant_id.as_ref().is_none_or(|t| &env.tenant_id == t)
            && self
                .code
                .as_deref()
                .filter(|c| !c.is_empty())
                .is_none_or(|c| env.code == c)
            && self.status.is_none_or(|s| env.status == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_environments() {
        let tenant = TenantId::new("t1");
        let envs = default_environments(&tenant);

        let codes: Vec<_> = envs.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["dev", "test", "staging", "prod"]);
        assert!(envs.iter().all(|e| e.tenant_id == tenant));
        assert!(envs.iter().all(|e| e.status == EnvStatus::Enabled));
        assert_eq!(envs[3].color, "#f5222d");
        assert!(envs[3].is_production());
        assert!(!envs[0].is_production());
    }

    #[test]
    fn test_validate() {
        assert!(Environment::new("t1", "dev", "Development").validate().is_ok());
        assert!(Environment::new("t1", "", "Development").validate().is_err());
        assert!(Environment::new("t1", "dev", " ").validate().is_err());
        assert!(Environment::new("", "dev", "Development").validate().is_err());
    }

    #[test]
    fn test_filter_matches() {
        let env = Environment::new("t1", "prod", "Production");
        assert!(EnvironmentFilter::for_tenant("t1").matches(&env));
        assert!(!EnvironmentFilter::for_tenant("t2").matches(&env));

        let by_code = EnvironmentFilter {
            code: Some("dev".to_string()),
            ..Default::default()
        };
        assert!(!by_code.matches(&env));
    }
}
