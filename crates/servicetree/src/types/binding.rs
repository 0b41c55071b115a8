//! Resource bindings.
//!
//! A binding attaches one external resource to one tree node within one
//! environment. Within a tenant, a `(resource_type, resource_id)` pair has at
//! most one binding.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceTreeError, ValidationError};
use crate::tenant::TenantId;

use super::node::TreeNode;

/// Kind of resource a binding refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// An asset-inventory instance.
    Instance,
    /// A raw cloud asset.
    Asset,
}

impl ResourceType {
    /// Wire code of the resource type.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Instance => "instance",
            ResourceType::Asset => "asset",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = ServiceTreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instance" => Ok(ResourceType::Instance),
            "asset" => Ok(ResourceType::Asset),
            other => Err(ValidationError::InvalidResourceType {
                resource_type: other.to_string(),
            }
            .into()),
        }
    }
}

/// How a binding was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindType {
    /// Bound explicitly by a caller.
    Manual,
    /// Bound by a binding rule.
    Rule,
}

impl BindType {
    /// Wire code of the bind type.
    pub fn as_str(self) -> &'static str {
        match self {
            BindType::Manual => "manual",
            BindType::Rule => "rule",
        }
    }
}

impl fmt::Display for BindType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BindType {
    type Err = ServiceTreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(BindType::Manual),
            "rule" => Ok(BindType::Rule),
            other => Err(ValidationError::InvalidBindType {
                bind_type: other.to_string(),
            }
            .into()),
        }
    }
}

/// Association of one resource with one node in one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceBinding {
    /// Binding identity, assigned by the store.
    pub id: i64,
    /// Target node.
    pub node_id: i64,
    /// Target environment.
    pub env_id: i64,
    /// Kind of the bound resource.
    pub resource_type: ResourceType,
    /// Identity of the bound resource.
    pub resource_id: i64,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// How the binding was created.
    pub bind_type: BindType,
    /// Originating rule, present only for [`BindType::Rule`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<i64>,
    /// Creation time.
    pub create_time: DateTime<Utc>,
}

impl ResourceBinding {
    /// Creates a manual binding draft.
    pub fn manual(
        tenant_id: TenantId,
        node_id: i64,
        env_id: i64,
        resource_type: ResourceType,
        resource_id: i64,
    ) -> Self {
        Self {
            id: 0,
            node_id,
            env_id,
            resource_type,
            resource_id,
            tenant_id,
            bind_type: BindType::Manual,
            rule_id: None,
            create_time: Utc::now(),
        }
    }

    /// Creates a rule-originated binding draft.
    pub fn from_rule(
        tenant_id: TenantId,
        node_id: i64,
        env_id: i64,
        resource_type: ResourceType,
        resource_id: i64,
        rule_id: i64,
    ) -> Self {
        Self {
            bind_type: BindType::Rule,
            rule_id: Some(rule_id),
            ..Self::manual(tenant_id, node_id, env_id, resource_type, resource_id)
        }
    }

    /// Returns `true` if the binding already points at `node_id` in `env_id`.
    pub fn targets(&self, node_id: i64, env_id: i64) -> bool {
        self.node_id == node_id && self.env_id == env_id
    }
}

/// Filter for listing and counting bindings. Unset fields do not filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BindingFilter {
    /// Tenant to list.
    pub tenant_id: Option<TenantId>,
    /// Only bindings on this node.
    pub node_id: Option<i64>,
    /// Only bindings in this environment.
    pub env_id: Option<i64>,
    /// Only bindings of this resource type.
    pub resource_type: Option<ResourceType>,
    /// Only bindings of this resource.
    pub resource_id: Option<i64>,
    /// Only manual (or rule) bindings.
    pub bind_type: Option<BindType>,
    /// Only bindings created by this rule.
    pub rule_id: Option<i64>,
    /// Number of matching bindings to skip.
    #[serde(default)]
    pub offset: u64,
    /// Maximum number of bindings to return.
    pub limit: Option<u64>,
}

impl BindingFilter {
    /// Filter matching every binding of a tenant.
    pub fn for_tenant(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Default::default()
        }
    }

    /// Filter matching every binding on a node.
    pub fn for_node(node_id: i64) -> Self {
        Self {
            node_id: Some(node_id),
            ..Default::default()
        }
    }

    /// Filter matching every binding in an environment.
    pub fn for_env(env_id: i64) -> Self {
        Self {
            env_id: Some(env_id),
            ..Default::default()
        }
    }

    /// Returns `true` if the binding satisfies every set criterion.
    pub fn matches(&self, binding: &ResourceBinding) -> bool {
        self.tenant_id
            .as_ref()
            .is_none_or(|t| &binding.tenant_id == t)
            && self.node_id.is_none_or(|n| binding.node_id == n)
            && self.env_id.is_none_or(|e| binding.env_id == e)
            && self
                .resource_type
                .is_none_or(|r| binding.resource_type == r)
            && self.resource_id.is_none_or(|r| binding.resource_id == r)
            && self.bind_type.is_none_or(|b| binding.bind_type == b)
            && self.rule_id.is_none_or(|r| binding.rule_id == Some(r))
    }
}

/// Request to bind many resources of one type to one node and environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct BatchBindRequest {
    pub node_id: i64,
    pub env_id: i64,
    pub resource_type: ResourceType,
    /// Duplicate ids are bound once.
    pub resource_ids: Vec<i64>,
    pub tenant_id: TenantId,
}

/// A bound resource together with the node it is bound to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct ResourceWithNode {
    pub resource_type: ResourceType,
    pub resource_id: i64,
    pub env_id: i64,
    pub bind_type: BindType,
    pub node: TreeNode,
}
