//! Binding rules.
//!
//! A rule is a named, prioritized set of conditions. A resource matches a
//! rule when every condition matches (logical AND). Among enabled rules,
//! lower `priority` values are evaluated first and the first match wins.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RuleError, ServiceTreeError, ServiceTreeResult, missing_field};
use crate::tenant::TenantId;

/// Comparison operator of a rule condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// Exact equality.
    #[serde(rename = "eq")]
    Equals,
    /// Inequality.
    #[serde(rename = "ne")]
    NotEquals,
    /// Substring containment.
    #[serde(rename = "contains")]
    Contains,
    /// Regular expression match (unanchored).
    #[serde(rename = "regex")]
    Regex,
    /// Membership in a comma-separated set.
    #[serde(rename = "in")]
    In,
    /// Non-membership in a comma-separated set.
    #[serde(rename = "not_in")]
    NotIn,
    /// The field has a non-empty value.
    #[serde(rename = "exists")]
    Exists,
}

impl Operator {
    /// All operators, in declaration order.
    pub const ALL: [Operator; 7] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::Contains,
        Operator::Regex,
        Operator::In,
        Operator::NotIn,
        Operator::Exists,
    ];

    /// Wire code of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Equals => "eq",
            Operator::NotEquals => "ne",
            Operator::Contains => "contains",
            Operator::Regex => "regex",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Exists => "exists",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ServiceTreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| {
                RuleError::InvalidOperator {
                    operator: s.to_string(),
                }
                .into()
            })
    }
}

/// One `field <operator> value` condition.
///
/// Supported fields: `name`, `asset_id`, `model_uid`, `attributes.<key>`
/// and `tag.<key>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCondition {
    /// Field to extract from the resource.
    pub field: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Expected value (pattern for `regex`, comma-separated list for
    /// `in`/`not_in`, ignored by `exists`).
    #[serde(default)]
    pub value: String,
}

impl RuleCondition {
    /// Creates a condition.
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

/// An automatic binding policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingRule {
    /// Rule identity, assigned by the store.
    pub id: i64,
    /// Node that matching resources are bound to.
    pub node_id: i64,
    /// Environment that matching resources are bound in.
    pub env_id: i64,
    /// Rule name.
    pub name: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Evaluation order, lower values first.
    #[serde(default)]
    pub priority: i32,
    /// Conditions, all of which must match.
    pub conditions: Vec<RuleCondition>,
    /// Disabled rules are never evaluated.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Creation time.
    pub create_time: DateTime<Utc>,
    /// Last update time.
    pub update_time: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl BindingRule {
    /// Creates an enabled rule draft with priority 0 and no conditions.
    pub fn new(
        tenant_id: impl Into<TenantId>,
        name: impl Into<String>,
        node_id: i64,
        env_id: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            node_id,
            env_id,
            name: name.into(),
            tenant_id: tenant_id.into(),
            priority: 0,
            conditions: Vec::new(),
            enabled: true,
            description: String::new(),
            create_time: now,
            update_time: now,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Appends a condition.
    pub fn with_condition(mut self, condition: RuleCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Sets the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Checks the rule shape: name, target node, tenant and at least one
    /// condition are mandatory, every condition names a field, and regex
    /// patterns compile.
    pub fn validate(&self) -> ServiceTreeResult<()> {
        if self.name.trim().is_empty() {
            return Err(missing_field("name"));
        }
        if self.node_id == 0 {
            return Err(missing_field("node_id"));
        }
        if self.tenant_id.is_empty() {
            return Err(missing_field("tenant_id"));
        }
        if self.conditions.is_empty() {
            return Err(missing_field("conditions"));
        }
        for condition in &self.conditions {
            if condition.field.trim().is_empty() {
                return Err(missing_field("conditions.field"));
            }
            if condition.operator == Operator::Regex {
                regex::Regex::new(&condition.value).map_err(|e| RuleError::InvalidPattern {
                    field: condition.field.clone(),
                    pattern: condition.value.clone(),
                    message: e.to_string(),
                })?;
            }
        }
        Ok(())
    }
}

/// Filter for listing rules. Unset fields do not filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleFilter {
    /// Tenant to list.
    pub tenant_id: Option<TenantId>,
    /// Only rules targeting this node.
    pub node_id: Option<i64>,
    /// Only enabled (or disabled) rules.
    pub enabled: Option<bool>,
    /// Case-insensitive substring of the name.
    pub name: Option<String>,
    /// Number of matching rules to skip.
    #[serde(default)]
    pub offset: u64,
    /// Maximum number of rules to return.
    pub limit: Option<u64>,
}

impl RuleFilter {
    /// Filter matching every rule of a tenant.
    pub fn for_tenant(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Default::default()
        }
    }

    /// Returns `true` if the rule satisfies every set criterion.
    pub fn matches(&self, rule: &BindingRule) -> bool {
        self.tenant_id.as_ref().is_none_or(|t| &rule.tenant_id == t)
            && self.node_id.is_none_or(|n| rule.node_id == n)
            && self.enabled.is_none_or(|e| rule.enabled == e)
            && self
                .name
                .as_deref()
                .filter(|n| !n.is_empty())
                .is_none_or(|n| rule.name.to_lowercase().contains(&n.to_lowercase()))
    }
}

/// Outcome of matching one resource against the enabled rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatchResult {
    /// The winning rule, if any.
    pub rule_id: Option<i64>,
    /// The winning rule's target node, if any.
    pub node_id: Option<i64>,
    /// The winning rule's target environment, if any.
    pub env_id: Option<i64>,
    /// The evaluated resource.
    pub resource_id: i64,
    /// Whether a rule matched.
    pub matched: bool,
    /// Human-readable reason.
    pub reason: String,
}

impl RuleMatchResult {
    /// A successful match against `rule`.
    pub fn matched(rule: &BindingRule, resource_id: i64) -> Self {
        Self {
            rule_id: Some(rule.id),
            node_id: Some(rule.node_id),
            env_id: Some(rule.env_id),
            resource_id,
            matched: true,
            reason: format!("matched rule: {}", rule.name),
        }
    }

    /// No enabled rule matched.
    pub fn unmatched(resource_id: i64) -> Self {
        Self {
            rule_id: None,
            node_id: None,
            env_id: None,
            resource_id,
            matched: false,
            reason: "no matching rule".to_string(),
        }
    }
}
