//! Rule engine: binding rule management and automatic binding.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::{BindingStore, NodeStore, ResourceInventory, RuleStore};
use crate::error::{NodeError, RuleError, ServiceTreeResult};
use crate::tenant::TenantId;
use crate::types::{
    BindingFilter, BindingRule, Instance, InstanceFilter, ResourceBinding, ResourceType,
    RuleFilter, RuleMatchResult,
};

use super::config::ServiceTreeConfig;
use super::matcher::RuleSet;

/// Manages binding rules and applies them to the resource inventory.
///
/// Enabled rules are evaluated in ascending priority order and the first
/// rule whose conditions all match decides where a resource is bound.
#[derive(Clone)]
pub struct RuleEngine {
    rules: Arc<dyn RuleStore>,
    bindings: Arc<dyn BindingStore>,
    nodes: Arc<dyn NodeStore>,
    inventory: Arc<dyn ResourceInventory>,
    config: ServiceTreeConfig,
}

impl RuleEngine {
    /// Creates a rule engine over the given stores and inventory.
    pub fn new(
        rules: Arc<dyn RuleStore>,
        bindings: Arc<dyn BindingStore>,
        nodes: Arc<dyn NodeStore>,
        inventory: Arc<dyn ResourceInventory>,
        config: ServiceTreeConfig,
    ) -> Self {
        Self {
            rules,
            bindings,
            nodes,
            inventory,
            config,
        }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &ServiceTreeConfig {
        &self.config
    }

    /// Creates a rule.
    ///
    /// # Errors
    ///
    /// * `ValidationError::MissingRequiredField` - name, node, tenant or
    ///   conditions are missing
    /// * `RuleError::InvalidPattern` - a regex condition does not compile
    /// * `NodeError::NotFound` - the target node does not exist in the tenant
    pub async fn create_rule(&self, mut rule: BindingRule) -> ServiceTreeResult<BindingRule> {
        rule.validate()?;
        self.target_node(&rule.tenant_id, rule.node_id).await?;

        let now = Utc::now();
        rule.id = 0;
        rule.create_time = now;
        rule.update_time = now;

        let created = self.rules.create(rule).await?;
        info!(
            rule_id = created.id,
            node_id = created.node_id,
            priority = created.priority,
            "Created binding rule"
        );
        Ok(created)
    }

    /// Replaces a rule's definition. The tenant keeps its stored value.
    pub async fn update_rule(&self, rule: BindingRule) -> ServiceTreeResult<BindingRule> {
        let existing = self.get_rule(rule.id).await?;

        let updated = BindingRule {
            tenant_id: existing.tenant_id,
            create_time: existing.create_time,
            update_time: Utc::now(),
            ..rule
        };
        updated.validate()?;
        self.target_node(&updated.tenant_id, updated.node_id).await?;

        self.rules.update(&updated).await?;
        debug!(rule_id = updated.id, "Updated binding rule");
        Ok(updated)
    }

    /// Deletes a rule together with the bindings it created.
    ///
    /// Failing to remove the bindings is logged and does not stop the rule
    /// from being deleted.
    pub async fn delete_rule(&self, id: i64) -> ServiceTreeResult<()> {
        self.get_rule(id).await?;

        match self.bindings.delete_by_rule(id).await {
            Ok(removed) => debug!(rule_id = id, removed, "Removed bindings created by rule"),
            Err(e) => warn!(rule_id = id, error = %e, "Failed to remove bindings created by rule"),
        }

        self.rules.delete(id).await?;
        info!(rule_id = id, "Deleted binding rule");
        Ok(())
    }

    /// Reads a rule.
    pub async fn get_rule(&self, id: i64) -> ServiceTreeResult<BindingRule> {
        self.rules
            .get_by_id(id)
            .await?
            .ok_or_else(|| RuleError::NotFound { id }.into())
    }

    /// Lists one page of rules and the total number of matches.
    pub async fn list_rules(
        &self,
        filter: &RuleFilter,
    ) -> ServiceTreeResult<(Vec<BindingRule>, u64)> {
        let rules = self.rules.list(filter).await?;
        let total = self.rules.count(filter).await?;
        Ok((rules, total))
    }

    /// Finds the rule that would bind `instance`.
    ///
    /// Nothing is written; the result only reports the winning rule, if any.
    pub async fn match_instance(
        &self,
        tenant_id: &TenantId,
        instance: &Instance,
    ) -> ServiceTreeResult<RuleMatchResult> {
        let rules = RuleSet::compile(self.rules.list_enabled(tenant_id).await?);

        let result = match rules.first_match(instance) {
            Some(rule) => RuleMatchResult::matched(rule, instance.id),
            None => RuleMatchResult::unmatched(instance.id),
        };
        debug!(
            instance_id = instance.id,
            matched = result.matched,
            rule_id = ?result.rule_id,
            "Matched instance against rules"
        );
        Ok(result)
    }

    /// Runs every enabled rule of the tenant over its inventory and binds
    /// the instances that are not bound yet.
    ///
    /// One page of instances and one page of existing bindings are loaded,
    /// bounded by [`ServiceTreeConfig`]. Returns the number of bindings
    /// created; running twice with an unchanged inventory creates nothing
    /// the second time.
    pub async fn execute_rules(&self, tenant_id: &TenantId) -> ServiceTreeResult<u64> {
        let rules = RuleSet::compile(self.rules.list_enabled(tenant_id).await?);
        if rules.is_empty() {
            debug!(tenant_id = %tenant_id, "No enabled rules, skipping execution");
            return Ok(0);
        }

        let instances = self
            .inventory
            .list_instances(&InstanceFilter::page(
                tenant_id.clone(),
                0,
                self.config.instance_page_size,
            ))
            .await?;

        let existing = BindingFilter {
            resource_type: Some(ResourceType::Instance),
            limit: Some(self.config.binding_page_size),
            ..BindingFilter::for_tenant(tenant_id.clone())
        };
        // A resource has at most one binding per tenant, whatever the
        // environment, so any existing binding rules it out.
        let mut bound: HashSet<i64> = self
            .bindings
            .list(&existing)
            .await?
            .into_iter()
            .map(|b| b.resource_id)
            .collect();

        let mut staged = Vec::new();
        for instance in &instances {
            if bound.contains(&instance.id) {
                continue;
            }
            let Some(rule) = rules.first_match(instance) else {
                continue;
            };

            debug!(instance_id = instance.id, rule_id = rule.id, "Staging rule binding");
            staged.push(ResourceBinding::from_rule(
                tenant_id.clone(),
                rule.node_id,
                rule.env_id,
                ResourceType::Instance,
                instance.id,
                rule.id,
            ));
            bound.insert(instance.id);
        }

        let created = if staged.is_empty() {
            0
        } else {
            self.bindings.create_batch(staged).await?
        };

        info!(
            tenant_id = %tenant_id,
            rules = rules.len(),
            instances = instances.len(),
            created,
            "Executed binding rules"
        );
        Ok(created)
    }

    async fn target_node(&self, tenant_id: &TenantId, node_id: i64) -> ServiceTreeResult<()> {
        match self.nodes.get_by_id(node_id).await? {
            Some(node) if &node.tenant_id == tenant_id => Ok(()),
            _ => Err(NodeError::NotFound { id: node_id }.into()),
        }
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("rules", &self.rules.backend_name())
            .field("inventory", &self.inventory.backend_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
