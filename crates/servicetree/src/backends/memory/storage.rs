//! Store trait implementations for [`MemoryBackend`].

use std::collections::HashSet;

use async_trait::async_trait;

use crate::core::{BindingStore, EnvironmentStore, NodeStore, RuleStore};
use crate::error::{EnvironmentError, NodeError, RuleError, ServiceTreeResult};
use crate::tenant::TenantId;
use crate::types::{
    BindingFilter, BindingRule, Environment, EnvironmentFilter, NodeFilter, ResourceBinding,
    ResourceType, RuleFilter, TreeNode,
};

use super::backend::{BACKEND_NAME, MemoryBackend, paginate, unique_violation};

#[async_trait]
impl NodeStore for MemoryBackend {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn create(&self, mut node: TreeNode) -> ServiceTreeResult<TreeNode> {
        let mut state = self.state.write();
        node.id = 0;
        if state.node_uid_taken(&node) {
            return Err(unique_violation("nodes.tenant_uid"));
        }
        node.id = state.next_node_id();
        state.nodes.insert(node.id, node.clone());
        Ok(node)
    }

    async fn update(&self, node: &TreeNode) -> ServiceTreeResult<()> {
        let mut state = self.state.write();
        if !state.nodes.contains_key(&node.id) {
            return Err(NodeError::NotFound { id: node.id }.into());
        }
        if state.node_uid_taken(node) {
            return Err(unique_violation("nodes.tenant_uid"));
        }
        state.nodes.insert(node.id, node.clone());
        Ok(())
    }

    async fn update_path(&self, id: i64, path: &str) -> ServiceTreeResult<()> {
        let mut state = self.state.write();
        let node = state
            .nodes
            .get_mut(&id)
            .ok_or(NodeError::NotFound { id })?;
        node.path = path.to_string();
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> ServiceTreeResult<Option<TreeNode>> {
        Ok(self.state.read().nodes.get(&id).cloned())
    }

    async fn get_by_uid(
        &self,
        tenant_id: &TenantId,
        uid: &str,
    ) -> ServiceTreeResult<Option<TreeNode>> {
        Ok(self
            .state
            .read()
            .nodes
            .values()
            .find(|n| &n.tenant_id == tenant_id && n.uid() == Some(uid))
            .cloned())
    }

    async fn list(&self, filter: &NodeFilter) -> ServiceTreeResult<Vec<TreeNode>> {
        let mut nodes: Vec<TreeNode> = self
            .state
            .read()
            .nodes
            .values()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect();
        nodes.sort_by_key(|n| (n.order, n.create_time, n.id));
        Ok(paginate(nodes, filter.offset, filter.limit))
    }

    async fn list_by_path(
        &self,
        tenant_id: &TenantId,
        path_prefix: &str,
    ) -> ServiceTreeResult<Vec<TreeNode>> {
        let mut nodes: Vec<TreeNode> = self
            .state
            .read()
            .nodes
            .values()
            .filter(|n| &n.tenant_id == tenant_id && n.path.starts_with(path_prefix))
            .cloned()
            .collect();
        nodes.sort_by_key(|n| (n.level, n.order, n.id));
        Ok(nodes)
    }

    async fn count(&self, filter: &NodeFilter) -> ServiceTreeResult<u64> {
        let state = self.state.read();
        Ok(state.nodes.values().filter(|n| filter.matches(n)).count() as u64)
    }

    async fn count_children(&self, parent_id: i64) -> ServiceTreeResult<u64> {
        let state = self.state.read();
        Ok(state
            .nodes
            .values()
            .filter(|n| n.parent_id == parent_id)
            .count() as u64)
    }

    async fn delete(&self, id: i64) -> ServiceTreeResult<()> {
        self.state.write().nodes.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl BindingStore for MemoryBackend {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn create(&self, mut binding: ResourceBinding) -> ServiceTreeResult<ResourceBinding> {
        let mut state = self.state.write();
        binding.id = 0;
        if state.binding_key_taken(&binding) {
            return Err(unique_violation("bindings.tenant_resource"));
        }
        binding.id = state.next_binding_id();
        state.bindings.insert(binding.id, binding.clone());
        Ok(binding)
    }

    async fn create_batch(&self, bindings: Vec<ResourceBinding>) -> ServiceTreeResult<u64> {
        let mut state = self.state.write();

        let mut keys = HashSet::with_capacity(bindings.len());
        for binding in &bindings {
            let key = (
                binding.tenant_id.clone(),
                binding.resource_type,
                binding.resource_id,
            );
            let taken = state.bindings.values().any(|b| {
                b.tenant_id == binding.tenant_id
                    && b.resource_type == binding.resource_type
                    && b.resource_id == binding.resource_id
            });
            if taken || !keys.insert(key) {
                return Err(unique_violation("bindings.tenant_resource"));
            }
        }

        let created = bindings.len() as u64;
        for mut binding in bindings {
            binding.id = state.next_binding_id();
            state.bindings.insert(binding.id, binding);
        }
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> ServiceTreeResult<Option<ResourceBinding>> {
        Ok(self.state.read().bindings.get(&id).cloned())
    }

    async fn get_by_resource(
        &self,
        tenant_id: &TenantId,
        resource_type: ResourceType,
        resource_id: i64,
    ) -> ServiceTreeResult<Option<ResourceBinding>> {
        Ok(self
            .state
            .read()
            .bindings
            .values()
            .find(|b| {
                &b.tenant_id == tenant_id
                    && b.resource_type == resource_type
                    && b.resource_id == resource_id
            })
            .cloned())
    }

    async fn list(&self, filter: &BindingFilter) -> ServiceTreeResult<Vec<ResourceBinding>> {
        let bindings: Vec<ResourceBinding> = self
            .state
            .read()
            .bindings
            .values()
            .rev()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        Ok(paginate(bindings, filter.offset, filter.limit))
    }

    async fn count(&self, filter: &BindingFilter) -> ServiceTreeResult<u64> {
        let state = self.state.read();
        Ok(state.bindings.values().filter(|b| filter.matches(b)).count() as u64)
    }

    async fn delete(&self, id: i64) -> ServiceTreeResult<()> {
        self.state.write().bindings.remove(&id);
        Ok(())
    }

    async fn delete_by_node(&self, node_id: i64) -> ServiceTreeResult<u64> {
        let mut state = self.state.write();
        let before = state.bindings.len();
        state.bindings.retain(|_, b| b.node_id != node_id);
        Ok((before - state.bindings.len()) as u64)
    }

    async fn delete_by_rule(&self, rule_id: i64) -> ServiceTreeResult<u64> {
        let mut state = self.state.write();
        let before = state.bindings.len();
        state.bindings.retain(|_, b| b.rule_id != Some(rule_id));
        Ok((before - state.bindings.len()) as u64)
    }
}

#[async_trait]
impl RuleStore for MemoryBackend {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn create(&self, mut rule: BindingRule) -> ServiceTreeResult<BindingRule> {
        let mut state = self.state.write();
        rule.id = state.next_rule_id();
        state.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn update(&self, rule: &BindingRule) -> ServiceTreeResult<()> {
        let mut state = self.state.write();
        match state.rules.get_mut(&rule.id) {
            Some(stored) => {
                *stored = rule.clone();
                Ok(())
            }
            None => Err(RuleError::NotFound { id: rule.id }.into()),
        }
    }

    async fn get_by_id(&self, id: i64) -> ServiceTreeResult<Option<BindingRule>> {
        Ok(self.state.read().rules.get(&id).cloned())
    }

    async fn list(&self, filter: &RuleFilter) -> ServiceTreeResult<Vec<BindingRule>> {
        let mut rules: Vec<BindingRule> = self
            .state
            .read()
            .rules
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        rules.sort_by_key(|r| (r.priority, r.id));
        Ok(paginate(rules, filter.offset, filter.limit))
    }

    async fn list_enabled(&self, tenant_id: &TenantId) -> ServiceTreeResult<Vec<BindingRule>> {
        let filter = RuleFilter {
            enabled: Some(true),
            ..RuleFilter::for_tenant(tenant_id.clone())
        };
        RuleStore::list(self, &filter).await
    }

    async fn count(&self, filter: &RuleFilter) -> ServiceTreeResult<u64> {
        let state = self.state.read();
        Ok(state.rules.values().filter(|r| filter.matches(r)).count() as u64)
    }

    async fn delete(&self, id: i64) -> ServiceTreeResult<()> {
        self.state.write().rules.remove(&id);
        Ok(())
    }

    async fn delete_by_node(&self, node_id: i64) -> ServiceTreeResult<u64> {
        let mut state = self.state.write();
        let before = state.rules.len();
        state.rules.retain(|_, r| r.node_id != node_id);
        Ok((before - state.rules.len()) as u64)
    }
}

#[async_trait]
impl EnvironmentStore for MemoryBackend {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn create(&self, mut env: Environment) -> ServiceTreeResult<Environment> {
        let mut state = self.state.write();
        env.id = 0;
        if state.env_code_taken(&env) {
            return Err(unique_violation("environments.tenant_code"));
        }
        env.id = state.next_environment_id();
        state.environments.insert(env.id, env.clone());
        Ok(env)
    }

    async fn create_batch(&self, envs: Vec<Environment>) -> ServiceTreeResult<u64> {
        let mut state = self.state.write();

        let mut codes = HashSet::with_capacity(envs.len());
        for env in &envs {
            let taken = state
                .environments
                .values()
                .any(|e| e.tenant_id == env.tenant_id && e.code == env.code);
            if taken || !codes.insert((env.tenant_id.clone(), env.code.clone())) {
                return Err(unique_violation("environments.tenant_code"));
            }
        }

        let created = envs.len() as u64;
        for mut env in envs {
            env.id = state.next_environment_id();
            state.environments.insert(env.id, env);
        }
        Ok(created)
    }

    async fn update(&self, env: &Environment) -> ServiceTreeResult<()> {
        let mut state = self.state.write();
        if !state.environments.contains_key(&env.id) {
            return Err(EnvironmentError::NotFound { id: env.id }.into());
        }
        if state.env_code_taken(env) {
            return Err(unique_violation("environments.tenant_code"));
        }
        state.environments.insert(env.id, env.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> ServiceTreeResult<Option<Environment>> {
        Ok(self.state.read().environments.get(&id).cloned())
    }

    async fn get_by_code(
        &self,
        tenant_id: &TenantId,
        code: &str,
    ) -> ServiceTreeResult<Option<Environment>> {
        Ok(self
            .state
            .read()
            .environments
            .values()
            .find(|e| &e.tenant_id == tenant_id && e.code == code)
            .cloned())
    }

    async fn list(&self, filter: &EnvironmentFilter) -> ServiceTreeResult<Vec<Environment>> {
        let mut envs: Vec<Environment> = self
            .state
            .read()
            .environments
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        envs.sort_by_key(|e| (e.order, e.id));
        Ok(paginate(envs, filter.offset, filter.limit))
    }

    async fn count(&self, filter: &EnvironmentFilter) -> ServiceTreeResult<u64> {
        let state = self.state.read();
        Ok(state
            .environments
            .values()
            .filter(|e| filter.matches(e))
            .count() as u64)
    }

    async fn delete(&self, id: i64) -> ServiceTreeResult<()> {
        self.state.write().environments.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, ServiceTreeError};

    #[tokio::test]
    async fn test_node_ids_and_uid_uniqueness() {
        let backend = MemoryBackend::new();
        let a = NodeStore::create(&backend, TreeNode::new("t1", "a").with_uid("biz.a"))
            .await
            .unwrap();
        assert_eq!(a.id, 1);

        let dup = NodeStore::create(&backend, TreeNode::new("t1", "b").with_uid("biz.a")).await;
        assert!(matches!(
            dup,
            Err(ServiceTreeError::Backend(BackendError::UniqueViolation { .. }))
        ));

        // same uid in another tenant is fine
        let other = NodeStore::create(&backend, TreeNode::new("t2", "b").with_uid("biz.a"))
            .await
            .unwrap();
        assert_eq!(other.id, 2);

        let found = backend
            .get_by_uid(&TenantId::new("t2"), "biz.a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, 2);
    }

    #[tokio::test]
    async fn test_node_update_missing() {
        let backend = MemoryBackend::new();
        let mut node = TreeNode::new("t1", "ghost");
        node.id = 9;
        let err = NodeStore::update(&backend, &node).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(backend.update_path(9, "/9/").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_by_path_is_prefix_scoped() {
        let backend = MemoryBackend::new();
        for (name, path, level) in [("a", "/1/", 1), ("b", "/1/2/", 2), ("c", "/12/", 1)] {
            let node = NodeStore::create(&backend, TreeNode::new("t1", name)).await.unwrap();
            let node = TreeNode {
                path: path.to_string(),
                level,
                ..node
            };
            NodeStore::update(&backend, &node).await.unwrap();
        }

        let subtree = backend
            .list_by_path(&TenantId::new("t1"), "/1/")
            .await
            .unwrap();
        let names: Vec<&str> = subtree.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_binding_natural_key_unique() {
        let backend = MemoryBackend::new();
        let tenant = TenantId::new("t1");
        BindingStore::create(
            &backend,
            ResourceBinding::manual(tenant.clone(), 1, 1, ResourceType::Instance, 7),
        )
        .await
        .unwrap();

        let dup = BindingStore::create(
            &backend,
            ResourceBinding::manual(tenant.clone(), 2, 1, ResourceType::Instance, 7),
        )
        .await
        .unwrap_err();
        assert!(dup.is_conflict());

        // a different resource type is a different key
        BindingStore::create(
            &backend,
            ResourceBinding::manual(tenant.clone(), 2, 1, ResourceType::Asset, 7),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_binding_batch_is_all_or_nothing() {
        let backend = MemoryBackend::new();
        let tenant = TenantId::new("t1");
        BindingStore::create(
            &backend,
            ResourceBinding::manual(tenant.clone(), 1, 1, ResourceType::Instance, 2),
        )
        .await
        .unwrap();

        let batch = (1..=3)
            .map(|id| ResourceBinding::manual(tenant.clone(), 1, 1, ResourceType::Instance, id))
            .collect();
        assert!(
            BindingStore::create_batch(&backend, batch)
                .await
                .unwrap_err()
                .is_conflict()
        );
        assert_eq!(
            BindingStore::count(&backend, &BindingFilter::for_tenant("t1"))
                .await
                .unwrap(),
            1
        );

        let batch = [4, 5]
            .into_iter()
            .map(|id| ResourceBinding::manual(tenant.clone(), 1, 1, ResourceType::Instance, id))
            .collect();
        assert_eq!(BindingStore::create_batch(&backend, batch).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_by_rule_and_node() {
        let backend = MemoryBackend::new();
        let tenant = TenantId::new("t1");
        let bindings = vec![
            ResourceBinding::from_rule(tenant.clone(), 1, 1, ResourceType::Instance, 1, 5),
            ResourceBinding::from_rule(tenant.clone(), 1, 1, ResourceType::Instance, 2, 5),
            ResourceBinding::manual(tenant.clone(), 2, 1, ResourceType::Instance, 3),
        ];
        BindingStore::create_batch(&backend, bindings).await.unwrap();

        assert_eq!(backend.delete_by_rule(5).await.unwrap(), 2);
        assert_eq!(BindingStore::delete_by_node(&backend, 2).await.unwrap(), 1);
        assert_eq!(
            BindingStore::count(&backend, &BindingFilter::default())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_rules_sorted_by_priority() {
        let backend = MemoryBackend::new();
        for (name, priority, enabled) in [("low", 20, true), ("high", 1, true), ("off", 0, false)]
        {
            RuleStore::create(
                &backend,
                BindingRule::new("t1", name, 1, 1)
                    .with_priority(priority)
                    .with_enabled(enabled),
            )
            .await
            .unwrap();
        }

        let enabled = backend.list_enabled(&TenantId::new("t1")).await.unwrap();
        let names: Vec<&str> = enabled.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn test_environment_code_unique_per_tenant() {
        let backend = MemoryBackend::new();
        EnvironmentStore::create(&backend, Environment::new("t1", "prod", "Production"))
            .await
            .unwrap();
        let dup = EnvironmentStore::create(&backend, Environment::new("t1", "prod", "Prod"))
            .await
            .unwrap_err();
        assert!(dup.is_conflict());

        EnvironmentStore::create(&backend, Environment::new("t2", "prod", "Production"))
            .await
            .unwrap();

        let batch = vec![
            Environment::new("t3", "dev", "Development"),
            Environment::new("t3", "dev", "Again"),
        ];
        assert!(
            EnvironmentStore::create_batch(&backend, batch)
                .await
                .unwrap_err()
                .is_conflict()
        );
        assert_eq!(
            EnvironmentStore::count(&backend, &EnvironmentFilter::for_tenant("t3"))
                .await
                .unwrap(),
            0
        );
    }
}
