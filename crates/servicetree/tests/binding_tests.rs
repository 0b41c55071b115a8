//! Binding manager integration tests.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use cam_servicetree::core::BindingStore;
use cam_servicetree::error::{BindingError, ErrorKind, NodeError, ServiceTreeError};
use cam_servicetree::service::BindingService;
use cam_servicetree::types::{
    BatchBindRequest, BindType, BindingFilter, ResourceBinding, ResourceType,
};

use common::{FailingBindings, Harness, other_tenant, tenant};

fn batch(node_id: i64, env_id: i64, resource_ids: Vec<i64>) -> BatchBindRequest {
    BatchBindRequest {
        node_id,
        env_id,
        resource_type: ResourceType::Instance,
        resource_ids,
        tenant_id: tenant(),
    }
}

#[tokio::test]
async fn test_bind_resource() {
    let h = Harness::new();
    let node = h.node("web", 0).await;

    let binding = h
        .st
        .bindings()
        .bind_resource(&tenant(), node.id, 1, ResourceType::Instance, 100)
        .await
        .unwrap();
    assert!(binding.id > 0);
    assert_eq!(binding.node_id, node.id);
    assert_eq!(binding.env_id, 1);
    assert_eq!(binding.bind_type, BindType::Manual);
    assert_eq!(binding.rule_id, None);

    let found = h
        .st
        .bindings()
        .get_resource_binding(&tenant(), ResourceType::Instance, 100)
        .await
        .unwrap();
    assert_eq!(found.id, binding.id);
}

#[tokio::test]
async fn test_bind_is_idempotent_for_same_target() {
    let h = Harness::new();
    let node = h.node("web", 0).await;
    let bindings = h.st.bindings();

    let first = bindings
        .bind_resource(&tenant(), node.id, 1, ResourceType::Instance, 100)
        .await
        .unwrap();
    let second = bindings
        .bind_resource(&tenant(), node.id, 1, ResourceType::Instance, 100)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(bindings.get_node_resource_count(node.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_bind_elsewhere_conflicts() {
    let h = Harness::new();
    let web = h.node("web", 0).await;
    let db = h.node("db", 0).await;
    let bindings = h.st.bindings();

    bindings
        .bind_resource(&tenant(), web.id, 1, ResourceType::Instance, 100)
        .await
        .unwrap();

    // Different node
    let err = bindings
        .bind_resource(&tenant(), db.id, 1, ResourceType::Instance, 100)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceTreeError::Binding(BindingError::AlreadyBound { node_id, .. }) if node_id == web.id
    ));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Same node, different environment
    let err = bindings
        .bind_resource(&tenant(), web.id, 2, ResourceType::Instance, 100)
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    // Still exactly one binding for the resource
    let filter = BindingFilter {
        resource_id: Some(100),
        ..BindingFilter::for_tenant(tenant())
    };
    assert_eq!(BindingStore::count(h.backend.as_ref(), &filter).await.unwrap(), 1);
}

#[tokio::test]
async fn test_same_resource_id_of_other_type_or_tenant() {
    let h = Harness::new();
    let web = h.node("web", 0).await;
    let foreign = h.node_in(other_tenant(), "web", 0).await;
    let bindings = h.st.bindings();

    bindings
        .bind_resource(&tenant(), web.id, 1, ResourceType::Instance, 100)
        .await
        .unwrap();
    bindings
        .bind_resource(&tenant(), web.id, 1, ResourceType::Asset, 100)
        .await
        .unwrap();
    bindings
        .bind_resource(&other_tenant(), foreign.id, 1, ResourceType::Instance, 100)
        .await
        .unwrap();

    assert_eq!(bindings.get_node_resource_count(web.id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_bind_requires_node_in_tenant() {
    let h = Harness::new();
    let foreign = h.node_in(other_tenant(), "web", 0).await;
    let bindings = h.st.bindings();

    let err = bindings
        .bind_resource(&tenant(), 999, 1, ResourceType::Instance, 100)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceTreeError::Node(NodeError::NotFound { id: 999 })
    ));

    let err = bindings
        .bind_resource(&tenant(), foreign.id, 1, ResourceType::Instance, 100)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_unknown_resource_type_is_rejected() {
    let err = "vm".parse::<ResourceType>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_store_level_conflict_surfaces_as_conflict() {
    let h = Harness::new();
    let node = h.node("web", 0).await;
    h.st
        .bindings()
        .bind_resource(&tenant(), node.id, 1, ResourceType::Instance, 100)
        .await
        .unwrap();

    // A racing writer that skipped the service checks
    let err = BindingStore::create(
        h.backend.as_ref(),
        ResourceBinding::manual(tenant(), node.id, 2, ResourceType::Instance, 100),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

// ============================================================================
// Batch
// ============================================================================

#[tokio::test]
async fn test_batch_bind_skips_bound_and_duplicates() {
    let h = Harness::new();
    let web = h.node("web", 0).await;
    let db = h.node("db", 0).await;
    let bindings = h.st.bindings();

    bindings
        .bind_resource(&tenant(), db.id, 1, ResourceType::Instance, 2)
        .await
        .unwrap();

    let created = bindings
        .bind_resource_batch(&batch(web.id, 1, vec![1, 2, 3, 3, 1]))
        .await
        .unwrap();
    assert_eq!(created, 2);
    assert_eq!(bindings.get_node_resource_count(web.id).await.unwrap(), 2);
    // The resource bound elsewhere stayed where it was
    assert_eq!(bindings.get_node_resource_count(db.id).await.unwrap(), 1);

    // Re-running creates nothing
    let created = bindings
        .bind_resource_batch(&batch(web.id, 1, vec![1, 2, 3]))
        .await
        .unwrap();
    assert_eq!(created, 0);
}

#[tokio::test]
async fn test_batch_bind_empty_request() {
    let h = Harness::new();
    let created = h
        .st
        .bindings()
        .bind_resource_batch(&batch(42, 1, Vec::new()))
        .await
        .unwrap();
    assert_eq!(created, 0);
}

#[tokio::test]
async fn test_batch_bind_verifies_node() {
    let h = Harness::new();
    let err = h
        .st
        .bindings()
        .bind_resource_batch(&batch(42, 1, vec![1]))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_batch_bind_skips_failed_lookups() {
    let h = Harness::new();
    let web = h.node("web", 0).await;
    let service = BindingService::new(
        Arc::new(FailingBindings {
            inner: h.backend.clone(),
            fail_lookup_ids: HashSet::from([2]),
            fail_delete_by_rule: false,
        }),
        h.backend.clone(),
    );

    let created = service
        .bind_resource_batch(&batch(web.id, 1, vec![1, 2, 3]))
        .await
        .unwrap();
    assert_eq!(created, 2);
    assert!(
        service
            .get_resource_binding(&tenant(), ResourceType::Instance, 3)
            .await
            .is_ok()
    );
    assert!(
        h.st
            .bindings()
            .get_resource_binding(&tenant(), ResourceType::Instance, 2)
            .await
            .unwrap_err()
            .is_not_found()
    );
}

// ============================================================================
// Unbind and lookups
// ============================================================================

#[tokio::test]
async fn test_unbind_resource() {
    let h = Harness::new();
    let web = h.node("web", 0).await;
    let bindings = h.st.bindings();
    bindings
        .bind_resource(&tenant(), web.id, 1, ResourceType::Instance, 100)
        .await
        .unwrap();

    bindings
        .unbind_resource(&tenant(), ResourceType::Instance, 100)
        .await
        .unwrap();
    assert_eq!(bindings.get_node_resource_count(web.id).await.unwrap(), 0);

    let err = bindings
        .unbind_resource(&tenant(), ResourceType::Instance, 100)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceTreeError::Binding(BindingError::ResourceNotBound { .. })
    ));

    // Once unbound the resource can go somewhere else
    let db = h.node("db", 0).await;
    bindings
        .bind_resource(&tenant(), db.id, 1, ResourceType::Instance, 100)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unbind_by_id() {
    let h = Harness::new();
    let web = h.node("web", 0).await;
    let bindings = h.st.bindings();
    let binding = bindings
        .bind_resource(&tenant(), web.id, 1, ResourceType::Instance, 100)
        .await
        .unwrap();

    assert_eq!(bindings.get_binding(binding.id).await.unwrap(), binding);
    bindings.unbind_by_id(binding.id).await.unwrap();

    let err = bindings.unbind_by_id(binding.id).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceTreeError::Binding(BindingError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_get_resource_node() {
    let h = Harness::new();
    let web = h.node("web", 0).await;
    let bindings = h.st.bindings();
    bindings
        .bind_resource(&tenant(), web.id, 3, ResourceType::Asset, 7)
        .await
        .unwrap();

    let found = bindings
        .get_resource_node(&tenant(), ResourceType::Asset, 7)
        .await
        .unwrap();
    assert_eq!(found.node.id, web.id);
    assert_eq!(found.env_id, 3);
    assert_eq!(found.resource_type, ResourceType::Asset);

    assert!(
        bindings
            .get_resource_node(&other_tenant(), ResourceType::Asset, 7)
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn test_counts_and_listing() {
    let h = Harness::new();
    let web = h.node("web", 0).await;
    let bindings = h.st.bindings();
    for (env_id, resource_id) in [(1, 10), (1, 11), (2, 12)] {
        bindings
            .bind_resource(&tenant(), web.id, env_id, ResourceType::Instance, resource_id)
            .await
            .unwrap();
    }

    assert_eq!(bindings.get_node_resource_count(web.id).await.unwrap(), 3);
    assert_eq!(
        bindings
            .get_node_env_resource_count(web.id, 1)
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        bindings
            .get_node_env_resource_count(web.id, 3)
            .await
            .unwrap(),
        0
    );

    let filter = BindingFilter {
        limit: Some(2),
        ..BindingFilter::for_node(web.id)
    };
    let (page, total) = bindings.list_bindings(&filter).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(total, 3);
    // Newest first
    assert_eq!(page[0].resource_id, 12);
}
