//! Environment service integration tests.

mod common;

use cam_servicetree::error::{EnvironmentError, ErrorKind, ServiceTreeError};
use cam_servicetree::types::{EnvStatus, Environment, EnvironmentFilter, ResourceType};

use common::{Harness, other_tenant, tenant};

#[tokio::test]
async fn test_init_default_envs() {
    let h = Harness::new();
    let envs = h.st.environments();

    assert_eq!(envs.init_default_envs(&tenant()).await.unwrap(), 4);

    let (list, total) = envs
        .list(&EnvironmentFilter::for_tenant(tenant()))
        .await
        .unwrap();
    assert_eq!(total, 4);
    let codes: Vec<(&str, &str)> = list
        .iter()
        .map(|e| (e.code.as_str(), e.color.as_str()))
        .collect();
    assert_eq!(
        codes,
        vec![
            ("dev", "#52c41a"),
            ("test", "#1890ff"),
            ("staging", "#faad14"),
            ("prod", "#f5222d"),
        ]
    );
    assert!(list.iter().all(|e| e.status == EnvStatus::Enabled));

    // A second run is a no-op
    assert_eq!(envs.init_default_envs(&tenant()).await.unwrap(), 0);
    assert_eq!(
        envs.list(&EnvironmentFilter::for_tenant(tenant()))
            .await
            .unwrap()
            .1,
        4
    );
}

#[tokio::test]
async fn test_init_skips_tenant_with_custom_env() {
    let h = Harness::new();
    let envs = h.st.environments();
    envs.create(Environment::new(tenant(), "qa", "QA"))
        .await
        .unwrap();

    assert_eq!(envs.init_default_envs(&tenant()).await.unwrap(), 0);
    assert!(envs.get_by_code(&tenant(), "prod").await.is_err());

    // Other tenants are unaffected
    assert_eq!(envs.init_default_envs(&other_tenant()).await.unwrap(), 4);
}

#[tokio::test]
async fn test_create_environment() {
    let h = Harness::new();
    let envs = h.st.environments();

    let env = envs
        .create(Environment::new(tenant(), "perf", "Performance"))
        .await
        .unwrap();
    assert!(env.id > 0);
    assert_eq!(envs.get_by_id(env.id).await.unwrap(), env);
    assert_eq!(envs.get_by_code(&tenant(), "perf").await.unwrap().id, env.id);

    let err = envs
        .create(Environment::new(tenant(), "", "Nameless code"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_codes_unique_per_tenant() {
    let h = Harness::new();
    let envs = h.st.environments();
    envs.create(Environment::new(tenant(), "perf", "Performance"))
        .await
        .unwrap();

    let err = envs
        .create(Environment::new(tenant(), "perf", "Again"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceTreeError::Environment(EnvironmentError::CodeExists { .. })
    ));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    envs.create(Environment::new(other_tenant(), "perf", "Performance"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_update_environment() {
    let h = Harness::new();
    let envs = h.st.environments();
    envs.init_default_envs(&tenant()).await.unwrap();
    let staging = envs.get_by_code(&tenant(), "staging").await.unwrap();

    let mut edit = staging.clone();
    edit.name = "Pre-release".to_string();
    edit.status = EnvStatus::Disabled;
    edit.tenant_id = other_tenant();
    let updated = envs.update(edit).await.unwrap();
    assert_eq!(updated.tenant_id, tenant());
    assert_eq!(updated.create_time, staging.create_time);

    let stored = envs.get_by_id(staging.id).await.unwrap();
    assert_eq!(stored.name, "Pre-release");
    assert_eq!(stored.status, EnvStatus::Disabled);

    // Taking another environment's code conflicts
    let mut clash = stored.clone();
    clash.code = "prod".to_string();
    assert!(envs.update(clash).await.unwrap_err().is_conflict());

    let mut renamed = stored;
    renamed.code = "pre".to_string();
    envs.update(renamed).await.unwrap();
    assert!(envs.get_by_code(&tenant(), "pre").await.is_ok());

    let mut ghost = Environment::new(tenant(), "ghost", "Ghost");
    ghost.id = 404;
    assert!(envs.update(ghost).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_delete_blocked_by_bindings() {
    let h = Harness::new();
    let envs = h.st.environments();
    envs.init_default_envs(&tenant()).await.unwrap();
    let prod = envs.get_by_code(&tenant(), "prod").await.unwrap();
    let web = h.node("web", 0).await;

    let binding = h
        .st
        .bindings()
        .bind_resource(&tenant(), web.id, prod.id, ResourceType::Instance, 1)
        .await
        .unwrap();

    let err = envs.delete(prod.id).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceTreeError::Environment(EnvironmentError::HasBindings { count: 1, .. })
    ));
    assert_eq!(err.kind(), ErrorKind::StructuralViolation);

    h.st.bindings().unbind_by_id(binding.id).await.unwrap();
    envs.delete(prod.id).await.unwrap();
    assert!(envs.get_by_id(prod.id).await.unwrap_err().is_not_found());
    assert!(envs.delete(prod.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_get_by_code_not_found() {
    let h = Harness::new();
    let err = h
        .st
        .environments()
        .get_by_code(&tenant(), "prod")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceTreeError::Environment(EnvironmentError::CodeNotFound { .. })
    ));
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_list_paging_and_production_flag() {
    let h = Harness::new();
    let envs = h.st.environments();
    envs.init_default_envs(&tenant()).await.unwrap();

    let filter = EnvironmentFilter {
        offset: 2,
        limit: Some(1),
        ..EnvironmentFilter::for_tenant(tenant())
    };
    let (page, total) = envs.list(&filter).await.unwrap();
    assert_eq!(total, 4);
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].code, "staging");
    assert!(!page[0].is_production());

    assert!(
        envs.get_by_code(&tenant(), "prod")
            .await
            .unwrap()
            .is_production()
    );
}
