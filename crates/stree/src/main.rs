//! Service tree operator CLI (`stree`).
//!
//! Runs tenant maintenance tasks against a SQLite service tree database.

mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use cam_servicetree::backends::memory::MemoryInventory;
use cam_servicetree::types::Instance;
use cam_servicetree::{ServiceTree, TenantId};
use clap::Parser;
use tracing::info;

#[cfg(feature = "sqlite")]
use cam_servicetree::backends::sqlite::SqliteBackend;

use cli::{Cli, Command};

fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("cam_servicetree={level},cam_stree={level}"))
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Reads a JSON array of instances. Instances without a tenant are assigned
/// to `tenant`.
fn load_instances(path: &Path, tenant: &TenantId) -> anyhow::Result<Vec<Instance>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inventory file {}", path.display()))?;
    let mut instances: Vec<Instance> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid inventory file {}", path.display()))?;

    for instance in &mut instances {
        if instance.tenant_id.is_empty() {
            instance.tenant_id = tenant.clone();
        }
    }
    info!(count = instances.len(), path = %path.display(), "Loaded inventory");
    Ok(instances)
}

/// Opens the SQLite database and wires the services over it.
#[cfg(feature = "sqlite")]
fn open_service_tree(cli: &Cli, instances: Vec<Instance>) -> anyhow::Result<ServiceTree> {
    info!(database = %cli.database_url, "Initializing SQLite backend");

    let backend = SqliteBackend::open(&cli.database_url)?;
    backend.init_schema()?;

    Ok(ServiceTree::new(
        Arc::new(backend),
        Arc::new(MemoryInventory::with_instances(instances)),
        cli.service_config(),
    ))
}

/// Fallback when the sqlite feature is not enabled.
#[cfg(not(feature = "sqlite"))]
fn open_service_tree(_cli: &Cli, _instances: Vec<Instance>) -> anyhow::Result<ServiceTree> {
    anyhow::bail!(
        "stree requires the 'sqlite' feature. \
         Build with: cargo build -p cam-stree --features sqlite"
    )
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let tenant = TenantId::new(cli.tenant.trim());

    let instances = match &cli.command {
        Command::ExecuteRules { inventory } | Command::Match { inventory, .. } => {
            load_instances(inventory, &tenant)?
        }
        Command::InitEnvs | Command::Tree { .. } => Vec::new(),
    };
    let target = match &cli.command {
        Command::Match { instance, .. } => Some(
            instances
                .iter()
                .find(|i| i.id == *instance && i.tenant_id == tenant)
                .cloned()
                .with_context(|| format!("Instance {instance} not found in inventory"))?,
        ),
        _ => None,
    };

    let st = open_service_tree(&cli, instances)?;

    match &cli.command {
        Command::InitEnvs => {
            let created = st.environments().init_default_envs(&tenant).await?;
            println!("Created {created} environment(s) for tenant {tenant}");
        }
        Command::Tree { root, counts } => {
            let tree = if *counts {
                st.tree().get_tree_with_counts(&tenant, *root).await?
            } else {
                st.tree().get_tree(&tenant, *root).await?
            };
            print_json(&tree)?;
        }
        Command::ExecuteRules { .. } => {
            let created = st.rules().execute_rules(&tenant).await?;
            println!("Created {created} binding(s) for tenant {tenant}");
        }
        Command::Match { .. } => {
            if let Some(instance) = target {
                let result = st.rules().match_instance(&tenant, &instance).await?;
                print_json(&result)?;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(errors) = cli.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    info!(
        tenant = %cli.tenant,
        database = %cli.database_url,
        "Starting stree"
    );

    run(cli).await
}
