//! Command line configuration for `stree`.
//!
//! Every global option can also be set through an environment variable:
//!
//! | Option | Variable | Default |
//! |--------|----------|---------|
//! | `--database-url` | `STREE_DATABASE_URL` | `servicetree.db` |
//! | `--tenant` | `STREE_TENANT` | `default` |
//! | `--log-level` | `STREE_LOG_LEVEL` | `info` |
//! | `--instance-page-size` | `STREE_INSTANCE_PAGE_SIZE` | `10000` |
//! | `--binding-page-size` | `STREE_BINDING_PAGE_SIZE` | `100000` |

use std::path::PathBuf;

use cam_servicetree::ServiceTreeConfig;
use clap::{Parser, Subcommand};

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Operator CLI for the cloud asset service tree.
#[derive(Debug, Clone, Parser)]
#[command(name = "stree")]
#[command(about = "Cloud asset service tree maintenance")]
pub struct Cli {
    /// SQLite database file, or `:memory:`.
    #[arg(long, env = "STREE_DATABASE_URL", default_value = "servicetree.db")]
    pub database_url: String,

    /// Tenant every command runs against.
    #[arg(long, env = "STREE_TENANT", default_value = "default")]
    pub tenant: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "STREE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Instances loaded per rule execution pass.
    #[arg(long, env = "STREE_INSTANCE_PAGE_SIZE", default_value = "10000")]
    pub instance_page_size: u64,

    /// Existing bindings loaded per rule execution pass.
    #[arg(long, env = "STREE_BINDING_PAGE_SIZE", default_value = "100000")]
    pub binding_page_size: u64,

    #[command(subcommand)]
    pub command: Command,
}

/// `stree` subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create the default environments if the tenant has none.
    InitEnvs,

    /// Print the tenant's tree as JSON.
    Tree {
        /// Root node; the whole tenant when absent.
        #[arg(long, default_value = "0")]
        root: i64,

        /// Include bound resource counts.
        #[arg(long)]
        counts: bool,
    },

    /// Apply the tenant's binding rules to an inventory snapshot.
    ExecuteRules {
        /// JSON file holding an array of instances.
        #[arg(long)]
        inventory: PathBuf,
    },

    /// Show which rule would bind one instance.
    Match {
        /// JSON file holding an array of instances.
        #[arg(long)]
        inventory: PathBuf,

        /// Identity of the instance to evaluate.
        #[arg(long)]
        instance: i64,
    },
}

impl Cli {
    /// Rule engine settings derived from the command line.
    pub fn service_config(&self) -> ServiceTreeConfig {
        ServiceTreeConfig {
            instance_page_size: self.instance_page_size,
            binding_page_size: self.binding_page_size,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database_url.trim().is_empty() {
            errors.push("Database URL cannot be empty".to_string());
        }

        if self.tenant.trim().is_empty() {
            errors.push("Tenant cannot be empty".to_string());
        }

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(format!(
                "Invalid log level '{}', expected one of: {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            ));
        }

        if let Err(config_errors) = self.service_config().validate() {
            errors.extend(config_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
