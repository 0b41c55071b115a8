//! Service configuration.

use serde::{Deserialize, Serialize};

/// Tuning knobs for the service layer.
///
/// # Example
///
/// ```
/// use cam_servicetree::service::ServiceTreeConfig;
///
/// let config: ServiceTreeConfig = serde_json::from_str(r#"{"instance_page_size": 500}"#).unwrap();
/// assert_eq!(config.instance_page_size, 500);
/// assert_eq!(config.binding_page_size, 100_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTreeConfig {
    /// Maximum number of inventory instances loaded by one rule execution.
    #[serde(default = "default_instance_page_size")]
    pub instance_page_size: u64,

    /// Maximum number of existing bindings loaded by one rule execution.
    #[serde(default = "default_binding_page_size")]
    pub binding_page_size: u64,
}

fn default_instance_page_size() -> u64 {
    10_000
}

fn default_binding_page_size() -> u64 {
    100_000
}

impl Default for ServiceTreeConfig {
    fn default() -> Self {
        Self {
            instance_page_size: default_instance_page_size(),
            binding_page_size: default_binding_page_size(),
        }
    }
}

impl ServiceTreeConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.instance_page_size == 0 {
            errors.push("Instance page size cannot be 0".to_string());
        }

        if self.binding_page_size == 0 {
            errors.push("Binding page size cannot be 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
