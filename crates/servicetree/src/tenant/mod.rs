//! Tenant identity.
//!
//! Every entity in the service tree (nodes, bindings, rules, environments)
//! belongs to exactly one tenant. Lookups that take a tenant never return
//! entities of another tenant, and structural links (parent nodes, binding
//! targets) are only accepted within one tenant.
//!
//! # Examples
//!
//! ```
//! use cam_servicetree::tenant::TenantId;
//!
//! let tenant = TenantId::new("acme");
//! assert_eq!(tenant.as_str(), "acme");
//! assert!(!tenant.is_empty());
//! ```

mod id;

pub use id::{DEFAULT_TENANT, TenantId};
