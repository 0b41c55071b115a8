//! Domain types for the service tree.
//!
//! - [`TreeNode`] and the materialized-path helpers ([`build_path`],
//!   [`path_ids`], ...)
//! - [`Tree`] and [`NodeWithChildren`] for assembled trees
//! - [`ResourceBinding`] and its filters and requests
//! - [`BindingRule`], [`RuleCondition`] and [`Operator`]
//! - [`Environment`] and the [`DEFAULT_ENVIRONMENTS`] table
//! - [`Instance`] and [`AttrValue`] for inventory resources
//!
//! # Examples
//!
//! ```
//! use cam_servicetree::types::{BindingRule, Operator, RuleCondition};
//!
//! let rule = BindingRule::new("acme", "us-east web tier", 12, 1)
//!     .with_priority(10)
//!     .with_condition(RuleCondition::new(
//!         "attributes.region",
//!         Operator::Equals,
//!         "us-east-1",
//!     ))
//!     .with_condition(RuleCondition::new("name", Operator::Regex, "^web-"));
//!
//! assert!(rule.validate().is_ok());
//! ```

mod binding;
mod environment;
mod node;
mod resource;
mod rule;
mod tree;

pub use binding::{
    BatchBindRequest, BindType, BindingFilter, ResourceBinding, ResourceType, ResourceWithNode,
};
pub use environment::{
    DEFAULT_ENVIRONMENTS, ENV_CODE_DEV, ENV_CODE_PROD, ENV_CODE_STAGING, ENV_CODE_TEST,
    EnvStatus, Environment, EnvironmentFilter, EnvironmentTemplate, default_environments,
};
pub use node::{
    LEVEL_BUSINESS_LINE, LEVEL_CLUSTER, LEVEL_MODULE, LEVEL_PRODUCT, NodeFilter, NodeStatus,
    ROOT_PARENT_ID, TreeNode, build_path, is_valid_path, path_depth, path_ids, rebase_path,
};
pub use resource::{AttrValue, FieldPath, Instance, InstanceFilter, TAGS_ATTRIBUTE};
pub use rule::{BindingRule, Operator, RuleCondition, RuleFilter, RuleMatchResult};
pub use tree::{EntryIndex, NodeWithChildren, Tree};
