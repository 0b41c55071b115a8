//! Tree nodes and materialized paths.
//!
//! A node's `path` lists the identities of every node from the top of the
//! tree down to the node itself, e.g. `/1/5/12/`. The path always starts and
//! ends with `/`, and a node's `level` equals the number of segments in it.
//! Subtree queries are prefix matches on this string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceTreeResult, missing_field};
use crate::tenant::TenantId;

/// Level of a business line (top of the tree).
pub const LEVEL_BUSINESS_LINE: i32 = 1;
/// Level of a product.
pub const LEVEL_PRODUCT: i32 = 2;
/// Level of a module.
pub const LEVEL_MODULE: i32 = 3;
/// Level of a cluster.
pub const LEVEL_CLUSTER: i32 = 4;

/// Parent identity used by top-level nodes.
pub const ROOT_PARENT_ID: i64 = 0;

/// Whether a node is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Active node (the default for new nodes).
    #[default]
    Enabled,
    /// Inactive node.
    Disabled,
}

impl NodeStatus {
    /// Numeric code used by storage backends.
    pub fn code(self) -> i32 {
        match self {
            NodeStatus::Enabled => 1,
            NodeStatus::Disabled => 0,
        }
    }

    /// Inverse of [`code`](Self::code). Unknown codes read as disabled.
    pub fn from_code(code: i32) -> Self {
        if code == 1 {
            NodeStatus::Enabled
        } else {
            NodeStatus::Disabled
        }
    }
}

/// A service tree node (business line, product, module, cluster, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Node identity, assigned by the store.
    pub id: i64,
    /// Optional human-readable slug, unique within the tenant
    /// (e.g. `biz.ecommerce.order`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Display name.
    pub name: String,
    /// Parent identity, [`ROOT_PARENT_ID`] for top-level nodes.
    pub parent_id: i64,
    /// Depth in the tree, 1 for top-level nodes.
    pub level: i32,
    /// Materialized path, e.g. `/1/5/12/`.
    pub path: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Responsible person.
    #[serde(default)]
    pub owner: String,
    /// Owning team.
    #[serde(default)]
    pub team: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Sort weight among siblings.
    #[serde(default)]
    pub order: i32,
    /// Enabled/disabled status.
    #[serde(default)]
    pub status: NodeStatus,
    /// Creation time.
    pub create_time: DateTime<Utc>,
    /// Last update time.
    pub update_time: DateTime<Utc>,
}

impl TreeNode {
    /// Creates a top-level node draft. Identity, level and path are filled
    /// in when the node is created.
    pub fn new(tenant_id: impl Into<TenantId>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            uid: None,
            name: name.into(),
            parent_id: ROOT_PARENT_ID,
            level: 0,
            path: String::new(),
            tenant_id: tenant_id.into(),
            owner: String::new(),
            team: String::new(),
            description: String::new(),
            tags: Vec::new(),
            order: 0,
            status: NodeStatus::Enabled,
            create_time: now,
            update_time: now,
        }
    }

    /// Sets the parent node.
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = parent_id;
        self
    }

    /// Sets the uid slug.
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Sets owner and team.
    pub fn with_owner(mut self, owner: impl Into<String>, team: impl Into<String>) -> Self {
        self.owner = owner.into();
        self.team = team.into();
        self
    }

    /// Sets the sort weight.
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Checks that name and tenant are present.
    pub fn validate(&self) -> ServiceTreeResult<()> {
        if self.name.trim().is_empty() {
            return Err(missing_field("name"));
        }
        if self.tenant_id.is_empty() {
            return Err(missing_field("tenant_id"));
        }
        Ok(())
    }

    /// Returns `true` for top-level nodes.
    pub fn is_root(&self) -> bool {
        self.parent_id == ROOT_PARENT_ID
    }

    /// Returns `true` if the node is enabled.
    pub fn is_enabled(&self) -> bool {
        self.status == NodeStatus::Enabled
    }

    /// Returns the uid if set and non-empty.
    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref().filter(|uid| !uid.is_empty())
    }

    /// Builds this node's path below the given parent path.
    ///
    /// An empty parent path yields a top-level path.
    pub fn build_path(&self, parent_path: &str) -> String {
        build_path(parent_path, self.id)
    }
}

/// Builds the path of node `id` below `parent_path`.
///
/// # Examples
///
/// ```
/// use cam_servicetree::types::build_path;
///
/// assert_eq!(build_path("", 1), "/1/");
/// assert_eq!(build_path("/1/", 2), "/1/2/");
/// ```
pub fn build_path(parent_path: &str, id: i64) -> String {
    if parent_path.is_empty() {
        format!("/{id}/")
    } else {
        format!("{parent_path}{id}/")
    }
}

/// Returns the node identities encoded in a path, from the top down.
///
/// Segments that are not integers are skipped.
///
/// # Examples
///
/// ```
/// use cam_servicetree::types::path_ids;
///
/// assert_eq!(path_ids("/1/5/12/"), vec![1, 5, 12]);
/// assert!(path_ids("").is_empty());
/// ```
pub fn path_ids(path: &str) -> Vec<i64> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| segment.parse().ok())
        .collect()
}

/// Returns the number of `/`-delimited segments in a path.
pub fn path_depth(path: &str) -> usize {
    path.split('/').filter(|segment| !segment.is_empty()).count()
}

/// Returns `true` if `path` is well formed: non-empty, starts and ends with
/// `/`, and every segment is a positive integer.
pub fn is_valid_path(path: &str) -> bool {
    if path.len() < 3 || !path.starts_with('/') || !path.ends_with('/') {
        return false;
    }
    path[1..path.len() - 1]
        .split('/')
        .all(|segment| segment.parse::<i64>().is_ok_and(|id| id > 0))
}

/// Replaces the leading `old_prefix` of `path` with `new_prefix`.
///
/// Returns `None` if `path` does not start with `old_prefix`.
pub fn rebase_path(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    path.strip_prefix(old_prefix)
        .map(|rest| format!("{new_prefix}{rest}"))
}

/// Filter for listing nodes. Unset fields do not filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeFilter {
    /// Tenant to list.
    pub tenant_id: Option<TenantId>,
    /// Only direct children of this parent (`Some(0)` for top-level nodes).
    pub parent_id: Option<i64>,
    /// Only nodes at this level.
    pub level: Option<i32>,
    /// Only nodes with this status.
    pub status: Option<NodeStatus>,
    /// Case-insensitive substring of the name.
    pub name: Option<String>,
    /// Exact owner.
    pub owner: Option<String>,
    /// Exact team.
    pub team: Option<String>,
    /// Number of matching nodes to skip.
    #[serde(default)]
    pub offset: u64,
    /// Maximum number of nodes to return.
    pub limit: Option<u64>,
}

impl NodeFilter {
    /// Filter matching every node of a tenant.
    pub fn for_tenant(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Default::default()
        }
    }

    /// Restricts the filter to direct children of `parent_id`.
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Sets offset/limit pagination.
    pub fn with_page(mut self, offset: u64, limit: u64) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Returns `true` if the node satisfies every set criterion.
    ///
    /// Pagination is not considered.
    pub fn matches(&self, node: &TreeNode) -> bool {
        self.tenant_id.as_ref().is_none_or(|t| &node.tenant_id == t)
            && self.parent_id.is_none_or(|p| node.parent_id == p)
            && self.level.is_none_or(|l| node.level == l)
            && self.status.is_none_or(|s| node.status == s)
            && self
                .name
                .as_deref()
                .filter(|n| !n.is_empty())
                .is_none_or(|n| node.name.to_lowercase().contains(&n.to_lowercase()))
            && self
                .owner
                .as_deref()
                .filter(|o| !o.is_empty())
                .is_none_or(|o| node.owner == o)
            && self
                .team
                .as_deref()
                .filter(|t| !t.is_empty())
                .is_none_or(|t| node.team == t)
    }
}
