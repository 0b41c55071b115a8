//! In-memory tree assembly.
//!
//! Nodes are loaded from storage as a flat, unordered list. [`Tree`] keeps
//! them in an arena and links parents to children by index, so the tree can
//! be built in one pass without recursive ownership. [`NodeWithChildren`] is
//! the nested, serializable view handed to callers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::node::TreeNode;

/// Index of an entry in a [`Tree`] arena.
pub type EntryIndex = usize;

#[derive(Debug, Clone)]
struct Entry {
    node: Option<TreeNode>,
    children: Vec<EntryIndex>,
    resource_count: Option<u64>,
}

/// An assembled tree backed by an arena of entries.
///
/// The root is either a real node or, for whole-tenant trees, a synthetic
/// entry with no node whose children are the tenant's top-level nodes.
/// Children are ordered by `(order, id)`.
#[derive(Debug, Clone)]
pub struct Tree {
    entries: Vec<Entry>,
    index: HashMap<i64, EntryIndex>,
    root: EntryIndex,
}

impl Tree {
    /// Builds a whole-tenant tree under a synthetic root.
    ///
    /// Top-level nodes, and nodes whose parent is not in `nodes`, become
    /// children of the synthetic root.
    pub fn with_synthetic_root(nodes: Vec<TreeNode>) -> Self {
        let mut tree = Tree {
            entries: vec![Entry {
                node: None,
                children: Vec::new(),
                resource_count: None,
            }],
            index: HashMap::new(),
            root: 0,
        };
        tree.insert_all(nodes);
        tree.link(|_| true);
        tree
    }

    /// Builds the subtree rooted at `root_id`.
    ///
    /// Returns `None` if `root_id` is not among `nodes`. Nodes that do not
    /// descend from the root are ignored.
    pub fn rooted_at(root_id: i64, nodes: Vec<TreeNode>) -> Option<Self> {
        let mut tree = Tree {
            entries: Vec::with_capacity(nodes.len()),
            index: HashMap::new(),
            root: 0,
        };
        tree.insert_all(nodes);
        tree.root = *tree.index.get(&root_id)?;
        let root = tree.root;
        tree.link(|idx| idx != root);
        Some(tree)
    }

    fn insert_all(&mut self, nodes: Vec<TreeNode>) {
        for node in nodes {
            if self.index.contains_key(&node.id) {
                continue;
            }
            self.index.insert(node.id, self.entries.len());
            self.entries.push(Entry {
                node: Some(node),
                children: Vec::new(),
                resource_count: None,
            });
        }
    }

    /// Links every real entry accepted by `attach` to its parent entry, or
    /// to the synthetic root when the parent is absent and the root is
    /// synthetic.
    fn link(&mut self, attach: impl Fn(EntryIndex) -> bool) {
        let synthetic = self.entries[self.root].node.is_none();
        for idx in 0..self.entries.len() {
            if !attach(idx) {
                continue;
            }
            let Some(parent_id) = self.entries[idx].node.as_ref().map(|n| n.parent_id) else {
                continue;
            };
            match self.index.get(&parent_id) {
                Some(&parent) if parent != idx => self.entries[parent].children.push(idx),
                _ if synthetic => self.entries[self.root].children.push(idx),
                _ => {}
            }
        }

        let keys: Vec<(i32, i64)> = self
            .entries
            .iter()
            .map(|e| e.node.as_ref().map_or((0, 0), |n| (n.order, n.id)))
            .collect();
        for entry in &mut self.entries {
            entry.children.sort_by_key(|&child| keys[child]);
        }
    }

    /// Index of the root entry.
    pub fn root(&self) -> EntryIndex {
        self.root
    }

    /// Returns `true` if the root is synthetic.
    pub fn has_synthetic_root(&self) -> bool {
        self.entries[self.root].node.is_none()
    }

    /// Node at `idx`, `None` for the synthetic root or an out-of-range index.
    pub fn node(&self, idx: EntryIndex) -> Option<&TreeNode> {
        self.entries.get(idx).and_then(|e| e.node.as_ref())
    }

    /// Children of `idx`, in display order.
    pub fn children(&self, idx: EntryIndex) -> &[EntryIndex] {
        self.entries
            .get(idx)
            .map(|e| e.children.as_slice())
            .unwrap_or_default()
    }

    /// Arena index of the node with identity `id`.
    pub fn find(&self, id: i64) -> Option<EntryIndex> {
        self.index.get(&id).copied()
    }

    /// Number of real nodes reachable from the root (the root included when
    /// it is real).
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns `true` if the tree has no real nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identities of every node reachable from the root, depth first.
    pub fn node_ids(&self) -> Vec<i64> {
        self.iter().map(|n| n.id).collect()
    }

    /// Iterates the nodes reachable from the root, depth first.
    pub fn iter(&self) -> impl Iterator<Item = &TreeNode> + '_ {
        let mut stack = vec![self.root];
        std::iter::from_fn(move || {
            while let Some(idx) = stack.pop() {
                stack.extend(self.children(idx).iter().rev());
                if let Some(node) = self.node(idx) {
                    return Some(node);
                }
            }
            None
        })
    }

    /// Attaches a resource count to the node with identity `id`.
    pub fn set_resource_count(&mut self, id: i64, count: u64) {
        if let Some(&idx) = self.index.get(&id) {
            self.entries[idx].resource_count = Some(count);
        }
    }

    /// Converts the arena into the nested view.
    pub fn to_nested(&self) -> NodeWithChildren {
        self.nest(self.root)
    }

    fn nest(&self, idx: EntryIndex) -> NodeWithChildren {
        let entry = &self.entries[idx];
        NodeWithChildren {
            node: entry.node.clone(),
            children: entry.children.iter().map(|&c| self.nest(c)).collect(),
            resource_count: entry.resource_count,
        }
    }
}

/// Nested tree view.
///
/// `node` is `None` only for the synthetic root of a whole-tenant tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeWithChildren {
    /// The node itself.
    #[serde(flatten)]
    pub node: Option<TreeNode>,
    /// Children, in display order.
    #[serde(default)]
    pub children: Vec<NodeWithChildren>,
    /// Resources bound to the node, when counts were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_count: Option<u64>,
}

impl NodeWithChildren {
    /// Identity of the node, `0` for the synthetic root.
    pub fn id(&self) -> i64 {
        self.node.as_ref().map_or(0, |n| n.id)
    }

    /// Finds a descendant (or self) by identity.
    pub fn find(&self, id: i64) -> Option<&NodeWithChildren> {
        if self.node.as_ref().is_some_and(|n| n.id == id) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}
