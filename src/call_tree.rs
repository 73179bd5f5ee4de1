//! Arena-backed call tree
//!
//! Nodes are addressed by [`NodeId`] and linked with `parent`, `first_child`
//! and `next_sibling` indices. Index 0 is always the synthetic root; the
//! entry-point frame hangs off it and is the only visible top-level node.
//! Nodes are never removed, so an id handed out once stays valid for the
//! lifetime of the tree.

use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use std::ops::{Index, IndexMut};

/// Number of spaces per level of depth when rendering
pub const INDENT_WIDTH: usize = 4;

/// Index of a node inside a [`CallTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The synthetic root
    pub const ROOT: NodeId = NodeId(0);
}

/// Name attached to a call node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameName {
    /// The synthetic root; never equal to any other frame
    Root,
    /// A resolved function symbol
    Symbol(String),
    /// The callee address did not resolve to any symbol
    Unknown,
}

impl FrameName {
    /// Whether two frames belong to the same function
    ///
    /// Unknown frames compare equal to each other, the root to nothing.
    pub fn same_function(&self, other: &FrameName) -> bool {
        match (self, other) {
            (FrameName::Symbol(a), FrameName::Symbol(b)) => a == b,
            (FrameName::Unknown, FrameName::Unknown) => true,
            _ => false,
        }
    }

    pub fn from_symbol(symbol: Option<&str>) -> Self {
        symbol.map_or(FrameName::Unknown, |s| FrameName::Symbol(s.to_string()))
    }
}

impl fmt::Display for FrameName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameName::Root => f.write_str("<root>"),
            FrameName::Symbol(name) => f.write_str(name),
            FrameName::Unknown => f.write_str("not found"),
        }
    }
}

/// One (non-recursive) function invocation
#[derive(Debug, Clone)]
pub struct CallNode {
    pub name: FrameName,
    /// Address of the call instruction that created this node
    pub return_site: u64,
    /// Instructions executed by this invocation and all of its descendants
    pub instructions: u64,
    /// Direct self-calls merged into this node
    pub recursive_calls: u64,
    pub depth: u32,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    next_sibling: Option<NodeId>,
}

impl CallNode {
    fn new(name: FrameName, return_site: u64, depth: u32, parent: Option<NodeId>) -> Self {
        Self {
            name,
            return_site,
            instructions: 0,
            recursive_calls: 0,
            depth,
            parent,
            first_child: None,
            next_sibling: None,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.first_child
    }

    pub fn next_sibling(&self) -> Option<NodeId> {
        self.next_sibling
    }
}

/// Call tree discovered while single-stepping a tracee
#[derive(Debug, Clone)]
pub struct CallTree {
    nodes: Vec<CallNode>,
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTree {
    /// Create a tree holding only the synthetic root
    pub fn new() -> Self {
        Self {
            nodes: vec![CallNode::new(FrameName::Root, 0, 0, None)],
        }
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when nothing but the root exists
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn get(&self, id: NodeId) -> Option<&CallNode> {
        self.nodes.get(id.0)
    }

    /// The entry-point frame, once tracing reached it
    pub fn entry(&self) -> Option<NodeId> {
        self.nodes[0].next_sibling
    }

    /// Attach the entry-point frame right after the root
    pub fn attach_entry(&mut self, name: FrameName, address: u64) -> NodeId {
        let id = self.push(CallNode::new(name, address, 0, Some(NodeId::ROOT)));
        self.nodes[0].next_sibling = Some(id);
        id
    }

    /// Attach a new node as the first child of `parent`
    pub fn attach_child(
        &mut self,
        parent: NodeId,
        name: FrameName,
        return_site: u64,
        depth: u32,
    ) -> NodeId {
        let id = self.push(CallNode::new(name, return_site, depth, Some(parent)));
        self[parent].first_child = Some(id);
        id
    }

    /// Attach a new node as the next sibling of `prev`, sharing its parent
    pub fn attach_sibling(
        &mut self,
        prev: NodeId,
        name: FrameName,
        return_site: u64,
        depth: u32,
    ) -> NodeId {
        let parent = self[prev].parent;
        let id = self.push(CallNode::new(name, return_site, depth, parent));
        self[prev].next_sibling = Some(id);
        id
    }

    fn push(&mut self, node: CallNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Children of `id` in call order
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            tree: self,
            next: self[id].first_child,
        }
    }

    /// Attribute one executed instruction to `id` and its active ancestors
    ///
    /// Walks upward incrementing every ancestor shallower than the last one
    /// incremented, stopping once a depth-0 frame has been counted.
    pub fn count_instruction(&mut self, id: NodeId) {
        self[id].instructions += 1;
        let mut last_depth = self[id].depth;
        let mut cursor = self[id].parent;

        while last_depth != 0 {
            while let Some(node) = cursor {
                if self[node].depth < last_depth {
                    break;
                }
                cursor = self[node].parent;
            }
            let Some(node) = cursor else { break };
            self[node].instructions += 1;
            last_depth = self[node].depth;
            cursor = self[node].parent;
        }
    }

    /// Re-depth the subtrees of recursion-collapsed nodes
    ///
    /// Recursive invocations leave their callees deeper than the single
    /// merged node they render under. Visits nodes in render order and, for
    /// every node with merged recursive calls, renumbers its first child's
    /// subtree from `depth + 1`.
    pub fn correct_recursive_depths(&mut self) {
        let Some(entry) = self.entry() else { return };
        let mut stack = vec![entry];

        while let Some(id) = stack.pop() {
            if self[id].recursive_calls > 0 {
                if let Some(child) = self[id].first_child {
                    let depth = self[id].depth;
                    self.rebuild_depth(child, depth, depth + 1);
                }
            }
            if id != entry {
                if let Some(next) = self[id].next_sibling {
                    stack.push(next);
                }
            }
            if let Some(child) = self[id].first_child {
                stack.push(child);
            }
        }
    }

    fn rebuild_depth(&mut self, start: NodeId, min_depth: u32, start_depth: u32) {
        let mut stack = vec![(start, start_depth)];

        while let Some((id, depth)) = stack.pop() {
            if self[id].depth == min_depth {
                continue;
            }
            self[id].depth = depth;
            if let Some(next) = self[id].next_sibling {
                stack.push((next, depth));
            }
            if let Some(child) = self[id].first_child {
                stack.push((child, depth + 1));
            }
        }
    }

    /// Visible nodes (entry and descendants) in render order
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            tree: self,
            stack: self.entry().into_iter().collect(),
        }
    }

    /// Write the indented text rendering of the visible tree
    pub fn render<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for id in self.walk() {
            let node = &self[id];
            let indent = INDENT_WIDTH * node.depth as usize;
            write!(out, "{:indent$}{}", "", node.name, indent = indent)?;
            if node.recursive_calls != 0 {
                write!(out, " [rec call: {}]", node.recursive_calls)?;
            }
            writeln!(out, ": {}", node.instructions)?;
        }
        Ok(())
    }

    /// Nested, serializable view of the visible tree
    pub fn to_report(&self) -> Option<CallReport> {
        self.entry().map(|entry| self.report_for(entry))
    }

    fn report_for(&self, id: NodeId) -> CallReport {
        let node = &self[id];
        CallReport {
            name: node.name.to_string(),
            instructions: node.instructions,
            recursive_calls: node.recursive_calls,
            depth: node.depth,
            children: self.children(id).map(|c| self.report_for(c)).collect(),
        }
    }
}

impl Index<NodeId> for CallTree {
    type Output = CallNode;

    fn index(&self, id: NodeId) -> &CallNode {
        &self.nodes[id.0]
    }
}

impl IndexMut<NodeId> for CallTree {
    fn index_mut(&mut self, id: NodeId) -> &mut CallNode {
        &mut self.nodes[id.0]
    }
}

/// Iterator over the children of a node
pub struct Children<'a> {
    tree: &'a CallTree,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree[id].next_sibling;
        Some(id)
    }
}

/// Depth-first walk: each node, then its children, then its next sibling
pub struct Walk<'a> {
    tree: &'a CallTree,
    stack: Vec<NodeId>,
}

impl Iterator for Walk<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        let node = &self.tree[id];
        // The entry's siblings belong to the root, not to the visible tree
        if node.parent != Some(NodeId::ROOT) {
            if let Some(next) = node.next_sibling {
                self.stack.push(next);
            }
        }
        if let Some(child) = node.first_child {
            self.stack.push(child);
        }
        Some(id)
    }
}

/// JSON shape of one call node
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CallReport {
    pub name: String,
    pub instructions: u64,
    pub recursive_calls: u64,
    pub depth: u32,
    pub children: Vec<CallReport>,
}
