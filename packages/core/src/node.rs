//! The CWE node model.
//!
//! A [`Node`] is a cheaply cloneable handle to one CWE entry (weakness,
//! category, or view) plus its position in a tree. Children are owned by their
//! parent; the parent link is a weak back-reference, so a tree is freed as soon
//! as its root handle and any registry holding it are dropped.
//!
//! Nodes form a forest:
//!
//! - for every child `c` of `p`, `c.parent() == p`;
//! - a node sits in at most one `children` list ([`Node::add_child`] moves a
//!   node that already has a parent);
//! - following parents always reaches a root. [`Node::add_child`] does not
//!   check for cycles; callers must not link a node under its own descendant.
//!
//! # Serialisation
//!
//! The parent link is never serialised. [`NodeRecord`] is the owned,
//! parent-free snapshot used for JSON, with `children` nested in full. XML uses
//! a separate shadow structure with `<Children>` / `<Child>` wrappers.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id;

struct NodeData {
    id: String,
    name: String,
    description: Option<String>,
    url: Option<String>,
    severity: Option<String>,
    mitigations: Vec<String>,
    examples: Vec<String>,
    parent: Weak<RwLock<NodeData>>,
    children: Vec<Node>,
}

fn read(lock: &RwLock<NodeData>) -> RwLockReadGuard<'_, NodeData> {
    lock.read().unwrap_or_else(|p| p.into_inner())
}

fn write(lock: &RwLock<NodeData>) -> RwLockWriteGuard<'_, NodeData> {
    lock.write().unwrap_or_else(|p| p.into_inner())
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A shared handle to a CWE entry and its tree links.
///
/// Cloning a `Node` clones the handle, not the entry. Use [`Node::ptr_eq`] to
/// ask whether two handles refer to the same entry.
#[derive(Clone)]
pub struct Node {
    inner: Arc<RwLock<NodeData>>,
}

impl Node {
    /// Create a detached node. It is not registered anywhere.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(NodeData {
                id: id.into(),
                name: name.into(),
                description: None,
                url: None,
                severity: None,
                mitigations: Vec::new(),
                examples: Vec::new(),
                parent: Weak::new(),
                children: Vec::new(),
            })),
        }
    }

    pub fn with_description(self, description: impl Into<String>) -> Self {
        write(&self.inner).description = Some(description.into());
        self
    }

    pub fn with_url(self, url: impl Into<String>) -> Self {
        write(&self.inner).url = Some(url.into());
        self
    }

    pub fn with_severity(self, severity: impl Into<String>) -> Self {
        write(&self.inner).severity = Some(severity.into());
        self
    }

    pub fn with_mitigations(self, mitigations: Vec<String>) -> Self {
        write(&self.inner).mitigations = mitigations;
        self
    }

    pub fn with_examples(self, examples: Vec<String>) -> Self {
        write(&self.inner).examples = examples;
        self
    }

    // --- fields --------------------------------------------------------------

    pub fn id(&self) -> String {
        read(&self.inner).id.clone()
    }

    pub fn name(&self) -> String {
        read(&self.inner).name.clone()
    }

    pub fn description(&self) -> Option<String> {
        read(&self.inner).description.clone()
    }

    pub fn url(&self) -> Option<String> {
        read(&self.inner).url.clone()
    }

    pub fn severity(&self) -> Option<String> {
        read(&self.inner).severity.clone()
    }

    pub fn mitigations(&self) -> Vec<String> {
        read(&self.inner).mitigations.clone()
    }

    pub fn examples(&self) -> Vec<String> {
        read(&self.inner).examples.clone()
    }

    /// The integer suffix of this node's ID. Fails if the ID is not canonical.
    pub fn numeric_id(&self) -> Result<u64> {
        id::numeric_value(&read(&self.inner).id)
    }

    /// Whether both handles refer to the same entry.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // --- tree ----------------------------------------------------------------

    /// The parent node, if this node has one and it is still alive.
    pub fn parent(&self) -> Option<Node> {
        read(&self.inner)
            .parent
            .upgrade()
            .map(|inner| Node { inner })
    }

    /// Direct children in insertion order.
    pub fn children(&self) -> Vec<Node> {
        read(&self.inner).children.clone()
    }

    pub fn child_count(&self) -> usize {
        read(&self.inner).children.len()
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    pub fn is_leaf(&self) -> bool {
        read(&self.inner).children.is_empty()
    }

    /// Append `child` to this node's children and make this node its parent.
    ///
    /// If `child` already has a parent it is removed from that parent's
    /// children first. No cycle check is performed.
    pub fn add_child(&self, child: &Node) {
        let previous = std::mem::replace(
            &mut write(&child.inner).parent,
            Arc::downgrade(&self.inner),
        );
        if let Some(previous) = previous.upgrade() {
            write(&previous).children.retain(|c| !c.ptr_eq(child));
        }
        write(&self.inner).children.push(child.clone());
    }

    /// The root reached by following parent links.
    pub fn root(&self) -> Node {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// The nodes from the root down to this node, inclusive.
    pub fn path(&self) -> Vec<Node> {
        let mut path = vec![self.clone()];
        while let Some(parent) = path.last().and_then(Node::parent) {
            path.push(parent);
        }
        path.reverse();
        path
    }

    /// Whether `other` is this node or one of its ancestors.
    pub fn has_ancestor(&self, other: &Node) -> bool {
        self.path().iter().any(|n| n.ptr_eq(other))
    }

    /// Every node below this one, depth-first in child order.
    ///
    /// Each entry is visited once even if the caller has linked a cycle.
    pub fn descendants(&self) -> Vec<Node> {
        let mut seen: HashSet<*const RwLock<NodeData>> = HashSet::new();
        seen.insert(Arc::as_ptr(&self.inner));
        let mut out = Vec::new();
        let mut stack: Vec<Node> = self.children().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            if !seen.insert(Arc::as_ptr(&node.inner)) {
                continue;
            }
            stack.extend(node.children().into_iter().rev());
            out.push(node);
        }
        out
    }

    /// Reorder children by ascending canonical ID, recursively.
    pub fn sort_children_by_id(&self) {
        let mut subtree = self.descendants();
        subtree.push(self.clone());
        for node in subtree {
            write(&node.inner)
                .children
                .sort_by_cached_key(|c| SortKey(c.id()));
        }
    }

    // --- serialisation -------------------------------------------------------

    /// An owned, parent-free snapshot of this node and its subtree.
    pub fn to_record(&self) -> NodeRecord {
        let mut seen = HashSet::new();
        self.record_into(&mut seen)
    }

    fn record_into(&self, seen: &mut HashSet<*const RwLock<NodeData>>) -> NodeRecord {
        seen.insert(Arc::as_ptr(&self.inner));
        let mut record = self.fields();
        for child in self.children() {
            if !seen.contains(&Arc::as_ptr(&child.inner)) {
                record.children.push(child.record_into(seen));
            }
        }
        record
    }

    /// This node's own fields as a childless record.
    pub(crate) fn fields(&self) -> NodeRecord {
        let data = read(&self.inner);
        NodeRecord {
            id: data.id.clone(),
            name: data.name.clone(),
            description: data.description.clone(),
            url: data.url.clone(),
            severity: data.severity.clone(),
            mitigations: data.mitigations.clone(),
            examples: data.examples.clone(),
            children: Vec::new(),
        }
    }

    /// Build a detached tree from a record. Parent links are restored.
    pub fn from_record(record: &NodeRecord) -> Result<Node> {
        let root = Node::detached(record, record.id.clone())?;
        let mut stack = vec![(root.clone(), record)];
        while let Some((parent, rec)) = stack.pop() {
            for child_rec in &rec.children {
                let child = Node::detached(child_rec, child_rec.id.clone())?;
                parent.add_child(&child);
                stack.push((child, child_rec));
            }
        }
        Ok(root)
    }

    /// A childless node carrying `record`'s fields under `id`.
    pub(crate) fn detached(record: &NodeRecord, id: String) -> Result<Node> {
        if id.is_empty() {
            return Err(Error::EmptyInput("node id"));
        }
        let node = Node::new(id, record.name.clone())
            .with_mitigations(record.mitigations.clone())
            .with_examples(record.examples.clone());
        {
            let mut data = write(&node.inner);
            data.description = record.description.clone();
            data.url = record.url.clone();
            data.severity = record.severity.clone();
        }
        Ok(node)
    }

    /// Pretty-printed JSON of this node and its subtree, without parent links.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_record()).map_err(|e| Error::Encode(e.to_string()))
    }

    /// Parse a node and its nested children from JSON.
    pub fn from_json(json: &str) -> Result<Node> {
        let record: NodeRecord =
            serde_json::from_str(json).map_err(|e| Error::Decode(e.to_string()))?;
        Node::from_record(&record)
    }

    /// XML of this node and its subtree, rooted at `<Node>`.
    ///
    /// ```text
    /// <Node><ID>CWE-1000</ID><Name>Research Concepts</Name>
    ///   <Children><Child><ID>CWE-20</ID>...</Child></Children></Node>
    /// ```
    pub fn to_xml(&self) -> Result<String> {
        let record = self.to_record();
        quick_xml::se::to_string_with_root("Node", &XmlNode::from(&record))
            .map_err(|e| Error::Encode(e.to_string()))
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = read(&self.inner);
        let parent = data.parent.upgrade().map(|p| read(&p).id.clone());
        let children: Vec<String> = data.children.iter().map(Node::id).collect();
        f.debug_struct("Node")
            .field("id", &data.id)
            .field("name", &data.name)
            .field("parent", &parent)
            .field("children", &children)
            .finish()
    }
}

/// Sorts canonical IDs numerically via [`id::compare_ids`].
#[derive(PartialEq, Eq)]
struct SortKey(String);

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        id::compare_ids(&self.0, &other.0)
    }
}

// ---------------------------------------------------------------------------
// NodeRecord
// ---------------------------------------------------------------------------

/// Parent-free JSON form of a node and its subtree.
///
/// ```json
/// { "id": "CWE-20", "name": "Improper Input Validation",
///   "mitigations": [], "examples": [],
///   "children": [ { "id": "CWE-89", "name": "SQL Injection", ... } ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    #[serde(default)]
    pub mitigations: Vec<String>,

    #[serde(default)]
    pub examples: Vec<String>,

    #[serde(default)]
    pub children: Vec<NodeRecord>,
}

// ---------------------------------------------------------------------------
// XML shadow structure
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct XmlNode<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(rename = "URL", skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(rename = "Severity", skip_serializing_if = "Option::is_none")]
    severity: Option<&'a str>,
    #[serde(rename = "Mitigations", skip_serializing_if = "Option::is_none")]
    mitigations: Option<XmlMitigations<'a>>,
    #[serde(rename = "Examples", skip_serializing_if = "Option::is_none")]
    examples: Option<XmlExamples<'a>>,
    #[serde(rename = "Children", skip_serializing_if = "Option::is_none")]
    children: Option<XmlChildren<'a>>,
}

#[derive(Serialize)]
struct XmlMitigations<'a> {
    #[serde(rename = "Mitigation")]
    items: &'a [String],
}

#[derive(Serialize)]
struct XmlExamples<'a> {
    #[serde(rename = "Example")]
    items: &'a [String],
}

#[derive(Serialize)]
struct XmlChildren<'a> {
    #[serde(rename = "Child")]
    items: Vec<XmlNode<'a>>,
}

impl<'a> From<&'a NodeRecord> for XmlNode<'a> {
    fn from(r: &'a NodeRecord) -> Self {
        XmlNode {
            id: &r.id,
            name: &r.name,
            description: r.description.as_deref(),
            url: r.url.as_deref(),
            severity: r.severity.as_deref(),
            mitigations: (!r.mitigations.is_empty()).then(|| XmlMitigations {
                items: &r.mitigations,
            }),
            examples: (!r.examples.is_empty()).then(|| XmlExamples { items: &r.examples }),
            children: (!r.children.is_empty()).then(|| XmlChildren {
                items: r.children.iter().map(XmlNode::from).collect(),
            }),
        }
    }
}

// --- tests -------------------------------------------------------------------
