//! The registry that owns a set of CWE nodes.
//!
//! A [`Registry`] maps canonical IDs to [`Node`]s and optionally records one
//! of them as the root of the tree being built. It is the deduplication point
//! for the graph builder: an ID is registered at most once, so traversals can
//! use membership as their termination test.
//!
//! All operations take the internal lock for the duration of their critical
//! section; a fully built registry can be read from many threads at once.
//!
//! # JSON form
//!
//! [`Registry::export_json`] emits an object keyed by ID, in numeric ID order.
//! Each value carries the node's fields without its parent link. Registered
//! children are listed by ID; unregistered ones are nested as [`NodeRecord`]s:
//!
//! ```json
//! { "CWE-20": { "id": "CWE-20", "name": "Improper Input Validation",
//!               "mitigations": [], "examples": [], "children": ["CWE-89"] } }
//! ```
//!
//! [`Registry::import_json`] reverses this. It also accepts fully nested
//! children and re-links each to the top-level entry with the same ID.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::id;
use crate::node::{Node, NodeRecord};

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<String, Node>,
    root: Option<Node>,
}

/// Thread-safe, ID-keyed collection of nodes.
#[derive(Debug, Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Add a node under its own ID.
    ///
    /// Fails with [`Error::EmptyInput`] if the ID is empty and with
    /// [`Error::DuplicateId`] if the ID is already present; the registry is
    /// left unchanged in both cases.
    pub fn register(&self, node: Node) -> Result<()> {
        let id = node.id();
        if id.is_empty() {
            return Err(Error::EmptyInput("node id"));
        }
        let mut inner = self.write();
        if inner.nodes.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        inner.nodes.insert(id, node);
        Ok(())
    }

    /// The node registered under exactly `id`.
    pub fn get_by_id(&self, id: &str) -> Result<Node> {
        self.read()
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().nodes.is_empty()
    }

    /// Registered IDs in numeric order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().nodes.keys().cloned().collect();
        ids.sort_by(|a, b| id::compare_ids(a, b));
        ids
    }

    /// Registered nodes in numeric ID order.
    pub fn nodes(&self) -> Vec<Node> {
        let inner = self.read();
        let mut entries: Vec<(&String, &Node)> = inner.nodes.iter().collect();
        entries.sort_by(|a, b| id::compare_ids(a.0, b.0));
        entries.into_iter().map(|(_, n)| n.clone()).collect()
    }

    pub fn root(&self) -> Option<Node> {
        self.read().root.clone()
    }

    /// Mark the registered node `id` as the root.
    pub fn set_root(&self, id: &str) -> Result<()> {
        let mut inner = self.write();
        let node = inner
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        inner.root = Some(node);
        Ok(())
    }

    /// Link registered nodes according to a parent → children map.
    ///
    /// Every ID in the map is checked first; if any is unregistered the call
    /// fails with [`Error::NotFound`] and no link is made. Children are
    /// appended in the order listed. An edge that would make a node its own
    /// ancestor is skipped.
    pub fn build_hierarchy(&self, hierarchy: &HashMap<String, Vec<String>>) -> Result<()> {
        let edges = {
            let inner = self.read();
            let lookup = |id: &str| {
                inner
                    .nodes
                    .get(id)
                    .cloned()
                    .ok_or_else(|| Error::NotFound(id.to_string()))
            };
            let mut edges = Vec::new();
            for (parent_id, child_ids) in hierarchy {
                let parent = lookup(parent_id.as_str())?;
                for child_id in child_ids {
                    edges.push((parent.clone(), lookup(child_id.as_str())?));
                }
            }
            edges
        };

        for (parent, child) in edges {
            if !parent.has_ancestor(&child) {
                parent.add_child(&child);
            }
        }
        Ok(())
    }

    /// Pretty-printed JSON object of every registered node, keyed by ID.
    ///
    /// A registered child is written as its ID; only unregistered children
    /// are nested in full. The output therefore stays flat however deep the
    /// tree is.
    pub fn export_json(&self) -> Result<String> {
        let entries: Vec<(String, Entry)> = {
            let inner = self.read();
            let mut nodes: Vec<(&String, &Node)> = inner.nodes.iter().collect();
            nodes.sort_by(|a, b| id::compare_ids(a.0, b.0));
            nodes
                .into_iter()
                .map(|(key, node)| (key.clone(), Entry::from_node(node, &inner.nodes)))
                .collect()
        };

        serde_json::to_string_pretty(&Export(&entries)).map_err(|e| Error::Encode(e.to_string()))
    }

    /// Replace the registry's contents with the nodes in `payload`.
    ///
    /// The payload is parsed and linked in full before the registry is
    /// touched, so a failure leaves the previous contents in place. When an
    /// entry's key and its `id` field differ, the key wins. A child given as
    /// an ID must name another entry. The root is cleared.
    pub fn import_json(&self, payload: &[u8]) -> Result<()> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::EmptyInput("registry payload"));
        }
        let entries: HashMap<String, Entry> =
            serde_json::from_slice(payload).map_err(|e| Error::Decode(e.to_string()))?;

        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort_by(|a, b| id::compare_ids(a, b));

        let mut nodes = HashMap::with_capacity(entries.len());
        for key in &keys {
            nodes.insert((*key).clone(), Node::detached(&entries[*key].fields(), (*key).clone())?);
        }
        for key in &keys {
            let parent = &nodes[*key];
            for child in &entries[*key].children {
                match child {
                    Child::Ref(child_id) => {
                        let child = nodes
                            .get(child_id)
                            .ok_or_else(|| Error::NotFound(child_id.clone()))?;
                        link_registered(parent, child);
                    }
                    Child::Nested(record) => link_nested(parent, record, &nodes)?,
                }
            }
        }

        *self.write() = Inner { nodes, root: None };
        Ok(())
    }
}

/// Link a registered `child` under `parent` unless it already has a parent or
/// the edge would close a cycle.
fn link_registered(parent: &Node, child: &Node) {
    if child.is_root() && !parent.has_ancestor(child) {
        parent.add_child(child);
    }
}

/// Attach a nested child record under `parent`.
///
/// A record whose ID is a top-level entry links that entry. Other records
/// become fresh, unregistered nodes and their own nested children are
/// followed.
fn link_nested(parent: &Node, record: &NodeRecord, registered: &HashMap<String, Node>) -> Result<()> {
    let mut stack = vec![(parent.clone(), record)];
    while let Some((parent, record)) = stack.pop() {
        match registered.get(&record.id) {
            Some(child) => link_registered(&parent, child),
            None => {
                let child = Node::detached(record, record.id.clone())?;
                parent.add_child(&child);
                stack.extend(record.children.iter().rev().map(|r| (child.clone(), r)));
            }
        }
    }
    Ok(())
}

/// One top-level entry of the JSON form.
#[derive(Serialize, Deserialize)]
struct Entry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    severity: Option<String>,
    #[serde(default)]
    mitigations: Vec<String>,
    #[serde(default)]
    examples: Vec<String>,
    #[serde(default)]
    children: Vec<Child>,
}

/// A child is either the ID of another entry or a nested record.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Child {
    Ref(String),
    Nested(NodeRecord),
}

impl Entry {
    fn from_node(node: &Node, registered: &HashMap<String, Node>) -> Self {
        let fields = node.fields();
        let children = node
            .children()
            .into_iter()
            .map(|child| match registered.get(&child.id()) {
                Some(entry) if entry.ptr_eq(&child) => Child::Ref(child.id()),
                _ => Child::Nested(child.to_record()),
            })
            .collect();
        Entry {
            id: fields.id,
            name: fields.name,
            description: fields.description,
            url: fields.url,
            severity: fields.severity,
            mitigations: fields.mitigations,
            examples: fields.examples,
            children,
        }
    }

    /// The entry's own fields as a childless record.
    fn fields(&self) -> NodeRecord {
        NodeRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            url: self.url.clone(),
            severity: self.severity.clone(),
            mitigations: self.mitigations.clone(),
            examples: self.examples.clone(),
            children: Vec::new(),
        }
    }
}

/// Serialises ordered `(id, entry)` pairs as a JSON object.
struct Export<'a>(&'a [(String, Entry)]);

impl Serialize for Export<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

// --- tests -------------------------------------------------------------------
