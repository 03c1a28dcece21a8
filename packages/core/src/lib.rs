//! Core model for the Common Weakness Enumeration (CWE) taxonomy.
//!
//! This crate holds the pure-logic half of the CWE client: identifier
//! normalization, the node tree, the registry that deduplicates nodes by ID,
//! and the relation kinds that decide which upstream links shape a tree. It
//! performs no I/O; `cwe-client` builds on it to fetch entries over HTTP.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`id`] | Canonical `CWE-<n>` IDs via [`normalize_id`] |
//! | [`relation`] | Upstream relation kinds and the parent-oriented lookup |
//! | [`node`] | [`Node`] handles with parent/child links, JSON and XML encoding |
//! | [`registry`] | [`Registry`]: ID-keyed node set with hierarchy building and JSON import/export |
//!
//! # Quick start
//!
//! ```rust
//! use cwe::{normalize_id, Node, Registry};
//!
//! let registry = Registry::new();
//! let view = Node::new(normalize_id("1000").unwrap(), "Research Concepts");
//! let sqli = Node::new(normalize_id("cwe-089").unwrap(), "SQL Injection");
//! view.add_child(&sqli);
//! registry.register(view).unwrap();
//! registry.register(sqli).unwrap();
//! registry.set_root("CWE-1000").unwrap();
//!
//! let json = registry.export_json().unwrap();
//! assert!(json.contains("\"CWE-89\""));
//! ```

pub mod error;
pub mod id;
pub mod node;
pub mod registry;
pub mod relation;

pub use error::{Error, Result};
pub use id::{compare_ids, normalize_id};
pub use node::{Node, NodeRecord};
pub use registry::Registry;
pub use relation::{is_parent_relation, RelationKind};
