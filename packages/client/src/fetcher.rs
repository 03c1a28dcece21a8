//! Graph construction on top of [`ApiClient`].
//!
//! The fetcher turns API responses into [`Node`]s and links them into trees.
//! Descent is iterative: an explicit stack of frames, each holding a node and
//! the child IDs still to visit, so arbitrarily deep hierarchies cannot
//! overflow the call stack. A visited set (and, when building into a
//! [`Registry`], the registry itself) guarantees every ID is expanded at most
//! once, which keeps cyclic relation data finite.
//!
//! Failures below the starting node are logged and skipped; only failures
//! that leave nothing to return are surfaced to the caller.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use cwe::{normalize_id, Node, Registry};

use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::entity::EntityKind;
use crate::error::{ClientError, Result};

/// One level of the descent: a node and the child IDs not yet visited.
struct Frame {
    node: Node,
    pending: std::vec::IntoIter<String>,
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: ApiClient,
}

impl Fetcher {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(ApiClient::from_config(config)?))
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub async fn fetch_weakness(&self, id: &str) -> Result<Node> {
        self.fetch(EntityKind::Weakness, id).await
    }

    pub async fn fetch_category(&self, id: &str) -> Result<Node> {
        self.fetch(EntityKind::Category, id).await
    }

    pub async fn fetch_view(&self, id: &str) -> Result<Node> {
        self.fetch(EntityKind::View, id).await
    }

    async fn fetch(&self, kind: EntityKind, id: &str) -> Result<Node> {
        Ok(self.client.entity(kind, id).await?.into_node())
    }

    /// Fetch several entries in one request and register each as a detached
    /// node.
    ///
    /// An empty list or an invalid ID fails before any request. Entries that
    /// do not decode, and IDs the response repeats, are skipped.
    pub async fn fetch_multiple(&self, ids: &[&str]) -> Result<Registry> {
        let entities = self.client.cwes(ids).await?;
        let registry = Registry::new();
        for entity in entities {
            let id = entity.id.clone();
            if let Err(e) = registry.register(entity.into_node()) {
                debug!("fetcher: skipping {id}: {e}");
            }
        }
        info!("fetcher: fetched {} of {} requested entries", registry.len(), ids.len());
        Ok(registry)
    }

    /// Fetch `id` as a weakness, a category, or a view (first success wins)
    /// and attach its descendants within `view_id`.
    ///
    /// A failure while populating children is logged; the node is returned
    /// with whatever was attached before the failure.
    pub async fn fetch_with_relations(&self, id: &str, view_id: &str) -> Result<Node> {
        let id = normalize_id(id)?;
        let view_id = normalize_id(view_id)?;

        let node = match self.fetch_weakness(&id).await {
            Ok(node) => node,
            Err(e) => {
                debug!("fetcher: {id} is not a weakness ({e}), trying category");
                match self.fetch_category(&id).await {
                    Ok(node) => node,
                    Err(e) => {
                        debug!("fetcher: {id} is not a category ({e}), trying view");
                        self.fetch_view(&id).await?
                    }
                }
            }
        };

        if let Err(e) = self.populate_children_recursive(&node, &view_id).await {
            warn!("fetcher: could not populate children of {id}: {e}");
        }
        Ok(node)
    }

    /// Attach every descendant of `node` within `view_id`.
    ///
    /// Fails only when the children of `node` itself cannot be listed.
    pub async fn populate_children_recursive(&self, node: &Node, view_id: &str) -> Result<()> {
        let view_id = normalize_id(view_id)?;
        let attached = self.descend(node, &view_id, None).await?;
        debug!("fetcher: attached {attached} descendants under {}", node.id());
        Ok(())
    }

    /// Build the full tree of `view_id` into a fresh registry whose root is
    /// the view itself.
    ///
    /// Only the view fetch is fatal, including a response that describes a
    /// different ID than the one requested. Every node is registered exactly
    /// once; an ID reachable along several paths hangs under the first parent
    /// that reached it.
    pub async fn build_tree_with_view(&self, view_id: &str) -> Result<Registry> {
        let view_id = normalize_id(view_id)?;
        info!("fetcher: building tree for view {view_id}");

        let root = self.fetch_view(&view_id).await?;
        if root.id() != view_id {
            return Err(ClientError::Decode {
                context: format!("view {view_id}"),
                message: format!("response describes {}", root.id()),
            });
        }
        let registry = Registry::new();
        registry.register(root.clone())?;
        registry.set_root(&root.id())?;

        match self.descend(&root, &view_id, Some(&registry)).await {
            Ok(attached) => info!(
                "fetcher: view {view_id} complete, {} nodes ({attached} attached)",
                registry.len()
            ),
            Err(e) => warn!("fetcher: could not list children of view {view_id}: {e}"),
        }
        Ok(registry)
    }

    /// Fetch `ids` and link them into a forest using their child relations.
    ///
    /// Only edges between fetched IDs are kept. A node keeps the first parent
    /// that claims it, edges that would close a cycle are dropped, and
    /// children are sorted by ID. When exactly one parentless node remains it
    /// becomes the registry root.
    pub async fn build_cwe_tree(&self, ids: &[&str], view_id: Option<&str>) -> Result<Registry> {
        let view_id = view_id.map(normalize_id).transpose()?;
        let registry = self.fetch_multiple(ids).await?;

        for parent in registry.nodes() {
            let children = match self.client.children(&parent.id(), view_id.as_deref()).await {
                Ok(children) => children,
                Err(e) => {
                    warn!("fetcher: could not list children of {}: {e}", parent.id());
                    continue;
                }
            };
            for raw in children {
                let Ok(child) = normalize_id(&raw).and_then(|id| registry.get_by_id(&id)) else {
                    continue;
                };
                if child.is_root() && !child.ptr_eq(&parent) && !parent.has_ancestor(&child) {
                    parent.add_child(&child);
                }
            }
        }

        let roots: Vec<Node> = registry.nodes().into_iter().filter(|n| n.is_root()).collect();
        for root in &roots {
            root.sort_children_by_id();
        }
        if let [only] = roots.as_slice() {
            registry.set_root(&only.id())?;
        }
        Ok(registry)
    }

    /// Depth-first descent from `start`, attaching children as they are
    /// fetched. Returns how many nodes were attached.
    ///
    /// With a registry, new nodes are registered and IDs already present are
    /// neither attached again nor expanded.
    async fn descend(&self, start: &Node, view_id: &str, registry: Option<&Registry>) -> Result<usize> {
        let first = self.client.children(&start.id(), Some(view_id)).await?;
        let mut visited: HashSet<String> = HashSet::from([start.id()]);
        let mut stack = vec![Frame {
            node: start.clone(),
            pending: first.into_iter(),
        }];
        let mut attached = 0;

        while let Some(frame) = stack.last_mut() {
            let parent = frame.node.clone();
            let Some(raw) = frame.pending.next() else {
                stack.pop();
                continue;
            };

            let id = match normalize_id(&raw) {
                Ok(id) => id,
                Err(e) => {
                    warn!("fetcher: ignoring child of {}: {e}", parent.id());
                    continue;
                }
            };
            if !visited.insert(id.clone()) || registry.is_some_and(|r| r.contains(&id)) {
                debug!("fetcher: {id} already visited");
                continue;
            }

            let child = match self.fetch_child(&id).await {
                Ok(child) => child,
                Err(e) => {
                    warn!("fetcher: skipping {id}: {e}");
                    continue;
                }
            };
            if let Some(registry) = registry {
                if let Err(e) = registry.register(child.clone()) {
                    warn!("fetcher: skipping {id}: {e}");
                    continue;
                }
            }
            parent.add_child(&child);
            attached += 1;

            let grandchildren = match self.client.children(&id, Some(view_id)).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!("fetcher: could not list children of {id}: {e}");
                    Vec::new()
                }
            };
            stack.push(Frame {
                node: child,
                pending: grandchildren.into_iter(),
            });
        }
        Ok(attached)
    }

    /// Children are usually weaknesses; categories are the fallback.
    async fn fetch_child(&self, id: &str) -> Result<Node> {
        match self.fetch_weakness(id).await {
            Ok(node) => Ok(node),
            Err(e) => {
                debug!("fetcher: {id} is not a weakness ({e}), trying category");
                self.fetch_category(id).await
            }
        }
    }
}
