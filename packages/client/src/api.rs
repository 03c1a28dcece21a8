//! Typed client for the CWE REST API.
//!
//! Endpoint paths (relative to the configured base URL):
//!
//! | Method | Path |
//! |--------|------|
//! | [`version`](ApiClient::version) | `/cwe/version` |
//! | [`cwes`](ApiClient::cwes) | `/cwe/<n>,<n>,…` |
//! | [`weakness`](ApiClient::weakness) | `/cwe/weakness/<n>` |
//! | [`category`](ApiClient::category) | `/cwe/category/<n>` |
//! | [`view`](ApiClient::view) | `/cwe/view/<n>` |
//! | [`parents`](ApiClient::parents) | `/cwe/<n>/parents[?view=<v>]` |
//! | [`children`](ApiClient::children) | `/cwe/<n>/children[?view=<v>]` |
//! | [`ancestors`](ApiClient::ancestors) | `/cwe/<n>/ancestors[?view=<v>]` |
//! | [`descendants`](ApiClient::descendants) | `/cwe/<n>/descendants[?view=<v>]` |
//!
//! `<n>` is the numeric part of the canonical ID. Every call goes through the
//! shared [`Transport`], so pacing and retries apply uniformly.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use cwe::id::numeric_part;
use cwe::normalize_id;

use crate::config::ClientConfig;
use crate::entity::{related_ids, Entity, EntityKind};
use crate::error::{ClientError, Result};
use crate::transport::Transport;

/// Content version reported by `/cwe/version`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Version {
    #[serde(alias = "ContentVersion")]
    pub version: String,
    #[serde(default, alias = "ContentDate")]
    pub release_date: Option<String>,
}

/// Which relation endpoint to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Parents,
    Children,
    Ancestors,
    Descendants,
}

impl Relation {
    fn segment(self) -> &'static str {
        match self {
            Relation::Parents => "parents",
            Relation::Children => "children",
            Relation::Ancestors => "ancestors",
            Relation::Descendants => "descendants",
        }
    }
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ApiClient {
    transport: Transport,
    base_url: String,
}

impl ApiClient {
    pub fn new(transport: Transport, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build the transport and client described by `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(Transport::from_config(config)?, &config.base_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub async fn version(&self) -> Result<Version> {
        let (url, value) = self.get_json("/cwe/version").await?;
        serde_json::from_value(value).map_err(|e| ClientError::Decode {
            context: url,
            message: e.to_string(),
        })
    }

    /// Fetch several entries in one request.
    ///
    /// IDs are normalized first and duplicates collapsed; an invalid ID fails
    /// the call before anything is sent. Entries the service returns in an
    /// unusable shape are skipped.
    pub async fn cwes(&self, ids: &[&str]) -> Result<Vec<Entity>> {
        if ids.is_empty() {
            return Err(cwe::Error::EmptyInput("id list").into());
        }
        let mut numbers: Vec<String> = Vec::with_capacity(ids.len());
        for raw in ids {
            let id = normalize_id(raw)?;
            let n = numeric_part(&id)?.to_string();
            if !numbers.contains(&n) {
                numbers.push(n);
            }
        }

        let (url, value) = self.get_json(&format!("/cwe/{}", numbers.join(","))).await?;
        let entities = Entity::list_from_response(&value, &url)?;
        debug!("api: {url} yielded {} of {} entries", entities.len(), numbers.len());
        Ok(entities)
    }

    pub async fn weakness(&self, id: &str) -> Result<Entity> {
        self.entity(EntityKind::Weakness, id).await
    }

    pub async fn category(&self, id: &str) -> Result<Entity> {
        self.entity(EntityKind::Category, id).await
    }

    pub async fn view(&self, id: &str) -> Result<Entity> {
        self.entity(EntityKind::View, id).await
    }

    /// Fetch one entry of the given kind.
    pub async fn entity(&self, kind: EntityKind, id: &str) -> Result<Entity> {
        let id = normalize_id(id)?;
        let path = format!("/cwe/{}/{}", kind.segment(), numeric_part(&id)?);
        let (url, value) = self.get_json(&path).await?;
        Entity::from_response(&value, kind, &url)
    }

    /// Direct parents of `id`, optionally restricted to one view.
    pub async fn parents(&self, id: &str, view: Option<&str>) -> Result<Vec<String>> {
        self.relation(Relation::Parents, id, view).await
    }

    /// Direct children of `id`, optionally restricted to one view.
    pub async fn children(&self, id: &str, view: Option<&str>) -> Result<Vec<String>> {
        self.relation(Relation::Children, id, view).await
    }

    pub async fn ancestors(&self, id: &str, view: Option<&str>) -> Result<Vec<String>> {
        self.relation(Relation::Ancestors, id, view).await
    }

    pub async fn descendants(&self, id: &str, view: Option<&str>) -> Result<Vec<String>> {
        self.relation(Relation::Descendants, id, view).await
    }

    async fn relation(&self, relation: Relation, id: &str, view: Option<&str>) -> Result<Vec<String>> {
        let id = normalize_id(id)?;
        let mut path = format!("/cwe/{}/{}", numeric_part(&id)?, relation.segment());
        if let Some(view) = view {
            let view = normalize_id(view)?;
            path.push_str("?view=");
            path.push_str(numeric_part(&view)?);
        }
        let (url, value) = self.get_json(&path).await?;
        related_ids(&value, &url)
    }

    /// GET `path` and parse the body as JSON. Returns the full URL alongside
    /// the value so callers can cite it in errors.
    async fn get_json(&self, path: &str) -> Result<(String, Value)> {
        let url = format!("{}{path}", self.base_url);
        let response = self.transport.get(&url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::ApiStatus {
                url,
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await?;
        let value = serde_json::from_slice(&body).map_err(|e| ClientError::Decode {
            context: url.clone(),
            message: e.to_string(),
        })?;
        Ok((url, value))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
