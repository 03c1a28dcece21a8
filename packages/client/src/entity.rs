//! Decoding of upstream CWE entity and relation payloads.
//!
//! The REST service is loose about shapes. An entity endpoint may answer with
//! the entry itself or with an envelope such as `{"Weaknesses": [ … ]}`; field
//! names may be `id` or `ID`; IDs may be strings (`"CWE-79"`, `"79"`) or
//! numbers. This module folds those variations into [`Entity`] and into plain
//! ID lists for the relation endpoints.

use serde_json::{Map, Value};
use tracing::debug;

use cwe::{is_parent_relation, normalize_id, Node};

use crate::error::{ClientError, Result};

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// The three kinds of entry the service exposes individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Weakness,
    Category,
    View,
}

impl EntityKind {
    /// Path segment under `/cwe/`.
    pub fn segment(self) -> &'static str {
        match self {
            EntityKind::Weakness => "weakness",
            EntityKind::Category => "category",
            EntityKind::View => "view",
        }
    }

    /// Key of the envelope array that wraps entries of this kind.
    pub fn envelope(self) -> &'static str {
        match self {
            EntityKind::Weakness => "weaknesses",
            EntityKind::Category => "categories",
            EntityKind::View => "views",
        }
    }
}

const ENVELOPES: [&str; 3] = ["weaknesses", "categories", "views"];

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// One CWE entry, flattened to the fields the node model carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    /// Canonical `CWE-<n>` ID.
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub severity: Option<String>,
    pub mitigations: Vec<String>,
    pub examples: Vec<String>,
}

impl Entity {
    /// Decode one entry object. `context` (usually the URL) is used in errors.
    ///
    /// Fails with [`ClientError::MissingField`] when there is no ID and with
    /// [`ClientError::Decode`] when `value` is not an object.
    pub fn from_value(value: &Value, context: &str) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| ClientError::Decode {
            context: context.to_string(),
            message: format!("expected an object, got {}", kind_of(value)),
        })?;

        let id = match field(obj, &["id"]) {
            Some(Value::String(s)) => normalize_id(s)?,
            Some(Value::Number(n)) => match n.as_u64() {
                Some(n) => format!("{}{n}", cwe::id::PREFIX),
                None => return Err(cwe::Error::InvalidId(n.to_string()).into()),
            },
            _ => {
                return Err(ClientError::MissingField {
                    context: context.to_string(),
                    field: "id",
                })
            }
        };

        Ok(Entity {
            id,
            name: text(obj, &["name"]).unwrap_or_default(),
            description: text(obj, &["description"]),
            url: text(obj, &["url"]),
            severity: text(obj, &["severity", "likelihoodofexploit"]),
            mitigations: flatten(field(obj, &["mitigations", "potentialmitigations"])),
            examples: flatten(field(obj, &["examples", "demonstrativeexamples"])),
        })
    }

    /// Decode the response of a single-entity endpoint.
    ///
    /// Accepts the bare entry or an envelope whose array has at least one
    /// element; the first element is used.
    pub fn from_response(value: &Value, kind: EntityKind, context: &str) -> Result<Self> {
        let entry = match value.as_object().and_then(|o| field(o, &[kind.envelope()])) {
            Some(Value::Array(items)) => items.first().ok_or_else(|| ClientError::Decode {
                context: context.to_string(),
                message: format!("empty `{}` envelope", kind.envelope()),
            })?,
            Some(other) => {
                return Err(ClientError::Decode {
                    context: context.to_string(),
                    message: format!("`{}` is {}, not an array", kind.envelope(), kind_of(other)),
                })
            }
            None => value,
        };
        Entity::from_value(entry, context)
    }

    /// Decode every entry of a multi-entity response, dropping the ones that
    /// do not parse.
    ///
    /// Accepts an ID-keyed object, an envelope holding any of the entity
    /// arrays, or a bare array.
    pub fn list_from_response(value: &Value, context: &str) -> Result<Vec<Self>> {
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(obj) if has_envelope(obj) => ENVELOPES
                .iter()
                .filter_map(|key| field(obj, &[*key]))
                .filter_map(Value::as_array)
                .flatten()
                .collect(),
            Value::Object(obj) => obj.values().collect(),
            other => {
                return Err(ClientError::Decode {
                    context: context.to_string(),
                    message: format!("expected an object or array, got {}", kind_of(other)),
                })
            }
        };

        Ok(items
            .into_iter()
            .filter_map(|item| match Entity::from_value(item, context) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    debug!("entity: skipping entry from {context}: {e}");
                    None
                }
            })
            .collect())
    }

    /// Build a detached node carrying this entry's fields.
    pub fn into_node(self) -> Node {
        let mut node = Node::new(self.id, self.name)
            .with_mitigations(self.mitigations)
            .with_examples(self.examples);
        if let Some(description) = self.description {
            node = node.with_description(description);
        }
        if let Some(url) = self.url {
            node = node.with_url(url);
        }
        if let Some(severity) = self.severity {
            node = node.with_severity(severity);
        }
        node
    }
}

// ---------------------------------------------------------------------------
// Relation lists
// ---------------------------------------------------------------------------

/// Decode the response of a relation endpoint into raw ID strings.
///
/// Entries may be strings, numbers, or objects carrying `cweId` / `id`.
/// Object entries whose `nature` is not parent-oriented are dropped. IDs are
/// returned as the service spelled them; callers normalize.
pub fn related_ids(value: &Value, context: &str) -> Result<Vec<String>> {
    let items = value.as_array().ok_or_else(|| ClientError::Decode {
        context: context.to_string(),
        message: format!("expected an array of IDs, got {}", kind_of(value)),
    })?;

    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) => ids.push(s.clone()),
            Value::Number(n) => ids.push(n.to_string()),
            Value::Object(obj) => {
                if let Some(nature) = text(obj, &["nature", "relationship"]) {
                    if !is_parent_relation(&nature) {
                        continue;
                    }
                }
                match field(obj, &["cweid", "cwe_id", "id"]) {
                    Some(Value::String(s)) => ids.push(s.clone()),
                    Some(Value::Number(n)) => ids.push(n.to_string()),
                    _ => debug!("entity: relation entry without an id in {context}"),
                }
            }
            _ => debug!("entity: ignoring {} in relation list from {context}", kind_of(item)),
        }
    }
    Ok(ids)
}

// --- helpers -----------------------------------------------------------------

/// First field matching any of `names`, ignoring ASCII case.
fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| {
        obj.iter()
            .find(|(k, v)| k.eq_ignore_ascii_case(name) && !v.is_null())
            .map(|(_, v)| v)
    })
}

fn text(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    field(obj, names)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn has_envelope(obj: &Map<String, Value>) -> bool {
    ENVELOPES
        .iter()
        .any(|key| matches!(field(obj, &[*key]), Some(Value::Array(_))))
}

/// Flatten a mitigation or example list into strings.
///
/// Strings are taken as-is; objects contribute their `Description`,
/// `IntroText`, or `Text`, whichever comes first.
fn flatten(value: Option<&Value>) -> Vec<String> {
    let items = match value {
        Some(Value::Array(items)) => items.as_slice(),
        Some(single @ (Value::String(_) | Value::Object(_))) => std::slice::from_ref(single),
        _ => return Vec::new(),
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(obj) => text(obj, &["description", "introtext", "text"]),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
