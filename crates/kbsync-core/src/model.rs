//! Resource model shared by the binder, the reconciler and the apply driver
//!
//! - [`ResourceKind`]: the closed set of managed object kinds
//! - [`DesiredState`]: what the caller wants to exist
//! - [`Identity`]: the stable handle of an object once it exists
//! - [`RemoteState`]: what the remote store currently holds

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::compare::is_valid_json;
use crate::error::{Error, Result};

/// Kinds of remote objects managed by kbsync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Index pattern managed through the index pattern API (server-assigned id)
    IndexPattern,
    /// Generic saved object of type `index-pattern` (caller-assigned id)
    FreeformObject,
    /// Per-space log source configuration (singleton)
    LogPatternSet,
}

impl ResourceKind {
    /// Stable name used in logs and manifests
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::IndexPattern => "index_pattern",
            ResourceKind::FreeformObject => "freeform_object",
            ResourceKind::LogPatternSet => "log_pattern_set",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a managed object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Object does not exist remotely (initial state, and after delete)
    Absent,
    /// Object exists remotely
    Present,
}

/// Caller-declared target description of an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    /// Object kind
    pub kind: ResourceKind,
    /// Space the object lives in
    pub space: String,
    /// Object name. Title for index patterns, id for free-form objects,
    /// ignored for log pattern sets.
    #[serde(default)]
    pub name: String,
    /// Raw JSON body
    pub body: String,
}

/// Kind-specific content extracted from a validated [`DesiredState`]
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Index pattern title and optional time field
    IndexPattern {
        title: String,
        time_field_name: Option<String>,
    },
    /// Full saved-object document, sent as-is
    FreeformObject(Value),
    /// Ordered log index patterns
    LogPatternSet(Vec<String>),
}

impl DesiredState {
    /// Create a new desired state
    pub fn new(
        kind: ResourceKind,
        space: impl Into<String>,
        name: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            space: space.into(),
            name: name.into(),
            body: body.into(),
        }
    }

    /// Validate the body and extract the kind-specific payload.
    ///
    /// Never touches the network. Every failure is [`Error::Validation`].
    pub fn payload(&self) -> Result<Payload> {
        check_segment("space", &self.space)?;

        if !is_valid_json(&self.body) {
            return Err(Error::validation(format!("body of {} is not valid JSON", self.kind)));
        }
        let body: Value = serde_json::from_str(&self.body).map_err(|e| {
            Error::validation(format!("body of {} is not valid JSON: {}", self.kind, e))
        })?;

        match self.kind {
            ResourceKind::IndexPattern => {
                let fields = body.as_object().ok_or_else(|| {
                    Error::validation("index pattern body must be a JSON object")
                })?;

                let title = if self.name.is_empty() {
                    fields
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                } else {
                    self.name.clone()
                };
                if title.is_empty() {
                    return Err(Error::validation(
                        "index pattern needs a name (or a \"title\" in its body)",
                    ));
                }

                let time_field_name = match fields.get("timeFieldName") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(_) => {
                        return Err(Error::validation("timeFieldName must be a string"));
                    }
                };

                Ok(Payload::IndexPattern {
                    title,
                    time_field_name,
                })
            }
            ResourceKind::FreeformObject => {
                check_segment("name", &self.name)?;
                if !body.is_object() {
                    return Err(Error::validation("saved object body must be a JSON object"));
                }
                Ok(Payload::FreeformObject(body))
            }
            ResourceKind::LogPatternSet => {
                let items = body.as_array().ok_or_else(|| {
                    Error::validation("log pattern set body must be a JSON array of strings")
                })?;

                let mut patterns = Vec::with_capacity(items.len());
                for item in items {
                    let pattern = item.as_str().ok_or_else(|| {
                        Error::validation("log pattern set body must be a JSON array of strings")
                    })?;
                    // Both would read back as a different list.
                    if pattern.is_empty() {
                        return Err(Error::validation("log patterns must not be empty"));
                    }
                    if pattern.contains(',') {
                        return Err(Error::validation(format!(
                            "log pattern '{}' must not contain ','",
                            pattern
                        )));
                    }
                    patterns.push(pattern.to_string());
                }
                Ok(Payload::LogPatternSet(patterns))
            }
        }
    }
}

/// Path segments are interpolated verbatim into request paths.
fn check_segment(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", field)));
    }
    if value.contains(['/', '?', '#']) {
        return Err(Error::validation(format!(
            "{} '{}' contains a reserved character ('/', '?' or '#')",
            field, value
        )));
    }
    Ok(())
}

/// Stable address of a remote object.
///
/// Opaque to callers: persist it and hand it back, never rebuild it from
/// other fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Space the object lives in
    pub space: String,
    /// Caller name, server id or local token, depending on the kind
    pub key: String,
}

impl Identity {
    pub fn new(space: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.space, self.key)
    }
}

/// Object as currently stored remotely, server-owned fields included.
///
/// `document` is the kind's canonical shape:
/// - index pattern: the object inside the `index_pattern` envelope
/// - free-form object: the saved object exactly as returned
/// - log pattern set: `{"logAlias": "<comma-joined patterns>"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteState {
    pub kind: ResourceKind,
    pub document: Value,
}

impl RemoteState {
    pub fn new(kind: ResourceKind, document: Value) -> Self {
        Self { kind, document }
    }

    /// Index pattern title, if present
    pub fn title(&self) -> Option<&str> {
        self.document.get("title").and_then(Value::as_str)
    }

    /// Ordered log patterns, if this is a log pattern set
    pub fn patterns(&self) -> Option<Vec<String>> {
        self.document
            .get("logAlias")
            .and_then(Value::as_str)
            .map(split_patterns)
    }
}

/// Serialize an ordered pattern list into the single alias string
pub fn join_patterns(patterns: &[String]) -> String {
    patterns.join(",")
}

/// Inverse of [`join_patterns`]. An empty alias is an empty list.
pub fn split_patterns(alias: &str) -> Vec<String> {
    if alias.is_empty() {
        return Vec::new();
    }
    alias.split(',').map(str::to_string).collect()
}
