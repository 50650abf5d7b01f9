//! Object identity types and the unstructured object model.

use crate::error::{LookupError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A resource schema: group, version, and kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Parse an `apiVersion` string and pair it with `kind`.
    pub fn parse(api_version: &str, kind: &str) -> Result<Self> {
        let (group, version) = parse_group_version(api_version)?;
        Ok(Self::new(group, version, kind))
    }

    /// The `apiVersion` form: `version` for the core group, else `group/version`.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// Split `group/version`. An empty string or a lone `/` is the empty
/// group-version, a string without `/` is a core-group version.
fn parse_group_version(api_version: &str) -> Result<(String, String)> {
    if api_version.is_empty() || api_version == "/" {
        return Ok((String::new(), String::new()));
    }
    match api_version.split_once('/') {
        None => Ok((String::new(), api_version.to_string())),
        Some((group, version)) if !version.contains('/') => {
            Ok((group.to_string(), version.to_string()))
        }
        Some(_) => Err(LookupError::InvalidGroupVersion(api_version.to_string())),
    }
}

/// A resource schema in its declarative `apiVersion` + `kind` form, as it
/// appears in ownership rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectType {
    pub api_version: String,
    pub kind: String,
}

impl ObjectType {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }

    pub fn to_gvk(&self) -> Result<GroupVersionKind> {
        GroupVersionKind::parse(&self.api_version, &self.kind)
    }
}

impl From<&GroupVersionKind> for ObjectType {
    fn from(gvk: &GroupVersionKind) -> Self {
        Self::new(gvk.api_version(), gvk.kind.clone())
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version, self.kind)
    }
}

/// Fully qualified identity of one concrete resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
}

impl ObjectReference {
    pub fn object_type(&self) -> ObjectType {
        ObjectType::new(self.api_version.clone(), self.kind.clone())
    }

    pub fn key(&self) -> Result<ObjectKey> {
        Ok(ObjectKey {
            gvk: GroupVersionKind::parse(&self.api_version, &self.kind)?,
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        })
    }

    /// Numeric resource version, 0 when absent or not a number.
    pub fn revision(&self) -> i64 {
        parse_revision(&self.resource_version)
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} {}", self.kind, self.name)
        } else {
            write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// Identity used to deduplicate objects: type plus namespaced name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub gvk: GroupVersionKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(
        gvk: GroupVersionKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            gvk,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} {}", self.gvk.kind, self.name)
        } else {
            write!(f, "{} {}/{}", self.gvk.kind, self.namespace, self.name)
        }
    }
}

/// Parse a resource version; anything that is not an integer counts as 0.
pub fn parse_revision(resource_version: &str) -> i64 {
    resource_version.parse().unwrap_or(0)
}

/// An unstructured resource: `apiVersion`, `kind`, `metadata`, and an
/// arbitrary body, as returned by the API server or a cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Object(Value);

impl Object {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn api_version(&self) -> Option<&str> {
        self.0.get("apiVersion").and_then(Value::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.0.get("kind").and_then(Value::as_str)
    }

    fn metadata_str(&self, field: &str) -> &str {
        self.0
            .get("metadata")
            .and_then(|m| m.get(field))
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.metadata_str("name")
    }

    pub fn namespace(&self) -> &str {
        self.metadata_str("namespace")
    }

    pub fn uid(&self) -> &str {
        self.metadata_str("uid")
    }

    pub fn resource_version(&self) -> &str {
        self.metadata_str("resourceVersion")
    }

    /// String-valued labels; non-string values are ignored.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.0
            .get("metadata")
            .and_then(|m| m.get("labels"))
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Follow a dotted field path such as `spec.selector.matchLabels`.
    /// Numeric segments index into arrays.
    pub fn field(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(&self.0, |current, segment| match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }

    /// Human-readable name for error messages: `Kind ns/name`.
    pub fn display_name(&self) -> String {
        let kind = self.kind().unwrap_or("<unknown>");
        if self.namespace().is_empty() {
            format!("{} {}", kind, self.name())
        } else {
            format!("{} {}/{}", kind, self.namespace(), self.name())
        }
    }

    /// Build a reference once the object's type is known.
    pub fn reference(&self, gvk: &GroupVersionKind) -> ObjectReference {
        ObjectReference {
            api_version: gvk.api_version(),
            kind: gvk.kind.clone(),
            namespace: self.namespace().to_string(),
            name: self.name().to_string(),
            uid: self.uid().to_string(),
            resource_version: self.resource_version().to_string(),
        }
    }

    pub fn key(&self, gvk: &GroupVersionKind) -> ObjectKey {
        ObjectKey::new(gvk.clone(), self.namespace(), self.name())
    }
}

impl From<Value> for Object {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
