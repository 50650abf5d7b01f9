//! Read/write object sets and ownership trees as JSON snapshots.

use crate::object::Object;
use crate::query::ObjectStore;
use crate::tree::ObjectTreeNode;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

const CURRENT_VERSION: &str = "1.0.0";

/// A point-in-time copy of a set of objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSnapshot {
    pub version: String,
    pub captured_at: DateTime<Utc>,
    pub objects: Vec<Object>,
}

/// A point-in-time ownership tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSnapshot {
    pub version: String,
    pub captured_at: DateTime<Utc>,
    pub tree: ObjectTreeNode,
}

impl ObjectSnapshot {
    pub fn new(objects: Vec<Object>) -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            captured_at: Utc::now(),
            objects,
        }
    }

    pub fn into_store(self) -> ObjectStore {
        self.objects.into_iter().collect()
    }
}

impl TreeSnapshot {
    pub fn new(tree: ObjectTreeNode) -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            captured_at: Utc::now(),
            tree,
        }
    }
}

fn validate_version(version: &str) -> Result<()> {
    if version != CURRENT_VERSION {
        anyhow::bail!(
            "snapshot version mismatch: expected {}, found {}",
            CURRENT_VERSION,
            version
        );
    }
    Ok(())
}

/// Parse objects from any of: a snapshot, a `List` with `items`, or a bare array.
pub fn objects_from_json(json: &str) -> Result<Vec<Object>> {
    let value: Value = serde_json::from_str(json).context("failed to parse objects JSON")?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            if let Some(version) = map.get("version").and_then(Value::as_str) {
                validate_version(version)?;
            }
            match map.remove("objects").or_else(|| map.remove("items")) {
                Some(Value::Array(items)) => items,
                _ => anyhow::bail!("expected an `objects` or `items` array"),
            }
        }
        _ => anyhow::bail!("expected a JSON array or object"),
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            if item.is_object() {
                Ok(Object::new(item))
            } else {
                anyhow::bail!("entry {} is not an object", i)
            }
        })
        .collect()
}

/// Load objects from a file into an in-memory store.
pub fn load_store(path: &Path) -> Result<ObjectStore> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read objects from {}", path.display()))?;
    let objects = objects_from_json(&json)
        .with_context(|| format!("invalid objects in {}", path.display()))?;
    Ok(objects.into_iter().collect())
}

pub fn save_objects(path: &Path, snapshot: &ObjectSnapshot) -> Result<()> {
    write_json(path, snapshot)
}

pub fn save_tree(path: &Path, snapshot: &TreeSnapshot) -> Result<()> {
    write_json(path, snapshot)
}

pub fn load_tree(path: &Path) -> Result<TreeSnapshot> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read tree from {}", path.display()))?;
    let snapshot: TreeSnapshot =
        serde_json::from_str(&json).context("failed to deserialize tree snapshot")?;
    validate_version(&snapshot.version)?;
    Ok(snapshot)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("failed to serialize snapshot")?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
