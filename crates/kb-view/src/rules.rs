//! Ownership rules and the matcher that turns them into concrete queries.
//!
//! A rule says "objects of type P own objects of type S found by criteria C".
//! Rules are matched by exact group/version/kind equality on the primary; there
//! are no wildcards and no kind hierarchy.

use crate::error::{LookupError, Result};
use crate::object::{GroupVersionKind, Object, ObjectType};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Label key/value pairs that must all be present on a matching object.
pub type MatchingLabels = BTreeMap<String, String>;

/// Label value replaced by the primary's name.
pub const PRIMARY_NAME: &str = "$(primary.name)";
/// Label value replaced by the primary's namespace.
pub const PRIMARY_NAMESPACE: &str = "$(primary.namespace)";
/// Label value replaced by the primary's own value for the same label key.
pub const PRIMARY_LABEL: &str = "$(primary)";

/// One primary type and everything it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipRule {
    pub primary: ObjectType,
    #[serde(default)]
    pub owned_resources: Vec<OwnedResource>,
}

/// A secondary type owned by the rule's primary, and how to find instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedResource {
    pub secondary: ObjectType,
    pub criteria: OwnershipCriteria,
}

/// How owned instances are located.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OwnershipCriteria {
    /// Use the label map found at a field path of the primary,
    /// e.g. `spec.selector.matchLabels`.
    SelectorCriteria { path: String },
    /// A fixed label template; see [`PRIMARY_NAME`], [`PRIMARY_NAMESPACE`]
    /// and [`PRIMARY_LABEL`].
    LabelCriteria(MatchingLabels),
}

impl OwnershipCriteria {
    /// Materialize the criteria into a label selector for `primary`.
    pub fn matching_labels(&self, primary: &Object) -> Result<MatchingLabels> {
        match self {
            Self::SelectorCriteria { path } => parse_selector(primary, path),
            Self::LabelCriteria(template) => Ok(parse_labels(primary, template)),
        }
    }
}

fn parse_selector(primary: &Object, path: &str) -> Result<MatchingLabels> {
    let value = primary.field(path).ok_or_else(|| LookupError::FieldPath {
        path: path.to_string(),
        object: primary.display_name(),
    })?;
    // A full label selector carries its map under matchLabels.
    let map = match value.get("matchLabels") {
        Some(inner) => inner,
        None => value,
    };
    let not_label_map = || LookupError::NotLabelMap {
        path: path.to_string(),
        object: primary.display_name(),
    };
    map.as_object()
        .ok_or_else(not_label_map)?
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => Ok((k.clone(), s.clone())),
            _ => Err(not_label_map()),
        })
        .collect()
}

fn parse_labels(primary: &Object, template: &MatchingLabels) -> MatchingLabels {
    let own_labels = primary.labels();
    template
        .iter()
        .map(|(key, value)| {
            let resolved = if value == PRIMARY_LABEL {
                own_labels.get(key).cloned().unwrap_or_default()
            } else {
                value
                    .replace(PRIMARY_NAME, primary.name())
                    .replace(PRIMARY_NAMESPACE, primary.namespace())
            };
            (key.clone(), resolved)
        })
        .collect()
}

/// A concrete list request derived from one owned resource of a matched rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryQuery {
    pub object_type: GroupVersionKind,
    /// Empty means all namespaces.
    pub namespace: String,
    pub selector: MatchingLabels,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    primary: GroupVersionKind,
    secondaries: Vec<GroupVersionKind>,
}

/// An immutable, pre-parsed rule set. Every type string is parsed when the
/// set is built, so an unparseable rule fails before any query is issued.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<OwnershipRule>,
    compiled: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<OwnershipRule>) -> Result<Self> {
        let compiled = rules
            .iter()
            .map(|rule| -> Result<CompiledRule> {
                Ok(CompiledRule {
                    primary: rule.primary.to_gvk()?,
                    secondaries: rule
                        .owned_resources
                        .iter()
                        .map(|owned| owned.secondary.to_gvk())
                        .collect::<Result<_>>()?,
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self { rules, compiled })
    }

    /// Parse rules from a JSON array.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let rules: Vec<OwnershipRule> =
            serde_json::from_str(json).context("failed to deserialize ownership rules")?;
        Ok(Self::new(rules)?)
    }

    /// Load rules from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rules from {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("invalid rules in {}", path.display()))
    }

    pub fn rules(&self) -> &[OwnershipRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules whose primary is exactly `gvk`, in declaration order.
    pub fn matching<'a>(
        &'a self,
        gvk: &'a GroupVersionKind,
    ) -> impl Iterator<Item = &'a OwnershipRule> + 'a {
        self.rules
            .iter()
            .zip(&self.compiled)
            .filter(move |(_, compiled)| &compiled.primary == gvk)
            .map(|(rule, _)| rule)
    }

    /// One query per owned resource of every rule matching `gvk`.
    ///
    /// With `namespaced` set, queries are restricted to the primary's
    /// namespace; a cluster-scoped primary still queries all namespaces.
    pub fn secondary_queries(
        &self,
        primary: &Object,
        gvk: &GroupVersionKind,
        namespaced: bool,
    ) -> Result<Vec<SecondaryQuery>> {
        let namespace = if namespaced {
            primary.namespace().to_string()
        } else {
            String::new()
        };
        let mut queries = Vec::new();
        for (rule, compiled) in self.rules.iter().zip(&self.compiled) {
            if &compiled.primary != gvk {
                continue;
            }
            for (owned, secondary) in rule.owned_resources.iter().zip(&compiled.secondaries) {
                queries.push(SecondaryQuery {
                    object_type: secondary.clone(),
                    namespace: namespace.clone(),
                    selector: owned.criteria.matching_labels(primary)?,
                });
            }
        }
        Ok(queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cluster() -> Object {
        Object::new(json!({
            "apiVersion": "apps.kubeblocks.io/v1",
            "kind": "Cluster",
            "metadata": {
                "name": "mycluster",
                "namespace": "demo",
                "labels": {"tenant": "acme"}
            },
            "spec": {
                "selector": {"matchLabels": {"app.kubernetes.io/instance": "mycluster"}},
                "plainLabels": {"role": "primary"},
                "badLabels": {"replicas": 3}
            }
        }))
    }

    #[test]
    fn test_label_criteria_template() {
        let mut template = MatchingLabels::new();
        template.insert("app.kubernetes.io/instance".into(), PRIMARY_NAME.into());
        template.insert("scope".into(), format!("{}-{}", PRIMARY_NAMESPACE, PRIMARY_NAME));
        template.insert("tenant".into(), PRIMARY_LABEL.into());
        template.insert("managed-by".into(), "kubeblocks".into());

        let labels = OwnershipCriteria::LabelCriteria(template)
            .matching_labels(&cluster())
            .unwrap();
        assert_eq!(labels["app.kubernetes.io/instance"], "mycluster");
        assert_eq!(labels["scope"], "demo-mycluster");
        assert_eq!(labels["tenant"], "acme");
        assert_eq!(labels["managed-by"], "kubeblocks");
    }

    #[test]
    fn test_selector_criteria_reads_label_selector() {
        let criteria = OwnershipCriteria::SelectorCriteria {
            path: "spec.selector".into(),
        };
        let labels = criteria.matching_labels(&cluster()).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["app.kubernetes.io/instance"], "mycluster");

        let plain = OwnershipCriteria::SelectorCriteria {
            path: "spec.plainLabels".into(),
        };
        assert_eq!(plain.matching_labels(&cluster()).unwrap()["role"], "primary");
    }

    #[test]
    fn test_selector_criteria_missing_path() {
        let criteria = OwnershipCriteria::SelectorCriteria {
            path: "spec.nothing".into(),
        };
        let err = criteria.matching_labels(&cluster()).unwrap_err();
        assert!(matches!(err, LookupError::FieldPath { .. }));
    }

    #[test]
    fn test_selector_criteria_rejects_non_string_values() {
        let criteria = OwnershipCriteria::SelectorCriteria {
            path: "spec.badLabels".into(),
        };
        let err = criteria.matching_labels(&cluster()).unwrap_err();
        assert!(matches!(err, LookupError::NotLabelMap { .. }));
    }

    #[test]
    fn test_rule_serde_shape() {
        let rules = RuleSet::from_json(
            r#"[{
                "primary": {"apiVersion": "apps.kubeblocks.io/v1", "kind": "Cluster"},
                "ownedResources": [
                    {"secondary": {"apiVersion": "v1", "kind": "Service"},
                     "criteria": {"labelCriteria": {
                         "app.kubernetes.io/instance": "$(primary.name)"
                     }}},
                    {"secondary": {"apiVersion": "apps/v1", "kind": "StatefulSet"},
                     "criteria": {"selectorCriteria": {"path": "spec.selector"}}}
                ]
            }]"#,
        )
        .unwrap();
        assert_eq!(rules.len(), 1);

        let gvk = GroupVersionKind::new("apps.kubeblocks.io", "v1", "Cluster");
        let queries = rules.secondary_queries(&cluster(), &gvk, true).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].object_type.kind, "Service");
        assert_eq!(queries[0].namespace, "demo");
        assert_eq!(queries[1].object_type.group, "apps");
    }

    #[test]
    fn test_matching_is_exact() {
        let rules = RuleSet::new(vec![OwnershipRule {
            primary: ObjectType::new("apps.kubeblocks.io/v1", "Cluster"),
            owned_resources: Vec::new(),
        }])
        .unwrap();
        let exact = GroupVersionKind::new("apps.kubeblocks.io", "v1", "Cluster");
        let other_version = GroupVersionKind::new("apps.kubeblocks.io", "v1alpha1", "Cluster");
        assert_eq!(rules.matching(&exact).count(), 1);
        assert_eq!(rules.matching(&other_version).count(), 0);
    }

    #[test]
    fn test_unparseable_rule_type_fails() {
        let err = RuleSet::new(vec![OwnershipRule {
            primary: ObjectType::new("a/b/c", "Cluster"),
            owned_resources: Vec::new(),
        }])
        .unwrap_err();
        assert!(matches!(err, LookupError::InvalidGroupVersion(_)));
    }

    #[test]
    fn test_unnamespaced_queries() {
        let rules = RuleSet::new(vec![OwnershipRule {
            primary: ObjectType::new("apps.kubeblocks.io/v1", "Cluster"),
            owned_resources: vec![OwnedResource {
                secondary: ObjectType::new("v1", "Pod"),
                criteria: OwnershipCriteria::LabelCriteria(MatchingLabels::new()),
            }],
        }])
        .unwrap();
        let gvk = GroupVersionKind::new("apps.kubeblocks.io", "v1", "Cluster");
        let queries = rules.secondary_queries(&cluster(), &gvk, false).unwrap();
        assert_eq!(queries[0].namespace, "");
    }
}
