use kb_view::LookupError;
use kb_view::object::{GroupVersionKind, Object, ObjectKey, ObjectType};
use kb_view::query::{ObjectStore, QueryContext};
use kb_view::reach::ReachabilitySetCollector;
use kb_view::rules::{MatchingLabels, OwnedResource, OwnershipCriteria, OwnershipRule, RuleSet};
use kb_view::scheme::TypeMetaResolver;
use kb_view::tree::TreeBuilder;
use serde_json::json;
use std::collections::BTreeSet;

fn object(api_version: &str, kind: &str, name: &str, labels: serde_json::Value) -> Object {
    Object::new(json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": {"name": name, "namespace": "default", "labels": labels}
    }))
}

fn cluster() -> Object {
    object("apps.kubeblocks.io/v1", "Cluster", "mycluster", json!({}))
}

fn labels(pairs: &[(&str, &str)]) -> MatchingLabels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn owned(kind_api: (&str, &str), criteria: OwnershipCriteria) -> OwnedResource {
    OwnedResource {
        secondary: ObjectType::new(kind_api.1, kind_api.0),
        criteria,
    }
}

fn fixture_rules() -> Vec<OwnershipRule> {
    vec![
        OwnershipRule {
            primary: ObjectType::new("apps.kubeblocks.io/v1", "Cluster"),
            owned_resources: vec![owned(
                ("Pod", "v1"),
                OwnershipCriteria::LabelCriteria(labels(&[("app", "X")])),
            )],
        },
        OwnershipRule {
            primary: ObjectType::new("v1", "Pod"),
            owned_resources: vec![owned(
                ("ConfigMap", "v1"),
                OwnershipCriteria::LabelCriteria(labels(&[("owner", "$(primary.name)")])),
            )],
        },
    ]
}

fn fixture_store() -> ObjectStore {
    vec![
        cluster(),
        object("v1", "Pod", "pod-0", json!({"app": "X"})),
        object("v1", "Pod", "pod-1", json!({"app": "X"})),
        object("v1", "ConfigMap", "cm-0", json!({"owner": "pod-0"})),
        object("v1", "ConfigMap", "cm-1", json!({"owner": "pod-1"})),
        object("v1", "ConfigMap", "unrelated", json!({"owner": "nobody"})),
    ]
    .into_iter()
    .collect()
}

fn key(kind: &str, name: &str) -> ObjectKey {
    let gvk = if kind == "Cluster" {
        GroupVersionKind::new("apps.kubeblocks.io", "v1", kind)
    } else {
        GroupVersionKind::new("", "v1", kind)
    };
    ObjectKey::new(gvk, "default", name)
}

#[test]
fn test_collects_every_reachable_object() {
    let rules = RuleSet::new(fixture_rules()).unwrap();
    let store = fixture_store();
    let set = ReachabilitySetCollector::new(&rules, &store, &TypeMetaResolver)
        .collect(&QueryContext::new(), &cluster())
        .unwrap();

    assert_eq!(set.len(), 5);
    assert_eq!(set.objects.len(), 5);
    for (kind, name) in [
        ("Cluster", "mycluster"),
        ("Pod", "pod-0"),
        ("Pod", "pod-1"),
        ("ConfigMap", "cm-0"),
        ("ConfigMap", "cm-1"),
    ] {
        assert!(set.contains(&key(kind, name)), "missing {kind} {name}");
    }
    assert!(!set.contains(&key("ConfigMap", "unrelated")));
    assert_eq!(set.get(&key("Pod", "pod-0")).unwrap().name(), "pod-0");
    assert_eq!(set.of_kind("ConfigMap").count(), 2);
}

#[test]
fn test_duplicate_rules_do_not_duplicate_objects() {
    // The cluster owns the same pods through two independent rules.
    let mut rules = fixture_rules();
    rules.push(OwnershipRule {
        primary: ObjectType::new("apps.kubeblocks.io/v1", "Cluster"),
        owned_resources: vec![owned(
            ("Pod", "v1"),
            OwnershipCriteria::LabelCriteria(MatchingLabels::new()),
        )],
    });
    let rules = RuleSet::new(rules).unwrap();
    let store = fixture_store();
    let set = ReachabilitySetCollector::new(&rules, &store, &TypeMetaResolver)
        .collect(&QueryContext::new(), &cluster())
        .unwrap();

    assert_eq!(set.len(), 5);
    assert_eq!(set.of_kind("Pod").count(), 2);
}

#[test]
fn test_matches_tree_builder_reachable_set() {
    let rules = RuleSet::new(fixture_rules()).unwrap();
    let store = fixture_store();
    let ctx = QueryContext::new();
    let set = ReachabilitySetCollector::new(&rules, &store, &TypeMetaResolver)
        .collect(&ctx, &cluster())
        .unwrap();
    let tree = TreeBuilder::new(&rules, &store, &TypeMetaResolver)
        .build(&ctx, &cluster())
        .unwrap();

    let from_tree: BTreeSet<ObjectKey> = tree
        .references()
        .into_iter()
        .map(|r| r.key().unwrap())
        .collect();
    assert_eq!(from_tree, set.keys);
}

#[test]
fn test_rule_cycle_terminates() {
    // Pods own every pod with the same app label, including themselves.
    let mut rules = fixture_rules();
    rules.push(OwnershipRule {
        primary: ObjectType::new("v1", "Pod"),
        owned_resources: vec![owned(
            ("Pod", "v1"),
            OwnershipCriteria::LabelCriteria(labels(&[("app", "$(primary)")])),
        )],
    });
    let rules = RuleSet::new(rules).unwrap();
    let store = fixture_store();
    let set = ReachabilitySetCollector::new(&rules, &store, &TypeMetaResolver)
        .collect(&QueryContext::new(), &cluster())
        .unwrap();
    assert_eq!(set.len(), 5);
}

#[test]
fn test_root_without_type_meta_fails() {
    let rules = RuleSet::new(fixture_rules()).unwrap();
    let store = fixture_store();
    let root = Object::new(json!({"metadata": {"name": "nameless"}}));
    let err = ReachabilitySetCollector::new(&rules, &store, &TypeMetaResolver)
        .collect(&QueryContext::new(), &root)
        .unwrap_err();
    assert!(matches!(err, LookupError::MissingTypeMeta(_)));
}

#[test]
fn test_bad_secondary_shape_fails_without_partial_result() {
    let rules = RuleSet::new(fixture_rules()).unwrap();
    let mut store = fixture_store();
    store.insert(Object::new(json!(["not", "an", "object"])));
    let result = ReachabilitySetCollector::new(&rules, &store, &TypeMetaResolver)
        .collect(&QueryContext::new(), &cluster());
    assert!(matches!(result, Err(LookupError::UnexpectedShape { .. })));
}
