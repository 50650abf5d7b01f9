//! Integration tests for kb-cli functionality.
//! Tests the underlying library functions that the CLI commands invoke.

use kb_core::config::KbConfig;
use kb_core::plan::PlanFile;
use kb_view::query::QueryContext;
use kb_view::reach::ReachabilitySetCollector;
use kb_view::rules::RuleSet;
use kb_view::scheme::TypeMetaResolver;
use kb_view::snapshot::{self, ObjectSnapshot, TreeSnapshot};
use kb_view::tree::{TreeBuilder, format_tree};
use serde_json::json;
use std::fs;
use std::path::Path;

const RULES: &str = r#"[
  {
    "primary": {"apiVersion": "apps.kubeblocks.io/v1", "kind": "Cluster"},
    "ownedResources": [
      {
        "secondary": {"apiVersion": "apps/v1", "kind": "StatefulSet"},
        "criteria": {"labelCriteria": {"app.kubernetes.io/instance": "$(primary.name)"}}
      }
    ]
  },
  {
    "primary": {"apiVersion": "apps/v1", "kind": "StatefulSet"},
    "ownedResources": [
      {
        "secondary": {"apiVersion": "v1", "kind": "Pod"},
        "criteria": {"selectorCriteria": {"path": "spec.selector"}}
      }
    ]
  }
]"#;

fn write_fixture(dir: &Path) {
    let objects = json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": [
            {
                "apiVersion": "apps.kubeblocks.io/v1",
                "kind": "Cluster",
                "metadata": {"name": "mycluster", "namespace": "demo"}
            },
            {
                "apiVersion": "apps/v1",
                "kind": "StatefulSet",
                "metadata": {
                    "name": "mycluster-mysql",
                    "namespace": "demo",
                    "labels": {"app.kubernetes.io/instance": "mycluster"}
                },
                "spec": {"selector": {"matchLabels": {"component": "mysql"}}}
            },
            {
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {
                    "name": "mycluster-mysql-0",
                    "namespace": "demo",
                    "labels": {"component": "mysql"}
                }
            },
            {
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {
                    "name": "other-0",
                    "namespace": "demo",
                    "labels": {"component": "redis"}
                }
            }
        ]
    });
    fs::write(dir.join("objects.json"), objects.to_string()).unwrap();
    fs::write(dir.join("rules.json"), RULES).unwrap();
}

#[test]
fn test_tree_from_files() {
    let tmpdir = tempfile::tempdir().unwrap();
    write_fixture(tmpdir.path());

    let store = snapshot::load_store(&tmpdir.path().join("objects.json")).unwrap();
    let rules = RuleSet::load(&tmpdir.path().join("rules.json")).unwrap();
    let root = store.find("Cluster", "demo", "mycluster").unwrap().clone();
    let config = KbConfig::load(tmpdir.path()).unwrap();

    let tree = TreeBuilder::new(&rules, &store, &TypeMetaResolver)
        .with_config(&config.view)
        .build(&QueryContext::new(), &root)
        .unwrap();

    assert_eq!(tree.node_count(), 3);
    let text = format_tree(&tree);
    assert!(text.starts_with("Cluster demo/mycluster\n"));
    assert!(text.contains("└── StatefulSet demo/mycluster-mysql\n"));
    assert!(text.contains("    └── Pod demo/mycluster-mysql-0\n"));
    assert!(!text.contains("other-0"));
}

#[test]
fn test_objects_from_files() {
    let tmpdir = tempfile::tempdir().unwrap();
    write_fixture(tmpdir.path());

    let store = snapshot::load_store(&tmpdir.path().join("objects.json")).unwrap();
    let rules = RuleSet::load(&tmpdir.path().join("rules.json")).unwrap();
    let root = store.find("Cluster", "demo", "mycluster").unwrap().clone();

    let set = ReachabilitySetCollector::new(&rules, &store, &TypeMetaResolver)
        .collect(&QueryContext::new(), &root)
        .unwrap();
    assert_eq!(set.len(), 3);
    assert_eq!(set.of_kind("Pod").count(), 1);
}

#[test]
fn test_tree_snapshot_roundtrip() {
    let tmpdir = tempfile::tempdir().unwrap();
    write_fixture(tmpdir.path());

    let store = snapshot::load_store(&tmpdir.path().join("objects.json")).unwrap();
    let rules = RuleSet::load(&tmpdir.path().join("rules.json")).unwrap();
    let root = store.find("Cluster", "demo", "mycluster").unwrap().clone();
    let tree = TreeBuilder::new(&rules, &store, &TypeMetaResolver)
        .build(&QueryContext::new(), &root)
        .unwrap();

    let path = tmpdir.path().join("out").join("tree.json");
    snapshot::save_tree(&path, &TreeSnapshot::new(tree.clone())).unwrap();
    assert_eq!(snapshot::load_tree(&path).unwrap().tree, tree);
}

#[test]
fn test_object_snapshot_reload() {
    let tmpdir = tempfile::tempdir().unwrap();
    write_fixture(tmpdir.path());

    let store = snapshot::load_store(&tmpdir.path().join("objects.json")).unwrap();
    let objects: Vec<_> = store.iter().cloned().collect();
    let path = tmpdir.path().join("snapshot.json");
    snapshot::save_objects(&path, &ObjectSnapshot::new(objects)).unwrap();

    let reloaded = snapshot::load_store(&path).unwrap();
    assert_eq!(reloaded.len(), store.len());
}

#[test]
fn test_rules_load_nonexistent() {
    let tmpdir = tempfile::tempdir().unwrap();
    assert!(RuleSet::load(&tmpdir.path().join("rules.json")).is_err());
}

#[test]
fn test_rules_with_bad_group_version() {
    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join("rules.json");
    fs::write(
        &path,
        r#"[{"primary": {"apiVersion": "a/b/c", "kind": "Cluster"}}]"#,
    )
    .unwrap();
    assert!(RuleSet::load(&path).is_err());
}

#[test]
fn test_config_from_project_dir() {
    let tmpdir = tempfile::tempdir().unwrap();
    let config_path = KbConfig::path(tmpdir.path());
    fs::create_dir_all(config_path.parent().unwrap()).unwrap();
    fs::write(&config_path, "[view]\nmax_tree_depth = 1\n").unwrap();
    write_fixture(tmpdir.path());

    let config = KbConfig::load(tmpdir.path()).unwrap();
    assert_eq!(config.view.max_tree_depth, 1);

    let store = snapshot::load_store(&tmpdir.path().join("objects.json")).unwrap();
    let rules = RuleSet::load(&tmpdir.path().join("rules.json")).unwrap();
    let root = store.find("Cluster", "demo", "mycluster").unwrap().clone();
    let result = TreeBuilder::new(&rules, &store, &TypeMetaResolver)
        .with_config(&config.view)
        .build(&QueryContext::new(), &root);
    assert!(result.is_err(), "depth 1 cannot hold a cluster with owned objects");
}

#[test]
fn test_plan_file_order() {
    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join("plan.json");
    fs::write(
        &path,
        r#"{"vertices": ["cluster", "sts", "pod"], "edges": [["cluster", "sts"], ["sts", "pod"]]}"#,
    )
    .unwrap();

    let dag = PlanFile::load(&path).unwrap().to_dag().unwrap();
    let names = |reverse: bool| -> Vec<String> {
        dag.topological_order(reverse)
            .unwrap()
            .into_iter()
            .map(|id| dag.vertex(id).unwrap().clone())
            .collect()
    };
    assert_eq!(names(false), vec!["cluster", "sts", "pod"]);
    assert_eq!(names(true), vec!["pod", "sts", "cluster"]);
}

#[test]
fn test_cyclic_plan_file_rejected() {
    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join("plan.json");
    fs::write(
        &path,
        r#"{"vertices": ["root", "a", "b"], "edges": [["root", "a"], ["a", "b"], ["b", "a"]]}"#,
    )
    .unwrap();

    let dag = PlanFile::load(&path).unwrap().to_dag().unwrap();
    assert!(dag.validate().is_err());
    assert!(dag.topological_order(false).is_err());
}
