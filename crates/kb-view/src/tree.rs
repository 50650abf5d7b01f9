//! Rooted reconstruction: the ownership tree of one primary object.

use crate::error::{LookupError, Result};
use crate::object::{Object, ObjectKey, ObjectReference};
use crate::query::{ObjectQuery, QueryContext, list_secondaries};
use crate::rules::RuleSet;
use crate::scheme::TypeResolver;
use kb_core::config::ViewConfig;
use kb_core::dag::{Dag, VertexId};
use serde::{Deserialize, Serialize};

/// One object and the subtrees of everything it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectTreeNode {
    pub primary: ObjectReference,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondaries: Vec<ObjectTreeNode>,
}

impl ObjectTreeNode {
    pub fn new(primary: ObjectReference) -> Self {
        Self {
            primary,
            secondaries: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including itself.
    pub fn node_count(&self) -> usize {
        1 + self
            .secondaries
            .iter()
            .map(ObjectTreeNode::node_count)
            .sum::<usize>()
    }

    /// Levels in this subtree; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        1 + self
            .secondaries
            .iter()
            .map(ObjectTreeNode::depth)
            .max()
            .unwrap_or(0)
    }

    /// All references in pre-order.
    pub fn references(&self) -> Vec<&ObjectReference> {
        let mut refs = vec![&self.primary];
        for child in &self.secondaries {
            refs.extend(child.references());
        }
        refs
    }

    /// First node in pre-order whose primary satisfies `predicate`.
    pub fn find(&self, predicate: &impl Fn(&ObjectReference) -> bool) -> Option<&ObjectTreeNode> {
        if predicate(&self.primary) {
            return Some(self);
        }
        self.secondaries.iter().find_map(|child| child.find(predicate))
    }

    /// Convert into a single-rooted DAG with an owner → owned edge per tree
    /// edge. A forward walk visits owners first, a reverse walk owned objects
    /// first.
    pub fn to_dag(&self) -> Dag<ObjectReference> {
        let mut dag = Dag::new();
        let root = dag.add_vertex(self.primary.clone());
        let mut stack: Vec<(&ObjectTreeNode, VertexId)> = vec![(self, root)];
        while let Some((node, id)) = stack.pop() {
            for child in &node.secondaries {
                let child_id = dag.add_vertex(child.primary.clone());
                dag.connect(id, child_id);
                stack.push((child, child_id));
            }
        }
        dag
    }
}

/// Format a tree as indented text.
pub fn format_tree(node: &ObjectTreeNode) -> String {
    let mut output = format!("{}\n", node.primary);
    format_children(node, "", &mut output);
    output
}

fn format_children(node: &ObjectTreeNode, prefix: &str, output: &mut String) {
    let child_count = node.secondaries.len();
    for (i, child) in node.secondaries.iter().enumerate() {
        let is_last = i == child_count - 1;
        let connector = if is_last { "└──" } else { "├──" };
        output.push_str(&format!("{}{} {}\n", prefix, connector, child.primary));
        let next_prefix = format!("{}{}", prefix, if is_last { "    " } else { "│   " });
        format_children(child, &next_prefix, output);
    }
}

/// Builds an [`ObjectTreeNode`] by recursing through matched ownership rules.
///
/// Every (object, owned resource) pair costs one blocking query. The build
/// fails closed: the first lookup or query error aborts it with no partial tree.
pub struct TreeBuilder<'a, Q: ?Sized, R: ?Sized> {
    rules: &'a RuleSet,
    query: &'a Q,
    resolver: &'a R,
    config: ViewConfig,
}

impl<'a, Q, R> TreeBuilder<'a, Q, R>
where
    Q: ObjectQuery + ?Sized,
    R: TypeResolver + ?Sized,
{
    pub fn new(rules: &'a RuleSet, query: &'a Q, resolver: &'a R) -> Self {
        Self {
            rules,
            query,
            resolver,
            config: ViewConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: &ViewConfig) -> Self {
        self.config = config.clone();
        self
    }

    pub fn build(&self, ctx: &QueryContext, primary: &Object) -> Result<ObjectTreeNode> {
        let mut ancestors = Vec::new();
        self.build_node(ctx, primary, &mut ancestors)
    }

    /// `ancestors` holds the keys from the root down to `primary`'s owner. An
    /// object that is its own ancestor means the rules describe a cycle.
    fn build_node(
        &self,
        ctx: &QueryContext,
        primary: &Object,
        ancestors: &mut Vec<ObjectKey>,
    ) -> Result<ObjectTreeNode> {
        if ancestors.len() >= self.config.max_tree_depth {
            return Err(LookupError::DepthExceeded(self.config.max_tree_depth));
        }
        let gvk = self.resolver.resolve_type(primary)?;
        let key = primary.key(&gvk);
        if ancestors.contains(&key) {
            return Err(LookupError::OwnershipCycle(key.to_string()));
        }
        tracing::trace!(object = %key, depth = ancestors.len(), "building subtree");

        let mut node = ObjectTreeNode::new(primary.reference(&gvk));
        let secondaries = list_secondaries(
            ctx,
            self.rules,
            self.query,
            primary,
            &gvk,
            self.config.namespaced_queries,
        )?;

        ancestors.push(key);
        for secondary in &secondaries {
            let subtree = self.build_node(ctx, secondary, ancestors)?;
            node.secondaries.push(subtree);
        }
        ancestors.pop();

        Ok(node)
    }
}
