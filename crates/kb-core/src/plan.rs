//! Reconciliation plans: typed actions applied in dependency order.
//!
//! A controller adds one action per intended mutation, connects them, and
//! executes the plan once. Execution stops at the first failing action; work
//! already done by earlier actions is left in place for the caller to handle.

use crate::config::PlanConfig;
use crate::dag::{Dag, VertexId};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One planned mutation.
pub trait Action {
    /// Short label used in logs.
    fn describe(&self) -> String;

    /// Apply the mutation.
    fn execute(&mut self) -> Result<()>;
}

/// Direction in which a plan is walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkOrder {
    /// Edge sources run before edge targets.
    #[default]
    Forward,
    /// Edge targets run before edge sources (e.g. children before owner).
    Reverse,
}

/// A DAG of actions plus the order it is executed in.
#[derive(Debug)]
pub struct Plan<A> {
    dag: Dag<A>,
    order: WalkOrder,
}

impl<A: Action> Default for Plan<A> {
    fn default() -> Self {
        Self::new(WalkOrder::Forward)
    }
}

impl<A: Action> Plan<A> {
    pub fn new(order: WalkOrder) -> Self {
        Self {
            dag: Dag::new(),
            order,
        }
    }

    /// Create an empty plan whose order comes from configuration.
    pub fn from_config(config: &PlanConfig) -> Self {
        Self::new(if config.reverse {
            WalkOrder::Reverse
        } else {
            WalkOrder::Forward
        })
    }

    pub fn order(&self) -> WalkOrder {
        self.order
    }

    pub fn add_action(&mut self, action: A) -> VertexId {
        self.dag.add_vertex(action)
    }

    /// Add an edge between two planned actions. See [`Dag::connect`].
    pub fn connect(&mut self, from: VertexId, to: VertexId) -> bool {
        self.dag.connect(from, to)
    }

    pub fn dag(&self) -> &Dag<A> {
        &self.dag
    }

    pub fn dag_mut(&mut self) -> &mut Dag<A> {
        &mut self.dag
    }

    /// Describe the actions in the order they would execute.
    pub fn describe(&self) -> Result<Vec<String>> {
        let order = self.dag.topological_order(self.order == WalkOrder::Reverse)?;
        Ok(order
            .into_iter()
            .filter_map(|id| self.dag.vertex(id).map(Action::describe))
            .collect())
    }

    /// Execute every action once. Returns how many actions ran.
    pub fn execute(&mut self) -> Result<usize> {
        let mut executed = 0usize;
        let walk = |id: VertexId, action: &mut A| -> Result<()> {
            tracing::debug!(vertex = %id, action = %action.describe(), "executing action");
            if let Err(e) = action.execute() {
                tracing::warn!(vertex = %id, action = %action.describe(), "action failed: {e}");
                return Err(e);
            }
            executed += 1;
            Ok(())
        };
        match self.order {
            WalkOrder::Forward => self.dag.walk_topo_order_mut(walk)?,
            WalkOrder::Reverse => self.dag.walk_reverse_topo_order_mut(walk)?,
        }
        Ok(executed)
    }
}

/// A plan described as data: named steps plus `[from, to]` dependency pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanFile {
    pub vertices: Vec<String>,
    #[serde(default)]
    pub edges: Vec<(String, String)>,
}

impl PlanFile {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse plan JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan from {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("invalid plan in {}", path.display()))
    }

    /// Build the named DAG. Step names must be unique and every edge must
    /// name declared steps. The result is not validated.
    pub fn to_dag(&self) -> Result<Dag<String>> {
        let mut dag = Dag::new();
        let mut ids: HashMap<&str, VertexId> = HashMap::new();
        for name in &self.vertices {
            if ids.contains_key(name.as_str()) {
                anyhow::bail!("duplicate step `{name}`");
            }
            ids.insert(name, dag.add_vertex(name.clone()));
        }
        for (from, to) in &self.edges {
            let lookup = |name: &str| {
                ids.get(name)
                    .copied()
                    .with_context(|| format!("edge references unknown step `{name}`"))
            };
            dag.connect(lookup(from)?, lookup(to)?);
        }
        Ok(dag)
    }
}
