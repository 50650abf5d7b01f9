//! Configuration for view reconstruction and plan execution.
//!
//! Load order: `.kbgraph/config.toml` → environment variables → defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const CONFIG_DIR: &str = ".kbgraph";
const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KbConfig {
    pub view: ViewConfig,
    pub plan: PlanConfig,
}

/// Object tree and reachability reconstruction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Deepest ownership nesting the tree builder will follow.
    pub max_tree_depth: usize,
    /// Restrict secondary queries to the primary's namespace.
    /// Cluster-scoped primaries (empty namespace) always query all namespaces.
    pub namespaced_queries: bool,
}

/// Plan execution settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Execute plans in reverse topological order.
    pub reverse: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            max_tree_depth: 64,
            namespaced_queries: true,
        }
    }
}

/// Helper to parse an env var and apply it to a config field.
fn env_override<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(v) = std::env::var(var)
        && let Ok(n) = v.parse()
    {
        *target = n;
    }
}

impl KbConfig {
    /// Path of the config file for a given project root.
    pub fn path(project_root: &Path) -> std::path::PathBuf {
        project_root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Load config from `.kbgraph/config.toml` in the project root, with env var overrides.
    /// Falls back to defaults if no config file exists.
    pub fn load(project_root: &Path) -> Result<Self> {
        let config_path = Self::path(project_root);

        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read {}", config_path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("failed to parse {}", config_path.display()))?
        } else {
            Self::default()
        };

        env_override("KB_MAX_TREE_DEPTH", &mut config.view.max_tree_depth);
        env_override("KB_NAMESPACED_QUERIES", &mut config.view.namespaced_queries);
        env_override("KB_PLAN_REVERSE", &mut config.plan.reverse);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.view.max_tree_depth == 0 {
            anyhow::bail!("view.max_tree_depth must be at least 1");
        }
        Ok(())
    }
}
