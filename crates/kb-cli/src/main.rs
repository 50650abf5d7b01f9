//! CLI binary for kbgraph: inspect ownership trees and reconciliation plans.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kb_core::config::{KbConfig, ViewConfig};
use kb_core::plan::PlanFile;
use kb_view::object::Object;
use kb_view::query::{ObjectStore, QueryContext};
use kb_view::reach::ReachabilitySetCollector;
use kb_view::rules::RuleSet;
use kb_view::scheme::{Scheme, TypeMetaResolver, TypeResolver};
use kb_view::snapshot::{self, TreeSnapshot};
use kb_view::tree::{self, TreeBuilder};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "kbgraph", about = "Ownership trees and reconciliation plans")]
struct Cli {
    /// Project root directory (defaults to current directory)
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Inputs shared by the view commands.
#[derive(clap::Args)]
struct ViewArgs {
    /// Objects file: a snapshot, a `List` with `items`, or a JSON array
    #[arg(long)]
    objects: PathBuf,

    /// Ownership rules file (JSON array of rules)
    #[arg(long)]
    rules: PathBuf,

    /// Root object as `<kind>/<namespace>/<name>` or `<kind>/<name>`
    #[arg(long)]
    root: String,

    /// Only resolve built-in types and types named in the rules
    #[arg(long)]
    strict: bool,

    /// Query timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the ownership tree rooted at an object
    Tree {
        #[command(flatten)]
        view: ViewArgs,

        /// Maximum ownership depth (overrides config)
        #[arg(long)]
        max_depth: Option<usize>,

        /// Write the tree to a snapshot file as well
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Print every object transitively owned by an object
    Objects {
        #[command(flatten)]
        view: ViewArgs,
    },

    /// Validate a plan file and print its execution order
    Plan {
        /// Plan file: `{"vertices": [..], "edges": [["from", "to"], ..]}`
        #[arg(short, long)]
        file: PathBuf,

        /// Walk edge targets before edge sources
        #[arg(long)]
        reverse: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn get_project_root(cli: &Cli) -> Result<PathBuf> {
    match &cli.project {
        Some(p) => Ok(p.clone()),
        None => std::env::current_dir().context("failed to get current directory"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let project_root = get_project_root(&cli)?;
    let config = KbConfig::load(&project_root)?;

    match cli.command {
        Commands::Tree {
            view,
            max_depth,
            save,
        } => cmd_tree(&config, &view, max_depth, save.as_deref()),
        Commands::Objects { view } => cmd_objects(&config, &view),
        Commands::Plan {
            file,
            reverse,
            json,
        } => cmd_plan(&config, &file, reverse, json),
    }
}

/// Split `<kind>/<namespace>/<name>` or `<kind>/<name>` (cluster-scoped).
fn parse_root(root: &str) -> Result<(&str, &str, &str)> {
    let parts: Vec<&str> = root.split('/').collect();
    let (kind, namespace, name) = match parts.as_slice() {
        [kind, name] => (*kind, "", *name),
        [kind, namespace, name] => (*kind, *namespace, *name),
        _ => anyhow::bail!("invalid root `{root}`: expected <kind>/<namespace>/<name>"),
    };
    if kind.is_empty() || name.is_empty() {
        anyhow::bail!("invalid root `{root}`: kind and name must not be empty");
    }
    Ok((kind, namespace, name))
}

/// Built-in types plus every type the rules mention.
fn scheme_for(rules: &RuleSet) -> Result<Scheme> {
    let mut scheme = Scheme::builtin();
    for rule in rules.rules() {
        scheme = scheme.register(rule.primary.to_gvk()?);
        for owned in &rule.owned_resources {
            scheme = scheme.register(owned.secondary.to_gvk()?);
        }
    }
    Ok(scheme)
}

struct ViewInputs {
    store: ObjectStore,
    rules: RuleSet,
    root: Object,
    resolver: Box<dyn TypeResolver>,
    ctx: QueryContext,
}

fn load_view_inputs(view: &ViewArgs) -> Result<ViewInputs> {
    let store = snapshot::load_store(&view.objects)?;
    let rules = RuleSet::load(&view.rules)?;
    let (kind, namespace, name) = parse_root(&view.root)?;
    let root = store
        .find(kind, namespace, name)
        .cloned()
        .with_context(|| {
            format!(
                "root object `{}` not found in {}",
                view.root,
                view.objects.display()
            )
        })?;
    let resolver: Box<dyn TypeResolver> = if view.strict {
        Box::new(scheme_for(&rules)?)
    } else {
        Box::new(TypeMetaResolver)
    };
    let ctx = match view.timeout {
        Some(secs) => QueryContext::new().with_timeout(Duration::from_secs(secs)),
        None => QueryContext::new(),
    };
    tracing::debug!(objects = store.len(), rules = rules.len(), "loaded view inputs");
    Ok(ViewInputs {
        store,
        rules,
        root,
        resolver,
        ctx,
    })
}

/// View settings with the `--max-depth` override applied and re-validated.
fn tree_config(config: &KbConfig, max_depth: Option<usize>) -> Result<ViewConfig> {
    let mut config = config.clone();
    if let Some(depth) = max_depth {
        config.view.max_tree_depth = depth;
    }
    config.validate().context("invalid --max-depth")?;
    Ok(config.view)
}

fn cmd_tree(
    config: &KbConfig,
    view: &ViewArgs,
    max_depth: Option<usize>,
    save: Option<&Path>,
) -> Result<()> {
    let view_config = tree_config(config, max_depth)?;
    let inputs = load_view_inputs(view)?;

    let tree = TreeBuilder::new(&inputs.rules, &inputs.store, &*inputs.resolver)
        .with_config(&view_config)
        .build(&inputs.ctx, &inputs.root)
        .with_context(|| format!("failed to build ownership tree for {}", view.root))?;

    if view.json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        print!("{}", tree::format_tree(&tree));
        println!();
        println!("{} objects, depth {}", tree.node_count(), tree.depth());
    }

    if let Some(path) = save {
        snapshot::save_tree(path, &TreeSnapshot::new(tree))?;
        eprintln!("Saved tree to {}", path.display());
    }
    Ok(())
}

fn cmd_objects(config: &KbConfig, view: &ViewArgs) -> Result<()> {
    let inputs = load_view_inputs(view)?;
    let set = ReachabilitySetCollector::new(&inputs.rules, &inputs.store, &*inputs.resolver)
        .with_config(&config.view)
        .collect(&inputs.ctx, &inputs.root)
        .with_context(|| format!("failed to collect objects owned by {}", view.root))?;

    if view.json {
        let objects: Vec<&Object> = set.objects.values().collect();
        println!("{}", serde_json::to_string_pretty(&objects)?);
    } else {
        for key in &set.keys {
            println!("{key}");
        }
        println!();
        println!("{} objects", set.len());
    }
    Ok(())
}

fn cmd_plan(config: &KbConfig, file: &Path, reverse: bool, json: bool) -> Result<()> {
    let plan = PlanFile::load(file)?;
    let dag = plan.to_dag()?;
    let reverse = reverse || config.plan.reverse;
    let order = dag
        .topological_order(reverse)
        .with_context(|| format!("invalid plan in {}", file.display()))?;
    let names: Vec<&str> = order
        .into_iter()
        .filter_map(|id| dag.vertex(id).map(String::as_str))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        for (i, name) in names.iter().enumerate() {
            println!("{:>3}. {}", i + 1, name);
        }
    }
    Ok(())
}
