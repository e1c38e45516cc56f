use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use weft_bundle::{BundleService, BundleUpdateService, csv_hash, synthetic_graph_name};
use weft_engine::State;
use weft_registry::{DeclarationRegistry, FsDeclarationSource};
use weft_runner::{CompilationService, GraphCompiler, GraphRunner, RunOptions, RunnerConfig};
use weft_store::{FsStore, Store};
use weft_workflow::GraphFactory;

/// Weft - compile, cache and run tabular workflows
#[derive(Parser)]
#[command(name = "weft")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.weft)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Path to a JSON config file (default: <data-dir>/weft.json when present)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a graph, reading the initial state as JSON from stdin
  Run {
    /// The graph to run
    graph: String,

    /// Workflow table to use instead of the configured one
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Compile the graph when no compiled artifact exists
    #[arg(long, conflicts_with = "no_autocompile")]
    autocompile: bool,

    /// Never compile, run from source when no compiled artifact exists
    #[arg(long)]
    no_autocompile: bool,

    /// Skip the store and run straight from the workflow table
    #[arg(long)]
    direct: bool,
  },

  /// Compile the graphs of a workflow table into the store
  Compile {
    csv: PathBuf,

    /// Only compile this graph
    #[arg(long)]
    graph: Option<String>,
  },

  /// Reconcile a cached bundle with the current declarations
  UpdateBundle {
    csv: PathBuf,

    /// The graph whose bundle to update (default: the table's first graph)
    #[arg(long)]
    graph: Option<String>,

    /// Show what would change without saving
    #[arg(long)]
    dry_run: bool,
  },

  /// Parse a workflow table and report structural warnings
  Validate { csv: PathBuf },
}

fn main() -> Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_env("WEFT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("weft=info,warn")),
    )
    .with_writer(io::stderr)
    .with_target(false)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".weft"),
  };

  let Some(command) = cli.command else {
    println!("weft - use --help to see available commands");
    return Ok(ExitCode::SUCCESS);
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(dispatch(command, cli.config, data_dir))
}

async fn dispatch(
  command: Commands,
  config: Option<PathBuf>,
  data_dir: PathBuf,
) -> Result<ExitCode> {
  let config = load_config(config.as_deref(), &data_dir).await?;

  match command {
    Commands::Run {
      graph,
      csv,
      autocompile,
      no_autocompile,
      direct,
    } => {
      let mut options = RunOptions::new(read_state_from_stdin()?);
      if autocompile {
        options = options.autocompile(true);
      } else if no_autocompile {
        options = options.autocompile(false);
      }
      if let Some(csv) = csv {
        options = options.csv_path(csv);
      }
      run_graph(config, &graph, options, direct).await
    }
    Commands::Compile { csv, graph } => {
      compile(config, &csv, graph.as_deref()).await?;
      Ok(ExitCode::SUCCESS)
    }
    Commands::UpdateBundle {
      csv,
      graph,
      dry_run,
    } => {
      update_bundle(config, &csv, graph.as_deref(), dry_run).await?;
      Ok(ExitCode::SUCCESS)
    }
    Commands::Validate { csv } => validate(&csv).await,
  }
}

async fn load_config(path: Option<&Path>, data_dir: &Path) -> Result<RunnerConfig> {
  let path = match path {
    Some(path) => path.to_path_buf(),
    None => {
      let default = data_dir.join("weft.json");
      if !default.exists() {
        return Ok(RunnerConfig::with_data_dir(data_dir));
      }
      default
    }
  };
  debug!(path = %path.display(), "loading config");
  RunnerConfig::load(&path)
    .await
    .with_context(|| format!("failed to load config: {}", path.display()))
}

async fn open(config: &RunnerConfig) -> Result<(DeclarationRegistry, Arc<dyn Store>)> {
  let registry = DeclarationRegistry::with_builtins();
  let loaded = FsDeclarationSource::new(&config.declarations_dir)
    .load_into(&registry)
    .await
    .with_context(|| {
      format!(
        "failed to load declarations from {}",
        config.declarations_dir.display()
      )
    })?;
  debug!(declarations = loaded, "custom declarations loaded");

  let store: Arc<dyn Store> = Arc::new(FsStore::new(&config.store_root));
  Ok((registry, store))
}

async fn run_graph(
  config: RunnerConfig,
  graph: &str,
  options: RunOptions,
  direct: bool,
) -> Result<ExitCode> {
  let (registry, store) = open(&config).await?;
  let csv = options.csv_path.clone().or_else(|| config.csv_path.clone());
  let runner = GraphRunner::new(config, registry, store);

  let result = if direct {
    let csv = csv.context("--direct needs a workflow table (--csv or csv_path in config)")?;
    runner
      .run_from_csv_direct(&csv, graph, options.initial_state)
      .await
  } else {
    runner.run(graph, options).await
  };

  eprintln!(
    "Execution {} {} ({} nodes, {} ms)",
    result.execution_id,
    if result.success { "succeeded" } else { "failed" },
    result.summary.nodes_run,
    result.duration_ms
  );
  println!("{}", serde_json::to_string_pretty(&result)?);

  Ok(if result.success {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}

async fn compile(config: RunnerConfig, csv: &Path, graph: Option<&str>) -> Result<()> {
  let (registry, store) = open(&config).await?;
  let compiler = CompilationService::new(BundleService::new(registry, store));

  let bundles = match graph {
    Some(graph) => vec![compiler.compile(graph, csv).await?],
    None => compiler.compile_all(csv).await?,
  };

  let output: Vec<_> = bundles
    .iter()
    .map(|b| {
      serde_json::json!({
        "graph": b.graph_name,
        "csv_hash": b.csv_hash,
        "service_load_order": b.service_load_order,
        "missing_declarations": b.missing_declarations,
      })
    })
    .collect();

  eprintln!("Compiled {} graph(s)", bundles.len());
  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

async fn update_bundle(
  config: RunnerConfig,
  csv: &Path,
  graph: Option<&str>,
  dry_run: bool,
) -> Result<()> {
  let source = tokio::fs::read_to_string(csv)
    .await
    .with_context(|| format!("failed to read workflow table: {}", csv.display()))?;
  let hash = csv_hash(source.as_bytes());

  let graph = match graph {
    Some(graph) => graph.to_string(),
    None => weft_config::parse(&source)?
      .first_workflow()
      .map(|w| w.name.clone())
      .context("workflow table has no graphs")?,
  };
  let graph = if graph.trim().is_empty() {
    synthetic_graph_name(&hash)
  } else {
    graph
  };

  let (registry, store) = open(&config).await?;
  let bundles = BundleService::new(registry, store);
  let Some(mut bundle) = bundles.load_bundle(&hash, &graph).await? else {
    bail!(
      "no cached bundle for graph '{}' of {}; run `weft compile` first",
      graph,
      csv.display()
    );
  };

  let updates = BundleUpdateService::new(bundles);
  if dry_run {
    let preview = updates.get_update_summary(&bundle)?;
    eprintln!(
      "Bundle for '{}' {}",
      graph,
      if preview.has_changes() {
        "is out of date"
      } else {
        "is up to date"
      }
    );
    println!("{}", serde_json::to_string_pretty(&preview)?);
  } else {
    let outcome = updates.reconcile(&mut bundle, true).await?;
    if let Some(error) = &outcome.save_error {
      eprintln!("Bundle updated in memory but not saved: {}", error);
    }
    println!("{}", serde_json::to_string_pretty(&outcome)?);
  }
  Ok(())
}

async fn validate(csv: &Path) -> Result<ExitCode> {
  let spec = weft_config::parse_file(csv)
    .await
    .with_context(|| format!("failed to parse workflow table: {}", csv.display()))?;

  let mut warnings = BTreeMap::new();
  for workflow in spec.workflows() {
    let graph = GraphFactory::build(&workflow.name, &workflow.nodes);
    warnings.insert(workflow.name.clone(), GraphFactory::validate(&graph));
  }

  let clean = spec.warnings().is_empty() && warnings.values().all(Vec::is_empty);
  eprintln!(
    "{} graph(s), {}",
    warnings.len(),
    if clean { "no warnings" } else { "with warnings" }
  );
  println!(
    "{}",
    serde_json::to_string_pretty(&serde_json::json!({
      "columns": spec.warnings(),
      "graphs": warnings,
    }))?
  );

  Ok(if clean {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}

fn read_state_from_stdin() -> Result<State> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(State::new());
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read initial state from stdin")?;

  if input.trim().is_empty() {
    return Ok(State::new());
  }
  let value: serde_json::Value =
    serde_json::from_str(&input).context("failed to parse initial state JSON from stdin")?;
  match value {
    serde_json::Value::Object(state) => Ok(state),
    other => bail!("initial state must be a JSON object, got {}", other),
  }
}
