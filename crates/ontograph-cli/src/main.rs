//! Ontograph CLI
//!
//! Command-line access to an editor session's persisted graph state:
//! - Exporting a graph as a Turtle exchange document
//! - Importing a Turtle document into the session
//! - Listing, capturing, renaming and deleting named views
//! - Running a layout algorithm over the stored graph
//! - Inspecting what the local cache holds for an ontology
//!
//! Without a remote store (`--remote`, behind the `http` feature) the CLI
//! works offline against the local cache only.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use ontograph_model::digest::sanitize_id_component;
use ontograph_model::{EditorSession, LayoutSnapshot, NamedView};
use ontograph_storage::{LocalCache, RemoteGraphDocument, RemoteStore, StorageError};
use ontograph_sync::{EngineConfig, GraphEngine, LoadSource};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ontograph")]
#[command(
    author,
    version,
    about = "Ontograph: graph state synchronization for ontology editing"
)]
struct Cli {
    #[command(flatten)]
    session: SessionArgs,
    /// More log output on stderr (-v info, -vv debug, -vvv trace). `RUST_LOG` wins.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SessionArgs {
    /// Directory of the local cache
    #[arg(long, default_value = ".ontograph/cache")]
    cache_dir: PathBuf,
    #[arg(long, default_value = "default")]
    project: String,
    /// Ontology to open
    #[arg(short, long, default_value = "main")]
    ontology: String,
    /// Acting user recorded in stamps and views (defaults to $USER)
    #[arg(long)]
    user: Option<String>,
    /// Engine configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Base URL of the remote store
    #[cfg(feature = "http")]
    #[arg(long)]
    remote: Option<String>,
    #[cfg(feature = "http")]
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the graph as a Turtle exchange document
    Export {
        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace the graph with the content of a Turtle document
    Import {
        input: PathBuf,
        /// Also commit graph, layout and document to the remote store
        #[arg(long)]
        save: bool,
    },
    /// Commit graph, layout and exchange document to the remote store
    Save,
    /// Manage named views
    Views {
        #[command(subcommand)]
        command: ViewCommands,
    },
    /// Recompute node positions with a layout algorithm
    Layout {
        #[arg(default_value = "force-directed")]
        name: String,
    },
    /// Show what the local cache holds for the ontology
    Inspect {
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ViewCommands {
    List,
    /// Capture the current layout, camera and visibility
    Capture { name: String },
    Rename { id: String, name: String },
    Delete { id: String },
    /// Apply a view and keep it as the stored layout
    Apply { id: String },
}

// ============================================================================
// Offline remote
// ============================================================================

/// Remote store used when none is configured: every call fails, so loads
/// fall back to the cache and commits are reported instead of lost silently.
struct Offline;

impl Offline {
    fn fetch(ontology_id: &str, resource: &'static str) -> StorageError {
        StorageError::FetchFailure {
            ontology: ontology_id.to_string(),
            resource,
            reason: "no remote store configured".to_string(),
        }
    }

    fn commit(ontology_id: &str, resource: &'static str) -> StorageError {
        StorageError::CommitFailure {
            ontology: ontology_id.to_string(),
            resource,
            reason: "no remote store configured".to_string(),
        }
    }
}

#[async_trait]
impl RemoteStore for Offline {
    async fn fetch_graph(&self, ontology_id: &str) -> Result<RemoteGraphDocument, StorageError> {
        Err(Self::fetch(ontology_id, "graph"))
    }

    async fn commit_graph(
        &self,
        ontology_id: &str,
        _document: &RemoteGraphDocument,
    ) -> Result<(), StorageError> {
        Err(Self::commit(ontology_id, "graph"))
    }

    async fn fetch_layout(&self, ontology_id: &str) -> Result<LayoutSnapshot, StorageError> {
        Err(Self::fetch(ontology_id, "layout"))
    }

    async fn commit_layout(
        &self,
        ontology_id: &str,
        _layout: &LayoutSnapshot,
    ) -> Result<(), StorageError> {
        Err(Self::commit(ontology_id, "layout"))
    }

    async fn fetch_named_views(&self, ontology_id: &str) -> Result<Vec<NamedView>, StorageError> {
        Err(Self::fetch(ontology_id, "views"))
    }

    async fn commit_named_views(
        &self,
        ontology_id: &str,
        _views: &[NamedView],
    ) -> Result<(), StorageError> {
        Err(Self::commit(ontology_id, "views"))
    }

    async fn post_exchange_document(
        &self,
        ontology_id: &str,
        _turtle: &str,
    ) -> Result<(), StorageError> {
        Err(Self::commit(ontology_id, "exchange"))
    }
}

// ============================================================================
// Setup
// ============================================================================

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "http")]
fn remote_store(args: &SessionArgs) -> Result<Arc<dyn RemoteStore>> {
    match &args.remote {
        Some(url) => {
            let timeout = std::time::Duration::from_secs(args.timeout_secs);
            let store = ontograph_storage::HttpRemoteStore::new(url, timeout)?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(Offline)),
    }
}

#[cfg(not(feature = "http"))]
fn remote_store(_args: &SessionArgs) -> Result<Arc<dyn RemoteStore>> {
    Ok(Arc::new(Offline))
}

fn open_engine(args: &SessionArgs) -> Result<GraphEngine> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let user = args
        .user
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "cli".to_string());
    let session = EditorSession::new(&args.project, &args.ontology, &user);
    let cache = LocalCache::open(&args.cache_dir)
        .with_context(|| format!("opening cache at {}", args.cache_dir.display()))?;
    Ok(GraphEngine::new(
        session,
        config,
        Arc::new(cache),
        remote_store(args)?,
    ))
}

// ============================================================================
// Commands
// ============================================================================

fn describe_source(source: LoadSource) -> &'static str {
    match source {
        LoadSource::LocalCache => "local cache",
        LoadSource::Remote => "remote store",
        LoadSource::StaleCache => "cache (remote unavailable)",
        LoadSource::Empty => "nothing (new graph)",
        LoadSource::Document => "document",
    }
}

fn cmd_export(engine: &GraphEngine, out: Option<PathBuf>) -> Result<()> {
    let turtle = engine.export_document();
    match out {
        Some(path) => {
            fs::write(&path, &turtle).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
        }
        None => print!("{turtle}"),
    }
    Ok(())
}

async fn cmd_import(engine: &GraphEngine, input: PathBuf, save: bool) -> Result<()> {
    let turtle =
        fs::read_to_string(&input).with_context(|| format!("reading {}", input.display()))?;
    let summary = engine.import_document(&turtle).await?;
    engine.flush_local();

    println!(
        "{} {} elements from {}",
        "imported".green().bold(),
        summary.elements,
        input.display()
    );
    for import in &summary.imports {
        println!("  {} imports {}", "→".cyan(), import);
    }
    for skip in &summary.skipped {
        println!("  {} {}", "→".yellow(), skip);
    }
    if save {
        engine.save().await?;
        println!("{} committed to the remote store", "ok".green().bold());
    }
    Ok(())
}

async fn cmd_views(engine: &GraphEngine, command: ViewCommands) -> Result<()> {
    match command {
        ViewCommands::List => {
            let views = engine.list_views();
            if views.is_empty() {
                println!("no named views");
            }
            for view in views {
                println!(
                    "{}  {}  {} nodes  by {} at {}",
                    view.id.dimmed(),
                    view.name.bold(),
                    view.node_positions.len(),
                    view.creator,
                    view.created_at.to_rfc3339()
                );
            }
        }
        ViewCommands::Capture { name } => {
            let view = engine.capture_view(&name).await?;
            println!("{} {} ({})", "captured".green().bold(), view.name, view.id);
        }
        ViewCommands::Rename { id, name } => {
            engine.rename_view(&id, &name).await?;
            println!("{} {} -> {}", "renamed".green().bold(), id, name);
        }
        ViewCommands::Delete { id } => {
            let view = engine.delete_view(&id).await?;
            println!("{} {}", "deleted".green().bold(), view.name);
        }
        ViewCommands::Apply { id } => {
            engine.activate_view(&id).await?;
            engine.flush_local();
            println!("{} {}", "applied".green().bold(), id);
        }
    }
    Ok(())
}

async fn cmd_layout(engine: &GraphEngine, name: &str) -> Result<()> {
    if !engine.layout_names().iter().any(|n| n == name) {
        return Err(anyhow!(
            "unknown layout `{name}` (available: {})",
            engine.layout_names().join(", ")
        ));
    }
    let moved = engine.run_layout(name).await?;
    println!("{} {} positioned {} nodes", "ok".green().bold(), name, moved);
    Ok(())
}

fn cmd_inspect(engine: &GraphEngine, args: &SessionArgs, source: LoadSource, json: bool) -> Result<()> {
    let prefix = format!(
        "{}__{}__",
        sanitize_id_component(&args.project),
        sanitize_id_component(&args.ontology)
    );
    let files: Vec<String> = engine
        .cache()
        .list_files()?
        .into_iter()
        .filter(|f| f.starts_with(&prefix))
        .collect();

    let mut kinds: BTreeMap<&'static str, usize> = BTreeMap::new();
    let (local, overlay) = {
        let model = engine.model();
        let model = model.read();
        for element in model.local_elements() {
            *kinds.entry(element.kind().as_str()).or_default() += 1;
        }
        (
            model.local_elements().count(),
            model.len() - model.local_elements().count(),
        )
    };
    let imports = engine.imports();
    let views = engine.list_views();

    if json {
        let report = serde_json::json!({
            "ontology": args.ontology,
            "source": source,
            "localElements": local,
            "overlayElements": overlay,
            "kinds": kinds,
            "imports": imports.registered(),
            "visibleImports": imports.visible_in_order(),
            "visibility": engine.visibility_state(),
            "views": views.iter().map(|v| &v.name).collect::<Vec<_>>(),
            "cacheFiles": files,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} {} (loaded from {})",
        "ontology".bold(),
        args.ontology,
        describe_source(source)
    );
    println!("  {} local elements, {} overlay", local, overlay);
    for (kind, count) in &kinds {
        println!("    {kind}: {count}");
    }
    println!("  {} {}", "imports".bold(), imports.registered().join(", "));
    println!(
        "  {} {}",
        "visible".bold(),
        imports.visible_in_order().join(", ")
    );
    println!("  {} {}", "views".bold(), views.len());
    println!("  {} {}", "cache".bold(), files.len());
    for file in files {
        println!("    {}", file.dimmed());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut engine = open_engine(&cli.session)?;
    engine.on_event(Box::new(|event| tracing::debug!(?event, "engine event")));
    let source = engine.load_graph(&cli.session.ontology).await?;
    tracing::info!(ontology = %cli.session.ontology, ?source, "session opened");

    match cli.command {
        Commands::Export { out } => cmd_export(&engine, out),
        Commands::Import { input, save } => cmd_import(&engine, input, save).await,
        Commands::Save => {
            engine.save().await?;
            println!("{} committed to the remote store", "ok".green().bold());
            Ok(())
        }
        Commands::Views { command } => cmd_views(&engine, command).await,
        Commands::Layout { name } => cmd_layout(&engine, &name).await,
        Commands::Inspect { json } => cmd_inspect(&engine, &cli.session, source, json),
    }
}
