//! graphweave CLI: maintenance over a SQLite-backed content graph.
//!
//! Usage:
//!   graphweave garden [--root dir] [--config file] [--db path]
//!   graphweave stats [--db path]
//!   graphweave communities [--db path]
//!   graphweave neighbors <id> [--direction both] [--db path]
//!   graphweave path <from> <to> [--db path]
//!   graphweave suggest [--limit 10] [--db path]

use clap::{Parser, Subcommand, ValueEnum};
use graphweave::{
    CancellationToken, Direction, EngineConfig, FsExistence, NodeId, OpenStore, Outcome,
    RunStatus, SqliteStore, SynthesisEngine,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "graphweave",
    version,
    about = "Graph synthesis engine maintenance"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one gardening pass
    Garden {
        /// Corpus root; node ids resolve against it for the orphan sweep
        #[arg(long)]
        root: Option<PathBuf>,
        /// YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print graph statistics
    Stats,
    /// List communities from the last gardening pass
    Communities,
    /// List a node's neighbors
    Neighbors {
        id: String,
        #[arg(long, value_enum, default_value = "both")]
        direction: DirectionArg,
    },
    /// Shortest directed path between two nodes
    Path { from: String, to: String },
    /// Suggest links: structural gaps and timeline order
    Suggest {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Outgoing,
    Incoming,
    Both,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Outgoing => Direction::Outgoing,
            DirectionArg::Incoming => Direction::Incoming,
            DirectionArg::Both => Direction::Both,
        }
    }
}

/// Get the default database path (~/.local/share/graphweave/graphweave.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let dir = data_dir.join("graphweave");
    std::fs::create_dir_all(&dir).ok();
    dir.join("graphweave.db")
}

fn open_engine(
    db: Option<PathBuf>,
    config: Option<PathBuf>,
    root: Option<PathBuf>,
) -> Result<SynthesisEngine, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    let store = SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    let config = match config {
        Some(path) => EngineConfig::load(&path)
            .map_err(|e| format!("Failed to load config '{}': {}", path.display(), e))?,
        None => EngineConfig::default(),
    };
    let mut builder = SynthesisEngine::builder(Arc::new(store)).config(config);
    if let Some(root) = root {
        builder = builder.existence(Arc::new(FsExistence::new(root)));
    }
    builder.build().map_err(|e| format!("Failed to load graph: {}", e))
}

async fn cmd_garden(engine: &SynthesisEngine) -> i32 {
    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted; stopping at the next phase boundary");
            interrupt.cancel();
        }
    });

    let report = match engine.garden(token).await {
        Ok(Outcome::Completed(report)) => report,
        Ok(Outcome::Coalesced) => {
            println!("A gardening pass is already running");
            return 0;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    if report.status == RunStatus::Cancelled {
        println!("Gardening cancelled; nothing committed");
        return 1;
    }
    println!(
        "{} communities (modularity {:.4})",
        report.communities, report.modularity
    );
    println!("Removed {} orphans", report.orphans_removed);
    println!("Pruned {} weak similarity edges", report.edges_pruned);
    println!("Merged {} duplicate nodes", report.duplicates_merged);
    if !report.hubs.is_empty() {
        println!("Hubs:");
        for (id, score) in &report.hubs {
            println!("  {:<40} {:.4}", id.as_str(), score);
        }
    }
    if report.status == RunStatus::Degraded {
        eprintln!(
            "Warning: pass degraded (approximate: {}, existence failures: {})",
            report.approximate, report.existence_failures
        );
    }
    0
}

fn cmd_stats(engine: &SynthesisEngine) -> i32 {
    let stats = engine.store().stats();
    println!("Nodes:   {}", stats.nodes);
    println!("Edges:   {}", stats.edges);
    println!("Density: {:.6}", stats.density);
    for (edge_type, count) in &stats.edges_by_type {
        println!("  {:<12} {}", edge_type.as_str(), count);
    }
    0
}

fn cmd_communities(engine: &SynthesisEngine) -> i32 {
    let communities = engine.store().communities();
    if communities.is_empty() {
        println!("No communities assigned yet; run `graphweave garden`");
        return 0;
    }
    for (community, members) in &communities {
        println!("Community {} ({} members)", community, members.len());
        for id in members {
            println!("  {}", id);
        }
    }
    0
}

fn cmd_neighbors(engine: &SynthesisEngine, id: &str, direction: Direction) -> i32 {
    let id = NodeId::from(id);
    if engine.store().node(&id).is_none() {
        eprintln!("Error: node '{}' not found", id);
        return 1;
    }
    for neighbor in engine.store().neighbors(&id, direction) {
        println!("{}", neighbor);
    }
    0
}

fn cmd_path(engine: &SynthesisEngine, from: &str, to: &str) -> i32 {
    match engine.store().shortest_path(&NodeId::from(from), &NodeId::from(to)) {
        Some(path) => {
            let hops: Vec<&str> = path.iter().map(NodeId::as_str).collect();
            println!("{}", hops.join(" -> "));
            0
        }
        None => {
            eprintln!("No path from '{}' to '{}'", from, to);
            1
        }
    }
}

fn cmd_suggest(engine: &SynthesisEngine, limit: usize) -> i32 {
    let gardener = engine.gardener();
    let suggestions = gardener
        .structural_gaps(limit)
        .into_iter()
        .chain(gardener.weave_timeline());
    let mut any = false;
    for suggestion in suggestions {
        any = true;
        println!(
            "{} -> {}  ({})",
            suggestion.source, suggestion.target, suggestion.reason
        );
    }
    if !any {
        println!("No suggestions");
    }
    0
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let (config, root) = match &cli.command {
        Commands::Garden { config, root } => (config.clone(), root.clone()),
        _ => (None, None),
    };
    let engine = match open_engine(cli.db, config, root) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Garden { .. } => cmd_garden(&engine).await,
        Commands::Stats => cmd_stats(&engine),
        Commands::Communities => cmd_communities(&engine),
        Commands::Neighbors { id, direction } => cmd_neighbors(&engine, &id, direction.into()),
        Commands::Path { from, to } => cmd_path(&engine, &from, &to),
        Commands::Suggest { limit } => cmd_suggest(&engine, limit),
    };
    std::process::exit(code);
}
