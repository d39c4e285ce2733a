//! Lexigraph CLI: per-owner concept graphs with an MCP server.
//!
//! Usage:
//!   lexigraph mcp [--transport stdio]
//!   lexigraph ingest --owner <id> [--task <id> --phase <phase>] [text]
//!   lexigraph nodes|edges|diff|checkpoint|taxonomy ...
//!
//! Every command accepts `--config <path>` and `--db <path>`.

use clap::{Parser, Subcommand};
use lexigraph::{
    ClusterType, Config, Direction, KnowledgeApi, NodeFilter, NodeType, OwnerId,
    ProcessTextRequest, TaskId, UnderstandingLevel,
};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "lexigraph",
    version,
    about = "Per-owner concept graphs extracted from everyday text"
)]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to SQLite database file (overrides the config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP (Model Context Protocol) server
    Mcp {
        /// Transport type (currently only stdio)
        #[arg(long, default_value = "stdio")]
        transport: String,
    },
    /// Extract concepts from text and fold them into the graph
    Ingest {
        #[arg(long)]
        owner: String,
        /// Text to ingest; read from stdin when omitted
        text: Option<String>,
        /// Read the text from a file instead
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
        #[arg(long, default_value = "note")]
        source_type: String,
        #[arg(long, default_value = "cli")]
        source_id: String,
        /// sent, received or self
        #[arg(long, default_value = "self")]
        direction: Direction,
        #[arg(long)]
        task: Option<String>,
        /// ideation or result (requires --task)
        #[arg(long, requires = "task")]
        phase: Option<ClusterType>,
    },
    /// List an owner's nodes, most frequent first
    Nodes {
        #[arg(long)]
        owner: String,
        /// keyword, person or project
        #[arg(long = "type")]
        node_type: Option<NodeType>,
        /// recognition, understanding or mastery
        #[arg(long)]
        min_level: Option<UnderstandingLevel>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List co-occurrence edges, heaviest first
    Edges {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        task: Option<String>,
    },
    /// Compare a task's ideation and result clusters
    Diff {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        task: String,
    },
    /// Record or list checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
    /// Manage the shared taxonomy
    Taxonomy {
        #[command(subcommand)]
        action: TaxonomyAction,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Snapshot the task's active node set
    Add {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        task: String,
        #[arg(long)]
        summary: Option<String>,
    },
    /// List checkpoints, oldest first
    List {
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        task: Option<String>,
    },
}

#[derive(Subcommand)]
enum TaxonomyAction {
    /// Load domains, fields and entries from a YAML catalogue
    Import {
        #[arg(required = true)]
        path: PathBuf,
    },
    /// Place a label in the hierarchy
    Classify { label: String },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lexigraph=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<PathBuf>, db: Option<PathBuf>) -> Result<Config, String> {
    let mut config = match path.or_else(Config::default_path) {
        Some(path) => Config::load(&path).map_err(|e| e.to_string())?,
        None => Config::default(),
    };
    if db.is_some() {
        config.database.path = db;
    }
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn read_text(text: Option<String>, file: Option<PathBuf>) -> Result<String, String> {
    if let Some(text) = text {
        return Ok(text);
    }
    if let Some(path) = file {
        return std::fs::read_to_string(&path)
            .map_err(|e| format!("cannot read '{}': {}", path.display(), e));
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| format!("cannot read stdin: {}", e))?;
    Ok(buf)
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Runtime::new().map_err(|e| format!("failed to create tokio runtime: {}", e))
}

fn cmd_ingest(api: &KnowledgeApi, request: ProcessTextRequest) -> i32 {
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match rt.block_on(api.process_text(&request)) {
        Ok(outcome) => print_json(&outcome),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_nodes(api: &KnowledgeApi, owner: &OwnerId, filter: &NodeFilter) -> i32 {
    let nodes = match api.list_nodes(owner, filter) {
        Ok(nodes) => nodes,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if nodes.is_empty() {
        println!("No nodes.");
        return 0;
    }
    println!("{:<36}  {:<28}  {:<8}  {:>5}  {:<13}", "ID", "LABEL", "TYPE", "FREQ", "LEVEL");
    println!("{}", "-".repeat(96));
    for node in nodes {
        println!(
            "{:<36}  {:<28}  {:<8}  {:>5}  {:<13}",
            node.id.as_str(),
            node.label,
            node.node_type.as_str(),
            node.frequency,
            node.understanding_level.as_str()
        );
    }
    0
}

fn cmd_diff(api: &KnowledgeApi, owner: &OwnerId, task: &TaskId) -> i32 {
    match api.cluster_diff(task, owner) {
        Ok(Some(diff)) => print_json(&diff),
        Ok(None) => {
            eprintln!("Error: task '{}' has no ideation cluster", task);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_taxonomy_classify(api: &KnowledgeApi, label: &str) -> i32 {
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match rt.block_on(api.classify(label)) {
        Ok(Some(classification)) => print_json(&classification),
        Ok(None) => {
            println!("'{}' could not be classified", label);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let config = match load_config(cli.config, cli.db) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Commands::Mcp { transport } = &cli.command {
        if transport != "stdio" {
            eprintln!("error: only 'stdio' transport is currently supported");
            std::process::exit(1);
        }
        std::process::exit(lexigraph::mcp::run_mcp_server(config));
    }

    let api = match KnowledgeApi::from_config(config) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Mcp { .. } => 0,
        Commands::Ingest {
            owner,
            text,
            file,
            source_type,
            source_id,
            direction,
            task,
            phase,
        } => match read_text(text, file) {
            Ok(text) => {
                let mut request =
                    ProcessTextRequest::new(text, source_type, source_id, direction, OwnerId::from(owner));
                request.task_id = task.map(TaskId::from);
                request.phase = phase;
                cmd_ingest(&api, request)
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Commands::Nodes {
            owner,
            node_type,
            min_level,
            limit,
        } => {
            let filter = NodeFilter {
                node_type,
                min_level,
                confirmed: None,
                limit,
            };
            cmd_nodes(&api, &OwnerId::from(owner), &filter)
        }
        Commands::Edges { owner, task } => {
            let task = task.map(TaskId::from);
            match api.list_edges(&OwnerId::from(owner), task.as_ref()) {
                Ok(edges) => print_json(&edges),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            }
        }
        Commands::Diff { owner, task } => cmd_diff(&api, &OwnerId::from(owner), &TaskId::from(task)),
        Commands::Checkpoint { action } => match action {
            CheckpointAction::Add {
                owner,
                task,
                summary,
            } => match api.add_checkpoint(&TaskId::from(task), &OwnerId::from(owner), None, summary) {
                Ok(checkpoint) => print_json(&checkpoint),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            },
            CheckpointAction::List { owner, task } => {
                let task = task.map(TaskId::from);
                let owner = owner.map(OwnerId::from);
                match api.list_checkpoints(task.as_ref(), owner.as_ref()) {
                    Ok(checkpoints) => print_json(&checkpoints),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        1
                    }
                }
            }
        },
        Commands::Taxonomy { action } => match action {
            TaxonomyAction::Import { path } => match api.import_taxonomy(&path) {
                Ok(summary) => {
                    println!(
                        "Imported {} domains, {} fields, {} entries",
                        summary.domains, summary.fields, summary.entries
                    );
                    0
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            },
            TaxonomyAction::Classify { label } => cmd_taxonomy_classify(&api, &label),
        },
    };
    std::process::exit(code);
}
