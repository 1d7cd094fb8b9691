use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// Populate and inspect the Gearhead equipment-manual index.
///
/// Connection settings are read from the environment (`PINECONE_API_KEY`,
/// `PINECONE_INDEX_NAME`, `EMBEDDING_MODEL`, `BASE_PDF_URL`, ...).
#[derive(Parser, Debug)]
#[command(name = "gearhead", author, version, about, long_about = None)]
struct Args {
    /// Log filter used when RUST_LOG is not set (e.g. "info", "gearhead_rag=debug")
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Directory where embedding models are cached
    #[arg(long, global = true, env = "GEARHEAD_MODEL_CACHE")]
    model_cache: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chunk, embed, and upsert a JSON file of manual pages
    Ingest {
        /// Path to a JSON array of documents
        file: PathBuf,
    },
    /// Create the index if it does not exist, or verify its shape
    EnsureIndex,
    /// Run a question against the index and print matches with citations
    Query {
        /// The question to retrieve context for
        question: String,
        /// Number of matches to return, if not the configured default
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Metadata filter as JSON, e.g. '{"equipment_type": {"$eq": "excavator"}}'
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Show the index dimension and vector count
    Stats,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(&args.log_level);

    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let app = commands::App::from_env(args.model_cache)?;

    match args.command {
        Commands::Ingest { file } => app.ingest(&file).await,
        Commands::EnsureIndex => app.ensure_index().await,
        Commands::Query { question, top_k, filter } => {
            app.query(&question, top_k, filter.as_deref()).await
        }
        Commands::Stats => app.stats().await,
    }
}
