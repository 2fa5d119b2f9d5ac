use clap::{Parser, Subcommand};
use std::path::PathBuf;

use arabic_rag::Result;
use arabic_rag::commands::{
    ask_question, export_index, import_index, ingest_documents, run_chat, search_index,
    show_status,
};
use arabic_rag::config::{Config, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "arabic-rag")]
#[command(about = "Question answering over an Arabic document corpus with a local vector index")]
#[command(version)]
struct Cli {
    /// Use this directory instead of ~/.arabic-rag for configuration and the index
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Chunk, embed and index a directory of documents
    Ingest {
        /// Corpus directory (defaults to [ingest] documents_dir)
        dir: Option<PathBuf>,
        /// Keep the existing index and only embed chunks it does not contain yet
        #[arg(long)]
        resume: bool,
    },
    /// Show the chunks most similar to a query
    Search {
        query: String,
        /// Number of results (defaults to [retrieval] top_k)
        #[arg(long, short)]
        k: Option<usize>,
    },
    /// Answer a single question
    Ask {
        question: String,
        /// Number of chunks used as context
        #[arg(long, short)]
        k: Option<usize>,
    },
    /// Start an interactive chat session
    Chat {
        /// Number of chunks used as context
        #[arg(long, short)]
        k: Option<usize>,
    },
    /// Show the state of the vector store and the Ollama connection
    Status,
    /// Export the vector store snapshot to a zip archive
    Export {
        /// Archive path (defaults to vector_index_storage.zip next to the store)
        destination: Option<PathBuf>,
    },
    /// Replace the vector store with a previously exported archive
    Import {
        archive: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => Config::config_dir().map_err(|e| arabic_rag::RagError::Config(e.to_string()))?,
    };

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&config_dir)?;
        } else {
            run_interactive_config(&config_dir)?;
        }
        return Ok(());
    }

    let config = Config::load(&config_dir)?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Ingest { dir, resume } => {
            ingest_documents(&config, dir, resume).await?;
        }
        Commands::Search { query, k } => {
            search_index(&config, &query, k).await?;
        }
        Commands::Ask { question, k } => {
            ask_question(&config, &question, k).await?;
        }
        Commands::Chat { k } => {
            run_chat(&config, k).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::Export { destination } => {
            export_index(&config, destination).await?;
        }
        Commands::Import { archive } => {
            import_index(&config, &archive).await?;
        }
    }

    Ok(())
}
