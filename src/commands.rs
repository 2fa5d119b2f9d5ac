use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::chat::{ChatSettings, RagService};
use crate::config::Config;
use crate::embeddings::ollama::OllamaClient;
use crate::index::{VectorStore, snapshot};
use crate::ingest::{IngestMode, Ingestor, read_documents};

const EXIT_COMMANDS: [&str; 3] = ["/exit", "/quit", "خروج"];

/// Open the configured vector store, starting empty if nothing was persisted yet
#[inline]
pub async fn open_store(config: &Config) -> Result<Arc<RwLock<VectorStore>>> {
    let path = config.vector_store_path();
    let store = tokio::task::spawn_blocking(move || VectorStore::open(path))
        .await
        .context("Vector store task failed")?
        .context("Failed to open vector store")?;
    Ok(Arc::new(RwLock::new(store)))
}

/// Which configured Ollama models a command talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelNeeds {
    Embedding,
    EmbeddingAndChat,
}

/// Build an Ollama client and make sure the models a command needs are served
#[inline]
pub async fn connect_ollama(config: &Config, needs: ModelNeeds) -> Result<Arc<OllamaClient>> {
    let client =
        Arc::new(OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?);

    let checker = Arc::clone(&client);
    tokio::task::spawn_blocking(move || match needs {
        ModelNeeds::Embedding => checker.embedding_health_check(),
        ModelNeeds::EmbeddingAndChat => checker.health_check(),
    })
        .await
        .context("Health check task failed")?
        .with_context(|| {
            format!(
                "Ollama is not ready at {}:{}",
                config.ollama.host, config.ollama.port
            )
        })?;

    Ok(client)
}

/// Chunk, embed and index a corpus directory
#[inline]
pub async fn ingest_documents(config: &Config, dir: Option<PathBuf>, resume: bool) -> Result<()> {
    let Some(dir) = dir.or_else(|| config.ingest.documents_dir.clone()) else {
        bail!("No documents directory given and none configured (set [ingest] documents_dir)");
    };

    let extensions = config.ingest.extensions.clone();
    let scan_dir = dir.clone();
    let documents = tokio::task::spawn_blocking(move || read_documents(&scan_dir, &extensions))
        .await
        .context("Document loading task failed")??;
    if documents.is_empty() {
        bail!(
            "No documents with extensions [{}] found in {}",
            config.ingest.extensions.join(", "),
            dir.display()
        );
    }

    let client = connect_ollama(config, ModelNeeds::Embedding).await?;
    let mode = if resume {
        IngestMode::Resume
    } else {
        IngestMode::Rebuild
    };
    let store = open_store_for(config, mode).await?;
    let ingestor = Ingestor::new(
        Arc::clone(&store),
        client,
        config.chunking.clone(),
        config.ingest.batch_size,
    )?;

    info!("Ingesting {} documents ({:?})", documents.len(), mode);
    let report = ingestor.run(&documents, mode).await?;

    println!("Ingestion complete!");
    println!("  Documents found: {}", report.documents_seen);
    println!("  Documents indexed: {}", report.documents_indexed);
    println!("  Chunks created: {}", report.chunks_created);
    if resume {
        println!("  Chunks already indexed: {}", report.chunks_skipped);
    }
    println!("  Chunks embedded: {}", report.chunks_embedded);
    println!("  Batches persisted: {}", report.batches_persisted);
    println!(
        "  Vector store: {}",
        config.vector_store_path().display()
    );

    Ok(())
}

/// Open the store an ingestion run writes to.
///
/// A rebuild replaces everything, so it also starts over from a corrupt snapshot.
async fn open_store_for(
    config: &Config,
    mode: IngestMode,
) -> Result<Arc<RwLock<VectorStore>>> {
    if mode == IngestMode::Resume {
        return open_store(config).await;
    }
    let path = config.vector_store_path();
    let store = tokio::task::spawn_blocking(move || VectorStore::open_for_rebuild(path))
        .await
        .context("Vector store task failed")?
        .context("Failed to open vector store")?;
    Ok(Arc::new(RwLock::new(store)))
}

async fn build_service(
    config: &Config,
    top_k: Option<usize>,
    needs: ModelNeeds,
) -> Result<RagService> {
    let settings = ChatSettings {
        top_k: top_k.unwrap_or(config.retrieval.top_k),
        ..config.chat_settings()
    };
    let client = connect_ollama(config, needs).await?;
    let store = open_store(config).await?;

    if store.read().await.is_empty() {
        warn!("The vector store is empty; run `arabic-rag ingest` first");
    }

    Ok(RagService::new(
        store,
        Arc::<OllamaClient>::clone(&client),
        client,
        settings,
    ))
}

/// Print the chunks most similar to a query
#[inline]
pub async fn search_index(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let service = build_service(config, top_k, ModelNeeds::Embedding).await?;
    let hits = service
        .retrieve(query, service.settings().top_k)
        .await
        .context("Search failed")?;

    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} results for: {}", hits.len(), query);
    println!();
    for (rank, hit) in hits.iter().enumerate() {
        let chunk = &hit.entry.chunk;
        println!(
            "{}. {} [chunk {}/{}] (score: {:.4})",
            rank + 1,
            chunk.source_document_id(),
            chunk.chunk_index() + 1,
            chunk.total_chunks(),
            hit.score
        );
        println!("   {}", preview(chunk.text(), 160));
        println!();
    }

    Ok(())
}

/// Answer a single question
#[inline]
pub async fn ask_question(config: &Config, question: &str, top_k: Option<usize>) -> Result<()> {
    let service = build_service(config, top_k, ModelNeeds::EmbeddingAndChat).await?;
    let answer = service.ask(question).await.context("Failed to answer")?;

    println!("{}", answer.text);
    for source in &answer.sources {
        println!();
        println!("📄 {}", source.source);
        println!("   {}", source.excerpt);
    }

    Ok(())
}

/// Interactive question answering that keeps conversation history
#[inline]
pub async fn run_chat(config: &Config, top_k: Option<usize>) -> Result<()> {
    let service = build_service(config, top_k, ModelNeeds::EmbeddingAndChat).await?;

    eprintln!("Arabic RAG chat. Commands: /reset, /history, /exit");
    loop {
        let line = tokio::task::spawn_blocking(read_question)
            .await
            .context("Input task failed")??;
        let question = line.trim();

        if question.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.contains(&question) {
            break;
        }
        if question == "/reset" {
            service.reset_conversation().await;
            eprintln!("Conversation cleared.");
            continue;
        }
        if question == "/history" {
            let conversation = service.conversation().await;
            if conversation.is_empty() {
                eprintln!("No conversation yet.");
            } else {
                println!("{}", conversation.history_text());
            }
            continue;
        }

        match service.ask(question).await {
            Ok(answer) => {
                println!();
                println!("{}", answer.text);
                println!();
            }
            Err(e) => eprintln!("❌ {e}"),
        }
    }

    Ok(())
}

fn read_question() -> Result<String> {
    Ok(dialoguer::Input::<String>::new()
        .with_prompt("سؤال")
        .allow_empty(true)
        .interact_text()?)
}

/// Show the state of the vector store and the Ollama connection
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 Arabic RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match connect_ollama(config, ModelNeeds::EmbeddingAndChat).await {
        Ok(_) => {
            println!(
                "   ✅ Ollama: Connected ({}:{})",
                config.ollama.host, config.ollama.port
            );
            println!("   📋 Embedding Model: {}", config.ollama.embedding_model);
            println!("   💬 Chat Model: {}", config.ollama.chat_model);
        }
        Err(e) => println!("   ❌ Ollama: {e:#}"),
    }
    println!();

    let path = config.vector_store_path();
    println!("🔍 Vector Store Status:");
    println!("   📁 Path: {}", path.display());
    match open_store(config).await {
        Ok(store) => {
            let store = store.read().await;
            let index = store.index();
            println!("   📦 Entries: {}", index.len());
            println!("   📚 Documents: {}", index.document_count());
            match index.dimension() {
                Some(dimension) => println!("   🔢 Dimension: {dimension}"),
                None => println!("   🔢 Dimension: (not fixed yet)"),
            }
            if let Ok(manifest) = snapshot::read_manifest(&path) {
                println!(
                    "   🕒 Last persisted: {}",
                    manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
        Err(e) => println!("   ❌ Failed to open: {e:#}"),
    }

    Ok(())
}

/// Write the persisted snapshot to a zip archive
#[inline]
pub async fn export_index(config: &Config, destination: Option<PathBuf>) -> Result<()> {
    let store = open_store(config).await?;
    let guard = store.read_owned().await;
    let written = tokio::task::spawn_blocking(move || guard.export(destination.as_deref()))
        .await
        .context("Export task failed")?
        .context("Failed to export vector store")?;

    println!("Exported vector store to {}", written.display());
    Ok(())
}

/// Replace the vector store with the contents of a zip archive.
///
/// The current snapshot is never loaded, so a corrupt one can be replaced.
#[inline]
pub async fn import_index(config: &Config, archive: &Path) -> Result<()> {
    let path = config.vector_store_path();
    let source = archive.to_path_buf();
    let store = tokio::task::spawn_blocking(move || VectorStore::from_archive(path, &source))
        .await
        .context("Import task failed")?
        .with_context(|| format!("Failed to import {}", archive.display()))?;

    println!(
        "Imported {} entries from {} documents",
        store.len(),
        store.index().document_count()
    );
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", flat.get(..cut).unwrap_or_default()),
        None => flat,
    }
}
