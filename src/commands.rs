use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use itertools::Itertools;
use tracing::info;

use crate::capabilities::{CapabilityDetector, CapabilityTable};
use crate::config::Config;
use crate::context::{ContextMap, parse_context_json, summarize_context};
use crate::database::VectorStore;
use crate::embeddings::create_provider;
use crate::indexer::Indexer;
use crate::prompt::{ErrorAttempt, PromptBuilder};

/// Print the effective configuration
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", style("Current Configuration").bold().cyan());
    println!();

    println!("{}", style("Embedding Settings:").bold().yellow());
    println!(
        "  Provider: {}",
        style(format!("{:?}", config.embedding.provider).to_lowercase()).cyan()
    );
    println!("  Model: {}", style(&config.embedding.model).cyan());
    println!("  Dimension: {}", style(config.embedding.dimension).cyan());
    println!("  Batch Size: {}", style(config.embedding.batch_size).cyan());
    match config.embedding_url() {
        Ok(url) => println!("  URL: {}", style(url).cyan()),
        Err(e) => println!("  URL: {} ({})", style("Invalid").red(), e),
    }

    println!();
    println!("{}", style("Chunking:").bold().yellow());
    println!("  Target Size: {}", style(config.chunking.target_size).cyan());
    println!("  Overlap: {}", style(config.chunking.overlap).cyan());

    println!();
    println!("{}", style("Vector Store:").bold().yellow());
    println!("  Collection: {}", style(&config.vector_store.collection).cyan());
    println!(
        "  On Embedding Mismatch: {}",
        style(format!("{:?}", config.vector_store.on_embedding_mismatch).to_lowercase()).cyan()
    );
    println!(
        "  Path: {}",
        style(config.vector_database_path().display()).dim()
    );

    println!();
    println!("{}", style("Prompt:").bold().yellow());
    println!("  Docs Directory: {}", style(config.docs_dir().display()).cyan());
    println!(
        "  Docs Per Capability: {}",
        style(config.prompt.docs_per_capability).cyan()
    );
    println!(
        "  Code Line Budget: {}",
        style(config.prompt.code_line_budget).cyan()
    );

    println!();
    let table_path = config.capabilities_path();
    if table_path.exists() {
        println!("Capability table: {}", style(table_path.display()).dim());
    } else {
        println!("Capability table: {}", style("built-in").dim());
    }
    println!("Config file: {}", style(config.config_file_path().display()).dim());

    Ok(())
}

/// Write the current configuration to disk if no config file exists yet
#[inline]
pub fn init_config(config: &Config) -> Result<()> {
    let path = config.config_file_path();
    if path.exists() {
        println!(
            "{} {}",
            style("Configuration already exists:").yellow(),
            path.display()
        );
        return Ok(());
    }

    config.save()?;
    println!(
        "{} {}",
        style("Wrote default configuration to").green(),
        path.display()
    );
    Ok(())
}

/// Ingest the documentation directory into the vector index
#[inline]
pub async fn ingest_docs(config: &Config, clear: bool) -> Result<()> {
    let mut indexer = Indexer::open(config)
        .await
        .context("Failed to open vector index for ingest")?;

    println!(
        "Ingesting docs from {}",
        style(indexer.docs_dir().display()).cyan()
    );
    let report = indexer.ingest(clear).await?;

    println!("{}", style("Ingest complete").bold().green());
    println!("  Files processed: {}", report.files_processed);
    println!("  Chunks stored: {}", report.chunks_stored);
    if !report.failures.is_empty() {
        println!("  {}", style(format!("Failures: {}", report.failures.len())).red());
        for (path, reason) in &report.failures {
            println!("    {}: {}", path.display(), reason);
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<VectorStore> {
    let provider = create_provider(&config.embedding).await?;
    Ok(VectorStore::open(config, provider).await?)
}

/// Run a similarity query against the index
#[inline]
pub async fn query_docs(
    config: &Config,
    text: &str,
    source: Option<&str>,
    topic: Option<&str>,
    top_k: usize,
) -> Result<()> {
    let store = open_store(config).await?;
    let hits = store.query(text, top_k, source, topic).await?;

    if hits.is_empty() {
        println!("No matching documentation found.");
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{} {} {} {}",
            style(format!("#{}", rank + 1)).bold(),
            style(&hit.source).cyan(),
            style(format!("[{}]", hit.topic)).dim(),
            style(format!("distance {:.4}", hit.distance)).dim()
        );
        if let Some(section) = &hit.section {
            println!("   Section: {}", section);
        }
        for line in hit.text.lines() {
            println!("   {}", line);
        }
        println!();
    }

    Ok(())
}

/// Show what the index contains
#[inline]
pub async fn show_stats(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let stats = store.stats().await?;

    println!(
        "{} {}",
        style("Collection").bold(),
        style(store.collection()).cyan()
    );
    println!("  Embedding: {}", store.embedder().model_id());
    println!("  Documents: {}", stats.total_documents);
    println!(
        "  Sources ({}): {}",
        stats.sources.len(),
        stats.sources.iter().join(", ")
    );
    println!(
        "  Topics ({}): {}",
        stats.topics.len(),
        stats.topics.iter().join(", ")
    );

    Ok(())
}

/// Remove every entry from the index; refuses without `confirmed`
#[inline]
pub async fn clear_index(config: &Config, confirmed: bool) -> Result<()> {
    if !confirmed {
        println!(
            "{}",
            style("Refusing to clear the index without --yes").yellow()
        );
        return Ok(());
    }

    let mut store = open_store(config).await?;
    store.clear().await?;
    info!("Cleared collection '{}'", store.collection());
    println!(
        "{} {}",
        style("Cleared collection").green(),
        store.collection()
    );
    Ok(())
}

/// Read a JSON context object from a file; no file means an empty context
#[inline]
pub fn load_context(path: Option<&Path>) -> Result<ContextMap> {
    let Some(path) = path else {
        return Ok(ContextMap::new());
    };
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read context file: {}", path.display()))?;
    parse_context_json(&json)
        .with_context(|| format!("Invalid context file: {}", path.display()))
}

/// Read a JSON array of previous attempts from a file
#[inline]
pub fn load_error_history(path: Option<&Path>) -> Result<Vec<ErrorAttempt>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read error history: {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Invalid error history: {}", path.display()))
}

/// Print the capabilities detected for a task
#[inline]
pub fn detect_capabilities(config: &Config, task: &str, context_path: Option<&Path>) -> Result<()> {
    let context = load_context(context_path)?;
    let detector = CapabilityDetector::new(CapabilityTable::load_for(config)?);
    let detected = detector.detect(task, &context);

    if detected.is_empty() {
        println!("No capabilities detected.");
    }
    for id in detected {
        let description = detector
            .table()
            .capabilities
            .get(&id)
            .and_then(|spec| spec.description.clone())
            .unwrap_or_default();
        println!("{} {}", style(&id).cyan(), style(description).dim());
    }

    Ok(())
}

/// Print the context summary that would go into a prompt
#[inline]
pub fn summarize(config: &Config, context_path: &Path) -> Result<()> {
    let context = load_context(Some(context_path))?;
    println!("{}", summarize_context(&context, &config.summary));
    Ok(())
}

/// Print a full prompt, optionally followed by its metadata as JSON on stderr
#[inline]
pub async fn print_prompt(
    config: &Config,
    task: &str,
    context_path: Option<&Path>,
    errors_path: Option<&Path>,
    show_metadata: bool,
) -> Result<()> {
    let context = load_context(context_path)?;
    let history = load_error_history(errors_path)?;

    let builder = PromptBuilder::new(config).await?;
    let (prompt, metadata) = builder.build_prompt(task, &context, &history).await;

    println!("{}", prompt);
    if show_metadata {
        let json =
            serde_json::to_string_pretty(&metadata).context("Failed to serialize metadata")?;
        eprintln!("{}", json);
    }

    Ok(())
}
