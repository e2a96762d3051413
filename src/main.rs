use std::path::PathBuf;

use clap::{Parser, Subcommand};
use codegen_rag::Result;
use codegen_rag::commands::{
    clear_index, detect_capabilities, ingest_docs, init_config, print_prompt, query_docs,
    show_config, show_stats, summarize,
};
use codegen_rag::config::Config;

#[derive(Parser)]
#[command(name = "codegen-rag")]
#[command(about = "Documentation retrieval and prompt assembly for task-specific code generation")]
#[command(version)]
struct Cli {
    /// Base directory holding config.toml, capabilities.toml, docs and vectors
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the configuration, or write a default config file
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Chunk and embed the integration docs into the vector index
    Ingest {
        /// Remove existing entries first
        #[arg(long)]
        clear: bool,
    },
    /// Search the indexed documentation
    Query {
        text: String,
        /// Only return chunks from this capability
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
    /// Show what the vector index contains
    Stats,
    /// Remove every entry from the vector index
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// List the capabilities detected for a task
    Detect {
        task: String,
        /// JSON file with the execution context
        #[arg(long)]
        context: Option<PathBuf>,
    },
    /// Print the summary of an execution context
    Summarize {
        /// JSON file with the execution context
        #[arg(long)]
        context: PathBuf,
    },
    /// Assemble and print the generation prompt for a task
    Prompt {
        task: String,
        /// JSON file with the execution context
        #[arg(long)]
        context: Option<PathBuf>,
        /// JSON file with previous failed attempts
        #[arg(long)]
        errors: Option<PathBuf>,
        /// Also print prompt metadata as JSON on stderr
        #[arg(long)]
        metadata: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.base_dir {
        Some(dir) => Config::load(dir)?,
        None => Config::load_default()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config)?;
            } else {
                init_config(&config)?;
            }
        }
        Commands::Ingest { clear } => {
            ingest_docs(&config, clear).await?;
        }
        Commands::Query {
            text,
            source,
            topic,
            top_k,
        } => {
            query_docs(&config, &text, source.as_deref(), topic.as_deref(), top_k).await?;
        }
        Commands::Stats => {
            show_stats(&config).await?;
        }
        Commands::Clear { yes } => {
            clear_index(&config, yes).await?;
        }
        Commands::Detect { task, context } => {
            detect_capabilities(&config, &task, context.as_deref())?;
        }
        Commands::Summarize { context } => {
            summarize(&config, &context)?;
        }
        Commands::Prompt {
            task,
            context,
            errors,
            metadata,
        } => {
            print_prompt(
                &config,
                &task,
                context.as_deref(),
                errors.as_deref(),
                metadata,
            )
            .await?;
        }
    }

    Ok(())
}
