use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Capability table error: {0}")]
    Capability(String),

    /// Some batches were committed before a later one failed
    #[error("Stored {stored} chunks before failing: {source}")]
    PartialInsert {
        stored: usize,
        source: Box<RagError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod capabilities;
pub mod commands;
pub mod config;
pub mod context;
pub mod database;
pub mod embeddings;
pub mod indexer;
pub mod prompt;

pub use capabilities::{CapabilityDetector, CapabilityTable};
pub use context::{ContextMap, ContextValue, SummaryConfig, summarize_context};
pub use prompt::{ErrorAttempt, PromptBuilder, PromptMetadata, RetrievalMethod};
