// Configuration management module
// Handles TOML configuration for embeddings, chunking, storage and prompt assembly

pub mod settings;

pub use settings::{Config, ConfigError, EmbeddingConfig, EmbeddingProviderKind};

