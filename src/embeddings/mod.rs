// Embeddings module
// Documentation chunking plus the embedding functions behind the vector store

pub mod chunking;
pub mod hashing;
pub mod ollama;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::{RagError, Result};

pub use chunking::{ChunkingConfig, DocumentChunk, MetadataValue, chunk_document, chunk_with_config};
pub use hashing::HashingEmbedder;
pub use ollama::OllamaClient;

/// A fixed embedding function
///
/// Every vector produced by one provider has `dimension()` entries, and
/// `model_id()` changes whenever the mapping from text to vector changes.
/// The vector store records the id so entries from different functions never
/// share a collection.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier of the embedding function version
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Embed every text, preserving order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::Embedding("Provider returned no embedding".to_string()))
    }
}

/// Build the configured embedding provider
///
/// For Ollama this also checks that the server answers and serves the model,
/// so an unreachable backend fails here rather than on first use.
#[inline]
pub async fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingProviderKind::Hashing => {
            info!("Using local hashing embedder ({} dimensions)", config.dimension);
            Ok(Arc::new(HashingEmbedder::new(config.dimension as usize)))
        }
        EmbeddingProviderKind::Ollama => {
            let client = OllamaClient::new(config)
                .map_err(|e| RagError::Embedding(format!("Failed to create Ollama client: {e:#}")))?;

            let checker = client.clone();
            tokio::task::spawn_blocking(move || checker.health_check())
                .await
                .map_err(|e| RagError::Embedding(format!("Health check task failed: {e}")))?
                .map_err(|e| RagError::Embedding(format!("Ollama is unavailable: {e:#}")))?;

            Ok(Arc::new(client))
        }
    }
}
