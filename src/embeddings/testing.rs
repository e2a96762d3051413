use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{EmbeddingProvider, HashingEmbedder};
use crate::{RagError, Result};

/// Hashing embedder that starts failing after a fixed number of `embed` calls
pub(crate) struct FailingEmbedder {
    inner: HashingEmbedder,
    successes: usize,
    calls: AtomicUsize,
}

impl FailingEmbedder {
    pub(crate) fn after(successes: usize, dimension: usize) -> Self {
        Self {
            inner: HashingEmbedder::new(dimension),
            successes,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.successes {
            return Err(RagError::Embedding(format!(
                "embedding backend went away on call {}",
                call + 1
            )));
        }
        self.inner.embed(texts).await
    }
}
