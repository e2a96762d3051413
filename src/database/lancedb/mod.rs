// LanceDB vector database module
// Handles vector storage and similarity search for documentation chunks


pub mod vector_store;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A retrieved chunk, ordered by ascending `distance`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub text: String,
    /// Capability id the chunk was indexed under
    pub source: String,
    pub topic: String,
    /// Originating section heading
    pub section: Option<String>,
    /// Squared L2 distance to the query; smaller is more similar
    pub distance: f32,
}

/// Summary of a collection's contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_documents: usize,
    pub sources: BTreeSet<String>,
    pub topics: BTreeSet<String>,
}

/// Records which embedding function built a collection
///
/// Distances are only comparable between vectors from the same function, so
/// the store refuses to mix entries whose manifest does not match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionManifest {
    pub embedding_model: String,
    pub dimension: usize,
    pub created_at: String,
}

impl CollectionManifest {
    #[inline]
    pub fn new(embedding_model: &str, dimension: usize) -> Self {
        Self {
            embedding_model: embedding_model.to_string(),
            dimension,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Whether entries written under `self` are comparable with `other`'s
    #[inline]
    pub fn is_compatible_with(&self, embedding_model: &str, dimension: usize) -> bool {
        self.embedding_model == embedding_model && self.dimension == dimension
    }
}
