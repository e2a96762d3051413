// Documentation retrieval module
// Vector and file backends plus the file cache behind the fallback

use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::database::VectorStore;

/// Directory under the docs root holding one markdown file per capability
pub const INTEGRATIONS_DIR: &str = "integrations";

/// How documentation was obtained for a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetrievalMethod {
    /// Semantic search over the vector index
    Vector,
    /// Whole per-capability markdown files
    FileFallback,
    /// Nothing to retrieve, or no backend available
    None,
}

impl fmt::Display for RetrievalMethod {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vector => "vector",
            Self::FileFallback => "file-fallback",
            Self::None => "none",
        })
    }
}

/// Where documentation passages come from
pub enum DocBackend {
    Vector(VectorStore),
    /// The vector store could not be opened; read `integrations/<id>.md`
    Files,
    Unavailable,
}

impl DocBackend {
    #[inline]
    pub fn method(&self) -> RetrievalMethod {
        match self {
            Self::Vector(_) => RetrievalMethod::Vector,
            Self::Files => RetrievalMethod::FileFallback,
            Self::Unavailable => RetrievalMethod::None,
        }
    }
}

/// Passages found for one capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedDocs {
    pub passages: Vec<String>,
    pub method: RetrievalMethod,
}

/// Files under the docs root, read at most once per builder.
///
/// Keys are paths relative to the root. Missing files are cached as absent
/// so repeated prompts do not hit the filesystem again.
#[derive(Debug)]
pub struct DocsCache {
    root: PathBuf,
    entries: RwLock<HashMap<PathBuf, Option<String>>>,
}

impl DocsCache {
    #[inline]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            entries: RwLock::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub async fn get(&self, relative: &Path) -> Option<String> {
        let cached = self.entries.read().await.get(relative).cloned();
        if let Some(entry) = cached {
            return entry;
        }

        let path = self.root.join(relative);
        let loaded = match tokio::fs::read_to_string(&path).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No file at {}", path.display());
                None
            }
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        };

        self.entries
            .write()
            .await
            .insert(relative.to_path_buf(), loaded.clone());
        loaded
    }

    #[inline]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Fetch documentation for one capability.
///
/// Vector queries are filtered to the capability's source. A failing query
/// falls back to the capability's markdown file.
pub(crate) async fn retrieve(
    backend: &DocBackend,
    cache: &DocsCache,
    capability: &str,
    task: &str,
    top_k: usize,
) -> RetrievedDocs {
    match backend {
        DocBackend::Vector(store) => {
            let query = format!("{} {}", capability, task);
            match store.query(&query, top_k, Some(capability), None).await {
                Ok(hits) => RetrievedDocs {
                    passages: hits.into_iter().map(|hit| hit.text).collect(),
                    method: RetrievalMethod::Vector,
                },
                Err(e) => {
                    warn!(
                        "Vector query for '{}' failed, using file docs: {}",
                        capability, e
                    );
                    from_file(cache, capability).await
                }
            }
        }
        DocBackend::Files => from_file(cache, capability).await,
        DocBackend::Unavailable => RetrievedDocs {
            passages: Vec::new(),
            method: RetrievalMethod::None,
        },
    }
}

async fn from_file(cache: &DocsCache, capability: &str) -> RetrievedDocs {
    let relative = Path::new(INTEGRATIONS_DIR).join(format!("{}.md", capability));
    let passages = cache
        .get(&relative)
        .await
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .into_iter()
        .collect();

    RetrievedDocs {
        passages,
        method: RetrievalMethod::FileFallback,
    }
}
