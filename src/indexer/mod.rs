// Indexer module
// Ingests integration documentation into the vector index

#[cfg(test)]
mod tests;

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use crate::{RagError, Result};
use crate::config::Config;
use crate::database::VectorStore;
use crate::embeddings::{ChunkingConfig, chunk_with_config, create_provider};
use crate::prompt::INTEGRATIONS_DIR;

/// Topic assigned to `integrations/<capability>.md`
pub const DEFAULT_TOPIC: &str = "overview";

const LOCK_FILE_NAME: &str = ".ingest.lock";
/// A lock older than this is left over from a crashed run
const STALE_LOCK_AGE: Duration = Duration::from_secs(60 * 60);

/// One markdown file and the metadata its chunks are stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocFile {
    pub path: PathBuf,
    pub source: String,
    pub topic: String,
}

/// Outcome of an ingest run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub files_processed: usize,
    /// Includes chunks committed from files that failed partway
    pub chunks_stored: usize,
    /// Files that could not be read or stored, with the reason
    pub failures: Vec<(PathBuf, String)>,
}

/// Find ingestible markdown files under `<docs_dir>/integrations`.
///
/// `integrations/<capability>.md` is stored with topic `overview` and
/// `integrations/<capability>/<topic>.md` with its own topic. Anything else
/// is ignored. A missing directory yields no files.
#[inline]
pub fn discover_docs(docs_dir: &Path) -> Result<Vec<DocFile>> {
    let root = docs_dir.join(INTEGRATIONS_DIR);
    if !root.is_dir() {
        warn!("No integration docs directory at {}", root.display());
        return Ok(Vec::new());
    }

    let mut docs = Vec::new();
    for entry in read_dir_sorted(&root)? {
        if entry.is_dir() {
            let Some(source) = file_name(&entry) else {
                continue;
            };
            for nested in read_dir_sorted(&entry)? {
                if let Some(topic) = markdown_stem(&nested) {
                    docs.push(DocFile {
                        source: source.clone(),
                        topic,
                        path: nested,
                    });
                }
            }
        } else if let Some(source) = markdown_stem(&entry) {
            docs.push(DocFile {
                source,
                topic: DEFAULT_TOPIC.to_string(),
                path: entry,
            });
        }
    }

    debug!("Discovered {} doc files under {}", docs.len(), root.display());
    Ok(docs)
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to list directory: {}", dir.display()))?;
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

fn markdown_stem(path: &Path) -> Option<String> {
    let is_markdown = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"));
    if !is_markdown || !path.is_file() {
        return None;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}

/// Chunks documentation files and writes them to the vector index
pub struct Indexer {
    store: VectorStore,
    chunking: ChunkingConfig,
    docs_dir: PathBuf,
    lock_file_path: PathBuf,
    show_progress: bool,
}

impl Indexer {
    #[inline]
    pub fn new(config: &Config, store: VectorStore) -> Self {
        Self {
            store,
            chunking: config.chunking.clone(),
            docs_dir: config.docs_dir(),
            lock_file_path: config.get_base_dir().join(LOCK_FILE_NAME),
            show_progress: console::user_attended_stderr(),
        }
    }

    /// Open the configured embedding provider and vector index
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        let provider = create_provider(&config.embedding).await?;
        let store = VectorStore::open(config, provider).await?;
        Ok(Self::new(config, store))
    }

    #[must_use]
    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    #[inline]
    pub fn docs_dir(&self) -> &Path {
        &self.docs_dir
    }

    /// Whether another process holds a fresh ingest lock
    #[inline]
    pub fn is_ingest_running(&self) -> bool {
        lock_is_fresh(&self.lock_file_path)
    }

    /// Ingest every discovered doc file, optionally clearing the index first.
    ///
    /// A file that fails to read or store is logged and reported; the rest
    /// are still ingested. Each stored batch is an atomic append.
    #[inline]
    pub async fn ingest(&mut self, clear_first: bool) -> Result<IngestReport> {
        let _lock = IngestLock::acquire(&self.lock_file_path)?;

        if clear_first {
            info!("Clearing collection '{}' before ingest", self.store.collection());
            self.store.clear().await?;
        }

        let docs = discover_docs(&self.docs_dir)?;
        let mut report = IngestReport::default();

        let bar = if self.show_progress {
            ProgressBar::new(docs.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Indexing {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        for doc in &docs {
            bar.set_message(format!("{}/{}", doc.source, doc.topic));
            match self.ingest_file(doc).await {
                Ok(stored) => {
                    report.files_processed += 1;
                    report.chunks_stored += stored;
                }
                Err(e) => {
                    if let RagError::PartialInsert { stored, .. } = &e {
                        report.chunks_stored += stored;
                    }
                    error!("Failed to ingest {}: {}", doc.path.display(), e);
                    report.failures.push((doc.path.clone(), e.to_string()));
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        info!(
            "Ingested {} files into '{}' ({} chunks, {} failures)",
            report.files_processed,
            self.store.collection(),
            report.chunks_stored,
            report.failures.len()
        );
        Ok(report)
    }

    async fn ingest_file(&mut self, doc: &DocFile) -> Result<usize> {
        let content = tokio::fs::read_to_string(&doc.path)
            .await
            .with_context(|| format!("Failed to read doc file: {}", doc.path.display()))?;

        let chunks = chunk_with_config(&content, &doc.source, &doc.topic, &self.chunking);
        debug!(
            "{} produced {} chunks",
            doc.path.display(),
            chunks.len()
        );
        self.store.add_documents(&chunks).await
    }
}

/// Exclusive ingest lock, removed on drop
struct IngestLock {
    path: PathBuf,
}

impl IngestLock {
    fn acquire(path: &Path) -> Result<Self> {
        if path.exists() {
            if lock_is_fresh(path) {
                return Err(anyhow!(
                    "Another ingest is already running (lock file {})",
                    path.display()
                )
                .into());
            }
            warn!("Removing stale ingest lock {}", path.display());
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove stale lock: {}", path.display()))?;
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(anyhow!("Another ingest is already running").into());
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to create lock file: {}", path.display()))
                    .into());
            }
        };
        write!(file, "{}", unix_now().as_secs()).context("Failed to write lock file")?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for IngestLock {
    #[inline]
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove ingest lock {}: {}", self.path.display(), e);
        }
    }
}

fn lock_is_fresh(path: &Path) -> bool {
    let Ok(content) = fs::read_to_string(path) else {
        return false;
    };
    let Ok(created) = content.trim().parse::<u64>() else {
        return false;
    };
    unix_now().as_secs().saturating_sub(created) < STALE_LOCK_AGE.as_secs()
}

fn unix_now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}
