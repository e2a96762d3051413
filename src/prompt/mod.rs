// Prompt module
// Assembles task, context summary, capability docs and error history into one prompt;
// recoverable problems degrade the prompt and show up in PromptMetadata

pub mod history;
pub mod retrieval;


use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capabilities::{CapabilityDetector, CapabilityTable};
use crate::config::Config;
use crate::context::{ContextMap, SummaryConfig, summarize_context};
use crate::database::VectorStore;
use crate::embeddings::create_provider;
use crate::{RagError, Result};

pub use history::{ErrorAttempt, hints_for, render_error_history};
pub use retrieval::{DocBackend, DocsCache, INTEGRATIONS_DIR, RetrievalMethod, RetrievedDocs};

const FALLBACK_PREAMBLE: &str = "\
You are an expert engineer writing a short, self-contained program for one \
task. The program runs in a sandbox and receives a `context` mapping with \
the inputs described below. Use only the integrations documented in this \
prompt, handle failures explicitly and follow the output requirements \
exactly.";

const OUTPUT_REQUIREMENTS: &str = "\
## OUTPUT REQUIREMENTS
Write the complete program for the task above using only the documented \
integrations and the `context` mapping described in the CONTEXT section.
- The program must print exactly one JSON object to stdout as its final \
output, for example {\"status\": \"success\", \"result\": ...}.
- On failure print {\"status\": \"error\", \"error\": \"<message>\"} instead.
- Print nothing after the JSON object.
Return only the code.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Documentation root; relative to the base directory unless absolute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_dir: Option<PathBuf>,
    /// Preamble file name inside the documentation root
    pub system_prompt_file: String,
    pub docs_per_capability: usize,
    /// Lines of failed code kept per previous attempt
    pub code_line_budget: usize,
}

impl Default for PromptConfig {
    #[inline]
    fn default() -> Self {
        Self {
            docs_dir: None,
            system_prompt_file: "system_prompt.md".to_string(),
            docs_per_capability: 3,
            code_line_budget: 50,
        }
    }
}

/// What went into a prompt, for logging and observability
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMetadata {
    pub integrations_detected: Vec<String>,
    pub context_summary: String,
    pub docs_retrieved_count: usize,
    pub retrieval_method: RetrievalMethod,
}

pub struct PromptBuilder {
    detector: CapabilityDetector,
    summary: SummaryConfig,
    backend: DocBackend,
    docs: DocsCache,
    system_prompt_file: PathBuf,
    docs_per_capability: usize,
    code_line_budget: usize,
}

impl PromptBuilder {
    /// Build from configuration, opening the vector index when possible.
    ///
    /// Invalid configuration or an invalid capability table is an error. A
    /// vector index that cannot be opened is not: the builder falls back to
    /// the per-capability markdown files, or to no documentation at all when
    /// those are missing too.
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RagError::Config(e.to_string()))?;
        let detector = CapabilityDetector::new(CapabilityTable::load_for(config)?);

        let backend = match open_vector_store(config).await {
            Ok(store) => DocBackend::Vector(store),
            Err(e) => {
                let integrations = config.docs_dir().join(INTEGRATIONS_DIR);
                if integrations.is_dir() {
                    warn!("Vector index unavailable, reading docs from files: {}", e);
                    DocBackend::Files
                } else {
                    warn!(
                        "Vector index unavailable and no docs at {}: {}",
                        integrations.display(),
                        e
                    );
                    DocBackend::Unavailable
                }
            }
        };

        info!("Prompt builder ready (retrieval: {})", backend.method());
        Ok(Self::from_parts(config, detector, backend))
    }

    /// Assemble a builder from already constructed parts
    #[inline]
    pub fn from_parts(config: &Config, detector: CapabilityDetector, backend: DocBackend) -> Self {
        Self {
            detector,
            summary: config.summary.clone(),
            backend,
            docs: DocsCache::new(config.docs_dir()),
            system_prompt_file: PathBuf::from(&config.prompt.system_prompt_file),
            docs_per_capability: config.prompt.docs_per_capability.max(1),
            code_line_budget: config.prompt.code_line_budget.max(1),
        }
    }

    #[inline]
    pub fn retrieval_backend(&self) -> RetrievalMethod {
        self.backend.method()
    }

    #[inline]
    pub fn docs_dir(&self) -> &Path {
        self.docs.root()
    }

    #[inline]
    pub fn detect_integrations(&self, task: &str, context: &ContextMap) -> Vec<String> {
        self.detector.detect(task, context)
    }

    #[inline]
    pub fn summarize_context(&self, context: &ContextMap) -> String {
        summarize_context(context, &self.summary)
    }

    /// Build the prompt for one generation attempt.
    ///
    /// Never fails: missing documentation yields in-prompt markers and the
    /// retrieval method actually used is reported in the metadata.
    #[inline]
    pub async fn build_prompt(
        &self,
        task: &str,
        context: &ContextMap,
        error_history: &[ErrorAttempt],
    ) -> (String, PromptMetadata) {
        let integrations = self.detect_integrations(task, context);
        let context_summary = self.summarize_context(context);
        debug!("Detected integrations: {:?}", integrations);

        let mut sections = vec![
            self.load_preamble().await,
            format!("## TASK\n{}", task),
            format!(
                "## CONTEXT\nThe `context` mapping passed to your code contains:\n{}",
                context_summary
            ),
        ];

        let mut docs_retrieved_count = 0;
        let mut retrieval_method = if integrations.is_empty() {
            RetrievalMethod::None
        } else {
            self.backend.method()
        };

        let mut doc_parts = vec!["## INTEGRATION DOCUMENTATION".to_string()];
        if integrations.is_empty() {
            doc_parts.push(
                "(no integrations detected; solve the task with the standard library)".to_string(),
            );
        }
        for capability in &integrations {
            let docs = retrieval::retrieve(
                &self.backend,
                &self.docs,
                capability,
                task,
                self.docs_per_capability,
            )
            .await;

            if docs.method == RetrievalMethod::FileFallback {
                retrieval_method = RetrievalMethod::FileFallback;
            }
            docs_retrieved_count += docs.passages.len();

            let body = if docs.passages.is_empty() {
                format!("(no documentation found for {})", capability)
            } else {
                docs.passages.join("\n\n")
            };
            let heading = match self
                .detector
                .table()
                .capabilities
                .get(capability)
                .and_then(|spec| spec.description.as_deref())
            {
                Some(description) => format!("### {}\n{}", capability, description),
                None => format!("### {}", capability),
            };
            doc_parts.push(format!("{}\n\n{}", heading, body));
        }
        sections.push(doc_parts.join("\n\n"));

        if let Some(history) = render_error_history(error_history, self.code_line_budget) {
            sections.push(history);
        }
        sections.push(OUTPUT_REQUIREMENTS.to_string());

        let metadata = PromptMetadata {
            integrations_detected: integrations,
            context_summary,
            docs_retrieved_count,
            retrieval_method,
        };
        debug!(
            "Built prompt with {} doc passages via {}",
            metadata.docs_retrieved_count, metadata.retrieval_method
        );

        (sections.join("\n\n"), metadata)
    }

    async fn load_preamble(&self) -> String {
        match self.docs.get(&self.system_prompt_file).await {
            Some(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => {
                debug!(
                    "No preamble at {}, using built-in text",
                    self.docs.root().join(&self.system_prompt_file).display()
                );
                FALLBACK_PREAMBLE.to_string()
            }
        }
    }
}

async fn open_vector_store(config: &Config) -> Result<VectorStore> {
    let provider = create_provider(&config.embedding).await?;
    VectorStore::open(config, provider).await
}
