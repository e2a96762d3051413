#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How far back from a window end we look for a sentence terminator
const SENTENCE_LOOKBACK: usize = 100;

/// Heading used for text that precedes the first `##`/`###` heading
pub const DEFAULT_SECTION_HEADING: &str = "General";

static SECTION_HEADING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(#{2,3})[ \t]+([^\r\n]+?)[ \t]*\r?$").expect("valid regex")
});

/// A metadata value attached to a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Int(i64),
    Text(String),
}

impl From<&str> for MetadataValue {
    #[inline]
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for MetadataValue {
    #[inline]
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// A bounded passage of integration documentation, the unit of semantic indexing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Heading-prefixed passage text
    pub text: String,
    /// Capability id whose documentation this chunk belongs to
    pub source: String,
    pub topic: String,
    /// Carries at least `section` and `chunk_index`
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl DocumentChunk {
    /// The heading of the section this chunk was cut from
    #[inline]
    pub fn section(&self) -> Option<&str> {
        match self.metadata.get("section") {
            Some(MetadataValue::Text(section)) => Some(section.as_str()),
            _ => None,
        }
    }

    /// Sequential index of this chunk within its section
    #[inline]
    pub fn chunk_index(&self) -> Option<i64> {
        match self.metadata.get("chunk_index") {
            Some(MetadataValue::Int(index)) => Some(*index),
            _ => None,
        }
    }
}

/// Configuration for documentation chunking
///
/// `overlap` must stay below `target_size`; `Config::validate` enforces this,
/// `chunk_document` does not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target window size in characters
    pub target_size: usize,
    /// Characters shared between consecutive windows of one section
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            target_size: 1000,
            overlap: 200,
        }
    }
}

struct Section<'a> {
    marker: &'a str,
    heading: &'a str,
    body: &'a str,
}

/// Chunk a markdown document using the sizes from `config`
#[inline]
pub fn chunk_with_config(
    content: &str,
    source: &str,
    topic: &str,
    config: &ChunkingConfig,
) -> Vec<DocumentChunk> {
    chunk_document(content, source, topic, config.target_size, config.overlap)
}

/// Split a markdown document into heading-prefixed, overlapping chunks
///
/// Sections start at `##` and `###` headings. A section whose body fits in
/// `target_size` characters becomes one chunk; longer bodies are cut into
/// windows that prefer to end on a sentence terminator and that start
/// `overlap` characters before the previous window ended. Windows shrink
/// when the heading prefix is long, so no chunk exceeds
/// `target_size + overlap` characters for headings shorter than `target_size`.
///
/// Precondition: `overlap < target_size`.
#[inline]
pub fn chunk_document(
    content: &str,
    source: &str,
    topic: &str,
    target_size: usize,
    overlap: usize,
) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();

    if content.trim().is_empty() {
        return chunks;
    }

    for section in split_sections(content) {
        let body = section.body.trim();
        if body.is_empty() {
            continue;
        }

        let prefix = format!("{} {}\n\n", section.marker, section.heading);
        let prefix_len = prefix.chars().count();
        let body_len = body.chars().count();
        // A chunk, heading included, stays within target_size + overlap
        let budget = (target_size + overlap)
            .saturating_sub(prefix_len)
            .min(target_size)
            .max(overlap + 1);

        let windows = if body_len <= target_size && prefix_len + body_len <= target_size + overlap {
            vec![body.to_string()]
        } else {
            split_windows(body, budget, overlap)
        };

        for (index, window) in windows.into_iter().enumerate() {
            let mut metadata = BTreeMap::new();
            metadata.insert("section".to_string(), section.heading.into());
            metadata.insert("chunk_index".to_string(), (index as i64).into());

            chunks.push(DocumentChunk {
                text: format!("{}{}", prefix, window),
                source: source.to_string(),
                topic: topic.to_string(),
                metadata,
            });
        }
    }

    debug!(
        "Chunked '{}' ({}) into {} chunks (avg {} chars)",
        source,
        topic,
        chunks.len(),
        chunks.iter().map(|c| c.text.chars().count()).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}

/// Split content into sections at level-2 and level-3 headings
fn split_sections(content: &str) -> Vec<Section<'_>> {
    let mut sections = Vec::new();
    let mut marker = "##";
    let mut heading = DEFAULT_SECTION_HEADING;
    let mut body_start = 0;

    for captures in SECTION_HEADING_REGEX.captures_iter(content).flatten() {
        let (Some(whole), Some(level), Some(title)) = (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };

        sections.push(Section {
            marker,
            heading,
            body: content.get(body_start..whole.start()).unwrap_or_default(),
        });

        marker = level.as_str();
        heading = title.as_str();
        body_start = whole.end();
    }

    sections.push(Section {
        marker,
        heading,
        body: content.get(body_start..).unwrap_or_default(),
    });

    sections
}

/// Cut a section body into overlapping windows of at most `target_size` characters
fn split_windows(body: &str, target_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = body.chars().collect();
    let len = chars.len();
    let mut windows = Vec::new();
    let mut start = 0;

    while start < len {
        let mut end = (start + target_size).min(len);

        if end < len {
            let floor = end.saturating_sub(SENTENCE_LOOKBACK).max(start);
            if let Some(pos) = chars
                .get(floor..end)
                .and_then(|slice| slice.iter().rposition(|c| matches!(c, '.' | '!' | '?')))
            {
                let cut = floor + pos + 1;
                if cut > start {
                    end = cut;
                }
            }
        }

        let window: String = chars.get(start..end).unwrap_or_default().iter().collect();
        let window = window.trim();
        if !window.is_empty() {
            windows.push(window.to_string());
        }

        if end >= len {
            break;
        }

        // Guarantees forward progress even for a misconfigured overlap
        start = end.saturating_sub(overlap).max(start + 1);
    }

    windows
}
