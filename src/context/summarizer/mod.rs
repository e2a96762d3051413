// Context summarizer module
// One `- <key>: <repr> (type: <type>) [TAG, ...]` line per context key


use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{ContextMap, ContextValue};

pub const TAG_BINARY: &str = "BINARY DATA";
pub const TAG_PLAIN_TEXT: &str = "PLAIN TEXT";
pub const TAG_BASE64: &str = "BASE64-ENCODED";
pub const TAG_LARGE_STRING: &str = "LARGE STRING (truncated)";
pub const TAG_REDACTED: &str = "REDACTED";
pub const TAG_PRIMITIVE: &str = "PRIMITIVE VALUE";
pub const TAG_COLLECTION: &str = "COLLECTION";

pub const EMPTY_CONTEXT: &str = "(empty)";

const DEFAULT_TRUNCATE_THRESHOLD: usize = 100;
const BASE64_DECODER: &str = "base64.b64decode";

/// How a single context key is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Heavy field: long strings are cut to the threshold
    Truncate,
    Full,
    Redact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Characters kept from a heavy string before it is truncated
    pub truncate_threshold: usize,
    pub heavy_fields: BTreeSet<String>,
    /// Field name to the decoding call generated code must apply
    pub encoded_fields: BTreeMap<String, String>,
    pub redacted_fields: BTreeSet<String>,
}

impl Default for SummaryConfig {
    #[inline]
    fn default() -> Self {
        let set = |names: &[&str]| names.iter().map(|n| (*n).to_string()).collect();
        Self {
            truncate_threshold: DEFAULT_TRUNCATE_THRESHOLD,
            heavy_fields: set(&[
                "attachment_data",
                "email_body",
                "file_content",
                "html_content",
                "image_base64",
                "pdf_base64",
                "raw_html",
            ]),
            encoded_fields: ["attachment_data", "image_base64", "pdf_base64"]
                .into_iter()
                .map(|name| (name.to_string(), BASE64_DECODER.to_string()))
                .collect(),
            redacted_fields: set(&["access_token", "api_key", "password", "secret"]),
        }
    }
}

impl SummaryConfig {
    #[inline]
    pub fn policy_for(&self, key: &str) -> FieldPolicy {
        if self.redacted_fields.contains(key) {
            FieldPolicy::Redact
        } else if self.heavy_fields.contains(key) {
            FieldPolicy::Truncate
        } else {
            FieldPolicy::Full
        }
    }

    #[inline]
    pub fn decoder_for(&self, key: &str) -> Option<&str> {
        self.encoded_fields.get(key).map(String::as_str)
    }
}

/// Summarize every key of `context`, one line per key in sorted order.
///
/// Never fails; an empty context renders as `(empty)`.
#[inline]
pub fn summarize_context(context: &ContextMap, config: &SummaryConfig) -> String {
    if context.is_empty() {
        return EMPTY_CONTEXT.to_string();
    }

    context
        .iter()
        .map(|(key, value)| summarize_field(key, value, config))
        .collect::<Vec<_>>()
        .join("\n")
}

fn summarize_field(key: &str, value: &ContextValue, config: &SummaryConfig) -> String {
    let policy = config.policy_for(key);
    let mut tags: Vec<&str> = Vec::new();
    let mut decode_line = None;

    let repr = if policy == FieldPolicy::Redact {
        tags.push(TAG_REDACTED);
        match value {
            ContextValue::String(s) => format!("<redacted, {} chars>", s.chars().count()),
            _ => "<redacted>".to_string(),
        }
    } else {
        match value {
            ContextValue::Binary(data) => {
                tags.push(TAG_BINARY);
                format!(
                    "<{} of already-decoded bytes; use directly, do not decode again>",
                    format_size(data.len())
                )
            }
            ContextValue::String(s) => {
                if let Some(decoder) = config.decoder_for(key) {
                    tags.push(TAG_BASE64);
                    decode_line = Some(format!(
                        "  decode before use: {}(context[\"{}\"])",
                        decoder, key
                    ));
                }
                let total = s.chars().count();
                if policy == FieldPolicy::Truncate && total > config.truncate_threshold {
                    tags.push(TAG_LARGE_STRING);
                    let prefix: String = s.chars().take(config.truncate_threshold).collect();
                    format!("{:?}... (truncated, {} chars total)", prefix, total)
                } else {
                    if decode_line.is_none() {
                        tags.push(TAG_PLAIN_TEXT);
                    }
                    format!("{:?}", s)
                }
            }
            ContextValue::Integer(i) => {
                tags.push(TAG_PRIMITIVE);
                i.to_string()
            }
            ContextValue::Float(f) => {
                tags.push(TAG_PRIMITIVE);
                f.to_string()
            }
            ContextValue::Boolean(b) => {
                tags.push(TAG_PRIMITIVE);
                b.to_string()
            }
            ContextValue::List(items) => {
                tags.push(TAG_COLLECTION);
                format!("list with {}", plural(items.len(), "item"))
            }
            ContextValue::Map(entries) => {
                tags.push(TAG_COLLECTION);
                format!("dict with {}", plural(entries.len(), "key"))
            }
            ContextValue::Null | ContextValue::Other { .. } => {
                format!("<{}>", value.type_name())
            }
        }
    };

    let mut line = format!("- {}: {} (type: {})", key, repr, value.type_name());
    if !tags.is_empty() {
        line.push_str(" [");
        line.push_str(&tags.join(", "));
        line.push(']');
    }
    if let Some(decode) = decode_line {
        line.push('\n');
        line.push_str(&decode);
    }
    line
}

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", count, noun)
    }
}
