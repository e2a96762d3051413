// Error history module
// Renders previous failed attempts with hints for the next one

use serde::{Deserialize, Serialize};

/// One failed generation attempt for the same task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorAttempt {
    pub attempt: u32,
    pub error: String,
    #[serde(default)]
    pub code: String,
}

impl ErrorAttempt {
    #[inline]
    pub fn new(attempt: u32, error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            attempt,
            error: error.into(),
            code: code.into(),
        }
    }
}

struct ErrorHint {
    /// Lower-case substrings, any of which selects the hint
    patterns: &'static [&'static str],
    hint: &'static str,
}

const ERROR_HINTS: &[ErrorHint] = &[
    ErrorHint {
        patterns: &["has no attribute 'get_text'", "has no attribute 'extract_text'"],
        hint: "PDF text extraction returned no text layer, so the document is probably \
               scanned. Rasterize the pages with pdf_to_image and run pdf_ocr instead of \
               calling the text extractor again.",
    },
    ErrorHint {
        patterns: &["nonetype"],
        hint: "A call returned None where an object was expected. Check every lookup and \
               extraction result for None before using it.",
    },
    ErrorHint {
        patterns: &["json", "expecting value", "not json serializable"],
        hint: "Print exactly one JSON object to stdout as the final output. Convert bytes, \
               dates and sets to strings or lists before serializing.",
    },
    ErrorHint {
        patterns: &["timeout", "timed out"],
        hint: "The run exceeded its time limit. Avoid unbounded loops, page through large \
               result sets and set explicit timeouts on network calls.",
    },
    ErrorHint {
        patterns: &["keyerror", "key error", "missing key"],
        hint: "A context key was missing. Only use keys listed in the CONTEXT section and \
               read optional ones with a default.",
    },
    ErrorHint {
        patterns: &["incorrect padding", "binascii", "b64decode", "invalid base64"],
        hint: "Fields tagged BINARY DATA are already decoded bytes. Only decode fields tagged \
               BASE64-ENCODED, with the decoder named in the CONTEXT section.",
    },
    ErrorHint {
        patterns: &["modulenotfounderror", "importerror", "no module named"],
        hint: "Only import modules used by the integration documentation; other packages \
               are not installed.",
    },
];

const COMMON_MISTAKES: &[&str] = &[
    "Printing anything other than a single JSON object as the final output",
    "Using a result without checking it for None or emptiness",
    "Decoding values that are already bytes",
    "Calling integration functions with argument names or order that differ from the documentation",
    "Using PDF text extraction on scanned documents instead of OCR",
];

/// Hints whose patterns appear in `error`, in table order.
#[inline]
pub fn hints_for(error: &str) -> Vec<&'static str> {
    let lowered = error.to_lowercase();
    ERROR_HINTS
        .iter()
        .filter(|entry| entry.patterns.iter().any(|p| lowered.contains(p)))
        .map(|entry| entry.hint)
        .collect()
}

/// Render the `## PREVIOUS ATTEMPTS` section, or `None` for an empty history.
///
/// Attempts are numbered by position, out of `history.len() + 1` since the
/// attempt being prompted for is the next one. Code is cut to
/// `code_line_budget` lines.
#[inline]
pub fn render_error_history(history: &[ErrorAttempt], code_line_budget: usize) -> Option<String> {
    if history.is_empty() {
        return None;
    }

    let total = history.len() + 1;
    let mut parts = vec![
        "## PREVIOUS ATTEMPTS".to_string(),
        format!(
            "This is attempt {} of {}. Every earlier attempt failed. Read each failure \
             carefully and do not repeat it.",
            total, total
        ),
    ];

    for (index, attempt) in history.iter().enumerate() {
        parts.push(render_attempt(index + 1, total, attempt, code_line_budget));
    }

    let fixes: Vec<String> = COMMON_MISTAKES
        .iter()
        .map(|mistake| format!("- {}", mistake))
        .collect();
    parts.push(format!(
        "### FIX THESE AND DO NOT REPEAT THEM\n{}",
        fixes.join("\n")
    ));

    Some(parts.join("\n\n"))
}

fn render_attempt(position: usize, total: usize, attempt: &ErrorAttempt, budget: usize) -> String {
    let mut lines = vec![
        format!("### Attempt {} of {} (failed)", position, total),
        "Error:".to_string(),
        fenced_verbatim(&attempt.error),
    ];

    if attempt.code.trim().is_empty() {
        lines.push("Code: (not captured)".to_string());
    } else {
        lines.push("Code that failed:".to_string());
        lines.push("```".to_string());
        let code_lines: Vec<&str> = attempt.code.lines().collect();
        lines.extend(code_lines.iter().take(budget).map(|line| (*line).to_string()));
        if code_lines.len() > budget {
            lines.push(format!("... ({} more lines)", code_lines.len() - budget));
        }
        lines.push("```".to_string());
    }

    let hints = hints_for(&attempt.error);
    if !hints.is_empty() {
        lines.push("Hints:".to_string());
        lines.extend(hints.iter().map(|hint| format!("- {}", hint)));
    }

    lines.join("\n")
}

/// Wrap `text` in a code fence without altering it
fn fenced_verbatim(text: &str) -> String {
    let newline = if text.ends_with('\n') { "" } else { "\n" };
    format!("```\n{}{}```", text, newline)
}
