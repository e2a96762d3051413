use super::split_windows as split_windows_impl;
use super::*;

fn sentence_body(sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("Sentence number {:03} ends here. ", i))
        .collect()
}

fn body_of(chunk: &DocumentChunk) -> &str {
    chunk
        .text
        .split_once("\n\n")
        .map_or(chunk.text.as_str(), |(_, body)| body)
}

#[test]
fn empty_content() {
    assert!(chunk_document("", "email_read", "overview", 700, 100).is_empty());
    assert!(chunk_document("   \n\n  ", "email_read", "overview", 700, 100).is_empty());
}

#[test]
fn small_section_is_single_chunk() {
    let content = "## Reading mail\n\nCall `read_inbox(client)` to list unread messages.";
    let chunks = chunk_document(content, "email_read", "overview", 700, 100);

    assert_eq!(chunks.len(), 1);
    assert_eq!(
        chunks[0].text,
        "## Reading mail\n\nCall `read_inbox(client)` to list unread messages."
    );
    assert_eq!(chunks[0].source, "email_read");
    assert_eq!(chunks[0].topic, "overview");
    assert_eq!(chunks[0].section(), Some("Reading mail"));
    assert_eq!(chunks[0].chunk_index(), Some(0));
}

#[test]
fn leading_text_uses_general_heading() {
    let content = "Intro text before any heading.\n\n## Usage\n\nUse it.";
    let chunks = chunk_document(content, "pdf_text", "overview", 700, 100);

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].section(), Some(DEFAULT_SECTION_HEADING));
    assert!(chunks[0].text.starts_with("## General\n\n"));
    assert_eq!(chunks[1].section(), Some("Usage"));
}

#[test]
fn level_three_headings_split_sections() {
    let content = "## Setup\n\nInstall it.\n\n### Credentials\n\nSet the token.\n\n# Title\n\nStill credentials.";
    let chunks = chunk_document(content, "database", "setup", 700, 100);

    assert_eq!(chunks.len(), 2);
    assert!(chunks[1].text.starts_with("### Credentials\n\n"));
    // Level-1 headings do not open a new section
    assert!(chunks[1].text.contains("# Title"));
    assert!(chunks[1].text.contains("Still credentials."));
}

#[test]
fn empty_sections_are_skipped() {
    let content = "## Empty\n\n## Filled\n\nSomething here.";
    let chunks = chunk_document(content, "http_request", "overview", 700, 100);

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].section(), Some("Filled"));
}

#[test]
fn long_section_splits_into_overlapping_windows() {
    let body = sentence_body(50);
    assert!(body.len() >= 1500);
    let content = format!("## Extraction\n\n{}", body);

    let chunks = chunk_document(&content, "pdf_text", "overview", 700, 100);

    assert!(chunks.len() >= 2, "expected at least two chunks");
    for chunk in &chunks {
        assert!(chunk.text.chars().count() <= 800, "chunk too long");
        assert!(chunk.text.starts_with("## Extraction\n\n"));
    }

    for pair in chunks.windows(2) {
        let next_body = body_of(&pair[1]);
        let shared: String = next_body.chars().take(40).collect();
        assert!(
            body_of(&pair[0]).contains(&shared),
            "consecutive windows should overlap"
        );
    }
}

#[test]
fn long_heading_counts_toward_chunk_size() {
    let heading = "Configuring the mailbox poller ".repeat(5);
    let heading = heading.trim();
    assert!(heading.chars().count() >= 150);
    let body = sentence_body(50);
    let content = format!("## {}\n\n{}", heading, body);

    let chunks = chunk_document(&content, "email_read", "overview", 700, 100);

    assert!(chunks.len() >= 3);
    for chunk in &chunks {
        assert!(
            chunk.text.chars().count() <= 800,
            "chunk has {} chars",
            chunk.text.chars().count()
        );
        assert_eq!(chunk.section(), Some(heading));
    }
}

#[test]
fn long_heading_splits_body_that_would_otherwise_fit() {
    let heading = "h".repeat(200);
    let body = sentence_body(20);
    assert!(body.chars().count() <= 700);
    let content = format!("## {}\n\n{}", heading, body);

    let chunks = chunk_document(&content, "email_read", "overview", 700, 100);

    assert!(chunks.len() >= 2);
    assert!(chunks.iter().all(|chunk| chunk.text.chars().count() <= 800));
}

#[test]
fn windows_prefer_sentence_boundaries() {
    let content = format!("## Extraction\n\n{}", sentence_body(60));
    let chunks = chunk_document(&content, "pdf_text", "overview", 700, 100);

    // Every window except the last one ends on a terminator
    for chunk in &chunks[..chunks.len() - 1] {
        assert!(body_of(chunk).ends_with('.'));
    }
}

#[test]
fn windows_cover_every_sentence() {
    let body = sentence_body(80);
    let content = format!("## Coverage\n\n{}", body);
    let chunks = chunk_document(&content, "spreadsheet", "overview", 500, 120);

    for i in 0..80 {
        let sentence = format!("Sentence number {:03} ends here.", i);
        assert!(
            chunks.iter().any(|c| c.text.contains(&sentence)),
            "sentence {} missing from chunks",
            i
        );
    }
}

#[test]
fn chunk_indices_are_sequential_per_section() {
    let content = format!(
        "## First\n\n{}\n\n## Second\n\n{}",
        sentence_body(40),
        sentence_body(40)
    );
    let chunks = chunk_document(&content, "email_send", "overview", 400, 50);

    for section in ["First", "Second"] {
        let indices: Vec<i64> = chunks
            .iter()
            .filter(|c| c.section() == Some(section))
            .filter_map(DocumentChunk::chunk_index)
            .collect();
        let expected: Vec<i64> = (0..indices.len() as i64).collect();
        assert!(indices.len() > 1);
        assert_eq!(indices, expected);
    }
}

#[test]
fn hard_cut_without_terminators() {
    let body = "x".repeat(250);
    let windows = split_windows_impl(&body, 100, 20);

    assert_eq!(windows[0].len(), 100);
    assert!(windows.iter().all(|w| w.len() <= 100));
    // 0..100, 80..180, 160..250
    assert_eq!(windows.len(), 3);
}

#[test]
fn multibyte_text_is_cut_on_char_boundaries() {
    let body = "Überprüfung der Rechnung läuft. ".repeat(40);
    let content = format!("## Prüfung\n\n{}", body);
    let chunks = chunk_document(&content, "pdf_text", "überblick", 300, 50);

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(body_of(chunk).chars().count() <= 300);
    }
}

#[test]
fn chunk_with_config_uses_configured_sizes() {
    let content = format!("## Body\n\n{}", sentence_body(30));
    let config = ChunkingConfig {
        target_size: 200,
        overlap: 40,
    };

    let from_config = chunk_with_config(&content, "database", "overview", &config);
    let direct = chunk_document(&content, "database", "overview", 200, 40);
    assert_eq!(from_config, direct);
}
