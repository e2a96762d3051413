use super::*;
use crate::embeddings::HashingEmbedder;
use crate::embeddings::testing::FailingEmbedder;
use std::sync::Arc;
use tempfile::TempDir;

async fn create_test_indexer() -> (Indexer, Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    let store = VectorStore::open(&config, Arc::new(HashingEmbedder::new(64)))
        .await
        .expect("should open vector store");

    let indexer = Indexer::new(&config, store).with_progress(false);
    (indexer, config, temp_dir)
}

fn write_doc(config: &Config, relative: &str, content: &[u8]) {
    let path = config.docs_dir().join(INTEGRATIONS_DIR).join(relative);
    fs::create_dir_all(path.parent().expect("doc path has a parent")).expect("should create dirs");
    fs::write(path, content).expect("should write doc");
}

#[tokio::test]
async fn discovery_follows_layout() {
    let (_indexer, config, _temp_dir) = create_test_indexer().await;
    write_doc(&config, "email_read.md", b"## Inbox\n\nread_inbox()");
    write_doc(&config, "pdf_ocr/languages.md", b"## Languages\n\neng, deu");
    write_doc(&config, "pdf_ocr/notes.txt", b"ignored");
    write_doc(&config, "README", b"ignored");

    let docs = discover_docs(&config.docs_dir()).expect("should discover docs");

    let found: Vec<(&str, &str)> = docs
        .iter()
        .map(|doc| (doc.source.as_str(), doc.topic.as_str()))
        .collect();
    assert_eq!(found, vec![("email_read", "overview"), ("pdf_ocr", "languages")]);
}

#[tokio::test]
async fn discovery_without_docs_dir_is_empty() {
    let (_indexer, config, _temp_dir) = create_test_indexer().await;
    assert!(
        discover_docs(&config.docs_dir())
            .expect("missing directory is not an error")
            .is_empty()
    );
}

#[tokio::test]
async fn ingest_stores_chunks_with_source_and_topic() {
    let (mut indexer, config, _temp_dir) = create_test_indexer().await;
    write_doc(
        &config,
        "email_read.md",
        b"## Reading\n\nCall read_inbox.\n\n## Marking\n\nCall mark_read.",
    );
    write_doc(&config, "pdf_to_image/rendering.md", b"## Render\n\nCall render_page.");

    let report = indexer.ingest(false).await.expect("ingest should succeed");

    assert_eq!(report.files_processed, 2);
    assert_eq!(report.chunks_stored, 3);
    assert!(report.failures.is_empty());

    let stats = indexer.store().stats().await.expect("should compute stats");
    assert_eq!(stats.total_documents, 3);
    assert!(stats.sources.contains("email_read"));
    assert!(stats.topics.contains("rendering"));
}

#[tokio::test]
async fn ingest_twice_appends_unless_cleared() {
    let (mut indexer, config, _temp_dir) = create_test_indexer().await;
    write_doc(&config, "email_read.md", b"## Reading\n\nCall read_inbox.");

    indexer.ingest(false).await.expect("first ingest");
    indexer.ingest(false).await.expect("second ingest");
    assert_eq!(indexer.store().count().await.expect("should count"), 2);

    indexer.ingest(true).await.expect("clearing ingest");
    assert_eq!(indexer.store().count().await.expect("should count"), 1);
}

#[tokio::test]
async fn unreadable_file_is_reported_and_skipped() {
    let (mut indexer, config, _temp_dir) = create_test_indexer().await;
    write_doc(&config, "broken.md", &[0xff, 0xfe, 0x00, 0x80]);
    write_doc(&config, "email_read.md", b"## Reading\n\nCall read_inbox.");

    let report = indexer.ingest(false).await.expect("ingest should succeed");

    assert_eq!(report.files_processed, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].0.ends_with("broken.md"));
}

#[tokio::test]
async fn lock_is_released_after_ingest() {
    let (mut indexer, _config, _temp_dir) = create_test_indexer().await;

    indexer.ingest(false).await.expect("ingest should succeed");

    assert!(!indexer.lock_file_path.exists());
    assert!(!indexer.is_ingest_running());
}

#[tokio::test]
async fn fresh_lock_blocks_concurrent_ingest() {
    let (mut indexer, _config, _temp_dir) = create_test_indexer().await;
    fs::write(&indexer.lock_file_path, unix_now().as_secs().to_string())
        .expect("should write lock");

    assert!(indexer.is_ingest_running());
    assert!(indexer.ingest(false).await.is_err());
    // The other run's lock is left alone
    assert!(indexer.lock_file_path.exists());
}

#[tokio::test]
async fn stale_lock_is_replaced() {
    let (mut indexer, _config, _temp_dir) = create_test_indexer().await;
    fs::write(&indexer.lock_file_path, "1000").expect("should write lock");

    assert!(!indexer.is_ingest_running());
    indexer
        .ingest(false)
        .await
        .expect("stale lock should not block ingest");
    assert!(!indexer.lock_file_path.exists());
}

#[tokio::test]
async fn partial_file_failure_counts_committed_chunks() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.vector_store.batch_size = 2;
    let store = VectorStore::open(&config, Arc::new(FailingEmbedder::after(1, 64)))
        .await
        .expect("should open vector store");
    let mut indexer = Indexer::new(&config, store).with_progress(false);
    write_doc(
        &config,
        "email_read.md",
        b"## One\n\nFirst.\n\n## Two\n\nSecond.\n\n## Three\n\nThird.\n\n## Four\n\nFourth.",
    );

    let report = indexer.ingest(false).await.expect("ingest should finish");

    assert_eq!(report.files_processed, 0);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].1.contains("Stored 2 chunks"));
    assert_eq!(report.chunks_stored, 2);
    let stats = indexer.store().stats().await.expect("should compute stats");
    assert_eq!(stats.total_documents, report.chunks_stored);
}
