use super::*;
use crate::database::lancedb::vector_store::MismatchPolicy;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.embedding.provider, EmbeddingProviderKind::Ollama);
    assert_eq!(config.embedding.protocol, "http");
    assert_eq!(config.embedding.host, "localhost");
    assert_eq!(config.embedding.port, 11434);
    assert_eq!(config.embedding.model, "nomic-embed-text:latest");
    assert_eq!(config.chunking.target_size, 1000);
    assert_eq!(config.chunking.overlap, 200);
    assert_eq!(config.vector_store.batch_size, 100);
    assert_eq!(config.prompt.docs_per_capability, 3);
    assert_eq!(config.prompt.code_line_budget, 50);
    assert_eq!(config.summary.truncate_threshold, 100);
    assert!(config.validate().is_ok());
}

#[test]
fn config_validation() {
    let config = Config::default();

    let mut invalid_config = config.clone();
    invalid_config.embedding.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.dimension = 4;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.vector_store.collection = "bad name".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.prompt.docs_per_capability = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.prompt.code_line_budget = 0;
    assert!(invalid_config.validate().is_err());
}

#[test]
fn overlap_must_be_smaller_than_target() {
    let mut config = Config::default();
    config.chunking.target_size = 500;
    config.chunking.overlap = 500;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::OverlapTooLarge(500, 500))
    ));

    config.chunking.overlap = 499;
    assert!(config.validate().is_ok());
}

#[test]
fn embedding_url_generation() {
    let config = Config::default();
    let url = config
        .embedding_url()
        .expect("should generate embedding_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_config_uses_defaults() {
    let partial_toml = r#"
        [embedding]
        provider = "hashing"
        dimension = 256

        [vector_store]
        on_embedding_mismatch = "reset"

        [summary]
        heavy_fields = ["raw_html"]
    "#;

    let config: Config = toml::from_str(partial_toml).expect("should parse partial toml");
    assert_eq!(config.embedding.provider, EmbeddingProviderKind::Hashing);
    assert_eq!(config.embedding.dimension, 256);
    assert_eq!(config.embedding.host, "localhost");
    assert_eq!(config.vector_store.on_embedding_mismatch, MismatchPolicy::Reset);
    assert_eq!(config.vector_store.collection, "integration_docs");
    assert!(config.summary.heavy_fields.contains("raw_html"));
    assert_eq!(config.chunking, ChunkingConfig::default());
}

#[test]
fn load_missing_file_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load defaults");

    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.embedding, EmbeddingConfig::default());
    assert_eq!(config.docs_dir(), temp_dir.path().join("docs"));
    assert_eq!(config.vector_database_path(), temp_dir.path().join("vectors"));
}

#[test]
fn save_and_reload() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("should load defaults");
    config.embedding.provider = EmbeddingProviderKind::Hashing;
    config.chunking.target_size = 700;
    config.chunking.overlap = 100;
    config.prompt.docs_dir = Some(PathBuf::from("integration-docs"));

    config.save().expect("should save config");
    let reloaded = Config::load(temp_dir.path()).expect("should reload config");

    assert_eq!(config, reloaded);
    assert_eq!(reloaded.docs_dir(), temp_dir.path().join("integration-docs"));
}

#[test]
fn load_rejects_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[chunking]\ntarget_size = 300\noverlap = 400\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
#[serial]
fn default_base_dir_honours_env_var() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    // SAFETY: serialized with other env-touching tests
    unsafe { std::env::set_var(HOME_ENV_VAR, temp_dir.path()) };

    let dir = Config::default_base_dir().expect("should resolve base dir");
    assert_eq!(dir, temp_dir.path());

    unsafe { std::env::remove_var(HOME_ENV_VAR) };
}

#[test]
fn setter_validation() {
    let mut config = EmbeddingConfig::default();

    assert!(config.set_port(8080).is_ok());
    assert!(config.set_model("mxbai-embed-large".to_string()).is_ok());
    assert!(config.set_batch_size(128).is_ok());

    assert!(config.set_port(0).is_err());
    assert!(config.set_model("   ".to_string()).is_err());
    assert!(config.set_batch_size(0).is_err());
    assert_eq!(config.port, 8080);
    assert_eq!(config.batch_size, 128);
}
