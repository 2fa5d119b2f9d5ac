use super::*;
use tempfile::TempDir;

#[test]
fn missing_config_falls_back_to_defaults() {
    let dir = TempDir::new().expect("should create temp dir");

    let config = load_existing_config(dir.path());

    assert_eq!(config.base_dir(), dir.path());
    assert!(!config.ollama.host.is_empty());
    assert!(config.ollama.port > 0);
    assert!(!config.ollama.embedding_model.is_empty());
    assert!(config.ollama.batch_size > 0);
}

#[test]
fn broken_config_falls_back_to_defaults() {
    let dir = TempDir::new().expect("should create temp dir");
    std::fs::write(dir.path().join("config.toml"), "not [valid toml").expect("should write file");

    let config = load_existing_config(dir.path());

    assert_eq!(config, Config::with_base_dir(dir.path()));
}

#[test]
fn documents_dir_input_parsing() {
    assert_eq!(parse_documents_dir("   "), None);
    assert_eq!(
        parse_documents_dir(" /data/corpus "),
        Some(PathBuf::from("/data/corpus"))
    );
}

#[test]
fn unreachable_ollama_reports_failure() {
    let ollama = OllamaConfig {
        host: "127.0.0.1".to_string(),
        port: 9,
        ..OllamaConfig::default()
    };

    assert!(!test_ollama_connection(&ollama));
}
