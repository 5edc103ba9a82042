use super::*;
use tempfile::TempDir;

#[test]
fn load_existing_config_without_file_uses_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = load_existing_config(temp_dir.path()).expect("config loaded successfully");

    assert_eq!(config.ollama, OllamaConfig::default());
    assert_eq!(config.chroma, ChromaConfig::default());
    assert_eq!(config.get_base_dir(), temp_dir.path());
}

#[test]
fn load_existing_config_reads_saved_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("defaults should load");
    config.ollama.model = "nomic-embed-text".to_string();
    config.save().expect("config should save");

    let loaded = load_existing_config(temp_dir.path()).expect("config loaded successfully");
    assert_eq!(loaded.ollama.model, "nomic-embed-text");
}

#[test]
fn load_existing_config_recovers_from_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(temp_dir.path().join("config.toml"), "[ollama\n")
        .expect("should write config");

    let config = load_existing_config(temp_dir.path()).expect("config loaded successfully");
    assert_eq!(config.ollama, OllamaConfig::default());
}

#[test]
fn health_urls() {
    assert_eq!(
        ollama_health_url(&OllamaConfig::default()),
        "http://localhost:11434/api/version"
    );
    assert_eq!(
        chroma_health_url(&ChromaConfig::default()),
        "http://localhost:8000/api/v1/heartbeat"
    );
}

#[test]
fn show_config_with_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    show_config(temp_dir.path()).expect("show_config should succeed");
}
