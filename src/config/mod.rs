// Configuration management module
// TOML settings for the embedding service, the vector store and the console itself

pub mod interactive;
pub mod settings;


use std::path::PathBuf;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{ChromaConfig, Config, ConfigError, OllamaConfig, StudioConfig};

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "VECTOR_STUDIO_CONFIG_DIR";

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    dirs::config_dir()
        .map(|dir| dir.join("vector-studio"))
        .ok_or(ConfigError::DirectoryError)
}
