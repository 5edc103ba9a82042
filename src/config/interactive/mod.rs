#[cfg(test)]
mod tests;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{ChromaConfig, Config, OllamaConfig};
use crate::http::build_agent;

const PROTOCOLS: &[&str] = &["http", "https"];

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Vector Studio Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure the Ollama instance used to embed documents and queries.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Chroma Configuration").bold().yellow());
    eprintln!("Configure the Chroma server that stores your collections.");
    eprintln!();

    configure_chroma(&mut config.chroma)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if reachable(&ollama_health_url(&config.ollama)) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before adding documents.");
    }

    if reachable(&chroma_health_url(&config.chroma)) {
        eprintln!("{}", style("✓ Chroma connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Chroma").yellow()
        );
        eprintln!("You can continue, but collection commands will fail until Chroma is up.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    match config.ollama.ollama_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Model: {}", style(&config.ollama.model).cyan());
    eprintln!(
        "  Timeout: {}s",
        style(config.ollama.timeout_seconds).cyan()
    );
    eprintln!("  Concurrency: {}", style(config.ollama.concurrency).cyan());

    eprintln!();
    eprintln!("{}", style("Chroma Settings:").bold().yellow());
    match config.chroma.chroma_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!(
        "  Auth: {}",
        style(if config.chroma.auth_token.is_some() {
            "bearer token"
        } else {
            "none"
        })
        .cyan()
    );
    eprintln!(
        "  Timeout: {}s",
        style(config.chroma.timeout_seconds).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Chunking:").bold().yellow());
    eprintln!("  Chunk size: {}", style(config.chunking.chunk_size).cyan());
    eprintln!(
        "  Chunk overlap: {}",
        style(config.chunking.chunk_overlap).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Studio:").bold().yellow());
    eprintln!(
        "  Persist directory: {}",
        style(&config.studio.persist_directory).cyan()
    );
    eprintln!(
        "  Default dimension: {}",
        style(config.studio.default_dimension).cyan()
    );
    eprintln!(
        "  Reserved collections: {}",
        style(config.studio.reserved_collections.join(", ")).cyan()
    );
    eprintln!(
        "  Upload directory: {}",
        style(config.upload_dir().display()).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    if !config_dir.join("config.toml").exists() {
        eprintln!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
        return Ok(Config {
            base_dir: config_dir.to_path_buf(),
            ..Config::default()
        });
    }

    match Config::load(config_dir) {
        Ok(config) => {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        }
        Err(e) => {
            eprintln!(
                "{} {}",
                style("Existing configuration is invalid, starting from defaults:").yellow(),
                e
            );
            Ok(Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            })
        }
    }
}

fn select_protocol(prompt: &str, current: &str) -> Result<String> {
    let default_index = PROTOCOLS.iter().position(|&p| p == current).unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt(prompt)
        .default(default_index)
        .items(PROTOCOLS)
        .interact()?;

    Ok(PROTOCOLS[protocol_index].to_string())
}

fn prompt_port(prompt: &str, current: u16) -> Result<u16> {
    let port = Input::new()
        .with_prompt(prompt)
        .default(current)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    Ok(port)
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocol = select_protocol("Ollama protocol", &ollama.protocol)?;

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), String> {
            let mut candidate = ollama.clone();
            candidate.protocol = protocol.clone();
            candidate.set_host(input.clone()).map_err(|e| e.to_string())
        })
        .interact_text()?;

    let port = prompt_port("Ollama port", ollama.port)?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let concurrency: usize = Input::new()
        .with_prompt("Concurrent embedding requests")
        .default(ollama.concurrency)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=32).contains(input) {
                Ok(())
            } else {
                Err("Concurrency must be between 1 and 32")
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_concurrency(concurrency)?;

    Ok(())
}

fn configure_chroma(chroma: &mut ChromaConfig) -> Result<()> {
    let protocol = select_protocol("Chroma protocol", &chroma.protocol)?;

    let host: String = Input::new()
        .with_prompt("Chroma host")
        .default(chroma.host.clone())
        .validate_with(|input: &String| -> Result<(), String> {
            let mut candidate = chroma.clone();
            candidate.protocol = protocol.clone();
            candidate.set_host(input.clone()).map_err(|e| e.to_string())
        })
        .interact_text()?;

    let port = prompt_port("Chroma port", chroma.port)?;

    let token: String = Input::new()
        .with_prompt("Chroma auth token (leave empty for none)")
        .default(chroma.auth_token.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;

    chroma.set_protocol(protocol)?;
    chroma.set_host(host)?;
    chroma.set_port(port)?;
    chroma.set_auth_token(Some(token));

    Ok(())
}

fn ollama_health_url(ollama: &OllamaConfig) -> String {
    format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    )
}

fn chroma_health_url(chroma: &ChromaConfig) -> String {
    format!(
        "{}://{}:{}/api/v1/heartbeat",
        chroma.protocol, chroma.host, chroma.port
    )
}

/// Any HTTP answer below 500 means something is listening
fn reachable(url: &str) -> bool {
    let agent = build_agent(Duration::from_secs(5));
    matches!(agent.get(url).call(), Ok(response) if response.status().as_u16() < 500)
}
