use thiserror::Error;

pub type Result<T> = std::result::Result<T, StudioError>;

#[derive(Error, Debug)]
pub enum StudioError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Collection '{0}' already exists")]
    AlreadyExists(String),

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("Document '{0}' not found")]
    DocumentNotFound(String),

    #[error("Embedding service error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Invalid collection state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
mod http;
pub mod manager;
pub mod models;
pub mod retrieval;
pub mod studio;
#[cfg(test)]
mod testing;
