// Embeddings module
// Turns text into vectors and splits documents into identified chunks

pub mod chunk_ids;
pub mod chunking;
pub mod ollama;

use async_trait::async_trait;

use crate::Result;

pub use chunk_ids::{calculate_chunk_ids, page_id};
pub use chunking::{CHUNK_INDEX_KEY, ChunkingConfig, TextSplitter};
pub use ollama::{EmbeddingResult, OllamaClient};

/// A service that maps texts to fixed-length vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed every text, returning exactly one vector per input in input order.
    ///
    /// A failure on any single text fails the whole call.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Verify the service is reachable and ready to embed
    async fn health_check(&self) -> Result<()>;
}
