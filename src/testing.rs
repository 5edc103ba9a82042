// Deterministic fakes shared by unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::embeddings::Embedder;
use crate::{Result, StudioError};

pub(crate) const TEST_DIMENSION: usize = 16;

/// Bag-of-words embedder: each lowercase word bumps one hashed coordinate.
///
/// Texts sharing words land close together in cosine space and every vector is
/// non-negative, so cosine distances stay within `[0, 1]`.
#[derive(Debug, Default)]
pub(crate) struct WordHashEmbedder {
    texts_embedded: AtomicUsize,
    failing: AtomicBool,
}

impl WordHashEmbedder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn texts_embedded(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; TEST_DIMENSION];
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            let hash = word
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325_u64, |acc, b| {
                    (acc ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
                });
            vector[(hash % TEST_DIMENSION as u64) as usize] += 1.0;
        }
        // Keep empty texts off the origin
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for WordHashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StudioError::Embedding("embedding service offline".to_string()));
        }
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|text| Self::vector_for(text)).collect())
    }

    async fn health_check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StudioError::Embedding("embedding service offline".to_string()));
        }
        Ok(())
    }
}
