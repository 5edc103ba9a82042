
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Document, MetadataValue};
use crate::{Result, StudioError};

/// Metadata key recording a chunk's position within its source document
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// Configuration for content chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Characters shared between the end of one chunk and the start of the next
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 80,
        }
    }
}

/// Fixed-window splitter with overlap that prefers to cut at whitespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    #[inline]
    fn default() -> Self {
        let config = ChunkingConfig::default();
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }
}

impl TextSplitter {
    /// Create a splitter. An overlap larger than the chunk size is clamped to it.
    #[inline]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(StudioError::Validation(
                "Chunk size must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size),
        })
    }

    #[inline]
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    #[inline]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub const fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text into trimmed, non-empty chunks of at most `chunk_size` characters.
    ///
    /// Each window ends at the last whitespace before the natural cut point when
    /// one exists past the window start. The next window starts `chunk_overlap`
    /// characters before the previous end, or at that end if that would not move
    /// the cursor forward.
    #[inline]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        if text.is_empty() {
            return chunks;
        }

        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut start = 0;

        while start < len {
            let mut end = (start + self.chunk_size).min(len);

            if end < len && !chars[end].is_whitespace() {
                if let Some(boundary) = last_whitespace(&chars, start, end) {
                    end = boundary;
                }
            }

            let chunk: String = chars[start..end].iter().collect();
            let trimmed = chunk.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }

            if end >= len {
                break;
            }

            let next = end.saturating_sub(self.chunk_overlap);
            start = if next <= start { end } else { next };
        }

        debug!(
            "Split {} characters into {} chunks (size {}, overlap {})",
            len,
            chunks.len(),
            self.chunk_size,
            self.chunk_overlap
        );

        chunks
    }

    /// Split one document, tagging each chunk with its index in that document
    #[inline]
    pub fn split_document(&self, document: &Document) -> Vec<Document> {
        self.split_text(&document.page_content)
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let mut metadata = document.metadata.clone();
                metadata.insert(CHUNK_INDEX_KEY, MetadataValue::from(index));
                Document::new(chunk, metadata)
            })
            .collect()
    }

    /// Split every document, keeping input order and per-document chunk order
    #[inline]
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Document> {
        documents
            .iter()
            .flat_map(|document| self.split_document(document))
            .collect()
    }
}

/// Position of the last whitespace strictly between `start` and `end`
fn last_whitespace(chars: &[char], start: usize, end: usize) -> Option<usize> {
    chars[start + 1..end]
        .iter()
        .rposition(|c| c.is_whitespace())
        .map(|offset| start + 1 + offset)
}
