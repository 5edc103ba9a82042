// Database module
// Vector store abstraction over the Chroma REST API and an in-process store

pub mod chroma;
pub mod memory;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;
use crate::models::{ID_KEY, Metadata, QueryResult};

pub use chroma::ChromaStore;
pub use memory::InMemoryStore;

/// A `where` clause in the store's filter language.
///
/// Supports plain equality (`{"source": "f1"}`), the comparison operators
/// `$eq`, `$ne`, `$in` and `$nin`, and the logical combinators `$and` / `$or`.
pub type Filter = serde_json::Map<String, Value>;

/// Filter matching items whose `metadata.id` equals `id`
#[inline]
pub fn id_filter(id: &str) -> Filter {
    let mut filter = Filter::new();
    filter.insert(ID_KEY.to_string(), Value::String(id.to_string()));
    filter
}

/// Reference to a collection as known by the store
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionHandle {
    pub id: String,
    pub name: String,
    pub metadata: Metadata,
}

/// One item to write: id, vector, metadata and the original text
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
    pub document: String,
}

/// One item read back from the store
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoredItem {
    pub id: String,
    pub document: Option<String>,
    pub metadata: Metadata,
    pub embedding: Option<Vec<f32>>,
    /// Only set for query results
    pub distance: Option<f32>,
}

impl StoredItem {
    /// Convert to a display result, guaranteeing `metadata.id` is present.
    ///
    /// A missing id falls back to the store's item id, then to a fresh UUID.
    #[inline]
    pub fn into_query_result(self) -> QueryResult {
        let mut metadata = self.metadata;
        if metadata.id().is_none() {
            let id = if self.id.is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                self.id
            };
            metadata.set_id(id);
        }

        QueryResult {
            page_content: self.document.unwrap_or_default(),
            metadata,
            embedding: self.embedding,
            distance: self.distance,
            similarity_score: None,
            is_related: false,
        }
    }
}

/// Selection for [`VectorStore::get`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetRequest {
    pub ids: Option<Vec<String>>,
    pub filter: Option<Filter>,
    pub limit: Option<usize>,
    pub include_embeddings: bool,
    /// Return bare ids without documents, metadata or embeddings
    pub ids_only: bool,
}

impl GetRequest {
    #[inline]
    pub fn all() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[inline]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[inline]
    pub fn with_embeddings(mut self) -> Self {
        self.include_embeddings = true;
        self
    }

    #[inline]
    pub fn ids_only(mut self) -> Self {
        self.ids_only = true;
        self
    }
}

/// Storage backend holding named collections of embedded documents.
///
/// Collection-level calls address collections by name; item-level calls take
/// the handle returned by [`VectorStore::get_collection`] or
/// [`VectorStore::create_collection`].
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Fail unless the store is reachable
    async fn heartbeat(&self) -> Result<()>;

    async fn list_collections(&self) -> Result<Vec<CollectionHandle>>;

    /// Look a collection up by name, `None` if absent
    async fn get_collection(&self, name: &str) -> Result<Option<CollectionHandle>>;

    /// Create a collection, or return the existing one unchanged
    async fn create_collection(&self, name: &str, metadata: &Metadata)
    -> Result<CollectionHandle>;

    /// Remove a collection and all of its items
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Replace the collection metadata
    async fn modify_metadata(&self, collection: &CollectionHandle, metadata: &Metadata)
    -> Result<()>;

    async fn count(&self, collection: &CollectionHandle) -> Result<usize>;

    async fn add(&self, collection: &CollectionHandle, records: &[EmbeddingRecord]) -> Result<()>;

    async fn get(&self, collection: &CollectionHandle, request: &GetRequest)
    -> Result<Vec<StoredItem>>;

    /// Nearest neighbours of `embedding`, closest first, with distances
    async fn query(
        &self,
        collection: &CollectionHandle,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<StoredItem>>;

    /// Overwrite existing items by id
    async fn update(&self, collection: &CollectionHandle, records: &[EmbeddingRecord])
    -> Result<()>;

    /// Delete every item matching the filter
    async fn delete(&self, collection: &CollectionHandle, filter: &Filter) -> Result<()>;
}
