// Collection manager
// Owns the lifecycle of one collection: create/initialize, deduplicated ingest,
// document updates and timestamp bookkeeping


use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::database::{
    CollectionHandle, EmbeddingRecord, GetRequest, VectorStore, id_filter,
};
use crate::embeddings::{Embedder, TextSplitter, calculate_chunk_ids};
use crate::models::{
    CollectionInfo, DEFAULT_DIMENSION, Document, Metadata, MetadataValue, QueryResult,
    now_timestamp, timestamp_after,
};
use crate::{Result, StudioError};

pub const CREATED_KEY: &str = "created";
pub const UPDATED_KEY: &str = "updated";

/// Run a side effect whose failure must not fail the surrounding operation.
///
/// Errors are logged and dropped.
#[inline]
pub async fn non_fatal<F>(action: &str, side_effect: F)
where
    F: Future<Output = Result<()>>,
{
    if let Err(e) = side_effect.await {
        warn!("{} failed, continuing: {}", action, e);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollectionState {
    Uninitialized,
    Initialized(CollectionHandle),
    Deleted,
}

/// Manages a single named collection in the vector store
pub struct CollectionManager {
    name: String,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    splitter: TextSplitter,
    persist_directory: String,
    dimension: u32,
    state: CollectionState,
}

impl CollectionManager {
    #[inline]
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            embedder,
            splitter: TextSplitter::default(),
            persist_directory: "./chroma_db".to_string(),
            dimension: DEFAULT_DIMENSION,
            state: CollectionState::Uninitialized,
        }
    }

    #[inline]
    pub fn with_splitter(mut self, splitter: TextSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    #[inline]
    pub fn with_persist_directory(mut self, persist_directory: impl Into<String>) -> Self {
        self.persist_directory = persist_directory.into();
        self
    }

    /// Dimension recorded in the metadata of a newly created collection
    #[inline]
    pub fn with_dimension(mut self, dimension: u32) -> Self {
        self.dimension = dimension;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn state(&self) -> &CollectionState {
        &self.state
    }

    fn handle(&self) -> Result<&CollectionHandle> {
        match &self.state {
            CollectionState::Initialized(handle) => Ok(handle),
            CollectionState::Uninitialized => Err(StudioError::InvalidState(format!(
                "Collection '{}' has not been initialized",
                self.name
            ))),
            CollectionState::Deleted => Err(StudioError::InvalidState(format!(
                "Collection '{}' has been deleted",
                self.name
            ))),
        }
    }

    /// Create the collection if absent, otherwise attach to it.
    ///
    /// Existing collections without a `created` timestamp get both timestamps
    /// backfilled. Calling this again is a no-op apart from refreshing the handle.
    #[inline]
    pub async fn initialize(&mut self) -> Result<()> {
        if self.state == CollectionState::Deleted {
            return Err(StudioError::InvalidState(format!(
                "Collection '{}' has been deleted",
                self.name
            )));
        }

        let handle = match self.store.get_collection(&self.name).await? {
            Some(mut handle) => {
                if !handle.metadata.contains_key(CREATED_KEY) {
                    info!("Backfilling timestamps for collection {}", self.name);
                    let now = now_timestamp();
                    let mut metadata = handle.metadata.clone();
                    metadata.insert(CREATED_KEY, now.clone());
                    metadata.insert(UPDATED_KEY, now);
                    self.store.modify_metadata(&handle, &metadata).await?;
                    handle.metadata = metadata;
                }
                handle
            }
            None => {
                info!("Creating collection {}", self.name);
                let now = now_timestamp();
                let mut metadata = Metadata::new();
                metadata.insert("hnsw:space", "cosine");
                metadata.insert("persist_directory", self.persist_directory.clone());
                metadata.insert("dimension", i64::from(self.dimension));
                metadata.insert(CREATED_KEY, now.clone());
                metadata.insert(UPDATED_KEY, now);
                self.store.create_collection(&self.name, &metadata).await?
            }
        };

        self.state = CollectionState::Initialized(handle);
        Ok(())
    }

    /// Chunk, identify, deduplicate, embed and insert documents.
    ///
    /// A single document that already carries an id is inserted as-is. With
    /// `update_existing`, chunks whose id is already stored are skipped before
    /// embedding. Returns the number of chunks inserted.
    #[inline]
    pub async fn add_documents(
        &self,
        documents: Vec<Document>,
        update_existing: bool,
    ) -> Result<usize> {
        let handle = self.handle()?;
        if documents.is_empty() {
            return Ok(0);
        }

        let pre_identified = documents.len() == 1 && documents[0].metadata.id().is_some();
        let chunks = if pre_identified {
            documents
        } else {
            calculate_chunk_ids(self.splitter.split_documents(&documents))
        };

        let mut seen: HashSet<String> = if update_existing {
            self.store
                .get(handle, &GetRequest::all().ids_only())
                .await?
                .into_iter()
                .map(|item| item.id)
                .collect()
        } else {
            HashSet::new()
        };

        let total = chunks.len();
        let new_chunks: Vec<Document> = chunks
            .into_iter()
            .filter(|chunk| seen.insert(chunk.metadata.id().unwrap_or_default().to_string()))
            .collect();

        debug!(
            "{} of {} chunks are new for collection {}",
            new_chunks.len(),
            total,
            self.name
        );

        if new_chunks.is_empty() {
            return Ok(0);
        }

        self.insert_chunks(handle, &new_chunks).await?;
        non_fatal("Refreshing collection timestamp", self.touch()).await;

        info!(
            "Added {} chunks to collection {}",
            new_chunks.len(),
            self.name
        );
        Ok(new_chunks.len())
    }

    async fn insert_chunks(&self, handle: &CollectionHandle, chunks: &[Document]) -> Result<()> {
        let texts: Vec<String> = chunks.iter().map(|c| c.page_content.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;

        if vectors.len() != chunks.len() {
            return Err(StudioError::Embedding(format!(
                "Expected {} embeddings, received {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let records: Vec<EmbeddingRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord {
                id: chunk.metadata.id().unwrap_or_default().to_string(),
                vector,
                metadata: chunk.metadata.without_nulls(),
                document: chunk.page_content.clone(),
            })
            .collect();

        self.store.add(handle, &records).await
    }

    /// Replace a document's text and embedding, keeping its metadata
    #[inline]
    pub async fn update_document(&self, id: &str, new_text: &str) -> Result<()> {
        let handle = self.handle()?;

        let existing = self
            .store
            .get(handle, &GetRequest::all().with_filter(id_filter(id)).with_limit(1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StudioError::DocumentNotFound(id.to_string()))?;

        let vector = self
            .embedder
            .embed(&[new_text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StudioError::Embedding("No embedding returned".to_string()))?;

        self.store
            .update(
                handle,
                &[EmbeddingRecord {
                    id: existing.id,
                    vector,
                    metadata: existing.metadata,
                    document: new_text.to_string(),
                }],
            )
            .await?;

        non_fatal("Refreshing collection timestamp", self.touch()).await;
        info!("Updated document {} in collection {}", id, self.name);
        Ok(())
    }

    #[inline]
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        let handle = self.handle()?;
        let filter = id_filter(id);

        let exists = !self
            .store
            .get(handle, &GetRequest::all().with_filter(filter.clone()).with_limit(1))
            .await?
            .is_empty();
        if !exists {
            return Err(StudioError::DocumentNotFound(id.to_string()));
        }

        self.store.delete(handle, &filter).await?;
        non_fatal("Refreshing collection timestamp", self.touch()).await;
        info!("Deleted document {} from collection {}", id, self.name);
        Ok(())
    }

    /// Remove the collection and everything in it. The manager is unusable afterwards.
    #[inline]
    pub async fn delete_collection(&mut self) -> Result<()> {
        self.handle()?;
        self.store.delete_collection(&self.name).await?;
        self.state = CollectionState::Deleted;
        info!("Deleted collection {}", self.name);
        Ok(())
    }

    #[inline]
    pub async fn get_collection_info(&self) -> Result<CollectionInfo> {
        self.handle()?;
        let current = self.current_handle().await?;
        let count = self.store.count(&current).await?;
        Ok(CollectionInfo::new(&self.name, count, current.metadata))
    }

    /// Every stored chunk with its embedding
    #[inline]
    pub async fn get_all_documents(&self) -> Result<Vec<QueryResult>> {
        self.peek(None).await
    }

    /// The first `limit` stored chunks, or all of them
    #[inline]
    pub async fn peek(&self, limit: Option<usize>) -> Result<Vec<QueryResult>> {
        let handle = self.handle()?;
        let mut request = GetRequest::all().with_embeddings();
        request.limit = limit;

        let items = self.store.get(handle, &request).await?;
        Ok(items
            .into_iter()
            .map(crate::database::StoredItem::into_query_result)
            .collect())
    }

    /// Merge `overlay` into the collection metadata and refresh `updated`.
    ///
    /// `created` is preserved, or set now if the collection never had one.
    #[inline]
    pub async fn update_metadata(&self, overlay: &Metadata) -> Result<Metadata> {
        self.handle()?;
        let current = self.current_handle().await?;

        let now = timestamp_after(stored_timestamp(&current.metadata, UPDATED_KEY));
        let created = current
            .metadata
            .get(CREATED_KEY)
            .cloned()
            .unwrap_or_else(|| now.clone().into());

        let mut metadata = current.metadata.merged(overlay);
        metadata.insert(CREATED_KEY, created);
        metadata.insert(UPDATED_KEY, now);

        self.store.modify_metadata(&current, &metadata).await?;
        Ok(metadata)
    }

    async fn current_handle(&self) -> Result<CollectionHandle> {
        self.store
            .get_collection(&self.name)
            .await?
            .ok_or_else(|| StudioError::CollectionNotFound(self.name.clone()))
    }

    /// Set `updated` to now, keeping the rest of the metadata
    async fn touch(&self) -> Result<()> {
        let current = self.current_handle().await?;
        let updated = timestamp_after(stored_timestamp(&current.metadata, UPDATED_KEY));
        let mut metadata = current.metadata.clone();
        metadata.insert(UPDATED_KEY, updated);
        self.store.modify_metadata(&current, &metadata).await
    }
}

fn stored_timestamp<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(MetadataValue::as_str)
}
