// Administrative surface
// One method per console action; every failure becomes an error envelope


use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use fancy_regex::Regex;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::{Config, StudioConfig};
use crate::database::{ChromaStore, CollectionHandle, VectorStore};
use crate::embeddings::{ChunkingConfig, Embedder, OllamaClient, TextSplitter};
use crate::manager::CollectionManager;
use crate::models::{CollectionInfo, Document, Metadata, QueryResult, now_timestamp};
use crate::retrieval::{QueryRequest, QueryResponse, QueryService};
use crate::{Result, StudioError};

static COLLECTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("valid regex"));

pub const DEFAULT_SOURCE: &str = "user-input";
pub const DEFAULT_PEEK_SAMPLE: usize = 5;

/// Uniform result envelope returned by every console action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ActionResult<T> {
    #[inline]
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    #[inline]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    fn from_result(action: &str, result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                error!("{} failed: {}", action, e);
                Self::failure(e.to_string())
            }
        }
    }
}

impl ActionResult<()> {
    #[inline]
    pub fn done() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    fn completed(action: &str, result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::done(),
            Err(e) => {
                error!("{} failed: {}", action, e);
                Self::failure(e.to_string())
            }
        }
    }
}

/// Common view over the result envelopes returned by console actions
pub trait Envelope: Serialize {
    fn succeeded(&self) -> bool;
    fn error_message(&self) -> Option<&str>;
}

impl<T: Serialize> Envelope for ActionResult<T> {
    #[inline]
    fn succeeded(&self) -> bool {
        self.success
    }

    #[inline]
    fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Query envelope: primary results in `data`, related results beside them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<QueryResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<Vec<QueryResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ActionResult<QueryResponse>> for QueryEnvelope {
    #[inline]
    fn from(result: ActionResult<QueryResponse>) -> Self {
        let (data, related) = match result.data {
            Some(response) => (Some(response.primary), response.related),
            None => (None, None),
        };
        Self {
            success: result.success,
            data,
            related,
            error: result.error,
        }
    }
}

impl Envelope for QueryEnvelope {
    #[inline]
    fn succeeded(&self) -> bool {
        self.success
    }

    #[inline]
    fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Add envelope carrying the new document's id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddDocumentEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ActionResult<String>> for AddDocumentEnvelope {
    #[inline]
    fn from(result: ActionResult<String>) -> Self {
        Self {
            success: result.success,
            id: result.data,
            error: result.error,
        }
    }
}

impl Envelope for AddDocumentEnvelope {
    #[inline]
    fn succeeded(&self) -> bool {
        self.success
    }

    #[inline]
    fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Text plus optional metadata submitted by a user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl NewDocument {
    #[inline]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: None,
        }
    }

    #[inline]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMethod {
    #[default]
    Default,
    Recursive,
    Markdown,
}

impl ProcessingMethod {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Recursive => "recursive",
            Self::Markdown => "markdown",
        }
    }
}

impl std::str::FromStr for ProcessingMethod {
    type Err = StudioError;

    #[inline]
    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "recursive" => Ok(Self::Recursive),
            "markdown" => Ok(Self::Markdown),
            other => Err(StudioError::Validation(format!(
                "Unknown processing method '{}'",
                other
            ))),
        }
    }
}

/// Chunking options for file ingest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub processing_method: ProcessingMethod,
}

impl Default for ProcessingSettings {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            processing_method: ProcessingMethod::Default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub files: usize,
    pub chunks_added: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub reachable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceStatus {
    fn from_check(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                reachable: true,
                error: None,
            },
            Err(e) => Self {
                reachable: false,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub vector_store: ServiceStatus,
    pub embedding_service: ServiceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionPeek {
    pub info: CollectionInfo,
    pub items: Vec<QueryResult>,
}

/// The console core: collection and document actions over a store and an embedder
pub struct Studio {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    settings: StudioConfig,
    chunking: ChunkingConfig,
    upload_dir: PathBuf,
}

impl Studio {
    #[inline]
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            settings: StudioConfig::default(),
            chunking: ChunkingConfig::default(),
            upload_dir: PathBuf::from("uploads"),
        }
    }

    /// Connect to the Chroma server and Ollama instance named in the config
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = ChromaStore::new(&config.chroma)?;
        let embedder = OllamaClient::new(&config.ollama)?;

        Ok(Self::new(Arc::new(store), Arc::new(embedder))
            .with_settings(config.studio.clone())
            .with_chunking(config.chunking)
            .with_upload_dir(config.upload_dir()))
    }

    #[inline]
    pub fn with_settings(mut self, settings: StudioConfig) -> Self {
        self.settings = settings;
        self
    }

    #[inline]
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    #[inline]
    pub fn with_upload_dir(mut self, upload_dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = upload_dir.into();
        self
    }

    #[inline]
    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    #[inline]
    pub async fn create_collection(
        &self,
        name: &str,
        dimension: Option<u32>,
    ) -> ActionResult<CollectionInfo> {
        ActionResult::from_result(
            "Create collection",
            self.try_create_collection(name, dimension).await,
        )
    }

    #[inline]
    pub async fn delete_collection(&self, name: &str) -> ActionResult<()> {
        ActionResult::completed("Delete collection", self.try_delete_collection(name).await)
    }

    /// Every collection except the reserved ones, with counts
    #[inline]
    pub async fn list_collections(&self) -> ActionResult<Vec<CollectionInfo>> {
        ActionResult::from_result("List collections", self.try_list_collections().await)
    }

    #[inline]
    pub async fn get_collection_info(&self, name: &str) -> ActionResult<CollectionInfo> {
        ActionResult::from_result("Get collection info", self.try_collection_info(name).await)
    }

    #[inline]
    pub async fn get_all_documents(&self, name: &str) -> ActionResult<Vec<QueryResult>> {
        ActionResult::from_result("Get documents", self.try_all_documents(name).await)
    }

    #[inline]
    pub async fn query_collection(
        &self,
        name: &str,
        query: &str,
        n_results: usize,
        filter: crate::database::Filter,
        include_related: bool,
    ) -> QueryEnvelope {
        ActionResult::from_result(
            "Query collection",
            self.try_query(name, query, n_results, filter, include_related)
                .await,
        )
        .into()
    }

    /// Add one text as a single unit; returns its id
    #[inline]
    pub async fn add_document(&self, name: &str, document: NewDocument) -> AddDocumentEnvelope {
        ActionResult::from_result("Add document", self.try_add_document(name, document).await)
            .into()
    }

    #[inline]
    pub async fn update_document(&self, name: &str, id: &str, content: &str) -> ActionResult<()> {
        ActionResult::completed(
            "Update document",
            self.try_update_document(name, id, content).await,
        )
    }

    #[inline]
    pub async fn delete_document(&self, name: &str, id: &str) -> ActionResult<()> {
        ActionResult::completed("Delete document", self.try_delete_document(name, id).await)
    }

    /// Read files and route each through chunked ingest.
    ///
    /// Relative paths resolve against the collection's upload directory.
    #[inline]
    pub async fn ingest_files(
        &self,
        name: &str,
        files: &[PathBuf],
        settings: ProcessingSettings,
    ) -> ActionResult<IngestSummary> {
        ActionResult::from_result("Ingest files", self.try_ingest(name, files, settings).await)
    }

    /// Check both backing services. Succeeds only when both respond.
    #[inline]
    pub async fn test_connection(&self) -> ActionResult<ConnectionStatus> {
        let status = ConnectionStatus {
            vector_store: ServiceStatus::from_check(self.store.heartbeat().await),
            embedding_service: ServiceStatus::from_check(self.embedder.health_check().await),
        };

        let failures: Vec<String> = [
            ("Vector store", &status.vector_store),
            ("Embedding service", &status.embedding_service),
        ]
        .into_iter()
        .filter_map(|(service, s)| {
            s.error
                .as_ref()
                .map(|e| format!("{} unavailable: {}", service, e))
        })
        .collect();

        if failures.is_empty() {
            info!("Connection test passed");
            return ActionResult::ok(status);
        }

        let message = failures.join("; ");
        error!("Connection test failed: {}", message);
        ActionResult {
            success: false,
            data: Some(status),
            error: Some(message),
        }
    }

    /// Merge metadata into a collection's metadata, refreshing `updated`
    #[inline]
    pub async fn update_collection_metadata(
        &self,
        name: &str,
        metadata: Metadata,
    ) -> ActionResult<Metadata> {
        ActionResult::from_result(
            "Update collection metadata",
            self.try_update_metadata(name, &metadata).await,
        )
    }

    #[inline]
    pub async fn peek_collection(&self, name: &str, sample: usize) -> ActionResult<CollectionPeek> {
        ActionResult::from_result("Peek collection", self.try_peek(name, sample).await)
    }

    /// Store an uploaded file under `<upload_dir>/<collection>/` and return its path
    #[inline]
    pub async fn upload_file(
        &self,
        name: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> ActionResult<PathBuf> {
        ActionResult::from_result(
            "Upload file",
            self.try_upload(name, file_name, bytes).await,
        )
    }

    fn manager(&self, name: &str) -> CollectionManager {
        CollectionManager::new(name, Arc::clone(&self.store), Arc::clone(&self.embedder))
            .with_persist_directory(self.settings.persist_directory.clone())
            .with_dimension(self.settings.default_dimension)
    }

    /// Attach a manager to an existing collection
    async fn open(&self, name: &str) -> Result<CollectionManager> {
        let name = validate_name(name)?;
        if self.store.get_collection(name).await?.is_none() {
            return Err(StudioError::CollectionNotFound(name.to_string()));
        }

        let splitter = TextSplitter::from_config(&self.chunking)?;
        let mut manager = self.manager(name).with_splitter(splitter);
        manager.initialize().await?;
        Ok(manager)
    }

    async fn try_create_collection(
        &self,
        name: &str,
        dimension: Option<u32>,
    ) -> Result<CollectionInfo> {
        let name = validate_name(name)?;
        if self.settings.is_reserved(name) {
            return Err(StudioError::Validation(format!(
                "Collection name '{}' is reserved",
                name
            )));
        }

        let dimension = dimension.unwrap_or(self.settings.default_dimension);
        if dimension == 0 {
            return Err(StudioError::Validation(
                "Dimension must be greater than 0".to_string(),
            ));
        }

        let existing = self.store.list_collections().await?;
        if existing.iter().any(|c| c.name == name) {
            return Err(StudioError::AlreadyExists(name.to_string()));
        }

        let mut manager = self.manager(name).with_dimension(dimension);
        manager.initialize().await?;
        info!("Created collection {} with dimension {}", name, dimension);
        manager.get_collection_info().await
    }

    async fn try_delete_collection(&self, name: &str) -> Result<()> {
        let mut manager = self.open(name).await?;
        manager.delete_collection().await
    }

    async fn try_list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let handles: Vec<CollectionHandle> = self
            .store
            .list_collections()
            .await?
            .into_iter()
            .filter(|handle| !self.settings.is_reserved(&handle.name))
            .collect();

        let counts = try_join_all(handles.iter().map(|handle| self.store.count(handle))).await?;

        Ok(handles
            .into_iter()
            .zip(counts)
            .map(|(handle, count)| CollectionInfo::new(handle.name, count, handle.metadata))
            .collect())
    }

    async fn try_collection_info(&self, name: &str) -> Result<CollectionInfo> {
        self.open(name).await?.get_collection_info().await
    }

    async fn try_all_documents(&self, name: &str) -> Result<Vec<QueryResult>> {
        self.open(name).await?.get_all_documents().await
    }

    async fn try_query(
        &self,
        name: &str,
        query: &str,
        n_results: usize,
        filter: crate::database::Filter,
        include_related: bool,
    ) -> Result<QueryResponse> {
        let name = validate_name(name)?;
        let query = query.trim();
        if query.is_empty() {
            return Err(StudioError::Validation("Query text is required".to_string()));
        }
        if n_results == 0 {
            return Err(StudioError::Validation(
                "Number of results must be greater than 0".to_string(),
            ));
        }

        let request = QueryRequest::new(name, query)
            .with_results(n_results)
            .with_filter(filter)
            .with_related(include_related);

        QueryService::new(Arc::clone(&self.store), Arc::clone(&self.embedder))
            .query(&request)
            .await
    }

    async fn try_add_document(&self, name: &str, document: NewDocument) -> Result<String> {
        if document.content.trim().is_empty() {
            return Err(StudioError::Validation(
                "Document content is required".to_string(),
            ));
        }
        let manager = self.open(name).await?;

        let mut metadata = document.metadata.unwrap_or_default().without_nulls();
        let id = match metadata.id() {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        metadata.set_id(id.clone());
        if !metadata.contains_key("source") {
            metadata.insert("source", DEFAULT_SOURCE);
        }
        if !metadata.contains_key("timestamp") {
            metadata.insert("timestamp", now_timestamp());
        }

        let added = manager
            .add_documents(vec![Document::new(document.content, metadata)], true)
            .await?;
        if added == 0 {
            return Err(StudioError::Validation(format!(
                "A document with id '{}' already exists",
                id
            )));
        }
        Ok(id)
    }

    async fn try_update_document(&self, name: &str, id: &str, content: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(StudioError::Validation("Document ID is required".to_string()));
        }
        if content.trim().is_empty() {
            return Err(StudioError::Validation(
                "Document content is required".to_string(),
            ));
        }
        self.open(name).await?.update_document(id, content).await
    }

    async fn try_delete_document(&self, name: &str, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(StudioError::Validation("Document ID is required".to_string()));
        }
        self.open(name).await?.delete_document(id).await
    }

    async fn try_ingest(
        &self,
        name: &str,
        files: &[PathBuf],
        settings: ProcessingSettings,
    ) -> Result<IngestSummary> {
        if files.is_empty() {
            return Err(StudioError::Validation("No files to ingest".to_string()));
        }
        if settings.chunk_overlap > settings.chunk_size {
            return Err(StudioError::Validation(format!(
                "Chunk overlap ({}) must not exceed chunk size ({})",
                settings.chunk_overlap, settings.chunk_size
            )));
        }
        let splitter = TextSplitter::new(settings.chunk_size, settings.chunk_overlap)?;
        let manager = self.open(name).await?.with_splitter(splitter);
        let collection_dir = self.upload_dir.join(manager.name());

        let mut documents = Vec::with_capacity(files.len());
        for file in files {
            let path = if file.is_absolute() {
                file.clone()
            } else {
                collection_dir.join(file)
            };
            documents.push(read_document(&path, settings).await?);
        }

        let mut chunks_added = 0;
        for document in documents {
            let source = document
                .metadata
                .get("source")
                .map(ToString::to_string)
                .unwrap_or_default();
            chunks_added += manager.add_documents(vec![document], true).await?;
            info!("Ingested {} into {}", source, manager.name());
        }

        Ok(IngestSummary {
            files: files.len(),
            chunks_added,
        })
    }

    async fn try_update_metadata(&self, name: &str, metadata: &Metadata) -> Result<Metadata> {
        self.open(name).await?.update_metadata(metadata).await
    }

    async fn try_peek(&self, name: &str, sample: usize) -> Result<CollectionPeek> {
        let manager = self.open(name).await?;
        let info = manager.get_collection_info().await?;
        let items = manager.peek(Some(sample)).await?;
        Ok(CollectionPeek { info, items })
    }

    async fn try_upload(&self, name: &str, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let name = validate_name(name)?;
        let file_name = validate_file_name(file_name)?;

        let directory = self.upload_dir.join(name);
        tokio::fs::create_dir_all(&directory).await?;

        let path = directory.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        info!("Stored upload {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}

/// Trim and check a collection name
fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StudioError::Validation(
            "Collection name is required".to_string(),
        ));
    }
    if !COLLECTION_NAME.is_match(name).unwrap_or(false) {
        return Err(StudioError::Validation(format!(
            "Invalid collection name '{}': use only letters, numbers, underscores and hyphens",
            name
        )));
    }
    Ok(name)
}

fn validate_file_name(file_name: &str) -> Result<&str> {
    let file_name = file_name.trim();
    if file_name.is_empty() {
        return Err(StudioError::Validation("File name is required".to_string()));
    }
    if file_name.contains(['/', '\\']) || file_name.contains("..") {
        return Err(StudioError::Validation(format!(
            "Invalid file name '{}'",
            file_name
        )));
    }
    Ok(file_name)
}

/// Load one file as an ingest document with provenance metadata
async fn read_document(path: &Path, settings: ProcessingSettings) -> Result<Document> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(StudioError::Validation(format!(
            "File {} does not exist or is not accessible",
            file_name
        )));
    }

    let content = match extension.as_str() {
        "pdf" => format!("Parsed PDF content for {}.", file_name),
        "doc" | "docx" => format!("Parsed DOCX content for {}.", file_name),
        _ => tokio::fs::read_to_string(path).await.map_err(|e| {
            StudioError::Validation(format!("Error processing file {}: {}", file_name, e))
        })?,
    };

    let mut metadata = Metadata::new();
    metadata.insert("source", file_name);
    metadata.insert("file_type", extension);
    metadata.insert("uploaded_at", now_timestamp());
    metadata.insert("processing_method", settings.processing_method.as_str());
    metadata.insert("chunk_size", settings.chunk_size);
    metadata.insert("chunk_overlap", settings.chunk_overlap);

    Ok(Document::new(content, metadata))
}
