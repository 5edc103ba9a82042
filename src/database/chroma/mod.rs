
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};
use url::Url;

use super::{CollectionHandle, EmbeddingRecord, Filter, GetRequest, StoredItem, VectorStore};
use crate::config::ChromaConfig;
use crate::http::{build_agent, is_success, read_response, run_blocking};
use crate::models::Metadata;
use crate::{Result, StudioError};

const API_PREFIX: &str = "api/v1/";

/// Client for the Chroma REST API
#[derive(Debug, Clone)]
pub struct ChromaStore {
    base_url: Url,
    auth_token: Option<String>,
    agent: ureq::Agent,
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    id: String,
    name: String,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, Value>>,
}

impl From<CollectionResponse> for CollectionHandle {
    fn from(response: CollectionResponse) -> Self {
        Self {
            id: response.id,
            name: response.name,
            metadata: response
                .metadata
                .as_ref()
                .map(Metadata::from_json_object)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<serde_json::Map<String, Value>>>>,
    #[serde(default)]
    embeddings: Option<Vec<Option<Vec<f32>>>>,
}

/// Query results are nested one level deeper: one list per query embedding
#[derive(Debug, Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<serde_json::Map<String, Value>>>>>,
    #[serde(default)]
    embeddings: Option<Vec<Vec<Option<Vec<f32>>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Columnar result lists, zipped into rows by index
struct Columns {
    ids: Vec<String>,
    documents: Option<Vec<Option<String>>>,
    metadatas: Option<Vec<Option<serde_json::Map<String, Value>>>>,
    embeddings: Option<Vec<Option<Vec<f32>>>>,
    distances: Option<Vec<Option<f32>>>,
}

impl Columns {
    fn into_items(self) -> Vec<StoredItem> {
        let Self {
            ids,
            mut documents,
            metadatas,
            mut embeddings,
            distances,
        } = self;

        ids.into_iter()
            .enumerate()
            .map(|(i, id)| StoredItem {
                id,
                document: documents
                    .as_mut()
                    .and_then(|column| column.get_mut(i))
                    .and_then(Option::take),
                metadata: metadatas
                    .as_ref()
                    .and_then(|column| column.get(i))
                    .and_then(Option::as_ref)
                    .map(Metadata::from_json_object)
                    .unwrap_or_default(),
                embedding: embeddings
                    .as_mut()
                    .and_then(|column| column.get_mut(i))
                    .and_then(Option::take),
                distance: distances
                    .as_ref()
                    .and_then(|column| column.get(i).copied())
                    .flatten(),
            })
            .collect()
    }
}

/// Chroma rejects empty metadata maps, so they are sent as null
fn metadata_json(metadata: &Metadata) -> Value {
    let cleaned = metadata.without_nulls();
    if cleaned.is_empty() {
        Value::Null
    } else {
        Value::Object(cleaned.to_json_object())
    }
}

fn records_body(records: &[EmbeddingRecord]) -> Value {
    json!({
        "ids": records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        "embeddings": records.iter().map(|r| r.vector.as_slice()).collect::<Vec<_>>(),
        "metadatas": records.iter().map(|r| metadata_json(&r.metadata)).collect::<Vec<_>>(),
        "documents": records.iter().map(|r| r.document.as_str()).collect::<Vec<_>>(),
    })
}

fn is_not_found(status: u16, body: &str) -> bool {
    status == 404 || body.contains("does not exist")
}

impl ChromaStore {
    #[inline]
    pub fn new(config: &ChromaConfig) -> Result<Self> {
        let base_url = config
            .chroma_url()
            .map_err(|e| StudioError::Config(e.to_string()))?;

        Ok(Self {
            base_url,
            auth_token: config.auth_token.clone(),
            agent: build_agent(Duration::from_secs(config.timeout_seconds)),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(API_PREFIX)
            .and_then(|api| api.join(path))
            .map_err(|e| StudioError::Config(format!("Failed to build Chroma URL: {}", e)))
    }

    fn authorize<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        match &self.auth_token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Send a request and return `(status, body)`, mapping transport failures
    fn call(&self, method: Method, path: &str, body: Option<&Value>) -> Result<(u16, String)> {
        let url = self.endpoint(path)?;
        debug!("Chroma {:?} {}", method, url);

        let payload = body
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StudioError::Store(format!("Failed to serialize request: {}", e)))?
            .unwrap_or_default();

        let response = match method {
            Method::Get => self.authorize(self.agent.get(url.as_str())).call(),
            Method::Delete => self.authorize(self.agent.delete(url.as_str())).call(),
            Method::Post => self
                .authorize(self.agent.post(url.as_str()))
                .header("Content-Type", "application/json")
                .send(payload.as_str()),
            Method::Put => self
                .authorize(self.agent.put(url.as_str()))
                .header("Content-Type", "application/json")
                .send(payload.as_str()),
        };

        response.and_then(read_response).map_err(|e| {
            error!("Failed to reach Chroma at {}: {}", self.base_url, e);
            StudioError::Store(format!(
                "Failed to reach Chroma at {}: {}",
                self.base_url, e
            ))
        })
    }

    fn error_for(&self, status: u16, body: &str) -> StudioError {
        let message = serde_json::from_str::<ErrorResponse>(body)
            .ok()
            .and_then(|e| e.message.or(e.error))
            .unwrap_or_else(|| body.to_string());
        warn!("Chroma returned HTTP {}: {}", status, message);
        StudioError::Store(format!("Chroma returned HTTP {}: {}", status, message))
    }

    /// Call an endpoint scoped to one collection, mapping "does not exist" errors
    fn call_collection<T: DeserializeOwned>(
        &self,
        collection: &CollectionHandle,
        method: Method,
        action: &str,
        body: Option<&Value>,
    ) -> Result<Option<T>> {
        let path = if action.is_empty() {
            format!("collections/{}", collection.id)
        } else {
            format!("collections/{}/{}", collection.id, action)
        };
        let (status, text) = self.call(method, &path, body)?;

        if !is_success(status) {
            if is_not_found(status, &text) {
                return Err(StudioError::CollectionNotFound(collection.name.clone()));
            }
            return Err(self.error_for(status, &text));
        }

        if text.trim().is_empty() {
            return Ok(None);
        }
        parse(&text).map(Some)
    }

    fn ping(&self) -> Result<()> {
        let (status, body) = self.call(Method::Get, "heartbeat", None)?;
        if is_success(status) {
            info!("Chroma heartbeat OK at {}", self.base_url);
            Ok(())
        } else {
            Err(self.error_for(status, &body))
        }
    }

    fn fetch_collections(&self) -> Result<Vec<CollectionHandle>> {
        let (status, body) = self.call(Method::Get, "collections", None)?;
        if !is_success(status) {
            return Err(self.error_for(status, &body));
        }
        let collections: Vec<CollectionResponse> = parse(&body)?;
        debug!("Found {} collections", collections.len());
        Ok(collections.into_iter().map(CollectionHandle::from).collect())
    }

    fn lookup_collection(&self, name: &str) -> Result<Option<CollectionHandle>> {
        let (status, body) = self.call(Method::Get, &format!("collections/{}", name), None)?;
        if is_success(status) {
            let collection: CollectionResponse = parse(&body)?;
            return Ok(Some(collection.into()));
        }
        if is_not_found(status, &body) {
            debug!("Collection {} does not exist", name);
            return Ok(None);
        }
        Err(self.error_for(status, &body))
    }

    fn upsert_collection(&self, name: &str, metadata: &Metadata) -> Result<CollectionHandle> {
        let body = json!({
            "name": name,
            "metadata": metadata_json(metadata),
            "get_or_create": true,
        });
        let (status, text) = self.call(Method::Post, "collections", Some(&body))?;
        if !is_success(status) {
            return Err(self.error_for(status, &text));
        }
        let collection: CollectionResponse = parse(&text)?;
        Ok(collection.into())
    }

    fn drop_collection(&self, name: &str) -> Result<()> {
        let (status, body) = self.call(Method::Delete, &format!("collections/{}", name), None)?;
        if is_success(status) {
            info!("Deleted collection {}", name);
            return Ok(());
        }
        if is_not_found(status, &body) {
            return Err(StudioError::CollectionNotFound(name.to_string()));
        }
        Err(self.error_for(status, &body))
    }

    fn put_metadata(&self, collection: &CollectionHandle, metadata: &Metadata) -> Result<()> {
        let body = json!({ "new_metadata": metadata_json(metadata) });
        self.call_collection::<Value>(collection, Method::Put, "", Some(&body))
            .map(|_| ())
    }

    fn count_items(&self, collection: &CollectionHandle) -> Result<usize> {
        self.call_collection(collection, Method::Get, "count", None)?
            .ok_or_else(|| StudioError::Store("Chroma returned an empty count".to_string()))
    }

    fn write_records(
        &self,
        collection: &CollectionHandle,
        action: &str,
        records: &[EmbeddingRecord],
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        debug!(
            "Sending {} records to {} ({})",
            records.len(),
            collection.name,
            action
        );
        self.call_collection::<Value>(collection, Method::Post, action, Some(&records_body(records)))
            .map(|_| ())
    }

    fn get_items(
        &self,
        collection: &CollectionHandle,
        request: &GetRequest,
    ) -> Result<Vec<StoredItem>> {
        let mut include = Vec::new();
        if !request.ids_only {
            include.extend(["documents", "metadatas"]);
            if request.include_embeddings {
                include.push("embeddings");
            }
        }

        let mut body = json!({ "include": include });
        if let Some(ids) = &request.ids {
            body["ids"] = json!(ids);
        }
        if let Some(filter) = request.filter.as_ref().filter(|f| !f.is_empty()) {
            body["where"] = Value::Object(filter.clone());
        }
        if let Some(limit) = request.limit {
            body["limit"] = json!(limit);
        }

        let response: GetResponse = self
            .call_collection(collection, Method::Post, "get", Some(&body))?
            .ok_or_else(|| StudioError::Store("Chroma returned an empty get response".to_string()))?;

        Ok(Columns {
            ids: response.ids,
            documents: response.documents,
            metadatas: response.metadatas,
            embeddings: response.embeddings,
            distances: None,
        }
        .into_items())
    }

    fn query_items(
        &self,
        collection: &CollectionHandle,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<StoredItem>> {
        let mut body = json!({
            "query_embeddings": [embedding],
            "n_results": n_results,
            "include": ["embeddings", "documents", "distances", "metadatas"],
        });
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            body["where"] = Value::Object(filter.clone());
        }

        let response: QueryResponse = self
            .call_collection(collection, Method::Post, "query", Some(&body))?
            .ok_or_else(|| {
                StudioError::Store("Chroma returned an empty query response".to_string())
            })?;

        Ok(Columns {
            ids: response.ids.into_iter().next().unwrap_or_default(),
            documents: response.documents.and_then(|c| c.into_iter().next()),
            metadatas: response.metadatas.and_then(|c| c.into_iter().next()),
            embeddings: response.embeddings.and_then(|c| c.into_iter().next()),
            distances: response.distances.and_then(|c| c.into_iter().next()),
        }
        .into_items())
    }

    fn delete_items(&self, collection: &CollectionHandle, filter: &Filter) -> Result<()> {
        let body = json!({ "where": filter });
        self.call_collection::<Value>(collection, Method::Post, "delete", Some(&body))
            .map(|_| ())
    }
}

fn parse<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| StudioError::Store(format!("Failed to parse Chroma response: {}", e)))
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn heartbeat(&self) -> Result<()> {
        let client = self.clone();
        run_blocking(move || client.ping()).await
    }

    async fn list_collections(&self) -> Result<Vec<CollectionHandle>> {
        let client = self.clone();
        run_blocking(move || client.fetch_collections()).await
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionHandle>> {
        let client = self.clone();
        let name = name.to_string();
        run_blocking(move || client.lookup_collection(&name)).await
    }

    async fn create_collection(
        &self,
        name: &str,
        metadata: &Metadata,
    ) -> Result<CollectionHandle> {
        let client = self.clone();
        let name = name.to_string();
        let metadata = metadata.clone();
        run_blocking(move || client.upsert_collection(&name, &metadata)).await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let client = self.clone();
        let name = name.to_string();
        run_blocking(move || client.drop_collection(&name)).await
    }

    async fn modify_metadata(
        &self,
        collection: &CollectionHandle,
        metadata: &Metadata,
    ) -> Result<()> {
        let client = self.clone();
        let collection = collection.clone();
        let metadata = metadata.clone();
        run_blocking(move || client.put_metadata(&collection, &metadata)).await
    }

    async fn count(&self, collection: &CollectionHandle) -> Result<usize> {
        let client = self.clone();
        let collection = collection.clone();
        run_blocking(move || client.count_items(&collection)).await
    }

    async fn add(&self, collection: &CollectionHandle, records: &[EmbeddingRecord]) -> Result<()> {
        let client = self.clone();
        let collection = collection.clone();
        let records = records.to_vec();
        run_blocking(move || client.write_records(&collection, "add", &records)).await
    }

    async fn get(
        &self,
        collection: &CollectionHandle,
        request: &GetRequest,
    ) -> Result<Vec<StoredItem>> {
        let client = self.clone();
        let collection = collection.clone();
        let request = request.clone();
        run_blocking(move || client.get_items(&collection, &request)).await
    }

    async fn query(
        &self,
        collection: &CollectionHandle,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<StoredItem>> {
        let client = self.clone();
        let collection = collection.clone();
        let embedding = embedding.to_vec();
        let filter = filter.cloned();
        run_blocking(move || {
            client.query_items(&collection, &embedding, n_results, filter.as_ref())
        })
        .await
    }

    async fn update(
        &self,
        collection: &CollectionHandle,
        records: &[EmbeddingRecord],
    ) -> Result<()> {
        let client = self.clone();
        let collection = collection.clone();
        let records = records.to_vec();
        run_blocking(move || client.write_records(&collection, "update", &records)).await
    }

    async fn delete(&self, collection: &CollectionHandle, filter: &Filter) -> Result<()> {
        let client = self.clone();
        let collection = collection.clone();
        let filter = filter.clone();
        run_blocking(move || client.delete_items(&collection, &filter)).await
    }
}
