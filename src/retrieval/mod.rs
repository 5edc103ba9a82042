// Query/retrieval service
// Embeds the query text, runs a nearest-neighbour search and decorates results
// with similarity scores, optionally expanding with related documents

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::database::{Filter, StoredItem, VectorStore};
use crate::embeddings::Embedder;
use crate::models::QueryResult;
use crate::{Result, StudioError};

/// Number of results requested by the related-documents pass
pub const RELATED_RESULTS: usize = 3;

pub const DEFAULT_RESULTS: usize = 5;

/// Convert a cosine distance into an integer percentage, `round((1 - d) * 100)`.
///
/// Halves round up. Distances outside `[0, 1]` are not clamped.
#[inline]
pub fn similarity_score(distance: f32) -> i64 {
    ((1.0 - f64::from(distance)) * 100.0 + 0.5).floor() as i64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub collection: String,
    pub text: String,
    #[serde(default = "default_results")]
    pub n_results: usize,
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub include_related: bool,
}

const fn default_results() -> usize {
    DEFAULT_RESULTS
}

impl QueryRequest {
    #[inline]
    pub fn new(collection: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            text: text.into(),
            n_results: DEFAULT_RESULTS,
            filter: Filter::new(),
            include_related: false,
        }
    }

    #[inline]
    pub fn with_results(mut self, n_results: usize) -> Self {
        self.n_results = n_results;
        self
    }

    #[inline]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    #[inline]
    pub fn with_related(mut self, include_related: bool) -> Self {
        self.include_related = include_related;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Store-ranked results, nearest first
    pub primary: Vec<QueryResult>,
    /// Results similar to the top primary hit, minus anything already in `primary`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<Vec<QueryResult>>,
}

pub struct QueryService {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl QueryService {
    #[inline]
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    #[inline]
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let primary = self
            .search(&request.collection, &request.text, request.n_results, &request.filter)
            .await?;

        debug!(
            "Query on {} returned {} results",
            request.collection,
            primary.len()
        );

        let related = if request.include_related {
            match primary.first() {
                Some(top) if !top.page_content.trim().is_empty() => {
                    self.related(request, top, &primary).await
                }
                _ => None,
            }
        } else {
            None
        };

        Ok(QueryResponse { primary, related })
    }

    /// Second pass seeded with the top result's text. Failures are logged and dropped.
    async fn related(
        &self,
        request: &QueryRequest,
        top: &QueryResult,
        primary: &[QueryResult],
    ) -> Option<Vec<QueryResult>> {
        let seen: HashSet<&str> = primary.iter().map(QueryResult::id).collect();

        match self
            .search(&request.collection, &top.page_content, RELATED_RESULTS, &request.filter)
            .await
        {
            Ok(results) => {
                let related: Vec<QueryResult> = results
                    .into_iter()
                    .filter(|result| !seen.contains(result.id()))
                    .map(|mut result| {
                        result.is_related = true;
                        result
                    })
                    .collect();
                debug!("Found {} related documents", related.len());
                (!related.is_empty()).then_some(related)
            }
            Err(e) => {
                warn!("Related documents query failed, returning primary results only: {}", e);
                None
            }
        }
    }

    async fn search(
        &self,
        collection: &str,
        text: &str,
        n_results: usize,
        filter: &Filter,
    ) -> Result<Vec<QueryResult>> {
        let handle = self
            .store
            .get_collection(collection)
            .await?
            .ok_or_else(|| StudioError::CollectionNotFound(collection.to_string()))?;

        let embedding = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StudioError::Embedding("No embedding returned".to_string()))?;

        let filter = (!filter.is_empty()).then_some(filter);
        let items = self
            .store
            .query(&handle, &embedding, n_results, filter)
            .await?;

        Ok(items.into_iter().map(score).collect())
    }
}

fn score(item: StoredItem) -> QueryResult {
    let mut result = item.into_query_result();
    result.similarity_score = Some(similarity_score(result.distance.unwrap_or(0.0)));
    result
}
