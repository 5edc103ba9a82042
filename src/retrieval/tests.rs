use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;

use crate::database::{CollectionHandle, EmbeddingRecord, InMemoryStore};
use crate::models::{Metadata, MetadataValue};
use crate::testing::WordHashEmbedder;

const TEXTS: &[(&str, &str)] = &[
    ("fox:0:0", "the quick brown fox"),
    ("fox:0:1", "a quick red fox"),
    ("dog:0:0", "the lazy dog sleeps"),
    ("cat:0:0", "cats chase mice at night"),
];

/// Succeeds for the first `allowed` calls, then fails
struct FlakyEmbedder {
    allowed: AtomicUsize,
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let remaining = self.allowed.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(StudioError::Embedding("service went away".to_string()));
        }
        self.allowed.store(remaining - 1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| WordHashEmbedder::vector_for(text))
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

async fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    let handle: CollectionHandle = store
        .create_collection("docs", &Metadata::new())
        .await
        .expect("collection");

    let records: Vec<EmbeddingRecord> = TEXTS
        .iter()
        .map(|(id, text)| {
            let mut metadata = Metadata::new();
            metadata.set_id(*id);
            metadata.insert("source", id.split(':').next().unwrap_or_default());
            EmbeddingRecord {
                id: (*id).to_string(),
                vector: WordHashEmbedder::vector_for(text),
                metadata,
                document: (*text).to_string(),
            }
        })
        .collect();
    store.add(&handle, &records).await.expect("seed records");
    store
}

async fn service() -> QueryService {
    QueryService::new(seeded_store().await, Arc::new(WordHashEmbedder::new()))
}

#[test]
fn similarity_score_examples() {
    assert_eq!(similarity_score(0.0), 100);
    assert_eq!(similarity_score(1.0), 0);
    assert_eq!(similarity_score(0.25), 75);
    assert_eq!(similarity_score(0.125), 88);
    // No clamping outside the cosine range
    assert_eq!(similarity_score(1.5), -50);
    assert_eq!(similarity_score(2.0), -100);
}

#[test]
fn request_deserializes_with_defaults() {
    let request: QueryRequest =
        serde_json::from_value(json!({"collection": "docs", "text": "fox"}))
            .expect("request should parse");
    assert_eq!(request.n_results, DEFAULT_RESULTS);
    assert!(request.filter.is_empty());
    assert!(!request.include_related);
}

#[tokio::test]
async fn primary_results_are_ranked_and_scored() {
    let service = service().await;
    let response = service
        .query(&QueryRequest::new("docs", "the quick brown fox").with_results(2))
        .await
        .expect("query should succeed");

    assert_eq!(response.primary.len(), 2);
    assert_eq!(response.primary[0].id(), "fox:0:0");
    assert_eq!(response.primary[0].similarity_score, Some(100));
    assert!(response.primary[0].similarity_score >= response.primary[1].similarity_score);
    assert!(response.primary.iter().all(|r| !r.is_related));
    assert!(response.primary.iter().all(|r| r.embedding.is_some()));
    assert!(response.related.is_none());
}

#[tokio::test]
async fn filter_restricts_results() {
    let service = service().await;
    let filter = json!({"source": "dog"})
        .as_object()
        .cloned()
        .expect("object");

    let response = service
        .query(
            &QueryRequest::new("docs", "quick fox")
                .with_results(5)
                .with_filter(filter),
        )
        .await
        .expect("query should succeed");

    assert_eq!(response.primary.len(), 1);
    assert_eq!(
        response.primary[0].metadata.get("source"),
        Some(&MetadataValue::from("dog"))
    );
}

#[tokio::test]
async fn related_excludes_primary_ids() {
    let service = service().await;
    let response = service
        .query(
            &QueryRequest::new("docs", "the quick brown fox")
                .with_results(1)
                .with_related(true),
        )
        .await
        .expect("query should succeed");

    assert_eq!(response.primary.len(), 1);
    let top = response.primary[0].id().to_string();

    let related = response.related.expect("related results expected");
    assert!(!related.is_empty());
    assert!(related.len() <= RELATED_RESULTS);
    assert!(related.iter().all(|r| r.id() != top));
    assert!(related.iter().all(|r| r.is_related));
    assert!(related.iter().all(|r| r.similarity_score.is_some()));
}

#[tokio::test]
async fn related_failure_keeps_primary() {
    let embedder = Arc::new(FlakyEmbedder {
        allowed: AtomicUsize::new(1),
    });
    let service = QueryService::new(seeded_store().await, embedder);

    let response = service
        .query(
            &QueryRequest::new("docs", "lazy dog")
                .with_results(2)
                .with_related(true),
        )
        .await
        .expect("primary query should still succeed");

    assert_eq!(response.primary.len(), 2);
    assert!(response.related.is_none());
}

#[tokio::test]
async fn no_related_pass_for_empty_primary() {
    let store = Arc::new(InMemoryStore::new());
    store
        .create_collection("empty", &Metadata::new())
        .await
        .expect("collection");
    let embedder = Arc::new(WordHashEmbedder::new());
    let service = QueryService::new(store, embedder.clone());

    let response = service
        .query(&QueryRequest::new("empty", "anything").with_related(true))
        .await
        .expect("query should succeed");

    assert!(response.primary.is_empty());
    assert!(response.related.is_none());
    assert_eq!(embedder.texts_embedded(), 1);
}

#[tokio::test]
async fn no_related_pass_when_top_result_has_no_text() {
    let store = Arc::new(InMemoryStore::new());
    let handle = store
        .create_collection("blank", &Metadata::new())
        .await
        .expect("collection");
    let records: Vec<EmbeddingRecord> = ["quick fox", "lazy dog"]
        .iter()
        .enumerate()
        .map(|(i, seed)| {
            let id = format!("blank:0:{}", i);
            let mut metadata = Metadata::new();
            metadata.set_id(id.clone());
            EmbeddingRecord {
                id,
                vector: WordHashEmbedder::vector_for(seed),
                metadata,
                document: String::new(),
            }
        })
        .collect();
    store.add(&handle, &records).await.expect("seed records");

    let embedder = Arc::new(WordHashEmbedder::new());
    let service = QueryService::new(store, embedder.clone());
    let response = service
        .query(&QueryRequest::new("blank", "quick fox").with_related(true))
        .await
        .expect("query should succeed");

    assert_eq!(response.primary.len(), 2);
    assert!(response.related.is_none());
    assert_eq!(embedder.texts_embedded(), 1);
}

#[tokio::test]
async fn missing_collection_is_not_found() {
    let service = service().await;
    let result = service.query(&QueryRequest::new("ghost", "fox")).await;
    assert!(matches!(result, Err(StudioError::CollectionNotFound(name)) if name == "ghost"));
}
