#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end console workflows against the in-memory store

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use vector_studio::Result;
use vector_studio::database::{Filter, InMemoryStore};
use vector_studio::embeddings::Embedder;
use vector_studio::models::{Metadata, MetadataValue};
use vector_studio::studio::{NewDocument, ProcessingSettings, Studio};

const DIMENSION: usize = 32;

/// Hashes lowercase words into a fixed number of buckets
struct BagOfWordsEmbedder;

fn bucket(word: &str) -> usize {
    let hash = word
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
        });
    usize::try_from(hash % DIMENSION as u64).unwrap_or_default()
}

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0_f32; DIMENSION];
                for word in text.split_whitespace() {
                    let word: String = word
                        .chars()
                        .filter(|c| c.is_alphanumeric())
                        .collect::<String>()
                        .to_lowercase();
                    if !word.is_empty() {
                        vector[bucket(&word)] += 1.0;
                    }
                }
                if vector.iter().all(|v| *v == 0.0) {
                    vector[0] = 1.0;
                }
                vector
            })
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

fn studio() -> Studio {
    Studio::new(Arc::new(InMemoryStore::new()), Arc::new(BagOfWordsEmbedder))
}

fn source_of(metadata: &Metadata) -> Option<String> {
    metadata.get("source").map(ToString::to_string)
}

#[tokio::test]
async fn create_add_and_query() {
    let studio = studio();

    let created = studio.create_collection("docs", Some(768)).await;
    assert!(created.success, "create failed: {:?}", created.error);
    assert_eq!(created.data.expect("info").dimension, 768);

    let mut metadata = Metadata::new();
    metadata.insert("source", "f1");
    let added = studio
        .add_document(
            "docs",
            NewDocument::new("The quick brown fox").with_metadata(metadata),
        )
        .await;
    assert!(added.success, "add failed: {:?}", added.error);

    let info = studio.get_collection_info("docs").await;
    assert_eq!(info.data.expect("info").count, 1);

    let response = studio
        .query_collection("docs", "quick fox", 1, Filter::new(), false)
        .await;
    assert!(response.success, "query failed: {:?}", response.error);

    assert!(response.related.is_none());
    let primary = response.data.expect("query data");
    assert_eq!(primary.len(), 1);

    let top = &primary[0];
    let score = top.similarity_score.expect("score");
    assert!((0..=100).contains(&score), "score {} out of range", score);
    assert_eq!(source_of(&top.metadata).as_deref(), Some("f1"));
}

#[tokio::test]
async fn duplicate_names_are_refused() {
    let studio = studio();
    assert!(studio.create_collection("docs", None).await.success);

    let again = studio.create_collection("docs", None).await;
    assert!(!again.success);
    assert!(again.error.expect("error").contains("already exists"));

    let listed = studio.list_collections().await.data.expect("collections");
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn reingesting_a_file_adds_nothing_new() {
    let studio = studio();
    let uploads = TempDir::new().expect("temp dir");
    let studio = studio.with_upload_dir(uploads.path());
    assert!(studio.create_collection("guides", None).await.success);

    let body = "Chroma keeps vectors. Ollama makes them. ".repeat(30);
    let stored = studio
        .upload_file("guides", "guide.md", body.as_bytes())
        .await;
    assert!(stored.success, "upload failed: {:?}", stored.error);

    let settings = ProcessingSettings {
        chunk_size: 200,
        chunk_overlap: 40,
        ..ProcessingSettings::default()
    };
    let files = vec!["guide.md".into()];

    let first = studio.ingest_files("guides", &files, settings).await;
    assert!(first.success, "ingest failed: {:?}", first.error);
    let first = first.data.expect("summary");
    assert!(first.chunks_added > 1);

    let second = studio.ingest_files("guides", &files, settings).await;
    assert_eq!(second.data.expect("summary").chunks_added, 0);

    let documents = studio.get_all_documents("guides").await.data.expect("documents");
    assert_eq!(documents.len(), first.chunks_added);
    assert!(
        documents
            .iter()
            .all(|d| source_of(&d.metadata).as_deref() == Some("guide.md"))
    );
    assert!(documents.iter().any(|d| d.id() == "guide.md:0:0"));
}

#[tokio::test]
async fn document_lifecycle() {
    let studio = studio();
    assert!(studio.create_collection("notes", None).await.success);

    let mut metadata = Metadata::new();
    metadata.set_id("note-1");
    metadata.insert("source", "manual");
    let id = studio
        .add_document(
            "notes",
            NewDocument::new("Initial text").with_metadata(metadata),
        )
        .await
        .id
        .expect("id");
    assert_eq!(id, "note-1");

    let updated = studio
        .update_document("notes", "note-1", "Revised text about foxes")
        .await;
    assert!(updated.success, "update failed: {:?}", updated.error);

    let documents = studio.get_all_documents("notes").await.data.expect("documents");
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].page_content, "Revised text about foxes");
    assert_eq!(source_of(&documents[0].metadata).as_deref(), Some("manual"));

    let removed = studio.delete_document("notes", "note-1").await;
    assert!(removed.success);
    let missing = studio.delete_document("notes", "note-1").await;
    assert!(!missing.success);

    assert!(studio.delete_collection("notes").await.success);
    let gone = studio.get_collection_info("notes").await;
    assert!(!gone.success);
    assert!(gone.error.expect("error").contains("not found"));
}

#[tokio::test]
async fn filtered_query_with_related_documents() {
    let studio = studio();
    assert!(studio.create_collection("animals", None).await.success);

    for (text, source) in [
        ("foxes hunt mice at dusk", "wild"),
        ("foxes hunt rabbits at night", "wild"),
        ("cats nap in the sun", "home"),
    ] {
        let mut metadata = Metadata::new();
        metadata.insert("source", source);
        let added = studio
            .add_document("animals", NewDocument::new(text).with_metadata(metadata))
            .await;
        assert!(added.success);
    }

    let filter = json!({"source": "wild"})
        .as_object()
        .cloned()
        .expect("object");
    let response = studio
        .query_collection("animals", "foxes hunt", 1, filter, true)
        .await;
    assert!(response.success, "query failed: {:?}", response.error);

    let primary = response.data.expect("query data");
    assert_eq!(primary.len(), 1);
    let related = response.related.expect("related results");
    assert_eq!(related.len(), 1);
    assert!(related[0].is_related);
    assert_ne!(related[0].id(), primary[0].id());
    assert_eq!(
        related[0].metadata.get("source"),
        Some(&MetadataValue::from("wild"))
    );
}

#[tokio::test]
async fn collection_metadata_merges() {
    let studio = studio();
    assert!(studio.create_collection("docs", None).await.success);

    let mut overlay = Metadata::new();
    overlay.insert("owner", "docs-team");
    let merged = studio
        .update_collection_metadata("docs", overlay)
        .await
        .data
        .expect("metadata");

    assert_eq!(merged.get("owner"), Some(&MetadataValue::from("docs-team")));
    assert!(merged.contains_key("created"));
    assert!(merged.contains_key("updated"));
    assert_eq!(
        merged.get("hnsw:space"),
        Some(&MetadataValue::from("cosine"))
    );
}
