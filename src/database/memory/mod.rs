// In-memory vector store
// Collections live in a HashMap behind a tokio RwLock; items keep insertion
// order, which is also the order `get` returns them in


use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use super::{CollectionHandle, EmbeddingRecord, Filter, GetRequest, StoredItem, VectorStore};
use crate::models::{Metadata, MetadataValue};
use crate::{Result, StudioError};

#[derive(Debug)]
struct MemoryCollection {
    id: String,
    metadata: Metadata,
    items: Vec<EmbeddingRecord>,
}

impl MemoryCollection {
    /// Check a whole batch before anything is written.
    ///
    /// The expected dimension comes from the stored items, or from the first
    /// vector of the batch when the collection is empty.
    fn check_dimensions(&self, records: &[EmbeddingRecord]) -> Result<()> {
        let expected = self
            .items
            .first()
            .or_else(|| records.first())
            .map(|record| record.vector.len());

        if let Some(expected) = expected {
            if let Some(bad) = records.iter().find(|r| r.vector.len() != expected) {
                return Err(dimension_mismatch(bad.vector.len(), expected));
            }
        }
        Ok(())
    }

    fn check_query(&self, vector: &[f32]) -> Result<()> {
        match self.items.first() {
            Some(existing) if existing.vector.len() != vector.len() => {
                Err(dimension_mismatch(vector.len(), existing.vector.len()))
            }
            _ => Ok(()),
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }
}

fn dimension_mismatch(actual: usize, expected: usize) -> StudioError {
    StudioError::Store(format!(
        "Embedding dimension {} does not match collection dimensionality {}",
        actual, expected
    ))
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl InMemoryStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Cosine distance, `1 - cos(a, b)`. Zero-magnitude vectors are at distance 1.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

fn not_found(collection: &CollectionHandle) -> StudioError {
    StudioError::CollectionNotFound(collection.name.clone())
}

/// Evaluate a `where` clause against item metadata
pub(crate) fn matches_filter(filter: &Filter, metadata: &Metadata) -> Result<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    all &= matches_filter(clause, metadata)?;
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    any |= matches_filter(clause, metadata)?;
                }
                any
            }
            field => matches_condition(metadata.get(field), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(operator: &str, condition: &'a Value) -> Result<Vec<&'a Filter>> {
    condition
        .as_array()
        .ok_or_else(|| invalid_filter(format!("{} expects a list of clauses", operator)))?
        .iter()
        .map(|clause| {
            clause
                .as_object()
                .ok_or_else(|| invalid_filter(format!("{} clauses must be objects", operator)))
        })
        .collect()
}

fn matches_condition(value: Option<&MetadataValue>, condition: &Value) -> Result<bool> {
    let Some(operators) = condition.as_object() else {
        return Ok(value.is_some_and(|v| values_equal(v, condition)));
    };

    for (operator, operand) in operators {
        let matched = match operator.as_str() {
            "$eq" => value.is_some_and(|v| values_equal(v, operand)),
            "$ne" => !value.is_some_and(|v| values_equal(v, operand)),
            "$in" => {
                let options = list(operator, operand)?;
                value.is_some_and(|v| options.iter().any(|o| values_equal(v, o)))
            }
            "$nin" => {
                let options = list(operator, operand)?;
                !value.is_some_and(|v| options.iter().any(|o| values_equal(v, o)))
            }
            "$gt" | "$gte" | "$lt" | "$lte" => {
                let bound = operand
                    .as_f64()
                    .ok_or_else(|| invalid_filter(format!("{} expects a number", operator)))?;
                value
                    .and_then(MetadataValue::as_f64)
                    .is_some_and(|v| match operator.as_str() {
                        "$gt" => v > bound,
                        "$gte" => v >= bound,
                        "$lt" => v < bound,
                        _ => v <= bound,
                    })
            }
            other => return Err(invalid_filter(format!("Unsupported operator {}", other))),
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn list<'a>(operator: &str, operand: &'a Value) -> Result<&'a Vec<Value>> {
    operand
        .as_array()
        .ok_or_else(|| invalid_filter(format!("{} expects a list", operator)))
}

fn values_equal(value: &MetadataValue, expected: &Value) -> bool {
    match (value, expected) {
        (MetadataValue::Str(a), Value::String(b)) => a == b,
        (MetadataValue::Bool(a), Value::Bool(b)) => a == b,
        (MetadataValue::Null, Value::Null) => true,
        (MetadataValue::Int(_) | MetadataValue::Float(_), Value::Number(n)) => {
            value.as_f64() == n.as_f64()
        }
        _ => false,
    }
}

fn invalid_filter(message: String) -> StudioError {
    StudioError::Validation(format!("Invalid where filter: {}", message))
}

fn to_stored(record: &EmbeddingRecord, include_embeddings: bool) -> StoredItem {
    StoredItem {
        id: record.id.clone(),
        document: Some(record.document.clone()),
        metadata: record.metadata.clone(),
        embedding: include_embeddings.then(|| record.vector.clone()),
        distance: None,
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn heartbeat(&self) -> Result<()> {
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionHandle>> {
        let collections = self.collections.read().await;
        let mut handles: Vec<CollectionHandle> = collections
            .iter()
            .map(|(name, collection)| CollectionHandle {
                id: collection.id.clone(),
                name: name.clone(),
                metadata: collection.metadata.clone(),
            })
            .collect();
        handles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(handles)
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionHandle>> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|collection| CollectionHandle {
            id: collection.id.clone(),
            name: name.to_string(),
            metadata: collection.metadata.clone(),
        }))
    }

    async fn create_collection(
        &self,
        name: &str,
        metadata: &Metadata,
    ) -> Result<CollectionHandle> {
        let mut collections = self.collections.write().await;
        let collection = collections.entry(name.to_string()).or_insert_with(|| {
            debug!("Creating in-memory collection {}", name);
            MemoryCollection {
                id: uuid::Uuid::new_v4().to_string(),
                metadata: metadata.without_nulls(),
                items: Vec::new(),
            }
        });

        Ok(CollectionHandle {
            id: collection.id.clone(),
            name: name.to_string(),
            metadata: collection.metadata.clone(),
        })
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StudioError::CollectionNotFound(name.to_string()))
    }

    async fn modify_metadata(
        &self,
        collection: &CollectionHandle,
        metadata: &Metadata,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(&collection.name)
            .ok_or_else(|| not_found(collection))?;
        stored.metadata = metadata.without_nulls();
        Ok(())
    }

    async fn count(&self, collection: &CollectionHandle) -> Result<usize> {
        let collections = self.collections.read().await;
        collections
            .get(&collection.name)
            .map(|stored| stored.items.len())
            .ok_or_else(|| not_found(collection))
    }

    async fn add(&self, collection: &CollectionHandle, records: &[EmbeddingRecord]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(&collection.name)
            .ok_or_else(|| not_found(collection))?;

        stored.check_dimensions(records)?;

        let mut fresh: Vec<&EmbeddingRecord> = Vec::with_capacity(records.len());
        for record in records {
            if stored.position(&record.id).is_some() || fresh.iter().any(|r| r.id == record.id) {
                debug!("Skipping existing id {} in {}", record.id, collection.name);
                continue;
            }
            fresh.push(record);
        }
        stored.items.extend(fresh.into_iter().cloned());
        Ok(())
    }

    async fn get(
        &self,
        collection: &CollectionHandle,
        request: &GetRequest,
    ) -> Result<Vec<StoredItem>> {
        let collections = self.collections.read().await;
        let stored = collections
            .get(&collection.name)
            .ok_or_else(|| not_found(collection))?;

        let mut items = Vec::new();
        for record in &stored.items {
            if request.limit.is_some_and(|limit| items.len() >= limit) {
                break;
            }
            if let Some(ids) = &request.ids {
                if !ids.contains(&record.id) {
                    continue;
                }
            }
            if let Some(filter) = &request.filter {
                if !matches_filter(filter, &record.metadata)? {
                    continue;
                }
            }
            if request.ids_only {
                items.push(StoredItem {
                    id: record.id.clone(),
                    ..StoredItem::default()
                });
            } else {
                items.push(to_stored(record, request.include_embeddings));
            }
        }
        Ok(items)
    }

    async fn query(
        &self,
        collection: &CollectionHandle,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<StoredItem>> {
        let collections = self.collections.read().await;
        let stored = collections
            .get(&collection.name)
            .ok_or_else(|| not_found(collection))?;
        stored.check_query(embedding)?;

        let mut scored = Vec::new();
        for record in &stored.items {
            if let Some(filter) = filter {
                if !matches_filter(filter, &record.metadata)? {
                    continue;
                }
            }
            let mut item = to_stored(record, true);
            item.distance = Some(cosine_distance(&record.vector, embedding));
            scored.push(item);
        }

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(n_results);
        Ok(scored)
    }

    async fn update(
        &self,
        collection: &CollectionHandle,
        records: &[EmbeddingRecord],
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(&collection.name)
            .ok_or_else(|| not_found(collection))?;

        stored.check_dimensions(records)?;

        let positions = records
            .iter()
            .map(|record| {
                stored
                    .position(&record.id)
                    .ok_or_else(|| StudioError::DocumentNotFound(record.id.clone()))
            })
            .collect::<Result<Vec<usize>>>()?;

        for (position, record) in positions.into_iter().zip(records) {
            stored.items[position] = record.clone();
        }
        Ok(())
    }

    async fn delete(&self, collection: &CollectionHandle, filter: &Filter) -> Result<()> {
        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(&collection.name)
            .ok_or_else(|| not_found(collection))?;

        let keep = stored
            .items
            .iter()
            .map(|record| matches_filter(filter, &record.metadata).map(|matched| !matched))
            .collect::<Result<Vec<bool>>>()?;

        let before = stored.items.len();
        let mut keep = keep.into_iter();
        stored.items.retain(|_| keep.next().unwrap_or(true));
        debug!(
            "Deleted {} items from {}",
            before - stored.items.len(),
            collection.name
        );
        Ok(())
    }
}
