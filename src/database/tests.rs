use super::*;
use serde_json::json;

#[test]
fn id_filter_matches_metadata_id() {
    let filter = id_filter("a:0:1");
    assert_eq!(Value::Object(filter), json!({"id": "a:0:1"}));
}

#[test]
fn get_request_builders() {
    let request = GetRequest::all()
        .with_filter(id_filter("x"))
        .with_limit(5)
        .with_embeddings();

    assert_eq!(request.limit, Some(5));
    assert!(request.include_embeddings);
    assert!(request.ids.is_none());
    assert_eq!(
        request.filter.map(Value::Object),
        Some(json!({"id": "x"}))
    );
}

#[test]
fn into_query_result_keeps_metadata_id() {
    let mut metadata = Metadata::new();
    metadata.set_id("a:0:0");
    let item = StoredItem {
        id: "store-id".to_string(),
        document: Some("text".to_string()),
        metadata,
        embedding: Some(vec![1.0]),
        distance: Some(0.5),
    };

    let result = item.into_query_result();
    assert_eq!(result.id(), "a:0:0");
    assert_eq!(result.page_content, "text");
    assert_eq!(result.distance, Some(0.5));
    assert_eq!(result.similarity_score, None);
}

#[test]
fn into_query_result_fills_missing_id() {
    let item = StoredItem {
        id: "store-id".to_string(),
        ..StoredItem::default()
    };
    assert_eq!(item.into_query_result().id(), "store-id");

    let anonymous = StoredItem::default().into_query_result();
    assert!(uuid::Uuid::parse_str(anonymous.id()).is_ok());
    assert_eq!(anonymous.page_content, "");
}
