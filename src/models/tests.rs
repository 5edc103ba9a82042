use super::*;
use serde_json::json;

#[test]
fn metadata_value_untagged_parsing() {
    let metadata: Metadata = serde_json::from_value(json!({
        "source": "f1",
        "page": 2,
        "score": 0.5,
        "draft": true,
        "missing": null
    }))
    .expect("metadata should deserialize");

    assert_eq!(metadata.get("source"), Some(&MetadataValue::Str("f1".to_string())));
    assert_eq!(metadata.get("page"), Some(&MetadataValue::Int(2)));
    assert_eq!(metadata.get("score"), Some(&MetadataValue::Float(0.5)));
    assert_eq!(metadata.get("draft"), Some(&MetadataValue::Bool(true)));
    assert_eq!(metadata.get("missing"), Some(&MetadataValue::Null));
}

#[test]
fn metadata_serializes_deterministically() {
    let mut metadata = Metadata::new();
    metadata.insert("zeta", 1_i64);
    metadata.insert("alpha", "a");

    let serialized = serde_json::to_string(&metadata).expect("metadata should serialize");
    assert_eq!(serialized, r#"{"alpha":"a","zeta":1}"#);
}

#[test]
fn whole_floats_display_as_integers() {
    assert_eq!(MetadataValue::Float(3.0).to_string(), "3");
    assert_eq!(MetadataValue::Float(1.5).to_string(), "1.5");
    assert_eq!(MetadataValue::Int(7).to_string(), "7");
}

#[test]
fn truthiness() {
    assert!(!MetadataValue::Str(String::new()).is_truthy());
    assert!(!MetadataValue::Int(0).is_truthy());
    assert!(!MetadataValue::Null.is_truthy());
    assert!(MetadataValue::Str("x".to_string()).is_truthy());
    assert!(MetadataValue::Float(0.1).is_truthy());
}

#[test]
fn without_nulls_drops_only_nulls() {
    let mut metadata = Metadata::new();
    metadata.insert("keep", "value");
    metadata.insert("drop", MetadataValue::Null);
    metadata.insert("zero", 0_i64);

    let cleaned = metadata.without_nulls();
    assert_eq!(cleaned.len(), 2);
    assert!(cleaned.contains_key("keep"));
    assert!(cleaned.contains_key("zero"));
    assert!(!cleaned.contains_key("drop"));
}

#[test]
fn merged_overrides_existing_keys() {
    let mut base = Metadata::new();
    base.insert("created", "2024-01-01T00:00:00.000Z");
    base.insert("owner", "alice");

    let mut overlay = Metadata::new();
    overlay.insert("owner", "bob");

    let merged = base.merged(&overlay);
    assert_eq!(merged.get("owner"), Some(&MetadataValue::from("bob")));
    assert_eq!(
        merged.get("created"),
        Some(&MetadataValue::from("2024-01-01T00:00:00.000Z"))
    );
}

#[test]
fn empty_id_is_treated_as_missing() {
    let mut metadata = Metadata::new();
    assert_eq!(metadata.id(), None);
    metadata.set_id("");
    assert_eq!(metadata.id(), None);
    metadata.set_id("a:0:0");
    assert_eq!(metadata.id(), Some("a:0:0"));
}

#[test]
fn from_json_object_skips_nested_values() {
    let object = json!({"tags": ["a", "b"], "nested": {"x": 1}, "kept": "yes"});
    let metadata = Metadata::from_json_object(object.as_object().expect("object"));
    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata.get("kept"), Some(&MetadataValue::from("yes")));
}

#[test]
fn collection_dimension_defaults() {
    let info = CollectionInfo::new("docs", 0, Metadata::new());
    assert_eq!(info.dimension, DEFAULT_DIMENSION);

    let mut metadata = Metadata::new();
    metadata.insert("dimension", 768_i64);
    let info = CollectionInfo::new("docs", 3, metadata);
    assert_eq!(info.dimension, 768);
}

#[test]
fn query_result_serializes_camel_case() {
    let mut metadata = Metadata::new();
    metadata.set_id("a:0:0");
    let result = QueryResult {
        page_content: "hello".to_string(),
        metadata,
        embedding: None,
        distance: Some(0.25),
        similarity_score: Some(75),
        is_related: false,
    };

    let value = serde_json::to_value(&result).expect("result should serialize");
    assert_eq!(value["pageContent"], "hello");
    assert_eq!(value["similarityScore"], 75);
    assert!(value.get("isRelated").is_none());
    assert!(value.get("embedding").is_none());
    assert_eq!(result.id(), "a:0:0");
}

#[test]
fn timestamp_after_is_strictly_later() {
    let now = now_timestamp();
    assert!(timestamp_after(Some(&now)) > now);

    assert_eq!(
        timestamp_after(Some("2999-06-30T12:00:00.123Z")),
        "2999-06-30T12:00:00.124Z"
    );

    let past = "2001-01-01T00:00:00.000Z";
    let fresh = timestamp_after(Some(past));
    assert!(fresh.as_str() > past);
    assert!(fresh.ends_with('Z'));

    assert!(timestamp_after(Some("not a timestamp")).ends_with('Z'));
    assert!(timestamp_after(None).ends_with('Z'));
}
