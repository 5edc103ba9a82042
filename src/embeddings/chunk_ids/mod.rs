// Deterministic chunk identifiers of the form `<source>:<page>:<sequence>`


use crate::models::{Document, MetadataValue};

const UNKNOWN_SOURCE: &str = "unknown";
const DEFAULT_PAGE: &str = "0";

/// The `<source>:<page>` prefix shared by every chunk of one page
#[inline]
pub fn page_id(document: &Document) -> String {
    let source = document
        .metadata
        .get("source")
        .filter(|value| value.is_truthy())
        .map_or_else(|| UNKNOWN_SOURCE.to_string(), MetadataValue::to_string);

    let page = document
        .metadata
        .get("page")
        .filter(|value| value.is_truthy())
        .map_or_else(|| DEFAULT_PAGE.to_string(), MetadataValue::to_string);

    format!("{}:{}", source, page)
}

/// Assign `metadata.id` to every chunk.
///
/// The sequence number counts consecutive chunks sharing a page id and resets to
/// zero whenever the page id changes, so ids depend on input order.
#[inline]
pub fn calculate_chunk_ids(chunks: Vec<Document>) -> Vec<Document> {
    let mut last_page_id: Option<String> = None;
    let mut current_chunk_index: usize = 0;

    chunks
        .into_iter()
        .map(|mut chunk| {
            let current_page_id = page_id(&chunk);

            if last_page_id.as_deref() == Some(current_page_id.as_str()) {
                current_chunk_index += 1;
            } else {
                current_chunk_index = 0;
            }

            chunk
                .metadata
                .set_id(format!("{}:{}", current_page_id, current_chunk_index));
            last_page_id = Some(current_page_id);
            chunk
        })
        .collect()
}
