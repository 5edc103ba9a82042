use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::config::{Config, get_config_dir};
use crate::database::Filter;
use crate::models::Metadata;
use crate::studio::{Envelope, NewDocument, ProcessingSettings, Studio};

/// Resolve the configuration directory, preferring an explicit override
#[inline]
pub fn resolve_config_dir(override_dir: Option<PathBuf>) -> Result<PathBuf> {
    match override_dir {
        Some(dir) => Ok(dir),
        None => get_config_dir().context("Failed to determine configuration directory"),
    }
}

/// Load the configuration and connect a console to the configured services
#[inline]
pub fn load_studio(config_dir: &Path) -> Result<Studio> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    debug!(
        "Using Chroma at {}:{} and Ollama model {}",
        config.chroma.host, config.chroma.port, config.ollama.model
    );
    Studio::from_config(&config).context("Failed to initialize console")
}

/// Print an envelope as pretty JSON and report whether it succeeded
#[inline]
pub fn print_result<E: Envelope>(result: &E) -> Result<bool> {
    let json = serde_json::to_string_pretty(result).context("Failed to serialize result")?;
    println!("{}", json);
    Ok(result.succeeded())
}

/// Parse a JSON object given on the command line into a `where` filter
#[inline]
pub fn parse_filter(raw: Option<&str>) -> Result<Filter> {
    let Some(raw) = raw else {
        return Ok(Filter::new());
    };

    match serde_json::from_str::<serde_json::Value>(raw).context("Filter is not valid JSON")? {
        serde_json::Value::Object(filter) => Ok(filter),
        other => bail!("Filter must be a JSON object, got {}", other),
    }
}

/// Parse a JSON object of scalar values into metadata
#[inline]
pub fn parse_metadata(raw: &str) -> Result<Metadata> {
    match serde_json::from_str::<serde_json::Value>(raw).context("Metadata is not valid JSON")? {
        serde_json::Value::Object(object) => {
            if let Some((key, _)) = object.iter().find(|(_, v)| v.is_array() || v.is_object()) {
                bail!("Metadata value for '{}' must be a string, number or boolean", key);
            }
            Ok(Metadata::from_json_object(&object))
        }
        other => bail!("Metadata must be a JSON object, got {}", other),
    }
}

#[inline]
pub async fn show_status(studio: &Studio) -> Result<bool> {
    print_result(&studio.test_connection().await)
}

#[inline]
pub async fn list_collections(studio: &Studio) -> Result<bool> {
    print_result(&studio.list_collections().await)
}

#[inline]
pub async fn create_collection(studio: &Studio, name: &str, dimension: Option<u32>) -> Result<bool> {
    info!("Creating collection {}", name);
    print_result(&studio.create_collection(name, dimension).await)
}

#[inline]
pub async fn delete_collection(studio: &Studio, name: &str) -> Result<bool> {
    info!("Deleting collection {}", name);
    print_result(&studio.delete_collection(name).await)
}

#[inline]
pub async fn collection_info(studio: &Studio, name: &str) -> Result<bool> {
    print_result(&studio.get_collection_info(name).await)
}

#[inline]
pub async fn peek_collection(studio: &Studio, name: &str, sample: usize) -> Result<bool> {
    print_result(&studio.peek_collection(name, sample).await)
}

#[inline]
pub async fn list_documents(studio: &Studio, name: &str) -> Result<bool> {
    print_result(&studio.get_all_documents(name).await)
}

#[inline]
pub async fn add_document(
    studio: &Studio,
    name: &str,
    text: String,
    source: Option<String>,
    id: Option<String>,
) -> Result<bool> {
    let mut metadata = Metadata::new();
    if let Some(source) = source {
        metadata.insert("source", source);
    }
    if let Some(id) = id {
        metadata.set_id(id);
    }

    let document = NewDocument::new(text).with_metadata(metadata);
    print_result(&studio.add_document(name, document).await)
}

#[inline]
pub async fn update_document(studio: &Studio, name: &str, id: &str, text: &str) -> Result<bool> {
    print_result(&studio.update_document(name, id, text).await)
}

#[inline]
pub async fn remove_document(studio: &Studio, name: &str, id: &str) -> Result<bool> {
    print_result(&studio.delete_document(name, id).await)
}

#[inline]
pub async fn query_collection(
    studio: &Studio,
    name: &str,
    text: &str,
    n_results: usize,
    filter: Option<&str>,
    include_related: bool,
) -> Result<bool> {
    let filter = parse_filter(filter)?;
    print_result(
        &studio
            .query_collection(name, text, n_results, filter, include_related)
            .await,
    )
}

#[inline]
pub async fn ingest_files(
    studio: &Studio,
    name: &str,
    files: &[PathBuf],
    settings: ProcessingSettings,
) -> Result<bool> {
    info!("Ingesting {} files into {}", files.len(), name);
    print_result(&studio.ingest_files(name, files, settings).await)
}

#[inline]
pub async fn set_collection_metadata(studio: &Studio, name: &str, raw: &str) -> Result<bool> {
    let metadata = parse_metadata(raw)?;
    print_result(&studio.update_collection_metadata(name, metadata).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetadataValue;
    use crate::studio::{ActionResult, AddDocumentEnvelope};

    #[test]
    fn filter_parsing() {
        assert!(parse_filter(None).expect("empty filter").is_empty());

        let filter = parse_filter(Some(r#"{"source": {"$in": ["a", "b"]}}"#)).expect("filter");
        assert!(filter.contains_key("source"));

        assert!(parse_filter(Some("[1, 2]")).is_err());
        assert!(parse_filter(Some("{not json")).is_err());
    }

    #[test]
    fn metadata_parsing() {
        let metadata = parse_metadata(r#"{"owner": "docs-team", "version": 2}"#).expect("metadata");
        assert_eq!(metadata.get("owner"), Some(&MetadataValue::from("docs-team")));
        assert_eq!(metadata.get("version"), Some(&MetadataValue::Int(2)));

        assert!(parse_metadata(r#"{"tags": ["a"]}"#).is_err());
        assert!(parse_metadata("42").is_err());
    }

    #[test]
    fn explicit_config_dir_wins() {
        let dir = resolve_config_dir(Some(PathBuf::from("/tmp/studio"))).expect("dir");
        assert_eq!(dir, PathBuf::from("/tmp/studio"));
    }

    #[test]
    fn print_result_reports_success() {
        assert!(print_result(&ActionResult::ok(1)).expect("printed"));
        assert!(!print_result(&ActionResult::<u8>::failure("bad")).expect("printed"));
        assert!(!print_result(&AddDocumentEnvelope::from(ActionResult::failure("bad"))).expect("printed"));
    }
}
