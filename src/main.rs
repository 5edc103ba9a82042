use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use vector_studio::commands::{
    add_document, collection_info, create_collection, delete_collection, ingest_files,
    list_collections, list_documents, load_studio, peek_collection, query_collection,
    remove_document, resolve_config_dir, set_collection_metadata, show_status, update_document,
};
use vector_studio::config::{run_interactive_config, show_config};
use vector_studio::retrieval::DEFAULT_RESULTS;
use vector_studio::studio::{DEFAULT_PEEK_SAMPLE, ProcessingMethod, ProcessingSettings};

#[derive(Parser)]
#[command(name = "vector-studio")]
#[command(about = "Administrative console for Chroma collections with Ollama embeddings")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to $VECTOR_STUDIO_CONFIG_DIR, then the platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the Ollama and Chroma connections
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Check that Chroma and Ollama are reachable
    Status,
    /// List collections with document counts
    List,
    /// Create a new collection
    Create {
        name: String,
        /// Embedding dimension recorded in the collection metadata
        #[arg(long)]
        dimension: Option<u32>,
    },
    /// Delete a collection and all of its documents
    Delete { name: String },
    /// Show collection count, dimension and metadata
    Info { name: String },
    /// Show collection info and a sample of stored documents
    Peek {
        name: String,
        #[arg(long, default_value_t = DEFAULT_PEEK_SAMPLE)]
        sample: usize,
    },
    /// List every document in a collection
    Documents { name: String },
    /// Add a single text as one document
    Add {
        name: String,
        text: String,
        /// Origin of the text, defaults to "user-input"
        #[arg(long)]
        source: Option<String>,
        /// Explicit document id, a UUID is generated otherwise
        #[arg(long)]
        id: Option<String>,
    },
    /// Replace a document's text, keeping its metadata
    Update {
        name: String,
        id: String,
        text: String,
    },
    /// Remove a document by id
    Remove { name: String, id: String },
    /// Similarity search within a collection
    Query {
        name: String,
        text: String,
        /// Number of results
        #[arg(short = 'k', long = "results", default_value_t = DEFAULT_RESULTS)]
        results: usize,
        /// Metadata filter as a JSON object, e.g. '{"source": "guide.md"}'
        #[arg(long = "where")]
        filter: Option<String>,
        /// Also return documents related to the top result
        #[arg(long)]
        related: bool,
    },
    /// Chunk, embed and store files
    Ingest {
        name: String,
        /// Files to ingest; relative paths resolve against the collection's upload directory
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        chunk_overlap: Option<usize>,
        /// Processing method: default, recursive or markdown
        #[arg(long)]
        method: Option<ProcessingMethod>,
    },
    /// Merge a JSON object into a collection's metadata
    SetMetadata { name: String, metadata: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = resolve_config_dir(cli.config_dir)?;

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&config_dir)?;
        } else {
            run_interactive_config(&config_dir)?;
        }
        return Ok(());
    }

    let studio = load_studio(&config_dir)?;

    let success = match cli.command {
        Commands::Config { .. } => true,
        Commands::Status => show_status(&studio).await?,
        Commands::List => list_collections(&studio).await?,
        Commands::Create { name, dimension } => {
            create_collection(&studio, &name, dimension).await?
        }
        Commands::Delete { name } => delete_collection(&studio, &name).await?,
        Commands::Info { name } => collection_info(&studio, &name).await?,
        Commands::Peek { name, sample } => peek_collection(&studio, &name, sample).await?,
        Commands::Documents { name } => list_documents(&studio, &name).await?,
        Commands::Add {
            name,
            text,
            source,
            id,
        } => add_document(&studio, &name, text, source, id).await?,
        Commands::Update { name, id, text } => {
            update_document(&studio, &name, &id, &text).await?
        }
        Commands::Remove { name, id } => remove_document(&studio, &name, &id).await?,
        Commands::Query {
            name,
            text,
            results,
            filter,
            related,
        } => query_collection(&studio, &name, &text, results, filter.as_deref(), related).await?,
        Commands::Ingest {
            name,
            files,
            chunk_size,
            chunk_overlap,
            method,
        } => {
            let defaults = ProcessingSettings::default();
            let settings = ProcessingSettings {
                chunk_size: chunk_size.unwrap_or(defaults.chunk_size),
                chunk_overlap: chunk_overlap.unwrap_or(defaults.chunk_overlap),
                processing_method: method.unwrap_or(defaults.processing_method),
            };
            ingest_files(&studio, &name, &files, settings).await?
        }
        Commands::SetMetadata { name, metadata } => {
            set_collection_metadata(&studio, &name, &metadata).await?
        }
    };

    if !success {
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["vector-studio", "list"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::List));
        }
    }

    #[test]
    fn create_with_dimension() {
        let parsed = Cli::try_parse_from(["vector-studio", "create", "docs", "--dimension", "768"])
            .expect("should parse");

        if let Commands::Create { name, dimension } = parsed.command {
            assert_eq!(name, "docs");
            assert_eq!(dimension, Some(768));
        } else {
            panic!("expected create command");
        }
    }

    #[test]
    fn query_options() {
        let parsed = Cli::try_parse_from([
            "vector-studio",
            "query",
            "docs",
            "quick fox",
            "-k",
            "3",
            "--where",
            r#"{"source":"f1"}"#,
            "--related",
        ])
        .expect("should parse");

        if let Commands::Query {
            name,
            text,
            results,
            filter,
            related,
        } = parsed.command
        {
            assert_eq!(name, "docs");
            assert_eq!(text, "quick fox");
            assert_eq!(results, 3);
            assert_eq!(filter.as_deref(), Some(r#"{"source":"f1"}"#));
            assert!(related);
        } else {
            panic!("expected query command");
        }
    }

    #[test]
    fn query_defaults() {
        let parsed =
            Cli::try_parse_from(["vector-studio", "query", "docs", "fox"]).expect("should parse");

        if let Commands::Query {
            results, related, ..
        } = parsed.command
        {
            assert_eq!(results, DEFAULT_RESULTS);
            assert!(!related);
        } else {
            panic!("expected query command");
        }
    }

    #[test]
    fn ingest_with_method() {
        let parsed = Cli::try_parse_from([
            "vector-studio",
            "ingest",
            "docs",
            "a.md",
            "b.txt",
            "--chunk-size",
            "500",
            "--method",
            "markdown",
        ])
        .expect("should parse");

        if let Commands::Ingest {
            files,
            chunk_size,
            chunk_overlap,
            method,
            ..
        } = parsed.command
        {
            assert_eq!(files, vec![PathBuf::from("a.md"), PathBuf::from("b.txt")]);
            assert_eq!(chunk_size, Some(500));
            assert_eq!(chunk_overlap, None);
            assert_eq!(method, Some(ProcessingMethod::Markdown));
        } else {
            panic!("expected ingest command");
        }
    }

    #[test]
    fn ingest_requires_files() {
        let cli = Cli::try_parse_from(["vector-studio", "ingest", "docs"]);
        assert!(cli.is_err());
    }

    #[test]
    fn unknown_method_is_rejected() {
        let cli = Cli::try_parse_from(["vector-studio", "ingest", "docs", "a.md", "--method", "magic"]);
        assert!(cli.is_err());
    }

    #[test]
    fn global_config_dir() {
        let parsed = Cli::try_parse_from(["vector-studio", "status", "--config-dir", "/tmp/vs"])
            .expect("should parse");
        assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/vs")));
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["vector-studio", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["vector-studio", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["vector-studio", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
