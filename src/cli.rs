use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::{
    chunking::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE},
    config::{DEFAULT_TOP_K, Settings},
    data_dir::DataDir,
    embedding::DEFAULT_BATCH_SIZE,
    sentence_model::DEFAULT_MODEL_ID,
};

#[derive(Debug, Parser)]
#[command(
    name = "brochure-rag",
    about = "Index PDF brochures and retrieve passages that answer questions"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true, env = "BROCHURE_RAG_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Index location (defaults to <data-dir>/index)
    #[arg(long, global = true, env = "BROCHURE_RAG_INDEX_DIR")]
    pub index_dir: Option<PathBuf>,

    /// Embedding model: Hugging Face id, local model path, or hash[:DIM]
    #[arg(
        long,
        global = true,
        env = "BROCHURE_RAG_MODEL",
        default_value = DEFAULT_MODEL_ID
    )]
    pub model: String,

    /// Chunk size in characters
    #[arg(
        long,
        global = true,
        env = "BROCHURE_RAG_CHUNK_SIZE",
        default_value_t = DEFAULT_CHUNK_SIZE
    )]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[arg(
        long,
        global = true,
        env = "BROCHURE_RAG_CHUNK_OVERLAP",
        default_value_t = DEFAULT_CHUNK_OVERLAP
    )]
    pub chunk_overlap: usize,

    /// Number of passages to retrieve
    #[arg(
        short = 'k',
        long,
        global = true,
        env = "BROCHURE_RAG_TOP_K",
        default_value_t = DEFAULT_TOP_K
    )]
    pub top_k: usize,

    /// Texts per embedding batch while indexing
    #[arg(
        long,
        global = true,
        env = "BROCHURE_RAG_BATCH_SIZE",
        default_value_t = DEFAULT_BATCH_SIZE
    )]
    pub batch_size: usize,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Pipeline settings, with the index placed under `data_dir` unless
    /// an explicit location was given.
    pub fn settings(&self, data_dir: &DataDir) -> Settings {
        Settings {
            model_id: self.model.clone(),
            index_dir: self
                .index_dir
                .clone()
                .unwrap_or_else(|| data_dir.index_dir()),
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            top_k: self.top_k,
            batch_size: self.batch_size,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rebuild the index from documents (replaces any existing index)
    Index(IndexArgs),
    /// Retrieve the passages most relevant to a question
    Query(QueryArgs),
    /// Show what the index contains
    Status(StatusArgs),
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// PDF, text or markdown files, or directories to scan
    #[arg(required_unless_present = "report")]
    pub paths: Vec<PathBuf>,

    /// Also ingest the files listed in a downloader report CSV
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Output the per-document report as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Query --

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// The question to answer
    pub query: String,

    /// Output results as JSON
    #[arg(long, conflicts_with = "prompt")]
    pub json: bool,

    /// Print a grounded prompt for a language model instead of the hits
    #[arg(long)]
    pub prompt: bool,

    /// Drop hits scoring below this cosine similarity
    #[arg(long)]
    pub min_score: Option<f32>,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "brochure-rag",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_query_defaults() {
        let cli = Cli::parse_from(["brochure-rag", "query", "sea view?"]);
        assert_eq!(cli.top_k, 5);
        assert_eq!(cli.chunk_size, 1000);
        assert_eq!(cli.chunk_overlap, 200);
        match cli.command {
            Command::Query(args) => {
                assert_eq!(args.query, "sea view?");
                assert!(!args.json);
                assert!(!args.prompt);
                assert!(args.min_score.is_none());
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "brochure-rag",
            "index",
            "brochures/",
            "--model",
            "hash",
            "-k",
            "3",
        ]);
        assert_eq!(cli.model, "hash");
        assert_eq!(cli.top_k, 3);
        match cli.command {
            Command::Index(args) => {
                assert_eq!(args.paths, vec![PathBuf::from("brochures/")]);
                assert!(args.report.is_none());
            }
            _ => panic!("expected index command"),
        }
    }

    #[test]
    fn index_needs_paths_or_report() {
        assert!(Cli::try_parse_from(["brochure-rag", "index"]).is_err());
        assert!(
            Cli::try_parse_from([
                "brochure-rag",
                "index",
                "--report",
                "download_report.csv"
            ])
            .is_ok()
        );
    }

    #[test]
    fn settings_default_index_under_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = DataDir::resolve(Some(tmp.path())).unwrap();
        let cli = Cli::parse_from(["brochure-rag", "status"]);
        let settings = cli.settings(&data_dir);
        assert_eq!(settings.index_dir, tmp.path().join("index"));
        assert_eq!(settings.top_k, 5);
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
