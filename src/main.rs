use std::{path::PathBuf, process::ExitCode};

use brochure_rag::{
    DataDir,
    Error,
    IndexStore,
    RagContext,
    Result,
    SimilarityIndex,
    cli::{Cli, Command, IndexArgs, QueryArgs},
    ingestion::{DocumentStatus, IngestReport},
    manifest,
    mcp,
    prompt,
    walker,
};
use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("BROCHURE_RAG_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_recoverable() => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let settings = cli.settings(&data_dir);
    settings.validate()?;

    match &cli.command {
        Command::Index(args) => {
            let context = RagContext::new(settings)?;
            cmd_index(&context, args)?;
        }
        Command::Query(args) => {
            let store = IndexStore::new(settings.index_dir.clone());
            // Fail before loading a model when there is nothing to search.
            if !store.exists() {
                return Err(Error::IndexUnavailable(settings.index_dir));
            }
            let context = RagContext::new(settings)?;
            cmd_query(&context, args)?;
        }
        Command::Status(args) => {
            let store = IndexStore::new(&settings.index_dir);
            cmd_status(&data_dir, &store, &cli.model, args.json)?;
        }
        Command::Mcp => {
            mcp::run_mcp(RagContext::new(settings)?)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn cmd_index(context: &RagContext, args: &IndexArgs) -> Result<()> {
    let mut documents = walker::collect_documents(&args.paths)?;

    if let Some(report) = &args.report {
        let entries = manifest::read_report(report)?;
        let mut listed = 0;
        for entry in &entries {
            match entry.ingestible_path() {
                Some(path) => {
                    listed += 1;
                    documents.push(path.to_path_buf());
                }
                None => info!(
                    id = %entry.id,
                    status = ?entry.status,
                    "download not ingested"
                ),
            }
        }
        info!(
            report = %report.display(),
            rows = entries.len(),
            listed,
            "read download report"
        );
        let mut seen = std::collections::HashSet::new();
        documents.retain(|path| seen.insert(path.clone()));
    }

    if documents.is_empty() {
        return Err(Error::EmptyInput);
    }

    let report = context.ingest(&documents)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_ingest_report(&report);
    }
    Ok(())
}

fn print_ingest_report(report: &IngestReport) {
    for doc in &report.documents {
        match &doc.status {
            DocumentStatus::Indexed { pages, chunks } => println!(
                "indexed  {} ({pages} pages, {chunks} chunks)",
                doc.source_file
            ),
            DocumentStatus::Empty { pages } => println!(
                "empty    {} ({pages} pages, no text)",
                doc.source_file
            ),
            DocumentStatus::Failed { error } => {
                println!("failed   {}: {error}", doc.path.display())
            }
        }
    }
    println!(
        "Indexed {} of {} documents into {} chunks at {} ({}, {} dimensions)",
        report.indexed_documents(),
        report.documents.len(),
        report.chunks,
        report.index_dir.display(),
        report.model_id,
        report.dimension
    );
}

fn cmd_query(context: &RagContext, args: &QueryArgs) -> Result<()> {
    let mut hits = context.retrieve(&args.query, context.settings().top_k)?;
    if let Some(min_score) = args.min_score {
        hits.retain(|hit| hit.score >= min_score);
    }

    if args.json {
        let output = json!({ "query": args.query, "results": hits });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if hits.is_empty() {
        println!("No relevant content found.");
    } else if args.prompt {
        println!("{}", prompt::build_prompt(&args.query, &hits));
    } else {
        for hit in &hits {
            println!(
                "{}. {} (page {})  score: {:.4}",
                hit.rank, hit.chunk.source_file, hit.chunk.page, hit.score
            );
            println!("   {}", prompt::preview(&hit.chunk.text));
        }
    }
    Ok(())
}

fn cmd_status(
    data_dir: &DataDir,
    store: &IndexStore,
    configured_model: &str,
    json: bool,
) -> Result<()> {
    let location: PathBuf = store.location().to_path_buf();
    let Some(index) = store.load()? else {
        if json {
            println!(
                "{}",
                json!({
                    "data_dir": data_dir.root(),
                    "index_dir": location,
                    "exists": false,
                })
            );
        } else {
            println!("No index at {}.", location.display());
            println!("Run `brochure-rag index <PATH>...` to build one.");
        }
        return Ok(());
    };

    if json {
        let output = json!({
            "data_dir": data_dir.root(),
            "index_dir": location,
            "exists": true,
            "model": index.model_id(),
            "configured_model": configured_model,
            "dimension": index.dimension(),
            "chunks": index.len(),
            "documents": index.document_count(),
        });
        println!("{output}");
    } else {
        println!(
            "Data dir: {} (from {})",
            data_dir.root().display(),
            data_dir.source()
        );
        println!("Index: {}", location.display());
        println!("Model: {}", index.model_id());
        if index.model_id() != configured_model {
            println!(
                "  (configured model is {configured_model}; \
                 rebuild before querying)"
            );
        }
        println!("Dimension: {}", index.dimension());
        println!("Documents: {}", index.document_count());
        println!("Chunks: {}", index.len());
    }
    Ok(())
}
