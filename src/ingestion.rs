use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    chunking::{Chunk, ChunkingConfig, chunk_pages},
    embedding::{Embedder, embed_batched},
    error::{Error, Result},
    extract::TextExtractor,
    index_store::IndexStore,
    vector_index::{FlatIndex, SimilarityIndex},
};

/// What happened to one input document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentStatus {
    Indexed { pages: usize, chunks: usize },
    /// Extracted fine but no page had any text.
    Empty { pages: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentReport {
    pub path: PathBuf,
    pub source_file: String,
    #[serde(flatten)]
    pub status: DocumentStatus,
}

/// Outcome of a full rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub documents: Vec<DocumentReport>,
    pub chunks: usize,
    pub model_id: String,
    pub dimension: usize,
    pub index_dir: PathBuf,
}

impl IngestReport {
    pub fn indexed_documents(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| matches!(d.status, DocumentStatus::Indexed { .. }))
            .count()
    }

    pub fn failed_documents(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| matches!(d.status, DocumentStatus::Failed { .. }))
            .count()
    }
}

/// File name used as chunk provenance.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Extract and chunk every document in parallel.
///
/// A document that cannot be extracted is reported and skipped; it never
/// aborts the batch. Chunks come back in document order, then page order.
pub fn extract_chunks(
    extractor: &dyn TextExtractor,
    documents: &[PathBuf],
    config: ChunkingConfig,
) -> Result<(Vec<DocumentReport>, Vec<Chunk>)> {
    let per_document = extract_documents(extractor, documents, config)?;

    let mut reports = Vec::with_capacity(per_document.len());
    let mut chunks = Vec::new();
    for (report, document_chunks) in per_document {
        reports.push(report);
        chunks.extend(document_chunks);
    }
    Ok((reports, chunks))
}

fn extract_documents(
    extractor: &dyn TextExtractor,
    documents: &[PathBuf],
    config: ChunkingConfig,
) -> Result<Vec<(DocumentReport, Vec<Chunk>)>> {
    config.validate()?;

    let per_document: Vec<(DocumentReport, Vec<Chunk>)> = documents
        .par_iter()
        .map(|path| {
            let source_file = source_name(path);
            let (status, chunks) =
                match extract_document(extractor, path, &source_file, config) {
                    Ok((pages, chunks)) if chunks.is_empty() => {
                        warn!(path = %path.display(), "no extractable text");
                        (DocumentStatus::Empty { pages }, chunks)
                    }
                    Ok((pages, chunks)) => {
                        debug!(
                            path = %path.display(),
                            pages,
                            chunks = chunks.len(),
                            "extracted"
                        );
                        let status = DocumentStatus::Indexed {
                            pages,
                            chunks: chunks.len(),
                        };
                        (status, chunks)
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping");
                        let status = DocumentStatus::Failed {
                            error: e.to_string(),
                        };
                        (status, Vec::new())
                    }
                };
            let report = DocumentReport {
                path: path.clone(),
                source_file,
                status,
            };
            (report, chunks)
        })
        .collect();
    Ok(per_document)
}

/// Embed one document's chunks. On failure the document is marked failed
/// and contributes nothing.
fn embed_document(
    report: &mut DocumentReport,
    chunks: Vec<Chunk>,
    embedder: &dyn Embedder,
    batch_size: usize,
) -> (Vec<Chunk>, Vec<Vec<f32>>) {
    if chunks.is_empty() {
        return (chunks, Vec::new());
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    match embed_batched(embedder, &texts, batch_size) {
        Ok(vectors) => (chunks, vectors),
        Err(e) => {
            warn!(
                path = %report.path.display(),
                error = %e,
                "embedding failed, skipping"
            );
            report.status = DocumentStatus::Failed {
                error: e.to_string(),
            };
            (Vec::new(), Vec::new())
        }
    }
}

fn extract_document(
    extractor: &dyn TextExtractor,
    path: &Path,
    source_file: &str,
    config: ChunkingConfig,
) -> Result<(usize, Vec<Chunk>)> {
    if !path.is_file() {
        return Err(Error::Extraction {
            path: path.to_path_buf(),
            reason: "file not found".to_string(),
        });
    }
    let pages = extractor.extract_pages(path)?;
    let chunks = chunk_pages(&pages, source_file, config)?;
    Ok((pages.len(), chunks))
}

/// Rebuild the index at `store` from `documents`.
///
/// Replaces any previous index. A document that fails to extract or embed
/// is recorded as failed and left out. Fails with [`Error::EmptyInput`]
/// when no document contributed a chunk, leaving the previous index
/// untouched.
pub fn ingest_documents(
    documents: &[PathBuf],
    extractor: &dyn TextExtractor,
    embedder: &dyn Embedder,
    store: &IndexStore,
    config: ChunkingConfig,
    batch_size: usize,
) -> Result<IngestReport> {
    let per_document = extract_documents(extractor, documents, config)?;

    let embedded: Vec<(DocumentReport, Vec<Chunk>, Vec<Vec<f32>>)> =
        per_document
            .into_par_iter()
            .map(|(mut report, chunks)| {
                let (chunks, vectors) =
                    embed_document(&mut report, chunks, embedder, batch_size);
                (report, chunks, vectors)
            })
            .collect();

    let mut reports = Vec::with_capacity(embedded.len());
    let mut chunks = Vec::new();
    let mut vectors = Vec::new();
    for (report, document_chunks, document_vectors) in embedded {
        reports.push(report);
        chunks.extend(document_chunks);
        vectors.extend(document_vectors);
    }
    if chunks.is_empty() {
        return Err(Error::EmptyInput);
    }

    let index = FlatIndex::from_embedded(chunks, vectors, embedder)?;
    store.persist(&index)?;

    let report = IngestReport {
        documents: reports,
        chunks: index.len(),
        model_id: index.model_id().to_string(),
        dimension: index.dimension(),
        index_dir: store.location().to_path_buf(),
    };
    info!(
        indexed = report.indexed_documents(),
        failed = report.failed_documents(),
        chunks = report.chunks,
        "ingestion finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{embedding::HashEmbedder, extract::ExtractorRegistry};

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reports_each_document_and_keeps_order() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = vec![
            write(tmp.path(), "b.txt", "second\x0cpage two"),
            write(tmp.path(), "blank.txt", "   \x0c\n"),
            write(tmp.path(), "broken.pdf", "not a pdf"),
            write(tmp.path(), "a.txt", "first"),
        ];

        let (reports, chunks) = extract_chunks(
            &ExtractorRegistry::new(),
            &docs,
            ChunkingConfig::default(),
        )
        .unwrap();

        assert_eq!(
            reports[0].status,
            DocumentStatus::Indexed {
                pages: 2,
                chunks: 2
            }
        );
        assert_eq!(reports[1].status, DocumentStatus::Empty { pages: 2 });
        assert!(matches!(reports[2].status, DocumentStatus::Failed { .. }));
        assert_eq!(reports[3].source_file, "a.txt");

        let provenance: Vec<(&str, u32)> = chunks
            .iter()
            .map(|c| (c.source_file.as_str(), c.page))
            .collect();
        assert_eq!(provenance, vec![("b.txt", 1), ("b.txt", 2), ("a.txt", 1)]);
    }

    #[test]
    fn missing_file_is_a_failed_document() {
        let tmp = tempfile::tempdir().unwrap();
        let (reports, chunks) = extract_chunks(
            &ExtractorRegistry::new(),
            &[tmp.path().join("gone.pdf")],
            ChunkingConfig::default(),
        )
        .unwrap();
        assert!(chunks.is_empty());
        match &reports[0].status {
            DocumentStatus::Failed { error } => {
                assert!(error.contains("file not found"))
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn ingest_builds_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = vec![
            write(tmp.path(), "a.txt", "alpha beta"),
            write(tmp.path(), "b.txt", "gamma delta"),
        ];
        let store = IndexStore::new(tmp.path().join("index"));
        let embedder = HashEmbedder::new(384).unwrap();

        let report = ingest_documents(
            &docs,
            &ExtractorRegistry::new(),
            &embedder,
            &store,
            ChunkingConfig::default(),
            1,
        )
        .unwrap();

        assert_eq!(report.chunks, 2);
        assert_eq!(report.indexed_documents(), 2);
        assert_eq!(report.model_id, "hash");
        assert_eq!(store.load().unwrap().unwrap().len(), 2);
    }

    #[test]
    fn ingest_without_text_is_empty_input_and_keeps_old_index() {
        let tmp = tempfile::tempdir().unwrap();
        let store = IndexStore::new(tmp.path().join("index"));
        let embedder = HashEmbedder::new(384).unwrap();
        let registry = ExtractorRegistry::new();
        let good = write(tmp.path(), "good.txt", "villa");
        ingest_documents(
            &[good],
            &registry,
            &embedder,
            &store,
            ChunkingConfig::default(),
            4,
        )
        .unwrap();

        let blank = write(tmp.path(), "blank.txt", " ");
        let err = ingest_documents(
            &[blank],
            &registry,
            &embedder,
            &store,
            ChunkingConfig::default(),
            4,
        )
        .unwrap_err();

        assert!(matches!(err, Error::EmptyInput));
        assert_eq!(store.load().unwrap().unwrap().len(), 1);
    }

    /// Hash embedder that refuses any batch mentioning "flooded".
    struct FloodedEmbedder(HashEmbedder);

    impl Embedder for FloodedEmbedder {
        fn model_id(&self) -> &str {
            self.0.model_id()
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("flooded")) {
                return Err(Error::Embedding("basement flooded".into()));
            }
            self.0.embed(texts)
        }
    }

    #[test]
    fn embedding_failure_skips_only_that_document() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = vec![
            write(tmp.path(), "good.txt", "alpha beta\x0cgamma"),
            write(tmp.path(), "bad.txt", "dry lobby\x0cflooded garage"),
            write(tmp.path(), "also_good.txt", "delta"),
        ];
        let store = IndexStore::new(tmp.path().join("index"));
        let embedder = FloodedEmbedder(HashEmbedder::new(384).unwrap());

        let report = ingest_documents(
            &docs,
            &ExtractorRegistry::new(),
            &embedder,
            &store,
            ChunkingConfig::default(),
            1,
        )
        .unwrap();

        assert_eq!(
            report.documents[0].status,
            DocumentStatus::Indexed {
                pages: 2,
                chunks: 2
            }
        );
        match &report.documents[1].status {
            DocumentStatus::Failed { error } => {
                assert!(error.contains("basement flooded"), "{error}")
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(report.failed_documents(), 1);
        assert_eq!(report.indexed_documents(), 2);
        assert_eq!(report.chunks, 3);

        let index = store.load().unwrap().unwrap();
        let sources: Vec<&str> = index
            .chunks()
            .iter()
            .map(|c| c.source_file.as_str())
            .collect();
        assert_eq!(sources, vec!["good.txt", "good.txt", "also_good.txt"]);
    }

    #[test]
    fn every_document_failing_to_embed_is_empty_input() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = vec![write(tmp.path(), "bad.txt", "flooded")];
        let store = IndexStore::new(tmp.path().join("index"));
        let embedder = FloodedEmbedder(HashEmbedder::new(384).unwrap());

        let err = ingest_documents(
            &docs,
            &ExtractorRegistry::new(),
            &embedder,
            &store,
            ChunkingConfig::default(),
            4,
        )
        .unwrap_err();

        assert!(matches!(err, Error::EmptyInput));
        assert!(!store.exists());
    }

    #[test]
    fn document_status_serializes_with_tag() {
        let report = DocumentReport {
            path: PathBuf::from("/b/a.pdf"),
            source_file: "a.pdf".into(),
            status: DocumentStatus::Indexed {
                pages: 3,
                chunks: 7,
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "indexed");
        assert_eq!(json["chunks"], 7);
        assert_eq!(json["source_file"], "a.pdf");
    }
}
