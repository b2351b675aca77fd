use std::path::PathBuf;

use crate::{
    config::Settings,
    embedding::{self, Embedder},
    error::{Error, Result},
    extract::ExtractorRegistry,
    index_store::IndexStore,
    ingestion::{self, IngestReport},
    retriever::Retriever,
    vector_index::{FlatIndex, Hit},
};

/// The pipeline for one configured index location.
///
/// Built once per process and shared by every command or request; it owns
/// the embedder so a model is loaded only once.
pub struct RagContext {
    settings: Settings,
    embedder: Box<dyn Embedder>,
    store: IndexStore,
    extractor: ExtractorRegistry,
}

impl RagContext {
    /// Validate `settings` and load the embedder they name.
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let embedder = embedding::from_model_id(&settings.model_id)?;
        Self::with_embedder(settings, embedder)
    }

    /// Use an already constructed embedder instead of resolving
    /// `settings.model_id`.
    pub fn with_embedder(
        settings: Settings,
        embedder: Box<dyn Embedder>,
    ) -> Result<Self> {
        settings.validate()?;
        let store = IndexStore::new(settings.index_dir.clone());
        Ok(Self {
            settings,
            embedder,
            store,
            extractor: ExtractorRegistry::new(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Rebuild the index from `documents`.
    pub fn ingest(&self, documents: &[PathBuf]) -> Result<IngestReport> {
        ingestion::ingest_documents(
            documents,
            &self.extractor,
            self.embedder.as_ref(),
            &self.store,
            self.settings.chunking(),
            self.settings.batch_size,
        )
    }

    /// The persisted index, or [`Error::IndexUnavailable`] if none exists.
    pub fn load_index(&self) -> Result<FlatIndex> {
        self.store.load()?.ok_or_else(|| {
            Error::IndexUnavailable(self.store.location().to_path_buf())
        })
    }

    /// Retrieve the `top_k` chunks most relevant to `query`.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Hit>> {
        if top_k == 0 {
            return Err(Error::InvalidArgument(
                "top_k must be at least 1".to_string(),
            ));
        }
        let index = self.load_index()?;
        Retriever::new(self.embedder.as_ref(), &index)?.retrieve(query, top_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(index_dir: PathBuf) -> Settings {
        Settings {
            model_id: "hash".into(),
            index_dir,
            ..Settings::default()
        }
    }

    #[test]
    fn retrieve_without_index_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = RagContext::new(settings(tmp.path().join("index"))).unwrap();

        let err = ctx.retrieve("pool", 3).unwrap_err();
        assert!(matches!(err, Error::IndexUnavailable(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn ingest_then_retrieve() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = tmp.path().join("tower.txt");
        std::fs::write(&doc, "rooftop pool\x0cunderground parking").unwrap();

        let ctx = RagContext::new(settings(tmp.path().join("index"))).unwrap();
        ctx.ingest(std::slice::from_ref(&doc)).unwrap();

        let hits = ctx.retrieve("parking", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.page, 2);
        assert_eq!(hits[0].chunk.source_file, "tower.txt");
    }

    #[test]
    fn index_from_other_model_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = tmp.path().join("a.txt");
        std::fs::write(&doc, "villa").unwrap();
        let index_dir = tmp.path().join("index");

        let small = Settings {
            model_id: "hash:32".into(),
            ..settings(index_dir.clone())
        };
        RagContext::new(small)
            .unwrap()
            .ingest(std::slice::from_ref(&doc))
            .unwrap();

        let ctx = RagContext::new(settings(index_dir)).unwrap();
        assert!(matches!(
            ctx.retrieve("villa", 1),
            Err(Error::DimensionMismatch {
                expected: 32,
                actual: 384
            })
        ));
    }
}
