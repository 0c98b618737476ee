//! # Ingestion pipeline
//!
//! One run takes the whole corpus through three strictly sequential stages:
//!
//! ```text
//!   Idle ─▶ Extracting ─▶ Chunking ─▶ Embedding ─▶ Ready
//!              │             │            │
//!              └─────────────┴────────────┴──▶ Failed ─▶ Idle
//! ```
//!
//! The index is assembled off to the side and handed back only when it is complete,
//! so callers can keep serving the previous index until a run succeeds.

use tracing::{debug, error, info, warn};

use crate::error::{EmbedError, IngestError};
use crate::ingest::chunk::{Chunk, ChunkParams, split_text};
use crate::ingest::document::{Document, Extractor};
use crate::ingest::embed::Embedder;
use crate::ingest::index::VectorIndex;
use crate::surface::Surface;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Idle,
    Extracting,
    Chunking,
    Embedding,
    Ready,
    Failed,
}

/// Result of a run that did not fail.
#[derive(Debug)]
pub enum IngestOutcome {
    /// A complete index, one entry per chunk.
    Indexed(VectorIndex),
    /// Chunking produced nothing to index.
    NoChunks,
}

/// Extract, chunk, embed and index a corpus.
pub struct IngestionPipeline {
    extractor: Box<dyn Extractor>,
    embedder: Box<dyn Embedder>,
    params: ChunkParams,
    batch_size: usize,
    state: IngestState,
    trace: Vec<IngestState>,
}

impl IngestionPipeline {
    /// `batch_size` is clamped to at least 1.
    pub fn new(
        extractor: Box<dyn Extractor>,
        embedder: Box<dyn Embedder>,
        params: ChunkParams,
        batch_size: usize,
    ) -> Self {
        Self {
            extractor,
            embedder,
            params,
            batch_size: batch_size.max(1),
            state: IngestState::Idle,
            trace: vec![IngestState::Idle],
        }
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    /// States visited by the most recent run, starting with `Idle`.
    pub fn trace(&self) -> &[IngestState] {
        &self.trace
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    fn transition(&mut self, next: IngestState) {
        debug!("Ingestion {:?} -> {:?}", self.state, next);
        self.state = next;
        self.trace.push(next);
    }

    /// Run all stages over `corpus`.
    ///
    /// Errors are reported on `surface` before they are returned, and leave the
    /// pipeline `Idle`.
    ///
    /// # Errors
    /// - [`IngestError::EmptyCorpus`] when nothing was uploaded.
    /// - [`IngestError::NoExtractableText`] when every document came out blank.
    /// - [`IngestError::Embedding`] or [`IngestError::Index`] from the last stage.
    pub async fn run(
        &mut self,
        corpus: &[Document],
        surface: &mut dyn Surface,
    ) -> Result<IngestOutcome, IngestError> {
        self.state = IngestState::Idle;
        self.trace = vec![IngestState::Idle];

        match self.run_stages(corpus, surface).await {
            Ok(outcome) => {
                self.transition(IngestState::Ready);
                Ok(outcome)
            }
            Err(e) => {
                error!("Ingestion failed: {}", e);
                self.transition(IngestState::Failed);
                surface.error(&e.to_string());
                self.transition(IngestState::Idle);
                Err(e)
            }
        }
    }

    async fn run_stages(
        &mut self,
        corpus: &[Document],
        surface: &mut dyn Surface,
    ) -> Result<IngestOutcome, IngestError> {
        if corpus.is_empty() {
            return Err(IngestError::EmptyCorpus);
        }

        self.transition(IngestState::Extracting);
        surface.status(&format!("Extracting text from {} document(s)", corpus.len()));
        let text = self.extract_corpus(corpus, surface);
        if text.trim().is_empty() {
            return Err(IngestError::NoExtractableText);
        }

        self.transition(IngestState::Chunking);
        let chunks = split_text(&text, self.params);
        surface.status(&format!(
            "Split {} characters into {} chunk(s)",
            text.chars().count(),
            chunks.len()
        ));

        self.transition(IngestState::Embedding);
        if chunks.is_empty() {
            warn!("No chunks to index");
            surface.warning("the documents produced no chunks; nothing was indexed");
            return Ok(IngestOutcome::NoChunks);
        }

        let vectors = self.embed_chunks(&chunks, surface).await?;
        let index = VectorIndex::build(chunks, vectors)?;
        info!("Indexed {} chunks with {}", index.len(), self.embedder.model_name());
        Ok(IngestOutcome::Indexed(index))
    }

    /// Concatenate every unit of every document. Unreadable documents contribute nothing.
    fn extract_corpus(&self, corpus: &[Document], surface: &mut dyn Surface) -> String {
        let mut text = String::new();
        for document in corpus {
            match self.extractor.extract_units(document) {
                Ok(units) => {
                    debug!("{}: {} unit(s)", document.name(), units.len());
                    units.iter().for_each(|unit| text.push_str(unit));
                }
                Err(e) => {
                    warn!("Skipping {}: {}", document.name(), e);
                    surface.warning(&format!("could not read {}: {}", document.name(), e));
                }
            }
        }
        text
    }

    async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        surface: &mut dyn Surface,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());

        surface.progress("Embedding", 0, texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = self.embedder.embed(batch).await?;
            if embedded.len() != batch.len() {
                return Err(EmbedError::CountMismatch {
                    expected: batch.len(),
                    got: embedded.len(),
                });
            }
            vectors.extend(embedded);
            surface.progress("Embedding", vectors.len(), texts.len());
        }
        Ok(vectors)
    }
}
