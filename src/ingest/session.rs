//! The document session: staged uploads, the active index and the lookup transcript.

use tracing::{info, warn};

use crate::error::{EmbedError, IngestError, SearchError};
use crate::ingest::document::Document;
use crate::ingest::index::{SearchHit, VectorIndex};
use crate::ingest::pipeline::{IngestOutcome, IngestionPipeline};
use crate::surface::Surface;
use crate::transcript::{Transcript, Turn};

const PREVIEW_CHARS: usize = 160;

/// State of one document question-answering session.
///
/// The active index is only replaced by a run that completes. A failed run, or
/// one that yields no chunks, leaves the previous index and transcript as they were.
pub struct DocumentSession {
    pipeline: IngestionPipeline,
    corpus: Vec<Document>,
    index: Option<VectorIndex>,
    transcript: Transcript,
}

impl DocumentSession {
    pub fn new(pipeline: IngestionPipeline) -> Self {
        Self {
            pipeline,
            corpus: Vec::new(),
            index: None,
            transcript: Transcript::new(),
        }
    }

    pub fn add_document(&mut self, document: Document) {
        info!("Staged {}", document.name());
        self.corpus.push(document);
    }

    pub fn documents(&self) -> &[Document] {
        &self.corpus
    }

    pub fn clear_documents(&mut self) {
        self.corpus.clear();
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.pipeline
    }

    /// Build a knowledge base from the staged documents.
    ///
    /// On success the new index replaces the old one, the transcript is emptied and
    /// the number of indexed chunks is returned. `Ok(None)` means there was nothing
    /// to index and the previous index is still active.
    ///
    /// # Errors
    /// Whatever stopped the run; it has already been reported on `surface`.
    pub async fn build_knowledge_base(
        &mut self,
        surface: &mut dyn Surface,
    ) -> Result<Option<usize>, IngestError> {
        match self.pipeline.run(&self.corpus, surface).await? {
            IngestOutcome::Indexed(index) => {
                let count = index.len();
                self.index = Some(index);
                self.transcript.clear();
                surface.status(&format!("Knowledge base ready: {count} chunk(s) indexed"));
                Ok(Some(count))
            }
            IngestOutcome::NoChunks => {
                warn!("Keeping the previous index");
                Ok(None)
            }
        }
    }

    /// The `top_k` chunks closest to `query`.
    ///
    /// The query and a summary of the hits are appended to the transcript.
    ///
    /// # Errors
    /// - [`SearchError::NoIndex`] before the first successful build.
    /// - The query could not be embedded.
    pub async fn search(
        &mut self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit<'_>>, SearchError> {
        let Some(index) = self.index.as_ref() else {
            return Err(SearchError::NoIndex);
        };

        let mut vectors = self
            .pipeline
            .embedder()
            .embed(&[query.to_string()])
            .await?;
        let Some(query_vector) = vectors.pop() else {
            return Err(SearchError::Embedding(EmbedError::CountMismatch {
                expected: 1,
                got: 0,
            }));
        };

        let hits = index.search(&query_vector, top_k)?;
        self.transcript.push(Turn::user(query));
        self.transcript.push(Turn::assistant(summarize(&hits)));
        Ok(hits)
    }
}

fn summarize(hits: &[SearchHit<'_>]) -> String {
    if hits.is_empty() {
        return "No matching passages.".to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(rank, hit)| {
            let preview: String = hit.chunk.text.chars().take(PREVIEW_CHARS).collect();
            let ellipsis = if hit.chunk.text.chars().count() > PREVIEW_CHARS { "..." } else { "" };
            format!(
                "{}. chunk {} (distance {:.3}): {}{}",
                rank + 1,
                hit.chunk.index,
                hit.distance,
                preview.trim(),
                ellipsis
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::chunk::ChunkParams;
    use crate::ingest::document::{DocumentKind, StandardExtractor};
    use crate::testing::{FixedEmbedder, RecordingSurface, setup};
    use crate::transcript::Role;

    fn session(embedder: FixedEmbedder) -> DocumentSession {
        DocumentSession::new(IngestionPipeline::new(
            Box::new(StandardExtractor),
            Box::new(embedder),
            ChunkParams::new(20, 4).unwrap(),
            8,
        ))
    }

    fn text_doc(name: &str, text: &str) -> Document {
        Document::new(name, DocumentKind::PlainText, text.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_build_reports_count_and_clears_transcript() {
        setup();
        let mut docs = session(FixedEmbedder::new());
        let mut surface = RecordingSurface::default();
        docs.add_document(text_doc("a.txt", "the quick brown fox jumps over the lazy dog"));

        assert_eq!(docs.build_knowledge_base(&mut surface).await.unwrap(), Some(3));
        docs.search("quick", 1).await.unwrap();
        assert_eq!(docs.transcript().len(), 2);

        let count = docs.build_knowledge_base(&mut surface).await.unwrap();
        assert_eq!(count, Some(3));
        assert_eq!(docs.index().unwrap().len(), 3);
        assert!(docs.transcript().is_empty());
        assert!(surface.statuses.iter().any(|s| s.contains("3 chunk(s) indexed")));
    }

    #[tokio::test]
    async fn test_blank_document_creates_no_index() {
        setup();
        let mut docs = session(FixedEmbedder::new());
        let mut surface = RecordingSurface::default();
        docs.add_document(text_doc("empty.txt", ""));

        let err = docs.build_knowledge_base(&mut surface).await.unwrap_err();
        assert!(matches!(err, IngestError::NoExtractableText));
        assert!(docs.index().is_none());
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_index() {
        setup();
        let mut docs = session(FixedEmbedder::new());
        let mut surface = RecordingSurface::default();
        docs.add_document(text_doc("a.txt", "first corpus"));
        docs.build_knowledge_base(&mut surface).await.unwrap();
        docs.search("first", 1).await.unwrap();

        docs.clear_documents();
        docs.add_document(text_doc("b.txt", "   \n\t "));
        assert!(docs.build_knowledge_base(&mut surface).await.is_err());

        let index = docs.index().unwrap();
        assert_eq!(index.chunks()[0].text, "first corpus");
        assert_eq!(docs.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_embedding_failure_keeps_previous_index_and_transcript() {
        setup();
        let mut docs = session(FixedEmbedder::new());
        let mut surface = RecordingSurface::default();
        docs.add_document(text_doc("a.txt", "first corpus"));
        docs.build_knowledge_base(&mut surface).await.unwrap();
        docs.search("first", 1).await.unwrap();

        let mut failing = session(FixedEmbedder::failing());
        failing.index = docs.index.take();
        failing.transcript = docs.transcript.clone();
        failing.add_document(text_doc("b.txt", "second corpus"));

        let err = failing.build_knowledge_base(&mut surface).await.unwrap_err();
        assert!(matches!(err, IngestError::Embedding(_)));
        assert_eq!(failing.index().unwrap().chunks()[0].text, "first corpus");
        assert_eq!(failing.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_search_returns_nearest_chunk_and_records_turns() {
        setup();
        let mut docs = session(FixedEmbedder::new());
        let mut surface = RecordingSurface::default();
        docs.add_document(text_doc("a.txt", "aaaaaaaaaaaaaaaaaaaazzzzzzzzzzzzzzzzzzzz"));
        docs.build_knowledge_base(&mut surface).await.unwrap();

        let hits = docs.search("zzzzzzzzzzzzzzzzzzzz", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].chunk.text.chars().all(|c| c == 'z'));

        let turns = docs.transcript().turns();
        assert_eq!(turns[0], Turn::user("zzzzzzzzzzzzzzzzzzzz"));
        assert_eq!(turns[1].role(), Role::Assistant);
        assert!(turns[1].content().contains("chunk"));
    }

    #[tokio::test]
    async fn test_search_before_build_fails() {
        setup();
        let mut docs = session(FixedEmbedder::new());
        assert!(matches!(docs.search("anything", 3).await, Err(SearchError::NoIndex)));
    }
}
