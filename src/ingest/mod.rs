//! # Document ingestion
//!
//! Turns uploaded documents into a searchable in-memory knowledge base.
//!
//! - [`document`]: what an upload is and how text comes out of it.
//! - [`chunk`]: fixed-window splitting with overlap.
//! - [`embed`]: the embedding backends.
//! - [`index`]: the HNSW vector index.
//! - [`pipeline`]: the extract, chunk, embed-and-index run and its states.
//! - [`session`]: [`DocumentSession`], which owns the corpus, the active index and
//!   the lookup transcript.
//!
//! ## Example
//! ```no_run
//! use docchat::config::DocChatConfig;
//! use docchat::ingest::{
//!     ChunkParams, Document, DocumentSession, IngestionPipeline, StandardExtractor,
//!     create_embedder,
//! };
//! use docchat::surface::TerminalSurface;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DocChatConfig::default();
//! let pipeline = IngestionPipeline::new(
//!     Box::new(StandardExtractor),
//!     create_embedder(&config, "sk-...")?,
//!     ChunkParams::try_from(&config.chunking)?,
//!     config.embedding.batch_size,
//! );
//! let mut docs = DocumentSession::new(pipeline);
//! docs.add_document(Document::from_path("paper.pdf")?);
//!
//! let mut surface = TerminalSurface::new();
//! docs.build_knowledge_base(&mut surface).await?;
//! for hit in docs.search("What is the main result?", 3).await? {
//!     println!("{:.3} {}", hit.distance, hit.chunk.text);
//! }
//! # Ok(()) }
//! ```

pub mod chunk;
pub mod document;
pub mod embed;
pub mod index;
pub mod pipeline;
pub mod session;

pub use chunk::{Chunk, ChunkParams, split_text};
pub use document::{Document, DocumentKind, Extractor, StandardExtractor};
pub use embed::{Embedder, LocalEmbedder, OpenAiEmbedder, create_embedder};
pub use index::{SearchHit, VectorIndex};
pub use pipeline::{IngestOutcome, IngestState, IngestionPipeline};
pub use session::DocumentSession;
