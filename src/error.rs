//! # Errors
//!
//! Typed failures for the two sessions. Each enum maps to one way things
//! can go wrong, and each has a different blast radius:
//!
//! | Error | Raised by | Consequence |
//! |-------|-----------|-------------|
//! | [`StartupError`] | [`crate::config`] | fatal, the binary exits before any interaction |
//! | [`SessionError`] | [`crate::chat::ChatSession`] | chat is disabled for the rest of the process |
//! | [`ResponderError`] | [`crate::responder`] | recovered per turn, recorded as an assistant turn |
//! | [`IngestError`] | [`crate::ingest`] | aborts one ingestion run, the previous index stays active |
//! | [`SearchError`] | [`crate::ingest::DocumentSession::search`] | fails one lookup |
//!
//! Configuration loading and the binary itself stay on `Box<dyn Error>`;
//! these enums exist where callers need to branch on the failure.

use async_openai::error::OpenAIError;
use thiserror::Error;

/// Problems detected before the first interaction.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The secret store has no usable value for `name`.
    #[error("missing secret `{name}`: set it in {location} or via the DOCCHAT_API_KEY environment variable")]
    MissingSecret { name: String, location: String },

    /// The configuration file exists but its values cannot be used.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failures of the chat session lifecycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The model service refused to open a conversation.
    #[error("could not create a chat session: {0}")]
    Creation(String),

    /// A previous creation attempt failed; chat stays disabled.
    #[error("chat is disabled because the session could not be created: {0}")]
    Unusable(String),
}

/// Errors raised by the model service while answering a turn.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResponderError {
    /// The service answered with an API-level error.
    #[error("the model API returned an error: {0}")]
    Api(String),

    /// Anything else: transport, decoding, an interrupted stream.
    #[error("an unexpected error occurred: {0}")]
    Other(String),
}

impl From<OpenAIError> for ResponderError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::ApiError(api) => ResponderError::Api(api.to_string()),
            other => ResponderError::Other(other.to_string()),
        }
    }
}

/// Errors from the embedding collaborator.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding service returned {got} vectors for {expected} texts")]
    CountMismatch { expected: usize, got: usize },

    #[error("local embedding model failed: {0}")]
    Model(String),
}

impl From<OpenAIError> for EmbedError {
    fn from(err: OpenAIError) -> Self {
        EmbedError::Request(err.to_string())
    }
}

/// Errors from building or querying the vector index.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("{chunks} chunks but {vectors} vectors")]
    LengthMismatch { chunks: usize, vectors: usize },

    #[error("vector {position} has dimension {got}, expected {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        got: usize,
    },

    #[error("cannot index zero-dimensional vectors")]
    EmptyVectors,

    #[error("hnsw index: {0}")]
    Hnsw(&'static str),
}

/// Extraction failure for a single document; never aborts a run on its own.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Reasons an ingestion run aborts.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Every document produced empty or whitespace-only text.
    #[error("no text could be extracted from the uploaded documents")]
    NoExtractableText,

    #[error("invalid chunking parameters: {0}")]
    InvalidChunking(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("index build failed: {0}")]
    Index(#[from] IndexError),

    #[error("no documents were uploaded")]
    EmptyCorpus,
}

/// Failures of a lookup against the knowledge base.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("no knowledge base has been built yet")]
    NoIndex,

    #[error("could not embed the query: {0}")]
    Embedding(#[from] EmbedError),

    #[error("lookup failed: {0}")]
    Index(#[from] IndexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_secret_mentions_location() {
        let err = StartupError::MissingSecret {
            name: "api_key".into(),
            location: "/tmp/secrets.yaml".into(),
        };
        let text = err.to_string();
        assert!(text.contains("api_key"));
        assert!(text.contains("/tmp/secrets.yaml"));
    }

    #[test]
    fn test_openai_non_api_errors_are_other() {
        let err: ResponderError = OpenAIError::InvalidArgument("bad model".into()).into();
        assert!(matches!(err, ResponderError::Other(ref msg) if msg.contains("bad model")));
    }

    #[test]
    fn test_ingest_error_wraps_index_error() {
        let err: IngestError = IndexError::EmptyVectors.into();
        assert!(matches!(err, IngestError::Index(IndexError::EmptyVectors)));
    }
}
