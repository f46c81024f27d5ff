//! Crate-wide error taxonomy.
//!
//! Lower layers (loader, chunker, providers, index) raise these; the general
//! persona propagates them to the caller, and only the DELIA entry point
//! converts them into a degraded-but-well-formed response.

/// Errors produced by the RAG pipeline.
#[derive(Debug)]
pub enum Error {
    /// Missing or invalid provider setup. Fatal, never retried.
    Configuration(String),
    /// File extension not in the supported set.
    UnsupportedFormat(String),
    /// A supported file failed to parse or read.
    Load(String),
    /// An embedding provider call failed.
    Embedding(String),
    /// The vector index storage cannot be reached.
    IndexUnavailable(String),
    /// A model invocation failed.
    Generation(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Configuration(m) => write!(f, "configuration error: {}", m),
            Error::UnsupportedFormat(ext) => write!(f, "unsupported file extension: {}", ext),
            Error::Load(m) => write!(f, "failed to load document: {}", m),
            Error::Embedding(m) => write!(f, "embedding failed: {}", m),
            Error::IndexUnavailable(m) => write!(f, "vector index unavailable: {}", m),
            Error::Generation(m) => write!(f, "generation failed: {}", m),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
