//! Document ingestion: load a file, chunk it, add it to the index.

use std::path::Path;

use crate::chunker::Chunker;
use crate::error::Result;
use crate::loader;
use crate::state::AppState;

/// Ingest one file into the vector index.
///
/// Returns the number of chunks added. Re-ingesting the same file appends
/// new chunks; callers who want a clean slate clear the index first. Files
/// that load to no content (e.g. an empty text file) are a no-op and never
/// touch the embedding backend.
pub async fn run_ingest(state: &AppState, path: &Path) -> Result<u64> {
    let documents = loader::load_document(path)?;
    let chunker = Chunker::from_config(&state.config.chunking);
    let chunks = chunker.split_documents(&documents);

    if chunks.is_empty() {
        println!("{}: no content to index", path.display());
        return Ok(0);
    }

    let index = state.index().await?;
    let added = index.add(&chunks).await?;

    println!(
        "Ingested {}: {} document(s), {} chunk(s) [model: {}]",
        path.display(),
        documents.len(),
        added,
        index.embedding_model()
    );

    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig};
    use crate::error::Error;
    use std::io::Write;

    fn test_state(dir: &std::path::Path) -> AppState {
        AppState::new(Config {
            db: DbConfig {
                path: dir.join("ragdesk.sqlite"),
            },
            llm: Default::default(),
            embedding: Default::default(),
            chunking: Default::default(),
            retrieval: Default::default(),
            server: Default::default(),
        })
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("report.docx");
        std::fs::File::create(&path).unwrap();

        let state = test_state(tmp.path());
        let err = run_ingest(&state, &path).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn empty_file_is_a_noop() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("empty.txt");
        std::fs::File::create(&path).unwrap();

        let state = test_state(tmp.path());
        // Succeeds without any embedding backend running.
        assert_eq!(run_ingest(&state, &path).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_file_is_a_load_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let state = test_state(tmp.path());

        let err = run_ingest(&state, &tmp.path().join("absent.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Load(_)));
    }

    #[tokio::test]
    async fn whitespace_only_file_is_a_noop() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("blank.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "   \n\n  ").unwrap();

        let state = test_state(tmp.path());
        assert_eq!(run_ingest(&state, &path).await.unwrap(), 0);
    }
}
