//! Vector index over SQLite.
//!
//! [`VectorIndex`] owns the connection pool and the embedding provider; it is
//! the single shared mutable resource of the process (see [`crate::state`]
//! for the memoized handle). Writes embed chunk text and persist chunk +
//! vector rows inside one transaction per batch; reads embed the query with
//! the same provider and rank stored vectors by cosine similarity in process.
//!
//! Repeated `add` calls with identical text append new records — dedup is
//! explicitly out of scope.

use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::migrate;
use crate::db;
use crate::models::{Chunk, IndexStats, IndexedRecord};

pub struct VectorIndex {
    pool: SqlitePool,
    provider: Box<dyn EmbeddingProvider>,
    config: Config,
}

impl VectorIndex {
    /// Connect to the underlying store, create the schema if needed, and
    /// build the embedding provider. Construction performs no embedding
    /// calls; a failure here must not be cached by callers.
    pub async fn connect(config: &Config) -> Result<VectorIndex> {
        let provider = embedding::create_provider(&config.embedding)?;
        let pool = db::connect(config).await?;
        migrate::run_migrations_on_pool(&pool).await?;

        Ok(VectorIndex {
            pool,
            provider,
            config: config.clone(),
        })
    }

    /// Embedding model backing this index.
    pub fn embedding_model(&self) -> &str {
        self.provider.model_name()
    }

    /// Embed and persist chunks. Each embedding batch is written in one
    /// transaction; duplicates accumulate. Returns the number of records
    /// written.
    pub async fn add(&self, chunks: &[Chunk]) -> Result<u64> {
        let mut written = 0u64;
        let now = chrono::Utc::now().timestamp();

        for batch in chunks.chunks(self.config.embedding.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors =
                embedding::embed_texts(self.provider.as_ref(), &self.config.embedding, &texts)
                    .await?;

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| Error::IndexUnavailable(e.to_string()))?;

            for (chunk, vector) in batch.iter().zip(vectors.iter()) {
                let metadata_json = serde_json::to_string(&chunk.metadata)
                    .map_err(|e| Error::IndexUnavailable(e.to_string()))?;

                sqlx::query(
                    "INSERT INTO chunks (id, source, chunk_index, text, metadata_json, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(&chunk.id)
                .bind(&chunk.source)
                .bind(chunk.chunk_index)
                .bind(&chunk.text)
                .bind(&metadata_json)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::IndexUnavailable(e.to_string()))?;

                let blob = embedding::vec_to_blob(vector);
                sqlx::query(
                    "INSERT INTO chunk_vectors (chunk_id, embedding, dims) VALUES (?, ?, ?)",
                )
                .bind(&chunk.id)
                .bind(&blob)
                .bind(vector.len() as i64)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::IndexUnavailable(e.to_string()))?;

                written += 1;
            }

            tx.commit()
                .await
                .map_err(|e| Error::IndexUnavailable(e.to_string()))?;
        }

        Ok(written)
    }

    /// Embed the query text with the ingestion provider and return the `k`
    /// nearest records by cosine similarity, best first.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<IndexedRecord>> {
        let query_vec =
            embedding::embed_query(self.provider.as_ref(), &self.config.embedding, text).await?;
        self.query_with_vector(&query_vec, k).await
    }

    /// Ranking core, separated from query embedding for testability.
    pub async fn query_with_vector(
        &self,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<IndexedRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.source, c.text, c.metadata_json, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::IndexUnavailable(e.to_string()))?;

        let mut records: Vec<IndexedRecord> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = embedding::blob_to_vec(&blob);
                let score = embedding::cosine_similarity(query_vec, &vec) as f64;
                let metadata_json: String = row.get("metadata_json");
                let metadata: BTreeMap<String, String> =
                    serde_json::from_str(&metadata_json).unwrap_or_default();

                IndexedRecord {
                    id: row.get("id"),
                    source: row.get("source"),
                    text: row.get("text"),
                    metadata,
                    score,
                }
            })
            .collect();

        records.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        records.truncate(k);

        Ok(records)
    }

    /// Remove every record from the index.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::IndexUnavailable(e.to_string()))?;
        sqlx::query("DELETE FROM chunks")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::IndexUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Record count, distinct source-document count, and embedding dimension
    /// (0 when the index is empty).
    pub async fn stats(&self) -> Result<IndexStats> {
        let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::IndexUnavailable(e.to_string()))?;

        let total_documents: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT source) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::IndexUnavailable(e.to_string()))?;

        let embedding_dimension: Option<i64> =
            sqlx::query_scalar("SELECT dims FROM chunk_vectors LIMIT 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::IndexUnavailable(e.to_string()))?;

        Ok(IndexStats {
            total_documents,
            total_chunks,
            embedding_dimension: embedding_dimension.unwrap_or(0),
        })
    }

    /// Sorted distinct source file names (basenames only).
    pub async fn list_sources(&self) -> Result<Vec<String>> {
        let sources: Vec<String> = sqlx::query("SELECT DISTINCT source FROM chunks")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::IndexUnavailable(e.to_string()))?
            .iter()
            .map(|row| {
                let source: String = row.get("source");
                Path::new(&source)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or(source)
            })
            .collect();

        let mut names: Vec<String> = sources;
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Build a chunk directly, used by tests and the ingestion pipeline helpers.
pub fn make_chunk(source: &str, chunk_index: i64, text: &str) -> Chunk {
    let mut metadata = BTreeMap::new();
    metadata.insert("source".to_string(), source.to_string());
    Chunk {
        id: uuid::Uuid::new_v4().to_string(),
        source: source.to_string(),
        chunk_index,
        text: text.to_string(),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig};

    fn test_config(dir: &Path) -> Config {
        Config {
            db: DbConfig {
                path: dir.join("ragdesk.sqlite"),
            },
            llm: Default::default(),
            embedding: Default::default(),
            chunking: Default::default(),
            retrieval: Default::default(),
            server: Default::default(),
        }
    }

    /// Insert a chunk + vector pair without going through an embedding
    /// provider, so ranking can be tested offline.
    async fn insert_with_vector(index: &VectorIndex, chunk: &Chunk, vector: &[f32]) {
        let metadata_json = serde_json::to_string(&chunk.metadata).unwrap();
        sqlx::query(
            "INSERT INTO chunks (id, source, chunk_index, text, metadata_json, created_at) \
             VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(&chunk.id)
        .bind(&chunk.source)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&metadata_json)
        .execute(&index.pool)
        .await
        .unwrap();

        sqlx::query("INSERT INTO chunk_vectors (chunk_id, embedding, dims) VALUES (?, ?, ?)")
            .bind(&chunk.id)
            .bind(embedding::vec_to_blob(vector))
            .bind(vector.len() as i64)
            .execute(&index.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_index_stats_and_sources() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = VectorIndex::connect(&test_config(tmp.path())).await.unwrap();

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.total_documents, 0);
        assert_eq!(stats.total_chunks, 0);
        assert_eq!(stats.embedding_dimension, 0);

        assert!(index.list_sources().await.unwrap().is_empty());

        // Clearing an empty index succeeds.
        index.clear().await.unwrap();
    }

    #[tokio::test]
    async fn query_with_vector_ranks_by_similarity() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = VectorIndex::connect(&test_config(tmp.path())).await.unwrap();

        let sky = make_chunk("/docs/sky.txt", 0, "The sky is blue.");
        let grass = make_chunk("/docs/grass.txt", 0, "Grass is green.");
        insert_with_vector(&index, &sky, &[1.0, 0.0, 0.0]).await;
        insert_with_vector(&index, &grass, &[0.0, 1.0, 0.0]).await;

        let results = index.query_with_vector(&[0.9, 0.1, 0.0], 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "The sky is blue.");
        assert!(results[0].score > 0.9);

        // k larger than the index returns everything, best first.
        let all = index.query_with_vector(&[0.9, 0.1, 0.0], 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].score >= all[1].score);
    }

    #[tokio::test]
    async fn stats_count_distinct_sources() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = VectorIndex::connect(&test_config(tmp.path())).await.unwrap();

        insert_with_vector(&index, &make_chunk("/docs/a.txt", 0, "one"), &[1.0, 0.0]).await;
        insert_with_vector(&index, &make_chunk("/docs/a.txt", 1, "two"), &[0.0, 1.0]).await;
        insert_with_vector(&index, &make_chunk("/docs/b.txt", 0, "three"), &[1.0, 1.0]).await;

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.embedding_dimension, 2);

        let sources = index.list_sources().await.unwrap();
        assert_eq!(sources, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = VectorIndex::connect(&test_config(tmp.path())).await.unwrap();

        insert_with_vector(&index, &make_chunk("/docs/a.txt", 0, "one"), &[1.0, 0.0]).await;
        index.clear().await.unwrap();

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 0);
        assert_eq!(stats.embedding_dimension, 0);
        assert!(index.list_sources().await.unwrap().is_empty());
    }
}
