use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::error::StoreError;
use crate::index::{IndexEntry, IndexManifest};

/// File name of the index database inside the persist directory.
pub const INDEX_FILE: &str = "index.db";

#[derive(Debug, Clone)]
pub struct IndexDb {
    pool: SqlitePool,
}

impl IndexDb {
    /// Open (or create) the index database and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(opts)
            .await?;

        sqlx::migrate!("../../migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// # Errors
    ///
    /// Returns an error if the manifest table cannot be read.
    pub async fn load_manifest(&self) -> Result<Option<IndexManifest>, StoreError> {
        let row = sqlx::query(
            "SELECT embedding_model, dimensions, distance, corpus_hash, chunk_count, built_at \
             FROM index_manifest WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<IndexManifest, StoreError> {
            let distance: String = row.get("distance");
            Ok(IndexManifest {
                embedding_model: row.get("embedding_model"),
                dimensions: usize::try_from(row.get::<i64, _>("dimensions"))?,
                distance: distance.parse().map_err(StoreError::Corrupt)?,
                corpus_hash: row.get("corpus_hash"),
                chunk_count: usize::try_from(row.get::<i64, _>("chunk_count"))?,
                built_at: row.get("built_at"),
            })
        })
        .transpose()
    }

    /// All entries in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored vector is malformed.
    pub async fn load_entries(&self) -> Result<Vec<IndexEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, content, source, chunk_index, embedding FROM index_entries \
             ORDER BY position ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<IndexEntry, StoreError> {
                let blob: Vec<u8> = row.get("embedding");
                Ok(IndexEntry {
                    id: row.get("id"),
                    content: row.get("content"),
                    source: row.get("source"),
                    chunk_index: usize::try_from(row.get::<i64, _>("chunk_index"))?,
                    vector: deserialize_embedding(&blob)?,
                })
            })
            .collect()
    }

    /// Replace every entry and the manifest in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; nothing is committed in that case.
    pub async fn replace(
        &self,
        manifest: &IndexManifest,
        entries: &[IndexEntry],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM index_entries")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM index_manifest")
            .execute(&mut *tx)
            .await?;

        for (position, entry) in entries.iter().enumerate() {
            sqlx::query(
                "INSERT INTO index_entries (position, id, content, source, chunk_index, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(i64::try_from(position)?)
            .bind(&entry.id)
            .bind(&entry.content)
            .bind(&entry.source)
            .bind(i64::try_from(entry.chunk_index)?)
            .bind(serialize_embedding(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO index_manifest \
             (id, embedding_model, dimensions, distance, corpus_hash, chunk_count, built_at) \
             VALUES (1, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&manifest.embedding_model)
        .bind(i64::try_from(manifest.dimensions)?)
        .bind(manifest.distance.as_str())
        .bind(&manifest.corpus_hash)
        .bind(i64::try_from(manifest.chunk_count)?)
        .bind(&manifest.built_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn serialize_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Result<Vec<f32>, StoreError> {
    if bytes.len() % 4 != 0 {
        return Err(StoreError::Corrupt(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Distance;

    fn manifest(chunk_count: usize) -> IndexManifest {
        IndexManifest {
            embedding_model: "all-minilm".into(),
            dimensions: 3,
            distance: Distance::Cosine,
            corpus_hash: "abc".into(),
            chunk_count,
            built_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    fn entry(id: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            id: id.into(),
            content: format!("content {id}"),
            source: "beem.txt".into(),
            chunk_index: 0,
            vector,
        }
    }

    #[test]
    fn embedding_blob_roundtrip() {
        let v = vec![0.5, -1.25, f32::MAX];
        assert_eq!(deserialize_embedding(&serialize_embedding(&v)).unwrap(), v);
    }

    #[test]
    fn malformed_blob_is_corrupt() {
        assert!(matches!(
            deserialize_embedding(&[0, 1, 2]),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn fresh_db_has_no_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let db = IndexDb::open(&dir.path().join(INDEX_FILE)).await.unwrap();
        assert!(db.load_manifest().await.unwrap().is_none());
        assert!(db.load_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let db = IndexDb::open(&dir.path().join(INDEX_FILE)).await.unwrap();
        let entries = vec![entry("b", vec![1.0, 2.0, 3.0]), entry("a", vec![4.0, 5.0, 6.0])];
        db.replace(&manifest(2), &entries).await.unwrap();

        assert_eq!(db.load_manifest().await.unwrap(), Some(manifest(2)));
        assert_eq!(db.load_entries().await.unwrap(), entries);
    }

    #[tokio::test]
    async fn replace_discards_previous_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = IndexDb::open(&dir.path().join(INDEX_FILE)).await.unwrap();
        db.replace(
            &manifest(2),
            &[entry("x", vec![0.0; 3]), entry("y", vec![1.0; 3])],
        )
        .await
        .unwrap();
        db.replace(&manifest(1), &[entry("z", vec![2.0; 3])])
            .await
            .unwrap();

        let loaded = db.load_entries().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "z");
        assert_eq!(db.load_manifest().await.unwrap().unwrap().chunk_count, 1);
    }

    #[tokio::test]
    async fn reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(INDEX_FILE);
        {
            let db = IndexDb::open(&path).await.unwrap();
            db.replace(&manifest(1), &[entry("keep", vec![1.0; 3])])
                .await
                .unwrap();
            db.close().await;
        }
        let db = IndexDb::open(&path).await.unwrap();
        assert_eq!(db.load_entries().await.unwrap()[0].id, "keep");
    }

    #[tokio::test]
    async fn wal_journal_mode_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let db = IndexDb::open(&dir.path().join(INDEX_FILE)).await.unwrap();
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(mode, "wal");
    }
}
