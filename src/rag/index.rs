//! Vector index over SQLite with brute-force cosine search.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use thiserror::Error;
use uuid::Uuid;

use super::images::{ImageBlob, ImageBlobStore};
use super::models::{ContentKind, Fragment, IndexStats, RetrievedRecord};
use crate::embedding::Embedding;

/// Database file created inside a persistent index location.
pub const INDEX_DB_FILE: &str = "sightline.sqlite3";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Fragment count ({fragments}) doesn't match embedding count ({embeddings})")]
    LengthMismatch { fragments: usize, embeddings: usize },

    #[error("Invalid index configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Corrupt record {0}")]
    CorruptRecord(String),
}

impl IndexError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. }
                | Self::LengthMismatch { .. }
                | Self::InvalidConfiguration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Where the index keeps its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexLocation {
    /// Ephemeral, discarded with the process.
    InMemory,
    /// Directory holding the database file; survives restarts.
    Persistent(PathBuf),
}

impl IndexLocation {
    pub fn from_option(dir: Option<&Path>) -> Self {
        match dir {
            Some(dir) => Self::Persistent(dir.to_path_buf()),
            None => Self::InMemory,
        }
    }
}

/// Vector index for one named collection.
///
/// Every stored embedding has the collection's dimension, recorded when the
/// collection is first created and checked on every reopen.
pub struct VectorIndex {
    conn: Connection,
    collection: String,
    dimension: usize,
    location: IndexLocation,
}

impl VectorIndex {
    /// Open (or create) `collection` at `location` with embedding dimension `dimension`.
    pub fn open(location: IndexLocation, collection: &str, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(IndexError::InvalidConfiguration(
                "embedding dimension must be positive".to_string(),
            ));
        }
        if collection.trim().is_empty() {
            return Err(IndexError::InvalidConfiguration(
                "collection name is required".to_string(),
            ));
        }

        let conn = match &location {
            IndexLocation::InMemory => Connection::open_in_memory()?,
            IndexLocation::Persistent(dir) => {
                std::fs::create_dir_all(dir)?;
                Connection::open(dir.join(INDEX_DB_FILE))?
            }
        };

        conn.execute_batch(
            r#"
            -- One row per named collection, pinning its embedding dimension
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dimensions INTEGER NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            -- Fragments with their embeddings (f32 little-endian blobs)
            CREATE TABLE IF NOT EXISTS fragments (
                id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                seq INTEGER NOT NULL,
                kind TEXT NOT NULL,
                page INTEGER NOT NULL,
                content TEXT,
                image_ref TEXT,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL,
                dimensions INTEGER NOT NULL
            );

            -- Encoded image payloads, keyed by image_ref
            CREATE TABLE IF NOT EXISTS image_blobs (
                collection TEXT NOT NULL,
                image_ref TEXT NOT NULL,
                mime TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (collection, image_ref)
            );

            CREATE INDEX IF NOT EXISTS idx_fragments_collection_seq ON fragments(collection, seq);
            "#,
        )?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT dimensions FROM collections WHERE name = ?1",
                params![collection],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(stored) if stored as usize != dimension => {
                return Err(IndexError::DimensionMismatch {
                    expected: stored as usize,
                    actual: dimension,
                });
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT INTO collections (name, dimensions) VALUES (?1, ?2)",
                    params![collection, dimension as i64],
                )?;
            }
        }

        log::debug!(
            "Opened collection '{}' (dimension {}) at {:?}",
            collection,
            dimension,
            location
        );

        Ok(Self {
            conn,
            collection: collection.to_string(),
            dimension,
            location,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn location(&self) -> &IndexLocation {
        &self.location
    }

    /// Insert fragments with their embeddings in one transaction.
    ///
    /// Returns the ids assigned to the fragments, in order.
    pub fn add(&mut self, fragments: &[Fragment], embeddings: &[Embedding]) -> Result<Vec<String>> {
        self.add_with_images(fragments, embeddings, &[])
    }

    /// Insert fragments and image payloads in a single transaction.
    pub(crate) fn add_with_images(
        &mut self,
        fragments: &[Fragment],
        embeddings: &[Embedding],
        images: &[(String, ImageBlob)],
    ) -> Result<Vec<String>> {
        self.validate_batch(fragments, embeddings)?;

        let tx = self.conn.transaction()?;
        let ids = write_batch(&tx, &self.collection, fragments, embeddings, images)?;
        tx.commit()?;

        Ok(ids)
    }

    /// Discard the collection's contents and insert a new batch, all in one
    /// transaction. On any error the previous contents remain.
    pub(crate) fn replace_with_images(
        &mut self,
        fragments: &[Fragment],
        embeddings: &[Embedding],
        images: &[(String, ImageBlob)],
    ) -> Result<Vec<String>> {
        self.validate_batch(fragments, embeddings)?;

        let tx = self.conn.transaction()?;
        delete_contents(&tx, &self.collection)?;
        let ids = write_batch(&tx, &self.collection, fragments, embeddings, images)?;
        tx.commit()?;

        Ok(ids)
    }

    /// Discard every fragment and image payload in the collection.
    pub fn clear(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        delete_contents(&tx, &self.collection)?;
        tx.commit()?;
        Ok(())
    }

    fn validate_batch(&self, fragments: &[Fragment], embeddings: &[Embedding]) -> Result<()> {
        if fragments.len() != embeddings.len() {
            return Err(IndexError::LengthMismatch {
                fragments: fragments.len(),
                embeddings: embeddings.len(),
            });
        }

        // Verify all dimensions before touching storage
        for emb in embeddings {
            self.check_dimension(emb)?;
        }
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM fragments WHERE collection = ?1",
            params![self.collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// The `k` nearest fragments by cosine distance, nearest first.
    ///
    /// Returns at most `min(k, count())` records; an empty index yields an empty
    /// result. Equal distances keep insertion order.
    pub fn query(&self, embedding: &Embedding, k: usize) -> Result<Vec<RetrievedRecord>> {
        self.check_dimension(embedding)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, kind, page, content, image_ref, embedding
             FROM fragments WHERE collection = ?1 ORDER BY seq",
        )?;

        let row_mapper = |row: &rusqlite::Row| -> rusqlite::Result<StoredRow> {
            Ok(StoredRow {
                id: row.get(0)?,
                kind: row.get(1)?,
                page: row.get(2)?,
                content: row.get(3)?,
                image_ref: row.get(4)?,
                embedding: row.get(5)?,
            })
        };

        let rows = stmt
            .query_map(params![self.collection], row_mapper)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let (id, fragment, stored) = row.into_parts(self.dimension)?;
            let distance = (1.0 - embedding.cosine_similarity(&stored)).clamp(0.0, 2.0);
            records.push(RetrievedRecord {
                id,
                fragment,
                distance,
            });
        }

        // Stable sort: ties stay in insertion order
        records.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        records.truncate(k);

        Ok(records)
    }

    /// Load every image payload stored for the collection.
    pub fn load_images(&self) -> Result<ImageBlobStore> {
        let mut stmt = self
            .conn
            .prepare("SELECT image_ref, mime, data FROM image_blobs WHERE collection = ?1")?;
        let store = stmt
            .query_map(params![self.collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    ImageBlob {
                        mime: row.get(1)?,
                        data: row.get(2)?,
                    },
                ))
            })?
            .collect::<rusqlite::Result<ImageBlobStore>>()?;
        Ok(store)
    }

    /// Get statistics about the collection.
    pub fn stats(&self) -> Result<IndexStats> {
        let count_kind = |kind: ContentKind| -> Result<u64> {
            let n: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM fragments WHERE collection = ?1 AND kind = ?2",
                params![self.collection, kind.as_str()],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        };
        let text_count = count_kind(ContentKind::Text)?;
        let image_count = count_kind(ContentKind::Image)?;

        let image_blob_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM image_blobs WHERE collection = ?1",
            params![self.collection],
            |row| row.get(0),
        )?;

        Ok(IndexStats {
            collection: self.collection.clone(),
            fragment_count: text_count + image_count,
            text_count,
            image_count,
            image_blob_count: image_blob_count as u64,
            dimension: self.dimension,
        })
    }

    fn check_dimension(&self, embedding: &Embedding) -> Result<()> {
        if embedding.dimension() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.dimension(),
            });
        }
        Ok(())
    }
}

struct StoredRow {
    id: String,
    kind: String,
    page: u32,
    content: Option<String>,
    image_ref: Option<String>,
    embedding: Vec<u8>,
}

impl StoredRow {
    /// Split into id, fragment and embedding, rejecting rows whose embedding blob
    /// does not hold exactly `dimension` floats.
    fn into_parts(self, dimension: usize) -> Result<(String, Fragment, Embedding)> {
        if self.embedding.len() != dimension * 4 {
            return Err(IndexError::CorruptRecord(format!(
                "{}: embedding is {} bytes, expected {}",
                self.id,
                self.embedding.len(),
                dimension * 4
            )));
        }
        let embedding = Embedding::from_le_bytes(&self.embedding);

        let fragment = match (ContentKind::parse(&self.kind), self.content, self.image_ref) {
            (Some(ContentKind::Text), Some(text), _) => Fragment::text(self.page, text),
            (Some(ContentKind::Image), _, Some(image_ref)) => Fragment::image(self.page, image_ref),
            _ => return Err(IndexError::CorruptRecord(self.id)),
        };
        Ok((self.id, fragment, embedding))
    }
}

fn delete_contents(tx: &Transaction<'_>, collection: &str) -> Result<()> {
    tx.execute(
        "DELETE FROM fragments WHERE collection = ?1",
        params![collection],
    )?;
    tx.execute(
        "DELETE FROM image_blobs WHERE collection = ?1",
        params![collection],
    )?;
    Ok(())
}

/// Insert fragments after the collection's current last `seq`, then their payloads.
fn write_batch(
    tx: &Transaction<'_>,
    collection: &str,
    fragments: &[Fragment],
    embeddings: &[Embedding],
    images: &[(String, ImageBlob)],
) -> Result<Vec<String>> {
    let next_seq: i64 = tx.query_row(
        "SELECT COALESCE(MAX(seq) + 1, 0) FROM fragments WHERE collection = ?1",
        params![collection],
        |row| row.get(0),
    )?;

    let mut insert_fragment = tx.prepare(
        "INSERT INTO fragments (id, collection, seq, kind, page, content, image_ref, metadata, embedding, dimensions)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;

    let mut ids = Vec::with_capacity(fragments.len());
    for (offset, (fragment, embedding)) in fragments.iter().zip(embeddings).enumerate() {
        let id = Uuid::new_v4().to_string();
        let metadata_json = serde_json::to_string(&fragment.metadata())?;

        insert_fragment.execute(params![
            id,
            collection,
            next_seq + offset as i64,
            fragment.kind().as_str(),
            fragment.page,
            fragment.text_content(),
            fragment.image_ref(),
            metadata_json,
            embedding.to_le_bytes(),
            embedding.dimension() as i64,
        ])?;
        ids.push(id);
    }

    let mut insert_blob = tx.prepare(
        "INSERT OR REPLACE INTO image_blobs (collection, image_ref, mime, data) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (image_ref, blob) in images {
        insert_blob.execute(params![collection, image_ref, blob.mime, blob.data])?;
    }

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(values: &[f32]) -> Embedding {
        Embedding::from_raw(values.to_vec()).unwrap()
    }

    fn memory_index() -> VectorIndex {
        VectorIndex::open(IndexLocation::InMemory, "test", 3).unwrap()
    }

    #[test]
    fn test_add_and_count() {
        let mut index = memory_index();
        assert_eq!(index.count().unwrap(), 0);

        let ids = index
            .add(
                &[Fragment::text(0, "alpha"), Fragment::image(1, "page_1_img_0")],
                &[unit(&[1.0, 0.0, 0.0]), unit(&[0.0, 1.0, 0.0])],
            )
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(index.count().unwrap(), 2);
    }

    #[test]
    fn test_length_mismatch_rejected_without_mutation() {
        let mut index = memory_index();
        let err = index
            .add(&[Fragment::text(0, "a"), Fragment::text(0, "b")], &[unit(&[1.0, 0.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, IndexError::LengthMismatch { fragments: 2, embeddings: 1 }));
        assert!(err.is_validation());
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn test_dimension_mismatch_rejected_without_mutation() {
        let mut index = memory_index();
        let err = index
            .add(
                &[Fragment::text(0, "ok"), Fragment::text(0, "bad")],
                &[unit(&[1.0, 0.0, 0.0]), unit(&[1.0, 0.0])],
            )
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 3, actual: 2 }));
        assert_eq!(index.count().unwrap(), 0);

        assert!(index.query(&unit(&[1.0, 0.0]), 1).is_err());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut index = memory_index();
        index
            .add(&[Fragment::text(0, "a")], &[unit(&[1.0, 0.0, 0.0])])
            .unwrap();
        index.clear().unwrap();
        assert_eq!(index.count().unwrap(), 0);
        index.clear().unwrap();
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn test_query_orders_by_distance_and_clamps() {
        let mut index = memory_index();
        index
            .add(
                &[
                    Fragment::text(0, "far"),
                    Fragment::text(0, "near"),
                    Fragment::text(0, "middle"),
                ],
                &[
                    unit(&[0.0, 0.0, 1.0]),
                    unit(&[1.0, 0.05, 0.0]),
                    unit(&[1.0, 1.0, 0.0]),
                ],
            )
            .unwrap();

        let results = index.query(&unit(&[1.0, 0.0, 0.0]), 10).unwrap();
        assert_eq!(results.len(), 3);
        let texts: Vec<_> = results.iter().map(|r| r.fragment.text_content().unwrap()).collect();
        assert_eq!(texts, vec!["near", "middle", "far"]);
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        assert!(results.iter().all(|r| r.distance >= 0.0));

        assert_eq!(index.query(&unit(&[1.0, 0.0, 0.0]), 2).unwrap().len(), 2);
        assert!(index.query(&unit(&[1.0, 0.0, 0.0]), 0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut index = memory_index();
        let same = unit(&[0.0, 1.0, 0.0]);
        index
            .add(
                &[Fragment::text(0, "first"), Fragment::text(0, "second")],
                &[same.clone(), same.clone()],
            )
            .unwrap();
        index
            .add(&[Fragment::text(0, "third")], &[same.clone()])
            .unwrap();

        let results = index.query(&same, 3).unwrap();
        let texts: Vec<_> = results.iter().map(|r| r.fragment.text_content().unwrap()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_empty_index_query_returns_nothing() {
        let index = memory_index();
        assert!(index.query(&unit(&[1.0, 0.0, 0.0]), 5).unwrap().is_empty());
    }

    #[test]
    fn test_persistence_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let location = IndexLocation::Persistent(temp.path().to_path_buf());
        {
            let mut index = VectorIndex::open(location.clone(), "docs", 3).unwrap();
            index
                .add_with_images(
                    &[Fragment::text(0, "kept"), Fragment::image(1, "page_1_img_0")],
                    &[unit(&[1.0, 0.0, 0.0]), unit(&[0.0, 1.0, 0.0])],
                    &[(
                        "page_1_img_0".to_string(),
                        ImageBlob {
                            mime: "image/png".to_string(),
                            data: "AAAA".to_string(),
                        },
                    )],
                )
                .unwrap();
        }

        let index = VectorIndex::open(location.clone(), "docs", 3).unwrap();
        assert_eq!(index.count().unwrap(), 2);
        let top = index.query(&unit(&[0.0, 1.0, 0.0]), 1).unwrap();
        assert_eq!(top[0].fragment, Fragment::image(1, "page_1_img_0"));
        assert!(index.load_images().unwrap().contains("page_1_img_0"));

        // Collections in the same location are independent
        let other = VectorIndex::open(location, "other", 3).unwrap();
        assert_eq!(other.count().unwrap(), 0);
    }

    #[test]
    fn test_reopen_with_different_dimension_rejected() {
        let temp = TempDir::new().unwrap();
        let location = IndexLocation::Persistent(temp.path().to_path_buf());
        VectorIndex::open(location.clone(), "docs", 3).unwrap();
        let err = VectorIndex::open(location, "docs", 4).err().unwrap();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 3, actual: 4 }));
    }

    #[test]
    fn test_clear_removes_image_blobs_and_stats() {
        let mut index = memory_index();
        index
            .add_with_images(
                &[Fragment::image(0, "page_0_img_0"), Fragment::text(0, "t")],
                &[unit(&[1.0, 0.0, 0.0]), unit(&[0.0, 0.0, 1.0])],
                &[(
                    "page_0_img_0".to_string(),
                    ImageBlob {
                        mime: "image/png".to_string(),
                        data: "AAAA".to_string(),
                    },
                )],
            )
            .unwrap();

        let stats = index.stats().unwrap();
        assert_eq!(stats.fragment_count, 2);
        assert_eq!(stats.text_count, 1);
        assert_eq!(stats.image_count, 1);
        assert_eq!(stats.image_blob_count, 1);
        assert_eq!(stats.dimension, 3);

        index.clear().unwrap();
        assert!(index.load_images().unwrap().is_empty());
        assert_eq!(index.stats().unwrap().image_blob_count, 0);
    }

    #[test]
    fn test_replace_swaps_contents() {
        let mut index = memory_index();
        index
            .add(&[Fragment::text(0, "old")], &[unit(&[1.0, 0.0, 0.0])])
            .unwrap();

        index
            .replace_with_images(
                &[Fragment::text(0, "new a"), Fragment::text(1, "new b")],
                &[unit(&[1.0, 0.0, 0.0]), unit(&[0.0, 1.0, 0.0])],
                &[],
            )
            .unwrap();

        let results = index.query(&unit(&[1.0, 0.0, 0.0]), 10).unwrap();
        let texts: Vec<_> = results
            .iter()
            .filter_map(|r| r.fragment.text_content())
            .collect();
        assert_eq!(texts, vec!["new a", "new b"]);
    }

    #[test]
    fn test_failed_replace_keeps_previous_contents() {
        let mut index = memory_index();
        index
            .add_with_images(
                &[Fragment::text(0, "kept"), Fragment::image(0, "page_0_img_0")],
                &[unit(&[1.0, 0.0, 0.0]), unit(&[0.0, 1.0, 0.0])],
                &[(
                    "page_0_img_0".to_string(),
                    ImageBlob {
                        mime: "image/png".to_string(),
                        data: "AAAA".to_string(),
                    },
                )],
            )
            .unwrap();
        index
            .conn
            .execute_batch(
                "CREATE TRIGGER reject_boom BEFORE INSERT ON fragments
                 WHEN NEW.content = 'boom'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let result = index.replace_with_images(
            &[Fragment::text(0, "fine"), Fragment::text(1, "boom")],
            &[unit(&[1.0, 0.0, 0.0]), unit(&[0.0, 0.0, 1.0])],
            &[],
        );
        assert!(matches!(result, Err(IndexError::Sqlite(_))));

        assert_eq!(index.count().unwrap(), 2);
        assert!(index.load_images().unwrap().contains("page_0_img_0"));
        let top = index.query(&unit(&[1.0, 0.0, 0.0]), 1).unwrap();
        assert_eq!(top[0].fragment.text_content(), Some("kept"));
    }

    #[test]
    fn test_truncated_embedding_is_corrupt() {
        let mut index = memory_index();
        index
            .add(&[Fragment::text(0, "t")], &[unit(&[1.0, 0.0, 0.0])])
            .unwrap();
        index
            .conn
            .execute(
                "UPDATE fragments SET embedding = ?1",
                params![vec![0u8, 0, 128, 63, 0]],
            )
            .unwrap();

        let err = index.query(&unit(&[1.0, 0.0, 0.0]), 1).unwrap_err();
        assert!(matches!(err, IndexError::CorruptRecord(_)));
    }

    #[test]
    fn test_rejects_bad_configuration() {
        assert!(VectorIndex::open(IndexLocation::InMemory, "x", 0).is_err());
        assert!(VectorIndex::open(IndexLocation::InMemory, "  ", 3).is_err());
    }
}
