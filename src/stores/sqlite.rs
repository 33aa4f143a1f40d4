//! Embedded vector store on `tokio-rusqlite` + `sqlite-vec`.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::PathBuf;
use std::sync::Once;

use async_trait::async_trait;
use tokio_rusqlite::{Connection, OptionalExtension, ffi};

use super::{CollectionSchema, VectorStore};
use crate::types::{Chunk, PipelineError, RetrievalHit};

/// Vector store backed by a single sqlite database file.
///
/// Each collection is a table `(id INTEGER PRIMARY KEY, text, embedding)`
/// plus a row in the `collections` registry recording its schema. A
/// connection is opened per operation and dropped when the operation ends, so
/// a wedged database never blocks unrelated retries.
#[derive(Clone, Debug)]
pub struct SqliteVectorStore {
    path: PathBuf,
    batch_size: usize,
    max_top_k: usize,
}

impl SqliteVectorStore {
    pub fn new(path: impl Into<PathBuf>, batch_size: usize, max_top_k: usize) -> Self {
        Self {
            path: path.into(),
            batch_size: batch_size.max(1),
            max_top_k: max_top_k.max(1),
        }
    }

    /// Opens a scoped connection for one operation set.
    ///
    /// Open or extension failures are connectivity problems and map to
    /// [`PipelineError::StoreUnavailable`] so callers can retry.
    async fn connect(&self) -> Result<Connection, PipelineError> {
        register_sqlite_vec()?;
        let conn = Connection::open(&self.path)
            .await
            .map_err(|err| PipelineError::StoreUnavailable(err.to_string()))?;
        conn.call(|conn| {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))
                .map_err(tokio_rusqlite::Error::Rusqlite)
        })
        .await
        .map_err(|err| PipelineError::StoreUnavailable(err.to_string()))?;
        Ok(conn)
    }

    async fn registered_schema(
        &self,
        conn: &Connection,
        name: &str,
    ) -> Result<Option<CollectionSchema>, PipelineError> {
        let name = name.to_string();
        conn.call(move |conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS collections (\
                 name TEXT PRIMARY KEY, dimension INTEGER NOT NULL, \
                 max_text_length INTEGER NOT NULL)",
                [],
            )
            .map_err(tokio_rusqlite::Error::Rusqlite)?;
            conn.query_row(
                "SELECT dimension, max_text_length FROM collections WHERE name = ?1",
                [&name],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(tokio_rusqlite::Error::Rusqlite)
        })
        .await
        .map_err(|err| PipelineError::Query(err.to_string()))
        .map(|row| {
            row.map(|(dimension, max_text_length)| CollectionSchema {
                dimension: dimension as usize,
                max_text_length: max_text_length as usize,
            })
        })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn ensure_collection(
        &self,
        name: &str,
        schema: CollectionSchema,
    ) -> Result<(), PipelineError> {
        validate_collection_name(name)?;
        let conn = self.connect().await?;

        if let Some(existing) = self.registered_schema(&conn, name).await? {
            if existing != schema {
                return Err(PipelineError::SchemaMismatch {
                    collection: name.to_string(),
                    detail: format!(
                        "registered dimension={} max_text_length={}, requested dimension={} max_text_length={}",
                        existing.dimension,
                        existing.max_text_length,
                        schema.dimension,
                        schema.max_text_length
                    ),
                });
            }
            return Ok(());
        }

        let table = name.to_string();
        let owned_name = name.to_string();
        conn.call(move |conn| {
            let tx = conn.transaction().map_err(tokio_rusqlite::Error::Rusqlite)?;
            tx.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS \"{table}\" (\
                     id INTEGER PRIMARY KEY, \
                     text TEXT NOT NULL, \
                     embedding TEXT NOT NULL)"
                ),
                [],
            )
            .map_err(tokio_rusqlite::Error::Rusqlite)?;
            tx.execute(
                "INSERT INTO collections (name, dimension, max_text_length) VALUES (?1, ?2, ?3)",
                (
                    &owned_name,
                    schema.dimension as i64,
                    schema.max_text_length as i64,
                ),
            )
            .map_err(tokio_rusqlite::Error::Rusqlite)?;
            tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)
        })
        .await
        .map_err(|err| PipelineError::Query(err.to_string()))?;

        tracing::info!(collection = name, dimension = schema.dimension, "collection created");
        Ok(())
    }

    async fn insert(&self, collection: &str, chunks: &[Chunk]) -> Result<(), PipelineError> {
        if chunks.is_empty() {
            return Ok(());
        }
        validate_collection_name(collection)?;
        let conn = self.connect().await?;

        let schema = self
            .registered_schema(&conn, collection)
            .await?
            .ok_or_else(|| PipelineError::Query(format!("unknown collection '{collection}'")))?;

        // Batches are independent: a failure reports its index range and
        // leaves earlier batches in place (at-least-once ingestion).
        for (batch_index, batch) in chunks.chunks(self.batch_size).enumerate() {
            let start = batch_index * self.batch_size;
            let end = start + batch.len();
            let batch_err = |reason: String| PipelineError::BatchInsert {
                collection: collection.to_string(),
                start,
                end,
                reason,
            };

            let mut rows = Vec::with_capacity(batch.len());
            for chunk in batch {
                if chunk.embedding.len() != schema.dimension {
                    return Err(batch_err(format!(
                        "chunk {} has dimension {}, collection expects {}",
                        chunk.id,
                        chunk.embedding.len(),
                        schema.dimension
                    )));
                }
                let embedding = serde_json::to_string(&chunk.embedding)
                    .map_err(|err| batch_err(err.to_string()))?;
                rows.push((chunk.id, chunk.text.clone(), embedding));
            }

            let table = collection.to_string();
            conn.call(move |conn| {
                let tx = conn.transaction().map_err(tokio_rusqlite::Error::Rusqlite)?;
                {
                    let mut stmt = tx
                        .prepare(&format!(
                            "INSERT INTO \"{table}\" (id, text, embedding) VALUES (?1, ?2, ?3)"
                        ))
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    for (id, text, embedding) in &rows {
                        stmt.execute((id, text, embedding))
                            .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    }
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(|err| batch_err(err.to_string()))?;

            tracing::debug!(
                collection,
                start,
                end,
                "inserted chunk batch"
            );
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, PipelineError> {
        validate_collection_name(collection)?;
        let conn = self.connect().await?;

        let schema = self
            .registered_schema(&conn, collection)
            .await?
            .ok_or_else(|| PipelineError::Query(format!("unknown collection '{collection}'")))?;
        if query_embedding.len() != schema.dimension {
            return Err(PipelineError::Query(format!(
                "query dimension {} does not match collection dimension {}",
                query_embedding.len(),
                schema.dimension
            )));
        }

        if query_embedding.iter().all(|v| *v == 0.0) {
            return Err(PipelineError::Query(
                "query embedding has zero magnitude, cosine similarity is undefined".into(),
            ));
        }

        let limit = top_k.min(self.max_top_k);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query_json = serde_json::to_string(query_embedding)
            .map_err(|err| PipelineError::Query(err.to_string()))?;
        let table = collection.to_string();

        let hits = conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT id, text, embedding, \
                         vec_distance_cosine(vec_f32(embedding), vec_f32(?1)) AS distance \
                         FROM \"{table}\" \
                         ORDER BY distance ASC, id ASC \
                         LIMIT {limit}"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let rows = stmt
                    .query_map([&query_json], |row| {
                        let id: i64 = row.get(0)?;
                        let text: String = row.get(1)?;
                        let embedding_json: String = row.get(2)?;
                        let distance: f32 = row.get(3)?;
                        Ok((id, text, embedding_json, distance))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut out = Vec::new();
                for row in rows {
                    out.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(out)
            })
            .await
            .map_err(|err| PipelineError::Query(err.to_string()))?;

        let mut results = Vec::with_capacity(hits.len());
        for (id, text, embedding_json, distance) in hits {
            let embedding: Vec<f32> = serde_json::from_str(&embedding_json)
                .map_err(|err| PipelineError::Query(err.to_string()))?;
            results.push(RetrievalHit {
                chunk: Chunk {
                    id,
                    text,
                    embedding,
                },
                // Cosine distance to similarity.
                score: 1.0 - distance,
            });
        }
        Ok(results)
    }
}

fn validate_collection_name(name: &str) -> Result<(), PipelineError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(PipelineError::Config(format!(
            "collection name '{name}' must match [A-Za-z_][A-Za-z0-9_]*"
        )))
    }
}

fn register_sqlite_vec() -> Result<(), PipelineError> {
    use std::sync::Mutex;

    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!(
                    "failed to register sqlite-vec extension (code {rc})"
                ))
            } else {
                Ok(())
            }
        };
        *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
    });

    INIT_RESULT
        .lock()
        .expect("init result mutex poisoned")
        .clone()
        .expect("init was called but result not set")
        .map_err(PipelineError::StoreUnavailable)
}
