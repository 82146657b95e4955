//! `PostgreSQL` implementation of the `DocumentStore` trait.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use lorekeeper_core::error::GameError;
use lorekeeper_core::ids::OwnerId;
use lorekeeper_core::merge;
use lorekeeper_core::store::{Document, DocumentStore};

use crate::schema::CREATE_DOCUMENTS_TABLE;

/// PostgreSQL-backed document store. One JSONB row per (owner, document).
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

fn infrastructure(err: sqlx::Error) -> GameError {
    GameError::Infrastructure(format!("document store: {err}"))
}

impl PgDocumentStore {
    /// Creates a new `PgDocumentStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the documents table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Infrastructure` if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), GameError> {
        sqlx::raw_sql(CREATE_DOCUMENTS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(())
    }
}

const UPSERT: &str = r"
INSERT INTO documents (owner_id, doc_id, body, updated_at)
VALUES ($1, $2, $3, NOW())
ON CONFLICT (owner_id, doc_id)
DO UPDATE SET body = EXCLUDED.body, updated_at = NOW()
";

/// Inserts an empty body unless the row exists. Merging into `{}` is the
/// same as merging into nothing.
const CLAIM_EMPTY: &str = r"
INSERT INTO documents (owner_id, doc_id, body, updated_at)
VALUES ($1, $2, '{}'::jsonb, NOW())
ON CONFLICT (owner_id, doc_id) DO NOTHING
";

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, owner: &OwnerId, id: &str) -> Result<Option<Document>, GameError> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT body FROM documents WHERE owner_id = $1 AND doc_id = $2")
                .bind(owner.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(infrastructure)?;
        Ok(row.map(|(body,)| body))
    }

    async fn put(&self, owner: &OwnerId, id: &str, document: Document) -> Result<(), GameError> {
        sqlx::query(UPSERT)
            .bind(owner.as_str())
            .bind(id)
            .bind(&document)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(())
    }

    async fn merge_patch(
        &self,
        owner: &OwnerId,
        id: &str,
        patch: &Document,
    ) -> Result<Document, GameError> {
        let mut tx = self.pool.begin().await.map_err(infrastructure)?;

        // `FOR UPDATE` locks nothing on a missing row, so claim it first; a
        // concurrent first merge blocks here until this one commits.
        sqlx::query(CLAIM_EMPTY)
            .bind(owner.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(infrastructure)?;

        let (existing,): (Value,) = sqlx::query_as(
            "SELECT body FROM documents WHERE owner_id = $1 AND doc_id = $2 FOR UPDATE",
        )
        .bind(owner.as_str())
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(infrastructure)?;

        let document = merge::merged(Some(&existing), patch);

        sqlx::query(UPSERT)
            .bind(owner.as_str())
            .bind(id)
            .bind(&document)
            .execute(&mut *tx)
            .await
            .map_err(infrastructure)?;

        tx.commit().await.map_err(infrastructure)?;
        Ok(document)
    }

    async fn delete(&self, owner: &OwnerId, id: &str) -> Result<bool, GameError> {
        let result = sqlx::query("DELETE FROM documents WHERE owner_id = $1 AND doc_id = $2")
            .bind(owner.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(
        &self,
        owner: &OwnerId,
        prefix: &str,
    ) -> Result<Vec<(String, Document)>, GameError> {
        // `LIKE` would treat the `_` in entity prefixes as a wildcard.
        let rows: Vec<(String, Value)> = sqlx::query_as(
            "SELECT doc_id, body FROM documents \
             WHERE owner_id = $1 AND left(doc_id, char_length($2)) = $2 \
             ORDER BY doc_id",
        )
        .bind(owner.as_str())
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;
        tracing::debug!(owner = %owner, prefix, count = rows.len(), "listed documents");
        Ok(rows)
    }
}
