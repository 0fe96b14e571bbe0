//! Document repository implementation.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use recap_core::{
    DocLevel, Document, DocumentFilter, DocumentRepository, Error, Result, ScoredDocument,
    UpsertDocumentRequest,
};

use crate::escape_like;

const DOCUMENT_COLUMNS: &str = "id, title, category, level, metadata, content, \
     summary_uuids, source_uuids, embedding, created_at";

/// PostgreSQL implementation of DocumentRepository.
pub struct PgDocumentRepository {
    pool: Pool<Postgres>,
}

impl PgDocumentRepository {
    /// Create a new PgDocumentRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse a document row into a Document struct.
    fn parse_document_row(row: sqlx::postgres::PgRow) -> Document {
        Document {
            id: row.get("id"),
            title: row.get("title"),
            category: row.get("category"),
            level: DocLevel::from_i16(row.get("level")),
            metadata: row.get("metadata"),
            content: row.get("content"),
            summary_uuids: row.get("summary_uuids"),
            source_uuids: row.get("source_uuids"),
            embedding: row.get("embedding"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn upsert(&self, request: UpsertDocumentRequest) -> Result<Document> {
        // COALESCE keeps the stored embedding when the request carries none;
        // link sets and created_at belong to the row, not the request.
        let query = format!(
            "INSERT INTO document (id, title, category, level, metadata, content, embedding)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO UPDATE SET
                 title = EXCLUDED.title,
                 category = EXCLUDED.category,
                 level = EXCLUDED.level,
                 metadata = EXCLUDED.metadata,
                 content = EXCLUDED.content,
                 embedding = COALESCE(EXCLUDED.embedding, document.embedding)
             RETURNING {DOCUMENT_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(request.id)
            .bind(&request.title)
            .bind(&request.category)
            .bind(request.level.as_i16())
            .bind(&request.metadata)
            .bind(&request.content)
            .bind(&request.embedding)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "documents",
            op = "upsert",
            doc_id = %request.id,
            "Upserted document"
        );

        Ok(Self::parse_document_row(row))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>> {
        let query = format!("SELECT {DOCUMENT_COLUMNS} FROM document WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_document_row))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM document WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn search(&self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let mut query = format!("SELECT {DOCUMENT_COLUMNS} FROM document WHERE 1=1 ");
        let mut param_idx = 1;

        if filter.id.is_some() {
            query.push_str(&format!("AND id = ${param_idx} "));
            param_idx += 1;
        }
        if filter.category.is_some() {
            query.push_str(&format!("AND category = ${param_idx} "));
            param_idx += 1;
        }
        if filter.level.is_some() {
            query.push_str(&format!("AND level = ${param_idx} "));
            param_idx += 1;
        }
        if filter.text.is_some() {
            query.push_str(&format!("AND content ILIKE ${param_idx} ESCAPE '\\' "));
            param_idx += 1;
        }
        for _ in &filter.metadata {
            query.push_str(&format!(
                "AND metadata->>${param_idx} = ${} ",
                param_idx + 1
            ));
            param_idx += 2;
        }

        query.push_str("ORDER BY created_at DESC");

        let mut q = sqlx::query(&query);
        if let Some(id) = filter.id {
            q = q.bind(id);
        }
        if let Some(category) = &filter.category {
            q = q.bind(category);
        }
        if let Some(level) = filter.level {
            q = q.bind(level.as_i16());
        }
        if let Some(text) = &filter.text {
            q = q.bind(format!("%{}%", escape_like(text)));
        }
        for (key, value) in &filter.metadata {
            q = q.bind(key).bind(value);
        }

        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;
        let documents: Vec<Document> = rows.into_iter().map(Self::parse_document_row).collect();

        debug!(
            subsystem = "db",
            component = "documents",
            op = "search",
            result_count = documents.len(),
            "Document search"
        );

        Ok(documents)
    }

    async fn nearest_by_embedding(
        &self,
        query_vec: &Vector,
        limit: i64,
        category: Option<&str>,
        level: Option<DocLevel>,
    ) -> Result<Vec<ScoredDocument>> {
        // Documents without an embedding are excluded rather than ranked last.
        let mut query = format!(
            "SELECT {DOCUMENT_COLUMNS}, 1 - (embedding <=> $1) AS similarity
             FROM document
             WHERE embedding IS NOT NULL "
        );
        let mut param_idx = 2;

        if category.is_some() {
            query.push_str(&format!("AND category = ${param_idx} "));
            param_idx += 1;
        }
        if level.is_some() {
            query.push_str(&format!("AND level = ${param_idx} "));
            param_idx += 1;
        }

        query.push_str(&format!("ORDER BY embedding <=> $1 LIMIT ${param_idx}"));

        let mut q = sqlx::query(&query).bind(query_vec);
        if let Some(category) = category {
            q = q.bind(category);
        }
        if let Some(level) = level {
            q = q.bind(level.as_i16());
        }
        q = q.bind(limit);

        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let similarity: f64 = row.get("similarity");
                ScoredDocument {
                    document: Self::parse_document_row(row),
                    similarity,
                }
            })
            .collect())
    }

    async fn link(&self, source_id: Uuid, summary_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // ANY() guard makes repeated links idempotent.
        sqlx::query(
            "UPDATE document
             SET summary_uuids = array_append(summary_uuids, $2)
             WHERE id = $1 AND NOT ($2 = ANY(summary_uuids))",
        )
        .bind(source_id)
        .bind(summary_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query(
            "UPDATE document
             SET source_uuids = array_append(source_uuids, $2)
             WHERE id = $1 AND NOT ($2 = ANY(source_uuids))",
        )
        .bind(summary_id)
        .bind(source_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "documents",
            op = "link",
            source_id = %source_id,
            summary_id = %summary_id,
            "Linked summary to source"
        );

        Ok(())
    }

    async fn unlink_summary(&self, source_id: Uuid, summary_id: Uuid) -> Result<()> {
        // One-sided on purpose: the summary keeps its source_uuids entry as a
        // record of what it was derived from.
        sqlx::query(
            "UPDATE document
             SET summary_uuids = array_remove(summary_uuids, $2)
             WHERE id = $1",
        )
        .bind(source_id)
        .bind(summary_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn clear_summaries(&self, source_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE document SET summary_uuids = '{}' WHERE id = $1")
            .bind(source_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(())
    }
}
