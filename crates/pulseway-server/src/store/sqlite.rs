//! SQLite-backed document store.
//!
//! Documents are JSON bodies keyed by (collection, id). Merging writes run
//! inside a transaction so each call stays atomic at document granularity.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use pulseway_core::DispatchError;
use serde_json::Value;
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use tracing::{info, warn};

use super::{merge_fields, DocumentStore};

/// Documents table behind a connection pool.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const SCHEMA: &str = include_str!("../../migrations/001_init.sql");

/// Open (creating if needed) the database at `db_path` and apply the schema.
///
/// `:memory:` gives a private in-memory database, used by tests.
pub async fn init_database(db_path: &str, max_connections: u32) -> Result<SqliteDocumentStore> {
    if db_path != ":memory:" {
        if let Some(dir) = Path::new(db_path).parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
    }

    info!("Opening document store at {}", db_path);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    // Every statement is IF NOT EXISTS.
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;
    info!("Document store schema ready");

    Ok(SqliteDocumentStore { pool })
}

fn parse_body(raw: &str) -> Result<Value, DispatchError> {
    Ok(serde_json::from_str(raw)?)
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Value>, DispatchError> {
        let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DispatchError::transient)?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("data").map_err(DispatchError::transient)?;
                Ok(Some(parse_body(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        merge: bool,
    ) -> Result<(), DispatchError> {
        let mut tx = self.pool.begin().await.map_err(DispatchError::transient)?;

        let mut body = data;
        if merge {
            let existing = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DispatchError::transient)?;
            if let Some(row) = existing {
                let raw: String = row.try_get("data").map_err(DispatchError::transient)?;
                let mut current = parse_body(&raw)?;
                merge_fields(&mut current, body);
                body = current;
            }
        }

        sqlx::query(
            "INSERT INTO documents (collection, id, data, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(collection)
        .bind(id)
        .bind(body.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(DispatchError::transient)?;

        tx.commit().await.map_err(DispatchError::transient)?;
        Ok(())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), DispatchError> {
        let mut tx = self.pool.begin().await.map_err(DispatchError::transient)?;

        let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(DispatchError::transient)?
            .ok_or_else(|| DispatchError::not_found("document", id))?;

        let raw: String = row.try_get("data").map_err(DispatchError::transient)?;
        let mut current = parse_body(&raw)?;
        merge_fields(&mut current, fields);

        sqlx::query("UPDATE documents SET data = ?, updated_at = ? WHERE collection = ? AND id = ?")
            .bind(current.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(DispatchError::transient)?;

        tx.commit().await.map_err(DispatchError::transient)?;
        Ok(())
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<(String, Value)>, DispatchError> {
        let rows = sqlx::query("SELECT id, data FROM documents WHERE collection = ? ORDER BY id")
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(DispatchError::transient)?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id").map_err(DispatchError::transient)?;
            let raw: String = row.try_get("data").map_err(DispatchError::transient)?;
            match parse_body(&raw) {
                Ok(body) => documents.push((id, body)),
                Err(err) => warn!("Skipping unreadable document {}/{}: {}", collection, id, err),
            }
        }
        Ok(documents)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<bool, DispatchError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DispatchError::transient)?;
        Ok(result.rows_affected() > 0)
    }
}
