//! PostgreSQL Storage - remote document backend
//!
//! Each top-level key is one row of `(key TEXT, value JSONB)`. Nested
//! paths are resolved inside the row's JSON value. Read-modify-write runs
//! inside a transaction with `SELECT ... FOR UPDATE`, so concurrent
//! writers to the same top-level key are serialised by the database.
//!
//! Every call is a network round trip; no retry is attempted here.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::{debug, info};

use super::backend::{Mutator, StorageBackend};
use super::migrations;
use super::path;
use crate::error::{ConfigError, DatabaseError, StoreResult};

/// Default table holding the documents
pub const DEFAULT_TABLE: &str = "leveling_documents";

/// PostgreSQL connection pool wrapper
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
    table: String,
}

impl PostgresBackend {
    /// Connect to PostgreSQL and run migrations
    pub async fn connect(database_url: &str, max_connections: u32, table: &str) -> StoreResult<Self> {
        if !migrations::is_valid_table_name(table) {
            return Err(ConfigError::InvalidValue {
                option: "LEVELING_PG_TABLE",
                value: table.to_string(),
            }
            .into());
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        info!("PostgreSQL connected (max_connections={})", max_connections);

        let store = Self {
            pool,
            table: table.to_string(),
        };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Connect with an existing pool (for testing / shared pools)
    pub fn from_pool(pool: PgPool, table: &str) -> StoreResult<Self> {
        if !migrations::is_valid_table_name(table) {
            return Err(ConfigError::InvalidValue {
                option: "LEVELING_PG_TABLE",
                value: table.to_string(),
            }
            .into());
        }
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    /// Run all pending migrations
    pub async fn run_migrations(&self) -> StoreResult<()> {
        let tracking = migrations::tracking_table(&self.table);
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                name VARCHAR(100) PRIMARY KEY,
                applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )",
            tracking
        ))
        .execute(&self.pool)
        .await?;

        for (name, sql) in migrations::get_migrations(&self.table) {
            let applied: bool = sqlx::query_scalar(&format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE name = $1)",
                tracking
            ))
            .bind(&name)
            .fetch_one(&self.pool)
            .await?;

            if !applied {
                info!("Running migration: {}", name);
                sqlx::raw_sql(&sql)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| DatabaseError::Migration(format!("{}: {}", name, e)))?;

                sqlx::query(&format!("INSERT INTO {} (name) VALUES ($1)", tracking))
                    .bind(&name)
                    .execute(&self.pool)
                    .await?;

                info!("Migration applied: {}", name);
            } else {
                debug!("Migration already applied: {}", name);
            }
        }

        Ok(())
    }

    async fn fetch_entry(&self, key: &str) -> StoreResult<Option<Value>> {
        let row: Option<Json<Value>> =
            sqlx::query_scalar(&format!("SELECT value FROM {} WHERE key = $1", self.table))
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|Json(value)| value))
    }

    fn upsert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
            self.table
        )
    }

    fn select_for_update_sql(&self) -> String {
        format!("SELECT value FROM {} WHERE key = $1 FOR UPDATE", self.table)
    }
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let top = path::top_level(key)?;
        let rest = path::remainder(key)?;
        let entry = self.fetch_entry(top).await?;
        Ok(match rest {
            None => entry,
            Some(rest) => entry.and_then(|e| path::get(&e, rest).cloned()),
        })
    }

    async fn modify(&self, key: &str, mutate: Mutator) -> StoreResult<Value> {
        let top = path::top_level(key)?;
        let rest = path::remainder(key)?;

        let mut tx = self.pool.begin().await?;
        let existing: Option<Json<Value>> = sqlx::query_scalar(&self.select_for_update_sql())
            .bind(top)
            .fetch_optional(&mut *tx)
            .await?;
        let existing = existing.map(|Json(value)| value);

        let (entry, next) = match rest {
            None => {
                let next = mutate(existing.as_ref())?;
                (next.clone(), next)
            }
            Some(rest) => {
                let mut entry = existing.unwrap_or_else(|| Value::Object(Map::new()));
                let next = mutate(path::get(&entry, rest))?;
                path::set(&mut entry, rest, next.clone())?;
                (entry, next)
            }
        };

        sqlx::query(&self.upsert_sql())
            .bind(top)
            .bind(Json(&entry))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!("PostgreSQL SET {}", key);
        Ok(next)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let top = path::top_level(key)?;
        let rest = path::remainder(key)?;

        match rest {
            None => {
                sqlx::query(&format!("DELETE FROM {} WHERE key = $1", self.table))
                    .bind(top)
                    .execute(&self.pool)
                    .await?;
            }
            Some(rest) => {
                let mut tx = self.pool.begin().await?;
                let existing: Option<Json<Value>> = sqlx::query_scalar(&self.select_for_update_sql())
                    .bind(top)
                    .fetch_optional(&mut *tx)
                    .await?;
                let mut entry = existing
                    .map(|Json(value)| value)
                    .unwrap_or_else(|| Value::Object(Map::new()));
                path::delete(&mut entry, rest)?;
                sqlx::query(&self.upsert_sql())
                    .bind(top)
                    .bind(Json(&entry))
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
            }
        }

        debug!("PostgreSQL DELETE {}", key);
        Ok(true)
    }

    async fn clear_all(&self) -> StoreResult<bool> {
        sqlx::query(&format!("DELETE FROM {}", self.table))
            .execute(&self.pool)
            .await?;
        info!("PostgreSQL table {} cleared", self.table);
        Ok(true)
    }

    async fn fetch_everything(&self) -> StoreResult<Value> {
        let rows: Vec<(String, Json<Value>)> =
            sqlx::query_as(&format!("SELECT key, value FROM {}", self.table))
                .fetch_all(&self.pool)
                .await?;
        debug!("PostgreSQL fetched {} rows", rows.len());
        Ok(path::fold(rows.into_iter().map(|(key, Json(value))| (key, value))))
    }
}
