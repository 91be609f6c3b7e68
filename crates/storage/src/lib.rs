use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{Message, MessageId};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every in-memory connection is its own database.
        let max_connections = if is_memory_url(database_url) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Persists `text` as-is and stamps it with the current time.
    pub async fn insert_message(&self, text: &str) -> Result<Message> {
        self.insert_message_at(text, Utc::now()).await
    }

    pub async fn insert_message_at(&self, text: &str, created_at: DateTime<Utc>) -> Result<Message> {
        let rec = sqlx::query("INSERT INTO messages (text, created_at) VALUES (?, ?) RETURNING id")
            .bind(text)
            .bind(created_at.timestamp_micros())
            .fetch_one(&self.pool)
            .await
            .context("failed to insert message")?;
        let id = MessageId(rec.get::<i64, _>(0));

        // Read back so the caller sees exactly what a later select returns.
        self.get_message(id)
            .await?
            .ok_or_else(|| anyhow!("inserted message {} vanished", id.0))
    }

    pub async fn get_message(&self, id: MessageId) -> Result<Option<Message>> {
        let row = sqlx::query("SELECT id, text, created_at FROM messages WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| message_from_row(&r)).transpose()
    }

    /// Messages newest first. `limit` of `None` returns the whole table.
    pub async fn list_messages(&self, limit: Option<u32>) -> Result<Vec<Message>> {
        let rows = if let Some(limit) = limit {
            sqlx::query(
                "SELECT id, text, created_at
                 FROM messages
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, text, created_at
                 FROM messages
                 ORDER BY created_at DESC, id DESC",
            )
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(message_from_row).collect()
    }

    pub async fn count_messages(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    let micros = row.get::<i64, _>(2);
    let created_at = DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| anyhow!("stored timestamp out of range: {micros}"))?;
    Ok(Message {
        id: MessageId(row.get::<i64, _>(0)),
        text: row.get::<String, _>(1),
        created_at,
    })
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
