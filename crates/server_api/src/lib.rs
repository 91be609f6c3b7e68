use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use serde::Deserialize;
use shared::{
    domain::{char_len, Message, NewMessage},
    error::{ApiError, ErrorCode},
};
use storage::Storage;
use tracing::warn;

const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub table: String,
    pub max_message_length: usize,
    pub insert_limiter: Arc<Mutex<InsertRateLimiter>>,
}

impl ApiContext {
    pub fn new(
        storage: Storage,
        table: impl Into<String>,
        max_message_length: usize,
        inserts_per_minute: usize,
    ) -> Self {
        Self {
            storage,
            table: table.into(),
            max_message_length,
            insert_limiter: Arc::new(Mutex::new(InsertRateLimiter::new(inserts_per_minute))),
        }
    }
}

/// Fixed one-minute window over all inserts.
pub struct InsertRateLimiter {
    limit: usize,
    window_started: Instant,
    used: usize,
}

impl InsertRateLimiter {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            window_started: Instant::now(),
            used: 0,
        }
    }

    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&mut self, now: Instant) -> bool {
        if now.duration_since(self.window_started) >= RATE_LIMIT_WINDOW {
            self.window_started = now;
            self.used = 0;
        }
        if self.used < self.limit {
            self.used += 1;
            true
        } else {
            false
        }
    }
}

/// The subset of table-service query parameters the board uses.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SelectQuery {
    pub select: Option<String>,
    pub order: Option<String>,
    pub limit: Option<u32>,
}

impl SelectQuery {
    fn newest_first(&self) -> Result<bool, ApiError> {
        match self.order.as_deref() {
            None | Some("created_at.desc") => Ok(true),
            Some("created_at.asc") => Ok(false),
            Some(other) => Err(ApiError::new(
                ErrorCode::Validation,
                format!("unsupported order '{other}'"),
            )),
        }
    }
}

pub async fn list_messages(
    ctx: &ApiContext,
    table: &str,
    query: &SelectQuery,
) -> Result<Vec<Message>, ApiError> {
    ensure_table(ctx, table)?;
    let newest_first = query.newest_first()?;

    let mut messages = ctx
        .storage
        .list_messages(if newest_first { query.limit } else { None })
        .await
        .map_err(internal)?;

    if !newest_first {
        messages.reverse();
        if let Some(limit) = query.limit {
            messages.truncate(limit as usize);
        }
    }
    Ok(messages)
}

pub async fn insert_messages(
    ctx: &ApiContext,
    table: &str,
    rows: Vec<NewMessage>,
) -> Result<Vec<Message>, ApiError> {
    ensure_table(ctx, table)?;
    if rows.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "no rows to insert"));
    }

    let mut validated = Vec::with_capacity(rows.len());
    for row in rows {
        validated.push(validate_text(&row.text, ctx.max_message_length)?);
    }

    {
        let mut limiter = ctx
            .insert_limiter
            .lock()
            .map_err(|_| ApiError::new(ErrorCode::Internal, "rate limiter poisoned"))?;
        if !limiter.allow() {
            warn!(table, "insert rejected by rate limit");
            return Err(ApiError::new(ErrorCode::RateLimited, "rate limit exceeded"));
        }
    }

    let mut inserted = Vec::with_capacity(validated.len());
    for text in validated {
        let message = ctx.storage.insert_message(&text).await.map_err(internal)?;
        inserted.push(message);
    }
    Ok(inserted)
}

pub fn validate_text(text: &str, max_message_length: usize) -> Result<String, ApiError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "text must not be empty"));
    }
    if char_len(trimmed) > max_message_length {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("text exceeds {max_message_length} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

fn ensure_table(ctx: &ApiContext, table: &str) -> Result<(), ApiError> {
    if table != ctx.table {
        return Err(ApiError::new(
            ErrorCode::NotFound,
            format!("relation \"public.{table}\" does not exist"),
        ));
    }
    Ok(())
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}
