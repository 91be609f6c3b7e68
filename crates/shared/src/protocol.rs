//! Realtime push-channel frames.
//!
//! The hosted service speaks a Phoenix-channel dialect: every frame is a JSON
//! object carrying a topic, an event name, a payload, and an optional ref used
//! to correlate replies.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

pub const PHOENIX_TOPIC: &str = "phoenix";
pub const DEFAULT_CHANNEL_NAME: &str = "messages_channel";
pub const PUBLIC_SCHEMA: &str = "public";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealtimeEvent {
    PhxJoin,
    PhxLeave,
    PhxReply,
    PhxError,
    PhxClose,
    Heartbeat,
    PostgresChanges,
    System,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeFrame {
    pub topic: String,
    pub event: RealtimeEvent,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    #[serde(rename = "*")]
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresChangeFilter {
    pub event: ChangeKind,
    pub schema: String,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgresChange {
    pub schema: String,
    pub table: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub record: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgresChangesPayload {
    pub data: PostgresChange,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<i64>,
}

impl PostgresChangesPayload {
    /// Decodes the inserted row, or `None` when the change is not an insert
    /// on `table`.
    pub fn inserted_record<T: DeserializeOwned>(
        &self,
        table: &str,
    ) -> Option<serde_json::Result<T>> {
        if self.data.kind != ChangeKind::Insert || self.data.table != table {
            return None;
        }
        Some(serde_json::from_value(self.data.record.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Ok,
    Error,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub status: ReplyStatus,
    #[serde(default)]
    pub response: Value,
}

pub fn channel_topic(channel: &str) -> String {
    format!("realtime:{channel}")
}

impl RealtimeFrame {
    pub fn join_inserts(topic: &str, table: &str, reference: impl Into<String>) -> Self {
        let filter = PostgresChangeFilter {
            event: ChangeKind::Insert,
            schema: PUBLIC_SCHEMA.to_string(),
            table: table.to_string(),
        };
        Self {
            topic: topic.to_string(),
            event: RealtimeEvent::PhxJoin,
            payload: json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [filter],
                }
            }),
            reference: Some(reference.into()),
        }
    }

    pub fn leave(topic: &str, reference: impl Into<String>) -> Self {
        Self {
            topic: topic.to_string(),
            event: RealtimeEvent::PhxLeave,
            payload: json!({}),
            reference: Some(reference.into()),
        }
    }

    pub fn heartbeat(reference: impl Into<String>) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: RealtimeEvent::Heartbeat,
            payload: json!({}),
            reference: Some(reference.into()),
        }
    }

    pub fn reply(topic: &str, reference: Option<String>, status: ReplyStatus, response: Value) -> Self {
        Self {
            topic: topic.to_string(),
            event: RealtimeEvent::PhxReply,
            payload: json!({ "status": status, "response": response }),
            reference,
        }
    }

    pub fn postgres_insert(topic: &str, table: &str, record: Value) -> Self {
        let change = PostgresChangesPayload {
            data: PostgresChange {
                schema: PUBLIC_SCHEMA.to_string(),
                table: table.to_string(),
                kind: ChangeKind::Insert,
                commit_timestamp: Some(Utc::now()),
                record,
            },
            ids: Vec::new(),
        };
        Self {
            topic: topic.to_string(),
            event: RealtimeEvent::PostgresChanges,
            payload: serde_json::to_value(change).unwrap_or(Value::Null),
            reference: None,
        }
    }

    /// Extracts the postgres filters a join frame asks for.
    pub fn join_filters(&self) -> Vec<PostgresChangeFilter> {
        self.payload
            .get("config")
            .and_then(|config| config.get("postgres_changes"))
            .and_then(|filters| serde_json::from_value(filters.clone()).ok())
            .unwrap_or_default()
    }

    pub fn reply_payload(&self) -> Option<ReplyPayload> {
        if self.event != RealtimeEvent::PhxReply {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }

    pub fn changes_payload(&self) -> Option<serde_json::Result<PostgresChangesPayload>> {
        if self.event != RealtimeEvent::PostgresChanges {
            return None;
        }
        Some(serde_json::from_value(self.payload.clone()))
    }
}
