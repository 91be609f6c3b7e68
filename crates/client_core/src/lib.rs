//! Remote data gateway for the message board.
//!
//! [`MessageGateway`] is the seam the coordinator talks to; [`RestGateway`]
//! implements it against a hosted table service over HTTPS plus a realtime
//! websocket.

use std::sync::Arc;

use async_trait::async_trait;
use shared::domain::Message;

pub mod error;
mod realtime;
pub mod transport;
pub mod types;

pub use error::{GatewayError, InsertFailureKind};
pub use transport::RestGateway;
pub use types::GatewayConfig;

/// Invoked once per row inserted anywhere, this client's own inserts included.
pub type InsertCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// Invoked when an open push channel drops and again once it is rejoined.
pub type StatusCallback = Arc<dyn Fn(ChannelStatus) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// The socket or the topic went away; redialing in the background.
    Lost(String),
    Restored,
}

#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Cheap existence probe against the message table.
    async fn connect(&self) -> Result<(), GatewayError>;
    /// Every message, newest first.
    async fn fetch_all(&self) -> Result<Vec<Message>, GatewayError>;
    /// Trims and persists `text`, returning the stored record.
    async fn insert(&self, text: &str) -> Result<Message, GatewayError>;
    /// Joins the insert feed. Inserts missed while the channel was lost are
    /// not replayed; `on_status` reports the gap.
    async fn subscribe_to_inserts(
        &self,
        on_insert: InsertCallback,
        on_status: StatusCallback,
    ) -> Result<(), GatewayError>;
    /// Closes every open push channel. Safe to call repeatedly.
    async fn teardown(&self);
}

#[async_trait]
impl<T> MessageGateway for Arc<T>
where
    T: MessageGateway + ?Sized,
{
    async fn connect(&self) -> Result<(), GatewayError> {
        (**self).connect().await
    }

    async fn fetch_all(&self) -> Result<Vec<Message>, GatewayError> {
        (**self).fetch_all().await
    }

    async fn insert(&self, text: &str) -> Result<Message, GatewayError> {
        (**self).insert(text).await
    }

    async fn subscribe_to_inserts(
        &self,
        on_insert: InsertCallback,
        on_status: StatusCallback,
    ) -> Result<(), GatewayError> {
        (**self).subscribe_to_inserts(on_insert, on_status).await
    }

    async fn teardown(&self) {
        (**self).teardown().await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
