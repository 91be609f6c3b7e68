use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use shared::domain::{Message, NewMessage};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    error::GatewayError,
    realtime::{open_insert_subscription, RealtimeSubscription},
    types::GatewayConfig,
    InsertCallback, MessageGateway, StatusCallback,
};

pub struct RestGateway {
    http: Client,
    config: GatewayConfig,
    subscriptions: Mutex<Vec<RealtimeSubscription>>,
}

/// Error bodies come in a few shapes; all of them carry `message`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl RestGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub async fn open_subscription_count(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.config.anon_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, String> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|err| format!("network request failed: {err}"))?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message.or(b.error))
            .unwrap_or(body);
        Err(format!("HTTP {}: {detail}", status.as_u16()))
    }
}

#[async_trait]
impl MessageGateway for RestGateway {
    async fn connect(&self) -> Result<(), GatewayError> {
        let request = self
            .http
            .get(self.config.table_url())
            .query(&[("select", "id"), ("limit", "1")]);
        let response = self.send(request).await.map_err(|err| {
            error!(table = %self.config.table, "gateway: connection probe failed: {err}");
            GatewayError::Connectivity(err)
        })?;
        // A probe that answers with something other than rows means the url
        // points at the wrong service.
        response
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|err| GatewayError::Connectivity(format!("unexpected probe response: {err}")))?;
        info!(base_url = %self.config.base_url(), table = %self.config.table, "gateway: connected");
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<Message>, GatewayError> {
        let request = self
            .http
            .get(self.config.table_url())
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        let response = self.send(request).await.map_err(|err| {
            error!("gateway: loading messages failed: {err}");
            GatewayError::Query(err)
        })?;
        let messages: Option<Vec<Message>> = response
            .json()
            .await
            .map_err(|err| GatewayError::Query(format!("malformed message list: {err}")))?;
        let messages = messages.unwrap_or_default();
        debug!(count = messages.len(), "gateway: messages loaded");
        Ok(messages)
    }

    async fn insert(&self, text: &str) -> Result<Message, GatewayError> {
        let body = [NewMessage::new(text)];
        let request = self
            .http
            .post(self.config.table_url())
            .header("Prefer", "return=representation")
            .json(&body);
        let response = self.send(request).await.map_err(|err| {
            error!("gateway: insert failed: {err}");
            GatewayError::insert(err)
        })?;
        let mut rows: Vec<Message> = response
            .json()
            .await
            .map_err(|err| GatewayError::insert(format!("malformed insert response: {err}")))?;
        if rows.is_empty() {
            return Err(GatewayError::insert("insert returned no rows"));
        }
        let message = rows.swap_remove(0);
        info!(id = message.id.0, "gateway: message inserted");
        Ok(message)
    }

    async fn subscribe_to_inserts(
        &self,
        on_insert: InsertCallback,
        on_status: StatusCallback,
    ) -> Result<(), GatewayError> {
        let subscription = open_insert_subscription(&self.config, on_insert, on_status)
            .await
            .map_err(|err| {
                warn!("gateway: realtime subscription failed: {err:#}");
                GatewayError::Subscription(format!("{err:#}"))
            })?;
        info!(topic = %subscription.topic(), "gateway: subscribed to inserts");
        self.subscriptions.lock().await.push(subscription);
        Ok(())
    }

    async fn teardown(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock().await);
        if subscriptions.is_empty() {
            debug!("gateway: teardown with no open channels");
            return;
        }
        let count = subscriptions.len();
        for subscription in subscriptions {
            subscription.close().await;
        }
        info!(count, "gateway: closed realtime channels");
    }
}
