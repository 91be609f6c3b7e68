use anyhow::{anyhow, Context, Result};
use url::Url;

use shared::{domain::DEFAULT_TABLE_NAME, protocol::DEFAULT_CHANNEL_NAME};

const REALTIME_PROTOCOL_VERSION: &str = "1.0.0";

/// Where the table service lives and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    base_url: Url,
    pub anon_key: String,
    pub table: String,
    pub channel: String,
}

impl GatewayConfig {
    pub fn new(base_url: &str, anon_key: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(base_url.trim())
            .with_context(|| format!("invalid backend url: {base_url}"))?;
        match base_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "backend url must start with http:// or https://, got {other}://"
                ))
            }
        }
        Ok(Self {
            base_url,
            anon_key: anon_key.into(),
            table: DEFAULT_TABLE_NAME.to_string(),
            channel: DEFAULT_CHANNEL_NAME.to_string(),
        })
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.base_url.as_str().trim_end_matches('/'),
            self.table
        )
    }

    pub fn realtime_url(&self) -> Result<Url> {
        let mut url = self.base_url.clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| anyhow!("cannot derive websocket url from {}", self.base_url))?;
        let path = format!(
            "{}/realtime/v1/websocket",
            self.base_url.path().trim_end_matches('/')
        );
        url.set_path(&path);
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &self.anon_key)
            .append_pair("vsn", REALTIME_PROTOCOL_VERSION);
        Ok(url)
    }
}
