use std::{fs, path::Path, str::FromStr, time::Duration};

use anyhow::Context;
use client_core::GatewayConfig;
use serde::Deserialize;
use shared::{
    domain::{DEFAULT_MAX_MESSAGE_LENGTH, DEFAULT_TABLE_NAME},
    protocol::DEFAULT_CHANNEL_NAME,
};
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "board.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub backend_url: String,
    pub anon_key: String,
    pub table: String,
    pub channel: String,
    pub toast_duration_ms: u64,
    pub max_message_length: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:54321".into(),
            anon_key: "dev-anon-key".into(),
            table: DEFAULT_TABLE_NAME.into(),
            channel: DEFAULT_CHANNEL_NAME.into(),
            toast_duration_ms: 3000,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

/// Keys accepted in `board.toml`; anything absent keeps its current value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    backend_url: Option<String>,
    anon_key: Option<String>,
    table: Option<String>,
    channel: Option<String>,
    toast_duration_ms: Option<u64>,
    max_message_length: Option<usize>,
}

impl Settings {
    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_duration_ms)
    }

    pub fn gateway_config(&self) -> anyhow::Result<GatewayConfig> {
        let config = GatewayConfig::new(&self.backend_url, self.anon_key.clone())
            .context("invalid board backend settings")?
            .with_table(self.table.clone())
            .with_channel(self.channel.clone());
        Ok(config)
    }
}

/// Defaults, then the config file, then the environment. An explicitly given
/// file must exist; the default one is optional.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match config_path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{}'", path.display()))?;
            apply_file_overrides(&mut settings, &raw)
                .with_context(|| format!("invalid config file '{}'", path.display()))?;
        }
        None => {
            if let Ok(raw) = fs::read_to_string(DEFAULT_CONFIG_FILE) {
                apply_file_overrides(&mut settings, &raw)
                    .with_context(|| format!("invalid config file '{DEFAULT_CONFIG_FILE}'"))?;
            }
        }
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file_overrides(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file: FileSettings = toml::from_str(raw)?;

    if let Some(v) = file.backend_url {
        settings.backend_url = v;
    }
    if let Some(v) = file.anon_key {
        settings.anon_key = v;
    }
    if let Some(v) = file.table {
        settings.table = v;
    }
    if let Some(v) = file.channel {
        settings.channel = v;
    }
    if let Some(v) = file.toast_duration_ms {
        settings.toast_duration_ms = v;
    }
    if let Some(v) = file.max_message_length {
        settings.max_message_length = v;
    }
    Ok(())
}

fn apply_env_overrides(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    // the APP__ spelling wins; report whichever name supplied the value
    let either = |name: &'static str, app_name: &'static str| {
        var(app_name)
            .map(|v| (app_name, v))
            .or_else(|| var(name).map(|v| (name, v)))
    };

    if let Some((_, v)) = either("BOARD_BACKEND_URL", "APP__BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Some((_, v)) = either("BOARD_ANON_KEY", "APP__ANON_KEY") {
        settings.anon_key = v;
    }
    if let Some((_, v)) = either("BOARD_TABLE", "APP__TABLE") {
        settings.table = v;
    }
    if let Some((_, v)) = either("BOARD_CHANNEL", "APP__CHANNEL") {
        settings.channel = v;
    }
    if let Some((name, v)) = either("BOARD_TOAST_DURATION_MS", "APP__TOAST_DURATION_MS") {
        if let Some(parsed) = parse_number(name, &v) {
            settings.toast_duration_ms = parsed;
        }
    }
    if let Some((name, v)) = either("BOARD_MAX_MESSAGE_LENGTH", "APP__MAX_MESSAGE_LENGTH") {
        if let Some(parsed) = parse_number(name, &v) {
            settings.max_message_length = parsed;
        }
    }
}

/// `None`, with a warning, when `value` is not a number; the setting keeps
/// its previous value.
fn parse_number<T: FromStr>(variable: &str, value: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!(variable, value, "config: ignoring unparsable number: {err}");
            None
        }
    }
}
