//! Terminal gestures, the intents they become, and the user-facing texts the
//! controller raises.

use client_core::{ChannelStatus, InsertFailureKind};
use shared::domain::Message;

/// One parsed line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gesture {
    Submit(String),
    Refresh,
    ClearInput,
    Restart,
    Quit,
}

impl Gesture {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Submit(_) => "submit",
            Self::Refresh => "refresh",
            Self::ClearInput => "clear_input",
            Self::Restart => "restart",
            Self::Quit => "quit",
        }
    }
}

/// What the view asks the coordinator to do after local validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIntent {
    Send(String),
    Refresh,
}

/// What the push channel hands to the application loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Inserted(Message),
    ChannelLost(String),
    ChannelRestored,
}

impl PushEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Inserted(_) => "inserted",
            Self::ChannelLost(_) => "channel_lost",
            Self::ChannelRestored => "channel_restored",
        }
    }
}

impl From<ChannelStatus> for PushEvent {
    fn from(status: ChannelStatus) -> Self {
        match status {
            ChannelStatus::Lost(reason) => Self::ChannelLost(reason),
            ChannelStatus::Restored => Self::ChannelRestored,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "ok",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

pub const CONNECTED: &str = "Connected to the message board.";
pub const STILL_CONNECTING: &str = "Still connecting, please wait a moment...";
pub const CONNECTION_FAILED: &str =
    "Could not reach the server. Check your connection and restart with /restart.";
pub const NOT_CONNECTED: &str = "Not connected. Type /restart to try again.";
pub const LOAD_FAILED: &str = "Could not load messages, please try again.";
pub const REFRESH_FAILED: &str = "Could not refresh messages.";
pub const REFRESHED: &str = "Messages refreshed.";
pub const SENT: &str = "Message sent!";
pub const NEW_MESSAGE: &str = "New message!";
pub const LIVE_UPDATES_UNAVAILABLE: &str = "Live updates are unavailable.";
pub const LIVE_UPDATES_LOST: &str = "Live updates interrupted, reconnecting...";
pub const LIVE_UPDATES_RESTORED: &str = "Live updates are back.";
pub const INPUT_CLEARED: &str = "Input cleared.";

pub fn retrying(attempt: u32, max_retries: u32) -> String {
    format!("Connection failed, retrying ({attempt}/{max_retries})...")
}

pub fn insert_failure_text(kind: InsertFailureKind) -> &'static str {
    match kind {
        InsertFailureKind::Network => {
            "Could not reach the server. Check your internet connection."
        }
        InsertFailureKind::RateLimited => "Sending too fast, wait a moment and try again.",
        InsertFailureKind::Generic => "Could not send the message, please try again.",
    }
}
