use thiserror::Error;

/// Coarse class of an insert failure, derived from the failure text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertFailureKind {
    Network,
    RateLimited,
    Generic,
}

impl InsertFailureKind {
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("network") || lower.contains("fetch") {
            Self::Network
        } else if lower.contains("rate limit") || lower.contains("too many requests") {
            Self::RateLimited
        } else {
            Self::Generic
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("backend unreachable or misconfigured: {0}")]
    Connectivity(String),
    #[error("failed to load messages: {0}")]
    Query(String),
    #[error("failed to insert message: {message}")]
    Insert {
        kind: InsertFailureKind,
        message: String,
    },
    #[error("failed to subscribe to inserts: {0}")]
    Subscription(String),
}

impl GatewayError {
    pub fn insert(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Insert {
            kind: InsertFailureKind::classify(&message),
            message,
        }
    }

    pub fn insert_kind(&self) -> Option<InsertFailureKind> {
        match self {
            Self::Insert { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
