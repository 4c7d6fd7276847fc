//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Feed disconnected")]
    Disconnected,

    #[error("Subscription rejected: {0}")]
    SubscriptionRejected(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Event channel closed")]
    ChannelClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FeedResult<T> = Result<T, FeedError>;
