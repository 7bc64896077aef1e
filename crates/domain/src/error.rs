use thiserror::Error;

/// Everything the feed can report back to the presentation layer.
/// None of these are fatal; each one can be retried by the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("{0}")]
    Validation(String),

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("comment store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("a submission is already in flight")]
    Busy,

    #[error("feed controller already started")]
    AlreadyStarted,
}

impl FeedError {
    pub fn store(err: &anyhow::Error) -> Self {
        FeedError::StoreUnavailable(format!("{:#}", err))
    }

    /// Whether the same action may succeed if the user simply tries again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FeedError::StoreUnavailable(_) | FeedError::Busy)
    }
}
