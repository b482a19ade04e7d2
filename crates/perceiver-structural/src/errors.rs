use cdp_adapter::AdapterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PerceiverError {
    #[error("adapter: {0}")]
    Adapter(#[from] AdapterError),
    #[error("capture timed out after {0}ms")]
    Timeout(u64),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PerceiverError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a fresh capture attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Adapter(err) => err.retriable,
            Self::Timeout(_) => true,
            Self::Internal(_) => false,
        }
    }

    /// The page itself could not be reached.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Adapter(err) if err.is_unreachable())
    }
}
