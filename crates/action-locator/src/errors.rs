//! Error types for the locator

use cdp_adapter::AdapterError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// The page could not be queried at all.
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// The refresh hook failed to produce a new capture.
    #[error("refresh failed: {0}")]
    Refresh(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LocatorError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LocatorError::Adapter(err) => err.retriable,
            LocatorError::Refresh(_) => true,
            LocatorError::Internal(_) => false,
        }
    }

    /// The browser side is gone; retrying resolution cannot help.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, LocatorError::Adapter(err) if err.is_unreachable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::AdapterErrorKind;

    #[test]
    fn unreachable_follows_adapter_kind() {
        let io: LocatorError = AdapterError::new(AdapterErrorKind::CdpIo).into();
        assert!(io.is_unreachable());
        assert!(io.is_retryable());
        let bad: LocatorError = AdapterError::new(AdapterErrorKind::InvalidSelector).into();
        assert!(!bad.is_unreachable());
        assert!(!bad.is_retryable());
    }
}
