//! Error types for action execution

use action_locator::LocatorError;
use cdp_adapter::{AdapterError, AdapterErrorKind};
use pagepilot_core_types::{ActionFailure, FailureKind};
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ActionError {
    /// No element for the requested target
    #[error("target not found: {0}")]
    NotFound(String),

    /// Element exists but cannot take the interaction (disabled, hidden, wrong kind)
    #[error("element not interactable: {0}")]
    NotInteractable(String),

    /// Dropdown or suggestion list has no matching entry
    #[error("option not found: {0}")]
    OptionNotFound(String),

    /// Malformed action parameters
    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("unsupported action: {0}")]
    Unsupported(String),

    #[error("wait timeout: {0}")]
    WaitTimeout(String),

    /// Element was detached between resolution and use
    #[error("stale element: {0}")]
    Stale(String),

    /// A page listener cancelled the interaction
    #[error("interaction intercepted: {0}")]
    Intercepted(String),

    /// Browser connection failure
    #[error("cdp i/o error: {0}")]
    CdpIo(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ActionError {
    pub fn is_retryable(&self) -> bool {
        self.failure_kind().is_transient()
    }

    /// The page cannot be reached at all; the caller should re-establish it.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ActionError::CdpIo(_))
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ActionError::NotFound(_) | ActionError::OptionNotFound(_) => FailureKind::NotFound,
            ActionError::NotInteractable(_) => FailureKind::NotInteractable,
            ActionError::InvalidAction(_) => FailureKind::InvalidAction,
            ActionError::Unsupported(_) => FailureKind::UnsupportedAction,
            ActionError::WaitTimeout(_) => FailureKind::Timeout,
            ActionError::Stale(_) => FailureKind::Stale,
            ActionError::Intercepted(_) => FailureKind::Intercepted,
            ActionError::CdpIo(_) => FailureKind::Network,
            ActionError::Internal(_) => FailureKind::Internal,
        }
    }

    pub fn to_failure(&self) -> ActionFailure {
        let message = match self {
            ActionError::NotFound(m)
            | ActionError::NotInteractable(m)
            | ActionError::OptionNotFound(m)
            | ActionError::InvalidAction(m)
            | ActionError::Unsupported(m)
            | ActionError::WaitTimeout(m)
            | ActionError::Stale(m)
            | ActionError::Intercepted(m)
            | ActionError::CdpIo(m)
            | ActionError::Internal(m) => m.clone(),
        };
        ActionFailure::new(self.failure_kind(), message)
    }
}

impl From<AdapterError> for ActionError {
    fn from(err: AdapterError) -> Self {
        let message = err.to_string();
        match err.kind {
            AdapterErrorKind::StaleNode => ActionError::Stale(message),
            AdapterErrorKind::Timeout => ActionError::WaitTimeout(message),
            AdapterErrorKind::CdpIo => ActionError::CdpIo(message),
            AdapterErrorKind::InvalidSelector => ActionError::InvalidAction(message),
            AdapterErrorKind::ScriptException | AdapterErrorKind::Internal => {
                ActionError::Internal(message)
            }
        }
    }
}

impl From<LocatorError> for ActionError {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::Adapter(inner) => inner.into(),
            other => ActionError::Internal(other.to_string()),
        }
    }
}
