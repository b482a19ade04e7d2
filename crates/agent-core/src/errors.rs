use thiserror::Error;

/// Failures talking to the planner service.
#[derive(Debug, Error, Clone)]
pub enum PlannerError {
    /// Connection refused, reset, DNS failure.
    #[error("planner unreachable: {0}")]
    Transport(String),

    #[error("planner timed out: {0}")]
    Timeout(String),

    /// Non-success response. `transient` is the service's own verdict.
    #[error("planner returned {status}: {message}")]
    Service {
        status: u16,
        message: String,
        transient: bool,
    },

    #[error("malformed planner response: {0}")]
    Decode(String),

    /// The service refused the request (unknown session, missing goal).
    #[error("planner rejected request: {0}")]
    Rejected(String),

    #[error("planner script: {0}")]
    Script(String),
}

impl PlannerError {
    /// Worth one retry with a fresh snapshot.
    pub fn is_transient(&self) -> bool {
        match self {
            PlannerError::Transport(_) | PlannerError::Timeout(_) => true,
            PlannerError::Service {
                status, transient, ..
            } => *transient || *status >= 500,
            PlannerError::Decode(_) | PlannerError::Rejected(_) | PlannerError::Script(_) => false,
        }
    }
}

impl From<reqwest::Error> for PlannerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PlannerError::Timeout(err.to_string())
        } else if err.is_decode() {
            PlannerError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            PlannerError::Service {
                status: status.as_u16(),
                message: err.to_string(),
                transient: false,
            }
        } else {
            PlannerError::Transport(err.to_string())
        }
    }
}

/// Errors emitted by the agent-core crate.
#[derive(Debug, Error, Clone)]
pub enum AgentError {
    /// The page (or every scope of it) cannot be reached.
    #[error("automation surface unavailable: {0}")]
    SurfaceUnavailable(String),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn surface(message: impl Into<String>) -> Self {
        Self::SurfaceUnavailable(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::SurfaceUnavailable(_) => true,
            AgentError::Planner(err) => err.is_transient(),
            AgentError::Config(_) | AgentError::Internal(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_transience() {
        assert!(PlannerError::Timeout("30s".into()).is_transient());
        assert!(PlannerError::Service {
            status: 502,
            message: "Planner error: overloaded".into(),
            transient: false,
        }
        .is_transient());
        assert!(PlannerError::Service {
            status: 429,
            message: "slow down".into(),
            transient: true,
        }
        .is_transient());
        assert!(!PlannerError::Rejected("Session not found".into()).is_transient());

        let wrapped: AgentError = PlannerError::Transport("refused".into()).into();
        assert!(wrapped.is_transient());
        assert!(!AgentError::config("max_steps must be positive").is_transient());
    }
}
