//! Automation surface: what the loop drives.
//!
//! A page is one or more scopes (the top document plus out-of-process frames),
//! each reachable through its own [`DomPort`] with its own registry and executor.

use std::sync::Arc;

use action_locator::ElementRegistry;
use action_primitives::{Executor, ExecutorConfig};
use async_trait::async_trait;
use cdp_adapter::DomPort;
use pagepilot_core_types::{ActionDescriptor, ActionResult, ScopeId, SessionId, Snapshot};
use perceiver_structural::StructuralExtractor;
use tracing::{debug, warn};

use crate::errors::AgentError;

#[async_trait]
pub trait AutomationSurface: Send + Sync {
    /// Reachable scopes, main first.
    fn scopes(&self) -> Vec<ScopeId>;

    async fn capture(&self, session: &SessionId, scope: &ScopeId) -> Result<Snapshot, AgentError>;

    /// Perform one action. `target_uid` may carry a `scope:` prefix.
    async fn perform(
        &self,
        session: &SessionId,
        action: &ActionDescriptor,
    ) -> Result<ActionResult, AgentError>;

    async fn ping(&self) -> Result<(), AgentError>;

    /// Bring an unreachable page back.
    async fn reestablish(&self) -> Result<(), AgentError>;
}

/// Prefix a uid with its scope for a merged snapshot.
///
/// Main-scope uids stay bare unless they contain `:`, in which case they are
/// written `main:<uid>` so they can never read as another scope's uid.
pub fn scoped_uid(scope: &ScopeId, uid: &str) -> String {
    if scope.is_main() && !uid.contains(':') {
        uid.to_string()
    } else {
        format!("{scope}:{uid}")
    }
}

/// Split a merged-snapshot uid into scope name and local uid.
///
/// Only `main` and the names in `scopes` count as prefixes; anything else is a
/// bare main-scope uid and yields `None`.
pub fn split_scoped_uid<'a>(uid: &'a str, scopes: &[ScopeId]) -> Option<(&'a str, &'a str)> {
    let (prefix, rest) = uid.split_once(':')?;
    if rest.is_empty() {
        return None;
    }
    let known = prefix == ScopeId::MAIN || scopes.iter().any(|scope| scope.as_str() == prefix);
    known.then_some((prefix, rest))
}

struct Scope {
    id: ScopeId,
    port: Arc<dyn DomPort>,
    executor: Executor,
}

/// [`AutomationSurface`] over DOM ports.
pub struct DomSurface {
    scopes: Vec<Scope>,
}

impl DomSurface {
    /// A surface with only the main scope.
    pub fn single(port: Arc<dyn DomPort>, executor: Executor) -> Self {
        Self {
            scopes: vec![Scope {
                id: ScopeId::main(),
                port,
                executor,
            }],
        }
    }

    /// Main scope with a default extractor and registry.
    pub fn standard(port: Arc<dyn DomPort>, config: ExecutorConfig) -> Self {
        Self::single(port, standard_executor(config))
    }

    /// Add a further scope, such as an out-of-process frame.
    pub fn with_scope(mut self, id: ScopeId, port: Arc<dyn DomPort>, executor: Executor) -> Self {
        self.scopes.retain(|scope| scope.id != id);
        self.scopes.push(Scope { id, port, executor });
        self
    }

    fn scope(&self, id: &ScopeId) -> Result<&Scope, AgentError> {
        self.scopes
            .iter()
            .find(|scope| &scope.id == id)
            .ok_or_else(|| AgentError::Internal(format!("unknown scope {id}")))
    }

    fn main(&self) -> Result<&Scope, AgentError> {
        self.scopes
            .first()
            .ok_or_else(|| AgentError::surface("no scopes attached"))
    }

    /// Pick the scope a uid belongs to and the uid as that scope knows it.
    ///
    /// With a single scope uids are never prefixed and go through verbatim.
    fn route<'a>(&'a self, uid: Option<&'a str>) -> Result<(&'a Scope, Option<&'a str>), AgentError> {
        if self.scopes.len() > 1 {
            let known = self.scopes();
            if let Some((prefix, rest)) = uid.and_then(|uid| split_scoped_uid(uid, &known)) {
                if let Some(scope) = self.scopes.iter().find(|scope| scope.id.as_str() == prefix) {
                    return Ok((scope, Some(rest)));
                }
            }
        }
        Ok((self.main()?, uid))
    }
}

pub fn standard_executor(config: ExecutorConfig) -> Executor {
    Executor::new(
        config,
        Arc::new(StructuralExtractor::default()),
        Arc::new(ElementRegistry::default()),
    )
}

#[async_trait]
impl AutomationSurface for DomSurface {
    fn scopes(&self) -> Vec<ScopeId> {
        self.scopes.iter().map(|scope| scope.id.clone()).collect()
    }

    async fn capture(&self, session: &SessionId, scope: &ScopeId) -> Result<Snapshot, AgentError> {
        let entry = self.scope(scope)?;
        match entry.executor.capture(entry.port.as_ref()).await {
            Ok(capture) => {
                debug!(%session, %scope, elements = capture.snapshot.len(), "scope captured");
                Ok(capture.snapshot)
            }
            Err(err) if err.is_unreachable() => Err(AgentError::surface(format!("{scope}: {err}"))),
            Err(err) => Err(AgentError::Internal(format!("capture of {scope} failed: {err}"))),
        }
    }

    async fn perform(
        &self,
        session: &SessionId,
        action: &ActionDescriptor,
    ) -> Result<ActionResult, AgentError> {
        let (scope, uid) = self.route(action.target_uid.as_deref())?;
        let mut local = action.clone();
        local.target_uid = uid.map(str::to_string);
        debug!(%session, scope = %scope.id, action = %action.kind, "dispatching to scope");

        match scope.executor.perform(scope.port.as_ref(), &local).await {
            Ok(mut result) => {
                if result.target_uid.is_some() {
                    result.target_uid = action.target_uid.clone();
                }
                Ok(result)
            }
            Err(err) if err.is_unreachable() => {
                Err(AgentError::surface(format!("{}: {err}", scope.id)))
            }
            Err(err) => Err(AgentError::Internal(err.to_string())),
        }
    }

    async fn ping(&self) -> Result<(), AgentError> {
        let main = self.main()?;
        main.port
            .ping()
            .await
            .map_err(|err| AgentError::surface(err.to_string()))
    }

    async fn reestablish(&self) -> Result<(), AgentError> {
        let main = self.main()?;
        main.port
            .reconnect()
            .await
            .map_err(|err| AgentError::surface(format!("reconnect failed: {err}")))?;
        for scope in self.scopes.iter().skip(1) {
            if let Err(err) = scope.port.reconnect().await {
                warn!(scope = %scope.id, %err, "frame scope not re-established");
            }
        }
        main.port
            .ping()
            .await
            .map_err(|err| AgentError::surface(err.to_string()))
    }
}
