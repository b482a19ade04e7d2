use async_trait::async_trait;
use cdp_adapter::DomPort;

use crate::errors::PerceiverError;
use crate::model::Capture;

/// Produces snapshots of the currently reachable document.
#[async_trait]
pub trait SnapshotExtractor: Send + Sync {
    async fn capture(&self, port: &dyn DomPort) -> Result<Capture, PerceiverError>;
}
