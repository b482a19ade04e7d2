//! Page lifecycle on top of a [`CdpTransport`]: open a tab, attach a flat
//! session, navigate and wait for the document to settle.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::config::CdpConfig;
use crate::dom::{CdpDomPort, DomPort};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::transport::{CdpTransport, CommandTarget};

const READY_POLL: Duration = Duration::from_millis(100);

/// An out-of-process frame exposed as its own DOM port.
#[derive(Clone)]
pub struct FrameTarget {
    pub target_id: String,
    pub url: String,
    pub port: Arc<CdpDomPort>,
}

/// One browser tab driven over CDP.
pub struct CdpPage {
    transport: Arc<dyn CdpTransport>,
    target_id: String,
    port: Arc<CdpDomPort>,
    frames: DashMap<String, FrameTarget>,
    load_timeout: Duration,
}

impl CdpPage {
    /// Create a tab, attach to it and optionally load `url`.
    pub async fn open(
        transport: Arc<dyn CdpTransport>,
        cfg: &CdpConfig,
        url: Option<&str>,
    ) -> Result<Self, AdapterError> {
        transport.start().await?;
        let created = transport
            .send_command(
                CommandTarget::Browser,
                "Target.createTarget",
                json!({ "url": "about:blank" }),
            )
            .await?;
        let target_id = string_field(&created, "targetId")?;
        let session_id = attach(transport.as_ref(), &target_id).await?;

        let port = Arc::new(CdpDomPort::new(
            transport.clone(),
            session_id.clone(),
            Some(target_id.clone()),
        ));
        transport
            .send_command(
                CommandTarget::Session(session_id),
                "Page.enable",
                json!({}),
            )
            .await?;
        port.install_hooks().await?;

        let page = Self {
            transport,
            target_id,
            port,
            frames: DashMap::new(),
            load_timeout: Duration::from_millis(cfg.load_timeout_ms),
        };
        info!(target: "cdp-page", target_id = %page.target_id, "page opened");
        if let Some(url) = url {
            page.navigate(url).await?;
        }
        Ok(page)
    }

    pub fn port(&self) -> Arc<CdpDomPort> {
        self.port.clone()
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Navigate and wait until `document.readyState` is no longer `loading`.
    pub async fn navigate(&self, url: &str) -> Result<(), AdapterError> {
        self.port.release_objects().await?;
        let reply = self
            .transport
            .send_command(
                CommandTarget::Session(self.port.session_id()),
                "Page.navigate",
                json!({ "url": url }),
            )
            .await?;
        if let Some(error) = reply.get("errorText").and_then(Value::as_str) {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("navigation to {url} failed: {error}")));
        }
        self.wait_ready().await
    }

    async fn wait_ready(&self) -> Result<(), AdapterError> {
        let deadline = Instant::now() + self.load_timeout;
        loop {
            // the old document may still answer right after Page.navigate
            match self.port.page_info().await {
                Ok(_) => {
                    if self.ready_state().await.as_deref() != Some("loading") {
                        return Ok(());
                    }
                }
                Err(err) if err.kind == AdapterErrorKind::StaleNode => {}
                Err(err) => return Err(err),
            }
            if Instant::now() >= deadline {
                return Err(AdapterError::new(AdapterErrorKind::Timeout)
                    .with_hint("document did not finish loading"));
            }
            sleep(READY_POLL).await;
        }
    }

    async fn ready_state(&self) -> Option<String> {
        let reply = self
            .transport
            .send_command(
                CommandTarget::Session(self.port.session_id()),
                "Runtime.evaluate",
                json!({ "expression": "document.readyState", "returnByValue": true }),
            )
            .await
            .ok()?;
        reply
            .pointer("/result/value")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Out-of-process iframes belonging to the browser, each behind its own port.
    pub async fn frame_targets(&self) -> Result<Vec<FrameTarget>, AdapterError> {
        let reply = self
            .transport
            .send_command(CommandTarget::Browser, "Target.getTargets", json!({}))
            .await?;
        let infos = reply
            .get("targetInfos")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut live = Vec::new();
        for info in infos {
            if info.get("type").and_then(Value::as_str) != Some("iframe") {
                continue;
            }
            let Some(target_id) = info.get("targetId").and_then(Value::as_str) else {
                continue;
            };
            let url = info
                .get("url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            live.push(target_id.to_string());
            if let Some(mut known) = self.frames.get_mut(target_id) {
                known.url = url;
                continue;
            }
            match attach(self.transport.as_ref(), target_id).await {
                Ok(session) => {
                    let port = Arc::new(CdpDomPort::new(
                        self.transport.clone(),
                        session,
                        Some(target_id.to_string()),
                    ));
                    if let Err(err) = port.install_hooks().await {
                        debug!(target: "cdp-page", %err, target_id, "frame hooks unavailable");
                    }
                    self.frames.insert(
                        target_id.to_string(),
                        FrameTarget {
                            target_id: target_id.to_string(),
                            url,
                            port,
                        },
                    );
                }
                Err(err) => debug!(target: "cdp-page", %err, target_id, "frame attach failed"),
            }
        }
        self.frames.retain(|id, _| live.contains(id));
        let mut frames: Vec<FrameTarget> = self.frames.iter().map(|f| f.value().clone()).collect();
        frames.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        Ok(frames)
    }

    pub async fn close(&self) -> Result<(), AdapterError> {
        self.transport
            .send_command(
                CommandTarget::Browser,
                "Target.closeTarget",
                json!({ "targetId": self.target_id }),
            )
            .await
            .map(|_| ())
    }
}

async fn attach(transport: &dyn CdpTransport, target_id: &str) -> Result<String, AdapterError> {
    let reply = transport
        .send_command(
            CommandTarget::Browser,
            "Target.attachToTarget",
            json!({ "targetId": target_id, "flatten": true }),
        )
        .await?;
    string_field(&reply, "sessionId")
}

fn string_field(reply: &Value, key: &str) -> Result<String, AdapterError> {
    reply
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::CdpIo).with_hint(format!("reply without {key}"))
        })
}
