use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, Message, MethodId, Response};
use futures::{future::BoxFuture, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::util::extract_ws_url;

/// Where a raw CDP command is routed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

/// Raw JSON command channel to the browser.
#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn start(&self) -> Result<(), AdapterError>;

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
}

/// Transport that refuses every command; used when no browser is configured.
#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl CdpTransport for NoopTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn send_command(
        &self,
        _target: CommandTarget,
        method: &str,
        _params: Value,
    ) -> Result<Value, AdapterError> {
        Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("no browser connection for {method}")))
    }
}

type LinkFactory =
    Arc<dyn Fn(CdpConfig) -> BoxFuture<'static, Result<Arc<BrowserLink>, AdapterError>> + Send + Sync>;

/// Chromium transport; launches (or connects to) a browser lazily and
/// relaunches when the previous connection died.
#[derive(Clone)]
pub struct ChromiumTransport {
    cfg: CdpConfig,
    link: Arc<Mutex<Option<Arc<BrowserLink>>>>,
    factory: LinkFactory,
}

impl ChromiumTransport {
    pub fn new(cfg: CdpConfig) -> Self {
        let factory: LinkFactory = Arc::new(|cfg: CdpConfig| {
            Box::pin(async move { Ok(Arc::new(BrowserLink::open(cfg).await?)) })
        });
        Self {
            cfg,
            link: Arc::new(Mutex::new(None)),
            factory,
        }
    }

    async fn link(&self) -> Result<Arc<BrowserLink>, AdapterError> {
        let mut guard = self.link.lock().await;
        if let Some(link) = guard.as_ref() {
            if link.is_alive() {
                return Ok(link.clone());
            }
            warn!(target: "cdp-transport", "browser link lost, reconnecting");
        }
        let link = (self.factory)(self.cfg.clone()).await?;
        *guard = Some(link.clone());
        Ok(link)
    }

    #[cfg(test)]
    fn with_factory(cfg: CdpConfig, factory: LinkFactory) -> Self {
        Self {
            cfg,
            link: Arc::new(Mutex::new(None)),
            factory,
        }
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        let link = self.link().await?;
        link.request(
            CommandTarget::Browser,
            "Target.setDiscoverTargets",
            json!({ "discover": true }),
            Duration::from_millis(self.cfg.default_deadline_ms),
        )
        .await?;
        Ok(())
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let link = self.link().await?;
        link.request(
            target,
            method,
            params,
            Duration::from_millis(self.cfg.default_deadline_ms),
        )
        .await
    }
}

struct Request {
    target: CommandTarget,
    method: String,
    params: Value,
    reply: oneshot::Sender<Result<Value, AdapterError>>,
}

type Pending = HashMap<CallId, oneshot::Sender<Result<Value, AdapterError>>>;

struct BrowserLink {
    requests: mpsc::Sender<Request>,
    pump: JoinHandle<()>,
    heartbeat: Option<JoinHandle<()>>,
    child: Mutex<Option<Child>>,
    alive: Arc<AtomicBool>,
}

impl BrowserLink {
    async fn open(cfg: CdpConfig) -> Result<Self, AdapterError> {
        let (child, ws_url) = match cfg.websocket_url.clone() {
            Some(url) => (None, url),
            None => {
                let browser_cfg = browser_config(&cfg)?;
                let mut child = browser_cfg.launch().map_err(|err| {
                    AdapterError::new(AdapterErrorKind::CdpIo)
                        .with_hint(format!("failed to launch chromium: {err}"))
                })?;
                let ws = extract_ws_url(&mut child).await.map_err(|err| {
                    AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string())
                })?;
                (Some(child), ws)
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string()))?;

        let (requests, inbox) = mpsc::channel(128);
        let alive = Arc::new(AtomicBool::new(true));

        let pump_alive = alive.clone();
        let pump = tokio::spawn(async move {
            let outcome = pump_messages(conn, inbox).await;
            pump_alive.store(false, Ordering::Relaxed);
            if let Err(err) = outcome {
                error!(target: "cdp-transport", %err, "message pump stopped");
            }
        });

        let heartbeat = spawn_heartbeat(
            requests.clone(),
            alive.clone(),
            Duration::from_millis(cfg.heartbeat_interval_ms),
        );

        info!(target: "cdp-transport", url = %ws_url, "connected to chromium");

        Ok(Self {
            requests,
            pump,
            heartbeat,
            child: Mutex::new(child),
            alive,
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn request(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request {
                target,
                method: method.to_string(),
                params,
                reply,
            })
            .await
            .map_err(|err| AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string()))?;

        match tokio::time::timeout(deadline, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("{method}: reply channel closed"))),
            Err(_) => Err(AdapterError::new(AdapterErrorKind::Timeout)
                .with_hint(format!("{method}: no reply within {}ms", deadline.as_millis()))),
        }
    }

    #[cfg(test)]
    fn stub() -> (Arc<Self>, Arc<AtomicBool>) {
        let (requests, _inbox) = mpsc::channel(8);
        let alive = Arc::new(AtomicBool::new(true));
        let pump = tokio::spawn(futures::future::pending::<()>());
        (
            Arc::new(Self {
                requests,
                pump,
                heartbeat: None,
                child: Mutex::new(None),
                alive: alive.clone(),
            }),
            alive,
        )
    }
}

impl Drop for BrowserLink {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        self.pump.abort();
        if let Some(handle) = &self.heartbeat {
            handle.abort();
        }
        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(mut child) = guard.take() {
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move {
                            if let Err(err) = child.kill().await {
                                warn!(target: "cdp-transport", ?err, "failed to kill chromium");
                            }
                        });
                    }
                    Err(_) => debug!(target: "cdp-transport", "no runtime to reap chromium"),
                }
            }
        }
    }
}

fn spawn_heartbeat(
    requests: mpsc::Sender<Request>,
    alive: Arc<AtomicBool>,
    every: Duration,
) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        while alive.load(Ordering::Relaxed) {
            ticker.tick().await;
            let (reply, response) = oneshot::channel();
            let sent = requests
                .send(Request {
                    target: CommandTarget::Browser,
                    method: "Browser.getVersion".to_string(),
                    params: json!({}),
                    reply,
                })
                .await;
            if sent.is_err() {
                break;
            }
            match tokio::time::timeout(Duration::from_secs(5), response).await {
                Ok(Ok(Ok(_))) => trace!(target: "cdp-transport", "heartbeat ok"),
                other => {
                    warn!(target: "cdp-transport", ok = other.is_ok(), "heartbeat failed");
                    alive.store(false, Ordering::Relaxed);
                    break;
                }
            }
        }
    }))
}

async fn pump_messages(
    mut conn: Connection<CdpEventMessage>,
    mut inbox: mpsc::Receiver<Request>,
) -> Result<(), AdapterError> {
    let mut pending: Pending = HashMap::new();
    loop {
        tokio::select! {
            Some(request) = inbox.recv() => {
                let session = match request.target {
                    CommandTarget::Browser => None,
                    CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
                };
                let method: MethodId = request.method.into();
                match conn.submit_command(method, session, request.params) {
                    Ok(call_id) => {
                        pending.insert(call_id, request.reply);
                    }
                    Err(err) => {
                        let _ = request.reply.send(Err(
                            AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string()),
                        ));
                    }
                }
            }
            message = conn.next() => match message {
                Some(Ok(Message::Response(resp))) => {
                    if let Some(reply) = pending.remove(&resp.id) {
                        let _ = reply.send(response_payload(resp));
                    }
                }
                Some(Ok(Message::Event(_))) => {}
                Some(Err(err)) => {
                    let err = map_cdp_error(err);
                    for (_, reply) in pending.drain() {
                        let _ = reply.send(Err(err.clone()));
                    }
                    return Err(err);
                }
                None => {
                    let err = AdapterError::new(AdapterErrorKind::CdpIo)
                        .with_hint("cdp connection closed");
                    for (_, reply) in pending.drain() {
                        let _ = reply.send(Err(err.clone()));
                    }
                    return Ok(());
                }
            }
        }
    }
}

fn response_payload(resp: Response) -> Result<Value, AdapterError> {
    match (resp.result, resp.error) {
        (Some(result), _) => Ok(result),
        (None, Some(error)) => {
            let kind = if error.message.contains("Could not find node")
                || error.message.contains("Could not find object")
                || error.message.contains("Cannot find context")
            {
                AdapterErrorKind::StaleNode
            } else {
                AdapterErrorKind::CdpIo
            };
            let stale = kind == AdapterErrorKind::StaleNode;
            Err(AdapterError::new(kind)
                .with_hint(format!("cdp error {}: {}", error.code, error.message))
                .retriable(error.code >= 500 || stale))
        }
        (None, None) => Err(AdapterError::new(AdapterErrorKind::Internal).with_hint("empty cdp response")),
    }
}

fn map_cdp_error(err: CdpError) -> AdapterError {
    let hint = err.to_string();
    match err {
        CdpError::Timeout => AdapterError::new(AdapterErrorKind::Timeout).with_hint(hint),
        CdpError::JavascriptException(_) => {
            AdapterError::new(AdapterErrorKind::ScriptException).with_hint(hint)
        }
        CdpError::Serde(_) => AdapterError::new(AdapterErrorKind::Internal).with_hint(hint),
        _ => AdapterError::new(AdapterErrorKind::CdpIo).with_hint(hint),
    }
}

fn browser_config(cfg: &CdpConfig) -> Result<BrowserConfig, AdapterError> {
    if !cfg.executable.as_os_str().is_empty() && !cfg.executable.exists() {
        return Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!(
                "chrome executable not found at {}",
                cfg.executable.display()
            ))
            .with_data(json!({
                "expected": cfg.executable,
                "hint": "Set PAGEPILOT_CHROME to the full path of chrome/chromium."
            })));
    }

    let profile_dir = if cfg.user_data_dir.is_absolute() {
        cfg.user_data_dir.clone()
    } else {
        std::env::current_dir()
            .map_err(|err| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint(format!("cannot resolve working directory: {err}"))
            })?
            .join(&cfg.user_data_dir)
    };
    fs::create_dir_all(&profile_dir).map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal)
            .with_hint(format!("cannot create profile dir {}: {err}", profile_dir.display()))
    })?;

    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
        .launch_timeout(Duration::from_secs(20))
        .user_data_dir(profile_dir);

    if !cfg.headless {
        builder = builder.with_head();
    }
    if std::env::var("PAGEPILOT_DISABLE_SANDBOX")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
    {
        builder = builder.no_sandbox();
    }

    let mut args = vec![
        "--disable-background-networking",
        "--disable-background-timer-throttling",
        "--disable-default-apps",
        "--disable-dev-shm-usage",
        "--disable-extensions",
        "--disable-popup-blocking",
        "--disable-sync",
        "--no-first-run",
        "--no-default-browser-check",
        "--remote-allow-origins=*",
    ];
    if cfg.headless {
        args.push("--headless=new");
        args.push("--hide-scrollbars");
        args.push("--mute-audio");
    }
    builder = builder.args(args);

    if !cfg.executable.as_os_str().is_empty() {
        builder = builder.chrome_executable(cfg.executable.clone());
    }

    builder.build().map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("browser config error: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn relaunches_when_link_dies() {
        let launches = Arc::new(AtomicUsize::new(0));
        let flags = Arc::new(Mutex::new(Vec::<Arc<AtomicBool>>::new()));

        let factory: LinkFactory = {
            let launches = launches.clone();
            let flags = flags.clone();
            Arc::new(move |_cfg: CdpConfig| {
                let launches = launches.clone();
                let flags = flags.clone();
                Box::pin(async move {
                    launches.fetch_add(1, Ordering::SeqCst);
                    let (link, alive) = BrowserLink::stub();
                    flags.lock().await.push(alive);
                    Ok(link)
                })
            })
        };

        let transport = ChromiumTransport::with_factory(CdpConfig::default(), factory);
        let first = transport.link().await.expect("first link");
        let again = transport.link().await.expect("cached link");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(launches.load(Ordering::SeqCst), 1);

        flags.lock().await[0].store(false, Ordering::SeqCst);
        let second = transport.link().await.expect("second link");
        assert_eq!(launches.load(Ordering::SeqCst), 2);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn noop_transport_reports_unreachable() {
        let err = NoopTransport
            .send_command(CommandTarget::Browser, "Browser.getVersion", json!({}))
            .await
            .unwrap_err();
        assert!(err.is_unreachable());
    }
}
