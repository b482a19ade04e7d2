//! Polling waits over page state that has no change notification.

use std::time::Duration;

use cdp_adapter::DomPort;
use regex::Regex;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::ActionError;
use crate::types::UrlMatch;

enum UrlTest {
    Change(String),
    Equals(String),
    Contains(String),
    Regex(Regex),
}

impl UrlTest {
    fn new(mode: &UrlMatch, start: &str) -> Result<Self, ActionError> {
        Ok(match mode {
            UrlMatch::Change => UrlTest::Change(start.to_string()),
            UrlMatch::Equals(v) => UrlTest::Equals(v.clone()),
            UrlMatch::Contains(v) => UrlTest::Contains(v.clone()),
            UrlMatch::Regex(pattern) => UrlTest::Regex(Regex::new(pattern).map_err(|err| {
                ActionError::InvalidAction(format!("bad url pattern '{pattern}': {err}"))
            })?),
        })
    }

    fn accepts(&self, url: &str) -> bool {
        match self {
            UrlTest::Change(start) => url != start,
            UrlTest::Equals(v) => url == v || url.trim_end_matches('/') == v.trim_end_matches('/'),
            UrlTest::Contains(v) => url.contains(v.as_str()),
            UrlTest::Regex(re) => re.is_match(url),
        }
    }
}

/// Poll the page URL until `mode` accepts it. Returns the accepted URL.
pub async fn wait_for_url(
    port: &dyn DomPort,
    mode: &UrlMatch,
    timeout: Duration,
    poll: Duration,
) -> Result<String, ActionError> {
    let start = port.page_info().await?.url;
    let test = UrlTest::new(mode, &start)?;
    let deadline = Instant::now() + timeout;
    loop {
        let url = port.page_info().await?.url;
        if test.accepts(&url) {
            debug!(%url, "url condition met");
            return Ok(url);
        }
        if Instant::now() >= deadline {
            return Err(ActionError::WaitTimeout(format!(
                "url still '{url}' after {}ms",
                timeout.as_millis()
            )));
        }
        tokio::time::sleep(poll).await;
    }
}

/// Wait until the resource count stays unchanged for `idle`.
/// Returns `false` when `timeout` elapses first.
pub async fn wait_network_idle(
    port: &dyn DomPort,
    idle: Duration,
    timeout: Duration,
    poll: Duration,
) -> Result<bool, ActionError> {
    let deadline = Instant::now() + timeout;
    let mut last = port.resource_count().await?;
    let mut quiet_since = Instant::now();
    loop {
        let now = Instant::now();
        if now.duration_since(quiet_since) >= idle {
            return Ok(true);
        }
        if now >= deadline {
            debug!(resources = last, "network never went idle");
            return Ok(false);
        }
        tokio::time::sleep(poll).await;
        let count = port.resource_count().await?;
        if count != last {
            last = count;
            quiet_since = Instant::now();
        }
    }
}
