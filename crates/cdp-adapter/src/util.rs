use anyhow::{anyhow, Result};
use chromiumoxide::async_process::Child;
use futures::io::{AsyncBufReadExt, BufReader};
use futures::stream::StreamExt;
use tokio::time::{timeout, Duration};

/// Read Chromium's stderr until it prints the DevTools websocket endpoint.
pub async fn extract_ws_url(child: &mut Child) -> Result<String> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("chromium process has no stderr handle"))?;
    let mut lines = BufReader::new(stderr).lines();
    let mut preview = Vec::new();

    let scan = async {
        while let Some(line) = lines.next().await {
            let line = line?;
            if let Some(ws) = parse_ws_line(&line) {
                return Ok(ws);
            }
            if preview.len() < 8 {
                preview.push(line);
            }
        }
        Err(anyhow!(
            "chromium exited before exposing a devtools endpoint: {}",
            preview.join(" | ")
        ))
    };

    timeout(Duration::from_secs(20), scan)
        .await
        .map_err(|_| anyhow!("timed out waiting for the devtools endpoint"))?
}

fn parse_ws_line(line: &str) -> Option<String> {
    let (_, ws) = line.rsplit_once("listening on ")?;
    let ws = ws.trim();
    (ws.starts_with("ws") && ws.contains("devtools/browser")).then(|| ws.to_string())
}

/// Turn a user-supplied address into an absolute URL, defaulting to https.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = url::Url::parse(trimmed) {
        if parsed.has_host() || matches!(parsed.scheme(), "about" | "data" | "file") {
            return Some(parsed.to_string());
        }
    }
    let candidate = if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("https://{trimmed}")
    };
    url::Url::parse(&candidate)
        .ok()
        .filter(|u| u.has_host())
        .map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_ws_endpoint_in_stderr_line() {
        let line = "DevTools listening on ws://127.0.0.1:9222/devtools/browser/abc";
        assert_eq!(
            parse_ws_line(line).as_deref(),
            Some("ws://127.0.0.1:9222/devtools/browser/abc")
        );
        assert!(parse_ws_line("some other output").is_none());
    }

    #[test]
    fn normalizes_bare_hosts() {
        assert_eq!(normalize_url("example.com").as_deref(), Some("https://example.com/"));
        assert_eq!(
            normalize_url("//cdn.example.com/x").as_deref(),
            Some("https://cdn.example.com/x")
        );
        assert_eq!(
            normalize_url("http://example.com/a?b=1").as_deref(),
            Some("http://example.com/a?b=1")
        );
        assert_eq!(normalize_url("about:blank").as_deref(), Some("about:blank"));
        assert_eq!(normalize_url("   "), None);
    }
}
