//! Chromium DevTools Protocol adapter for PagePilot.
//!
//! The crate owns the browser connection (transport, launch configuration)
//! and the [`dom::DomPort`] abstraction every higher layer is written
//! against. [`dom::CdpDomPort`] drives a live page. The `testing` feature adds
//! `dom::MemoryDom` for deterministic, browser-free runs.

use std::{env, path::PathBuf};

use which::which;

pub mod dom;
pub mod page;
pub mod transport;
pub mod util;

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// High-level error categories surfaced by the adapter.
    #[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
    pub enum AdapterErrorKind {
        #[error("operation timed out")]
        Timeout,
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("node is detached or no longer addressable")]
        StaleNode,
        #[error("page script raised an exception")]
        ScriptException,
        #[error("selector not supported")]
        InvalidSelector,
        #[error("internal error")]
        Internal,
    }

    /// Enriched error metadata passed back to higher layers.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
        pub data: Option<serde_json::Value>,
    }

    impl fmt::Display for AdapterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for AdapterError {}

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            let retriable = matches!(
                kind,
                AdapterErrorKind::Timeout | AdapterErrorKind::CdpIo | AdapterErrorKind::StaleNode
            );
            Self {
                kind,
                hint: None,
                retriable,
                data: None,
            }
        }

        pub fn stale(hint: impl Into<String>) -> Self {
            Self::new(AdapterErrorKind::StaleNode).with_hint(hint)
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        pub fn with_data(mut self, data: serde_json::Value) -> Self {
            self.data = Some(data);
            self
        }

        /// The browser side cannot be reached at all (as opposed to one bad node).
        pub fn is_unreachable(&self) -> bool {
            matches!(self.kind, AdapterErrorKind::CdpIo)
        }
    }
}

pub mod config {
    use crate::detect_chrome_executable;
    use serde::{Deserialize, Serialize};
    use std::{
        env,
        path::{Path, PathBuf},
    };

    /// Configuration for launching and talking to Chromium.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(default)]
    pub struct CdpConfig {
        pub executable: PathBuf,
        pub user_data_dir: PathBuf,
        pub headless: bool,
        pub default_deadline_ms: u64,
        pub websocket_url: Option<String>,
        pub heartbeat_interval_ms: u64,
        /// Time allowed for the first document load when opening a page.
        pub load_timeout_ms: u64,
    }

    impl Default for CdpConfig {
        fn default() -> Self {
            Self {
                executable: default_chrome_path(),
                user_data_dir: default_profile_dir(),
                headless: resolve_headless_default(),
                default_deadline_ms: 30_000,
                websocket_url: resolve_ws_url(),
                heartbeat_interval_ms: 15_000,
                load_timeout_ms: 20_000,
            }
        }
    }

    fn resolve_headless_default() -> bool {
        match env::var("PAGEPILOT_HEADLESS") {
            Ok(value) => {
                let lower = value.to_ascii_lowercase();
                !matches!(lower.as_str(), "0" | "false" | "no" | "off")
            }
            Err(_) => true,
        }
    }

    fn resolve_ws_url() -> Option<String> {
        env::var("PAGEPILOT_WS_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn default_chrome_path() -> PathBuf {
        detect_chrome_executable().unwrap_or_default()
    }

    fn default_profile_dir() -> PathBuf {
        if let Ok(path) = env::var("PAGEPILOT_CHROME_PROFILE") {
            return PathBuf::from(path);
        }
        Path::new("./.pagepilot-profile").into()
    }
}

fn detect_chrome_executable() -> Option<PathBuf> {
    if let Ok(raw) = env::var("PAGEPILOT_CHROME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let candidate = PathBuf::from(trimmed);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    for name in chrome_executable_names() {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }

    let skip_defaults = env::var("PAGEPILOT_SKIP_OS_PATHS")
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false);

    if !skip_defaults {
        for candidate in os_specific_chrome_paths() {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

fn chrome_executable_names() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["chrome.exe", "chromium.exe", "msedge.exe"]
    }

    #[cfg(not(target_os = "windows"))]
    {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
        ]
    }
}

fn os_specific_chrome_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    }

    #[cfg(any(target_os = "linux", target_os = "freebsd"))]
    {
        vec![
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/chromium"),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "freebsd")))]
    {
        Vec::new()
    }
}

pub use config::CdpConfig;
pub use dom::{CdpDomPort, DomPort, NodeHandle};
#[cfg(any(test, feature = "testing"))]
pub use dom::MemoryDom;
pub use error::{AdapterError, AdapterErrorKind};
pub use page::{CdpPage, FrameTarget};
pub use transport::{CdpTransport, ChromiumTransport, CommandTarget, NoopTransport};
