//! Error and success banners visible after an action.

use cdp_adapter::{DomPort, NodeHandle};
use pagepilot_core_types::limits;
use pagepilot_core_types::text::clip;
use tracing::debug;

pub const ERROR_SELECTORS: &[&str] = &[
    "[role=\"alert\"]",
    "[aria-live=\"assertive\"]",
    ".error",
    ".error-message",
    ".alert-danger",
    ".alert-error",
    ".invalid-feedback",
    ".form-error",
    ".toast-error",
    ".notification-error",
];

pub const SUCCESS_SELECTORS: &[&str] = &[
    "[role=\"status\"]",
    ".success",
    ".success-message",
    ".alert-success",
    ".toast-success",
    ".notification-success",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Banners {
    pub errors: Vec<String>,
    pub successes: Vec<String>,
}

pub async fn scan(port: &dyn DomPort, roots: &[NodeHandle]) -> Banners {
    Banners {
        errors: collect(port, roots, ERROR_SELECTORS).await,
        successes: collect(port, roots, SUCCESS_SELECTORS).await,
    }
}

async fn collect(port: &dyn DomPort, roots: &[NodeHandle], selectors: &[&str]) -> Vec<String> {
    let selector = selectors.join(", ");
    let mut found: Vec<String> = Vec::new();
    for root in roots {
        let nodes = match port.query_all(*root, &selector).await {
            Ok(nodes) => nodes,
            Err(err) => {
                debug!(%err, %root, "banner query failed");
                continue;
            }
        };
        for node in nodes {
            if found.len() >= limits::BANNERS {
                return found;
            }
            let Ok(facts) = port.facts(node).await else {
                continue;
            };
            if !facts.connected || facts.style.is_hidden() || !facts.rect.has_area() {
                continue;
            }
            let text = clip(&facts.text, limits::ATTRIBUTE_CHARS);
            if !text.is_empty() && !found.contains(&text) {
                found.push(text);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::dom::El;
    use cdp_adapter::MemoryDom;

    #[tokio::test]
    async fn visible_deduplicated_and_capped() {
        let dom = MemoryDom::new("https://app.test/", "App");
        dom.append(dom.body(), El::new("div").attr("role", "alert").text("Email is required"));
        dom.append(dom.body(), El::new("p").class("error").text("Email is required"));
        dom.append(dom.body(), El::new("p").class("error").text("Old error").hidden());
        dom.append(dom.body(), El::new("p").class("error"));
        for i in 0..8 {
            dom.append(dom.body(), El::new("span").class("form-error").text(&format!("field {i}")));
        }
        dom.append(dom.body(), El::new("div").class("toast-success").text("Saved"));

        let banners = scan(&dom, &[dom.document_handle()]).await;
        assert_eq!(banners.errors.len(), 5);
        assert_eq!(banners.errors[0], "Email is required");
        assert!(!banners.errors.iter().any(|e| e == "Old error"));
        assert_eq!(banners.successes, vec!["Saved".to_string()]);
    }
}
