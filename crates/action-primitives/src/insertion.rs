//! Text insertion strategies used by `type`, tried in order until one lands.

use async_trait::async_trait;
use cdp_adapter::dom::{InsertMode, NodeFacts, SyntheticEvent};
use cdp_adapter::{AdapterError, DomPort, NodeHandle};
use tracing::{debug, trace};

use crate::keys;

const EMBEDDED_EDITOR_SELECTOR: &str =
    "textarea, [contenteditable]:not([contenteditable=\"false\"]), [role=\"textbox\"]";

#[async_trait]
pub trait TextInsertion: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(false)` when the strategy does not apply to `node` or the page refused the text.
    async fn insert(
        &self,
        port: &dyn DomPort,
        node: NodeHandle,
        facts: &NodeFacts,
        text: &str,
    ) -> Result<bool, AdapterError>;
}

/// Native value assignment, insertion at the caret, embedded editors, keystrokes.
pub fn default_chain() -> Vec<Box<dyn TextInsertion>> {
    vec![
        Box::new(NativeValue),
        Box::new(CaretInsertion),
        Box::new(EmbeddedEditor),
        Box::new(Keystrokes),
    ]
}

async fn notify_value_change(
    port: &dyn DomPort,
    node: NodeHandle,
    text: &str,
) -> Result<(), AdapterError> {
    port.dispatch(node, &SyntheticEvent::input("input", Some(text), "insertText"))
        .await?;
    port.dispatch(node, &SyntheticEvent::basic("change", false))
        .await?;
    Ok(())
}

/// Assign through the element's value setter, then announce the change.
pub struct NativeValue;

#[async_trait]
impl TextInsertion for NativeValue {
    fn name(&self) -> &'static str {
        "native-value"
    }

    async fn insert(
        &self,
        port: &dyn DomPort,
        node: NodeHandle,
        facts: &NodeFacts,
        text: &str,
    ) -> Result<bool, AdapterError> {
        if !facts.is_text_field() {
            return Ok(false);
        }
        port.focus(node).await?;
        if !port.set_value(node, text).await? {
            return Ok(false);
        }
        notify_value_change(port, node, text).await?;
        Ok(true)
    }
}

/// Insert at the end of an editable region.
pub struct CaretInsertion;

impl CaretInsertion {
    async fn insert_into(
        port: &dyn DomPort,
        node: NodeHandle,
        text: &str,
    ) -> Result<bool, AdapterError> {
        port.focus(node).await?;
        port.place_caret_at_end(node).await?;
        let before = port.facts(node).await?.text;

        // Editors that handle beforeinput themselves cancel it and insert the text.
        let proceed = port
            .dispatch(
                node,
                &SyntheticEvent::input("beforeinput", Some(text), "insertText"),
            )
            .await?;
        if !proceed {
            let after = port.facts(node).await?.text;
            if after != before && after.contains(text) {
                trace!(%node, "editor consumed beforeinput");
                return Ok(true);
            }
        }

        if port.insert_text(node, text, InsertMode::Command).await? {
            return Ok(true);
        }
        if port.insert_text(node, text, InsertMode::Append).await? {
            port.dispatch(node, &SyntheticEvent::input("input", Some(text), "insertText"))
                .await?;
            return Ok(true);
        }
        Ok(false)
    }
}

#[async_trait]
impl TextInsertion for CaretInsertion {
    fn name(&self) -> &'static str {
        "caret"
    }

    async fn insert(
        &self,
        port: &dyn DomPort,
        node: NodeHandle,
        facts: &NodeFacts,
        text: &str,
    ) -> Result<bool, AdapterError> {
        if !facts.is_editable_surface() || facts.is_text_field() {
            return Ok(false);
        }
        Self::insert_into(port, node, text).await
    }
}

/// Rich editors that hide the real input (a textarea or editable region) inside a wrapper.
pub struct EmbeddedEditor;

#[async_trait]
impl TextInsertion for EmbeddedEditor {
    fn name(&self) -> &'static str {
        "embedded-editor"
    }

    async fn insert(
        &self,
        port: &dyn DomPort,
        node: NodeHandle,
        facts: &NodeFacts,
        text: &str,
    ) -> Result<bool, AdapterError> {
        if facts.is_text_field() || facts.is_editable_surface() {
            return Ok(false);
        }
        for inner in port.query_all(node, EMBEDDED_EDITOR_SELECTOR).await? {
            let inner_facts = port.facts(inner).await?;
            if !inner_facts.connected || inner_facts.control.disabled || inner_facts.control.read_only {
                continue;
            }
            debug!(%node, %inner, tag = %inner_facts.tag, "typing into embedded editor");
            if inner_facts.tag == "textarea" {
                port.focus(inner).await?;
                if port.set_value(inner, text).await? {
                    notify_value_change(port, inner, text).await?;
                    return Ok(true);
                }
            } else if CaretInsertion::insert_into(port, inner, text).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// One key at a time: keydown, beforeinput, insertion, input, keyup; a single change at the end.
pub struct Keystrokes;

#[async_trait]
impl TextInsertion for Keystrokes {
    fn name(&self) -> &'static str {
        "keystrokes"
    }

    async fn insert(
        &self,
        port: &dyn DomPort,
        node: NodeHandle,
        facts: &NodeFacts,
        text: &str,
    ) -> Result<bool, AdapterError> {
        let field = facts.is_text_field();
        port.focus(node).await?;
        let mut typed = if field {
            facts.control.value.clone().unwrap_or_default()
        } else {
            String::new()
        };
        let mut landed = false;
        for c in text.chars() {
            let key = keys::for_char(c);
            let ch = key.key.clone();
            let down = SyntheticEvent::key("keydown", &key.key, &key.code, key.key_code);
            if port.dispatch(node, &down).await? {
                let before = SyntheticEvent::input("beforeinput", Some(&ch), "insertText");
                if port.dispatch(node, &before).await? {
                    let inserted = if field {
                        typed.push(c);
                        port.set_value(node, &typed).await?
                    } else {
                        port.insert_text(node, &ch, InsertMode::Append).await?
                    };
                    if inserted {
                        landed = true;
                        port.dispatch(node, &SyntheticEvent::input("input", Some(&ch), "insertText"))
                            .await?;
                    }
                }
            }
            let up = SyntheticEvent::key("keyup", &key.key, &key.code, key.key_code);
            port.dispatch(node, &up).await?;
        }
        if landed {
            port.dispatch(node, &SyntheticEvent::basic("change", false))
                .await?;
        }
        Ok(landed)
    }
}
