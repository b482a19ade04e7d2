//! The fixed catalog of things that count as interactive.

use cdp_adapter::dom::NodeFacts;
use once_cell::sync::Lazy;

pub const TEST_HOOK_ATTRIBUTES: &[&str] = &["data-testid", "data-test", "data-test-id", "data-qa", "data-cy"];

pub const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "checkbox",
    "radio",
    "switch",
    "tab",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "option",
    "combobox",
    "textbox",
    "searchbox",
    "slider",
    "spinbutton",
    "treeitem",
    "listbox",
];

pub const CLASS_HINTS: &[&str] = &["btn", "button", "clickable", "link", "dropdown", "toggle", "menu-item"];

/// Attributes copied into snapshot records.
pub const RECORDED_ATTRIBUTES: &[&str] = &[
    "id",
    "name",
    "type",
    "role",
    "href",
    "placeholder",
    "title",
    "alt",
    "for",
    "list",
    "autocomplete",
    "class",
    "data-testid",
    "data-test",
    "data-test-id",
    "data-qa",
    "data-cy",
    "data-value",
    "aria-label",
    "aria-controls",
    "aria-owns",
    "aria-expanded",
    "aria-haspopup",
    "aria-checked",
    "aria-selected",
];

/// One selector list covering every matcher, issued once per scope.
pub static CANDIDATE_SELECTOR: Lazy<String> = Lazy::new(|| {
    let mut parts: Vec<String> = vec![
        "input:not([type=\"hidden\"])".into(),
        "textarea".into(),
        "select".into(),
        "button".into(),
        "a[href]".into(),
        "summary".into(),
        "[contenteditable]:not([contenteditable=\"false\"])".into(),
        "[tabindex]".into(),
        "[onclick]".into(),
    ];
    parts.extend(INTERACTIVE_ROLES.iter().map(|role| format!("[role=\"{role}\"]")));
    parts.extend(TEST_HOOK_ATTRIBUTES.iter().map(|attr| format!("[{attr}]")));
    parts.extend(CLASS_HINTS.iter().map(|hint| format!("[class*=\"{hint}\" i]")));
    parts.join(", ")
});

/// Items searched inside popups referenced through `aria-controls`.
pub const POPUP_ITEM_SELECTOR: &str =
    "[role=\"option\"], [role=\"menuitem\"], [role=\"menuitemcheckbox\"], [role=\"menuitemradio\"], li, [data-value]";

/// Re-derives, from the facts alone, whether a queried node belongs in the catalog.
///
/// The batched selector over-matches class names (`[class*=btn]` hits `btn-group`
/// containers); this check is token-exact.
pub fn qualifies(facts: &NodeFacts, has_listener: bool) -> bool {
    if has_listener {
        return true;
    }
    let native = match facts.tag.as_str() {
        "input" => facts.input_type().as_deref() != Some("hidden"),
        "textarea" | "select" | "button" | "summary" => true,
        "a" => facts.has_attr("href"),
        "option" => true,
        _ => false,
    };
    native
        || facts
            .attr("role")
            .map(|role| INTERACTIVE_ROLES.contains(&role.trim().to_ascii_lowercase().as_str()))
            .unwrap_or(false)
        || facts.control.content_editable
        || tab_index(facts).map(|t| t >= 0).unwrap_or(false)
        || facts.has_attr("onclick")
        || TEST_HOOK_ATTRIBUTES.iter().any(|attr| facts.has_attr(attr))
        || facts.has_attr("data-value")
        || has_class_hint(facts)
}

pub fn tab_index(facts: &NodeFacts) -> Option<i32> {
    facts.attr("tabindex").and_then(|v| v.trim().parse().ok())
}

fn has_class_hint(facts: &NodeFacts) -> bool {
    facts.classes().any(|token| {
        let token = token.to_ascii_lowercase();
        CLASS_HINTS.iter().any(|hint| {
            if hint.contains('-') {
                token.contains(hint)
            } else {
                token.split(['-', '_']).any(|part| part == *hint)
            }
        })
    })
}

/// Coarse semantic type reported as the record's `type`.
pub fn element_type(facts: &NodeFacts) -> String {
    let by_tag = match facts.tag.as_str() {
        "input" => Some(match facts.input_type().as_deref() {
            Some("checkbox") => "checkbox",
            Some("radio") => "radio",
            Some("submit" | "button" | "reset" | "image") => "button",
            Some("file") => "file-input",
            Some("range") => "slider",
            Some("color" | "date" | "datetime-local" | "month" | "time" | "week") => "picker",
            _ => "text-input",
        }),
        "textarea" => Some("text-input"),
        "select" => Some("select"),
        "button" => Some("button"),
        "a" => Some("link"),
        "summary" => Some("disclosure"),
        "option" => Some("option"),
        "iframe" | "frame" => Some("frame"),
        _ => None,
    };
    if let Some(kind) = by_tag {
        return kind.to_string();
    }
    if let Some(role) = facts.attr("role").map(|r| r.trim().to_ascii_lowercase()) {
        if !role.is_empty() {
            return role;
        }
    }
    if facts.control.content_editable {
        return "editable".into();
    }
    "clickable".into()
}

/// Focusable without relying on a role: native controls, links, or a tabindex.
pub fn focusable(facts: &NodeFacts) -> bool {
    matches!(facts.tag.as_str(), "input" | "textarea" | "select" | "button")
        || (facts.tag == "a" && facts.has_attr("href"))
        || tab_index(facts).map(|t| t >= 0).unwrap_or(false)
        || facts.control.content_editable
}
