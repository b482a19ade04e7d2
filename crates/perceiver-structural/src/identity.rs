//! uids and the locators recorded alongside them.

use std::collections::{BTreeMap, HashMap};

use cdp_adapter::dom::selector::{attr_selector, id_selector};
use cdp_adapter::dom::{NodeFacts, PathStep};
use pagepilot_core_types::limits;
use pagepilot_core_types::locator::IDENTIFYING_ATTRIBUTES;
use pagepilot_core_types::text::{clip, normalize_whitespace, truncate_chars};

use crate::catalog::TEST_HOOK_ATTRIBUTES;

/// uid from a stable attribute: test hook, then id, then name.
pub fn stable_uid(facts: &NodeFacts) -> Option<String> {
    TEST_HOOK_ATTRIBUTES
        .iter()
        .chain(["id", "name"].iter())
        .find_map(|attr| {
            facts
                .attr(attr)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| truncate_chars(v, limits::TEXT_CHARS))
        })
}

/// Content hash of what makes the element recognisable.
pub fn fingerprint_uid(facts: &NodeFacts, label: Option<&str>, xpath: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    let classes = facts.classes().take(3).collect::<Vec<_>>().join(" ");
    let text = truncate_chars(&normalize_whitespace(&facts.text), 40);
    for part in [
        facts.tag.as_str(),
        facts.attr("role").unwrap_or(""),
        facts.attr("type").unwrap_or(""),
        facts.attr("placeholder").unwrap_or(""),
        label.unwrap_or(""),
        classes.as_str(),
        text.as_str(),
        xpath,
    ] {
        hasher.update(part.as_bytes());
        hasher.update(&[0x1f]);
    }
    let hex = hasher.finalize().to_hex();
    format!("fp-{}", &hex.as_str()[..12])
}

/// Hands out uids unique within one snapshot; repeats get a `~N` ordinal suffix.
#[derive(Debug, Default)]
pub struct UidAllocator {
    issued: HashMap<String, usize>,
}

impl UidAllocator {
    pub fn allocate(&mut self, base: String) -> String {
        if !self.issued.contains_key(&base) {
            self.issued.insert(base.clone(), 1);
            return base;
        }
        let mut ordinal = self.issued.get(&base).copied().unwrap_or(1);
        loop {
            ordinal += 1;
            let candidate = format!("{base}~{ordinal}");
            if !self.issued.contains_key(&candidate) {
                self.issued.insert(base, ordinal);
                self.issued.insert(candidate.clone(), 1);
                return candidate;
            }
        }
    }
}

/// Preferred CSS selector: `#id`, a test-hook or name attribute, else an nth-of-type path.
pub fn css_selector(facts: &NodeFacts, steps: &[PathStep]) -> String {
    if let Some(id) = facts.attr("id").filter(|v| !v.trim().is_empty()) {
        return id_selector(id);
    }
    for attr in TEST_HOOK_ATTRIBUTES.iter().chain(["name"].iter()) {
        if let Some(value) = facts.attr(attr).filter(|v| !v.is_empty()) {
            return attr_selector(&facts.tag, attr, value);
        }
    }
    nth_path(steps)
}

pub fn nth_path(steps: &[PathStep]) -> String {
    steps
        .iter()
        .map(|step| {
            if step.same_tag > 1 {
                format!("{}:nth-of-type({})", step.tag, step.index)
            } else {
                step.tag.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" > ")
}

/// Absolute, fully indexed XPath within the element's own tree.
pub fn xpath(steps: &[PathStep]) -> String {
    steps
        .iter()
        .map(|step| format!("/{}[{}]", step.tag, step.index))
        .collect()
}

/// Compact description used in boundary-aware paths: `tag#id` or `tag:nth-of-type(n)`.
pub fn short_step(facts: &NodeFacts, steps: &[PathStep]) -> String {
    match facts.attr("id").filter(|v| !v.trim().is_empty()) {
        Some(id) => format!("{}{}", facts.tag, id_selector(id)),
        None => nth_path(steps),
    }
}

/// Attribute subset recorded for fingerprint matching.
pub fn fingerprint_attributes(facts: &NodeFacts) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for name in IDENTIFYING_ATTRIBUTES
        .iter()
        .chain(["role", "type", "alt", "data-value"].iter())
    {
        if let Some(value) = facts.attr(name).filter(|v| !v.trim().is_empty()) {
            out.insert(name.to_string(), clip(value, limits::ATTRIBUTE_CHARS));
        }
    }
    out
}
