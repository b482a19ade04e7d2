use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attributes tried first when re-finding an element by fingerprint, most specific first.
pub const IDENTIFYING_ATTRIBUTES: &[&str] = &[
    "data-testid",
    "data-test",
    "data-test-id",
    "data-qa",
    "data-cy",
    "id",
    "name",
    "aria-label",
    "placeholder",
    "href",
    "title",
];

/// Everything recorded at capture time to find an element again later.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatorSet {
    pub css: String,
    pub xpath: String,
    /// Attribute subset used for fingerprint matching.
    #[serde(default)]
    pub fingerprint: BTreeMap<String, String>,
    /// Normalized visible text.
    #[serde(default)]
    pub text: String,
    pub tag: String,
}

impl LocatorSet {
    /// Fingerprint attributes ordered by how uniquely they tend to identify an element.
    pub fn ranked_attributes(&self) -> Vec<(&str, &str)> {
        let mut ranked: Vec<(&str, &str)> = IDENTIFYING_ATTRIBUTES
            .iter()
            .filter_map(|name| {
                self.fingerprint
                    .get_key_value(*name)
                    .map(|(k, v)| (k.as_str(), v.as_str()))
            })
            .collect();
        ranked.extend(
            self.fingerprint
                .iter()
                .filter(|(k, _)| !IDENTIFYING_ATTRIBUTES.contains(&k.as_str()))
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifying_attributes_rank_first() {
        let mut fingerprint = BTreeMap::new();
        fingerprint.insert("class".to_string(), "btn".to_string());
        fingerprint.insert("name".to_string(), "q".to_string());
        fingerprint.insert("data-testid".to_string(), "search".to_string());
        let set = LocatorSet {
            fingerprint,
            ..Default::default()
        };
        let names: Vec<&str> = set.ranked_attributes().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["data-testid", "name", "class"]);
    }
}
