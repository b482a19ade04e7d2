//! Matching a requested choice against option labels and values.

use pagepilot_core_types::text::normalize_whitespace;

/// Value and visible label of one selectable entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub value: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    ExactValue,
    ExactText,
    Substring,
}

/// Best entry for `wanted`: exact value, then exact trimmed text, then
/// case-insensitive substring of text or value. Earlier entries win ties.
pub fn best_match(choices: &[Choice], wanted: &str) -> Option<(usize, MatchTier)> {
    let wanted_trim = wanted.trim();
    if wanted_trim.is_empty() {
        return None;
    }
    if let Some(i) = choices.iter().position(|c| c.value == wanted || c.value == wanted_trim) {
        return Some((i, MatchTier::ExactValue));
    }
    let wanted_text = normalize_whitespace(wanted_trim);
    if let Some(i) = choices
        .iter()
        .position(|c| normalize_whitespace(&c.text) == wanted_text)
    {
        return Some((i, MatchTier::ExactText));
    }
    let needle = wanted_text.to_lowercase();
    choices
        .iter()
        .position(|c| {
            normalize_whitespace(&c.text).to_lowercase().contains(&needle)
                || c.value.to_lowercase().contains(&needle)
        })
        .map(|i| (i, MatchTier::Substring))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(value: &str, text: &str) -> Choice {
        Choice {
            value: value.into(),
            text: text.into(),
        }
    }

    #[test]
    fn exact_text_beats_substring() {
        let choices = [choice("ny", "New York"), choice("ny2", "NY")];
        assert_eq!(best_match(&choices, "NY"), Some((1, MatchTier::ExactText)));
    }

    #[test]
    fn exact_value_comes_first() {
        let choices = [choice("ny2", "ny"), choice("ny", "New York")];
        assert_eq!(best_match(&choices, "ny"), Some((1, MatchTier::ExactValue)));
    }

    #[test]
    fn substring_is_case_insensitive() {
        let choices = [choice("de", "Germany"), choice("us", "United  States")];
        assert_eq!(best_match(&choices, "united"), Some((1, MatchTier::Substring)));
        assert_eq!(best_match(&choices, "  "), None);
        assert_eq!(best_match(&choices, "Mars"), None);
    }
}
