//! Key descriptors for synthesized keyboard events.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub key: String,
    pub code: String,
    pub key_code: u32,
}

impl KeyDescriptor {
    fn named(key: &str, code: &str, key_code: u32) -> Self {
        Self {
            key: key.into(),
            code: code.into(),
            key_code,
        }
    }

    /// Produces a character (and a `keypress`).
    pub fn is_printable(&self) -> bool {
        self.key.chars().count() == 1
    }

    pub fn is_enter(&self) -> bool {
        self.key == "Enter"
    }
}

/// Canonical descriptor for a key name, or one derived from a single character.
pub fn describe(name: &str) -> Option<KeyDescriptor> {
    let named = match name.trim().to_ascii_lowercase().as_str() {
        "enter" | "return" => Some(KeyDescriptor::named("Enter", "Enter", 13)),
        "escape" | "esc" => Some(KeyDescriptor::named("Escape", "Escape", 27)),
        "tab" => Some(KeyDescriptor::named("Tab", "Tab", 9)),
        "backspace" => Some(KeyDescriptor::named("Backspace", "Backspace", 8)),
        "delete" | "del" => Some(KeyDescriptor::named("Delete", "Delete", 46)),
        "arrowup" | "up" => Some(KeyDescriptor::named("ArrowUp", "ArrowUp", 38)),
        "arrowdown" | "down" => Some(KeyDescriptor::named("ArrowDown", "ArrowDown", 40)),
        "arrowleft" | "left" => Some(KeyDescriptor::named("ArrowLeft", "ArrowLeft", 37)),
        "arrowright" | "right" => Some(KeyDescriptor::named("ArrowRight", "ArrowRight", 39)),
        "space" | "spacebar" => Some(KeyDescriptor::named(" ", "Space", 32)),
        _ => None,
    };
    if named.is_some() {
        return named;
    }
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(for_char(c)),
        _ => None,
    }
}

/// Descriptor for typing one character.
pub fn for_char(c: char) -> KeyDescriptor {
    let (code, key_code) = if c.is_ascii_alphabetic() {
        (
            format!("Key{}", c.to_ascii_uppercase()),
            c.to_ascii_uppercase() as u32,
        )
    } else if c.is_ascii_digit() {
        (format!("Digit{c}"), c as u32)
    } else if c == ' ' {
        ("Space".to_string(), 32)
    } else {
        (String::new(), 0)
    };
    KeyDescriptor {
        key: c.to_string(),
        code,
        key_code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_keys_are_canonical() {
        let enter = describe("enter").unwrap();
        assert_eq!((enter.key.as_str(), enter.code.as_str(), enter.key_code), ("Enter", "Enter", 13));
        assert!(enter.is_enter());
        assert!(!enter.is_printable());
        assert_eq!(describe("ArrowDown").unwrap().key_code, 40);
        assert_eq!(describe("Space").unwrap().key, " ");
    }

    #[test]
    fn single_characters_are_derived() {
        let a = describe("a").unwrap();
        assert_eq!((a.code.as_str(), a.key_code), ("KeyA", 65));
        assert!(a.is_printable());
        assert_eq!(describe("7").unwrap().code, "Digit7");
        assert_eq!(describe("ß").unwrap().key_code, 0);
        assert!(describe("Hyper").is_none());
    }
}
