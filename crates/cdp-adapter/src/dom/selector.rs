//! A compact CSS selector engine plus the escaping helpers used when
//! generating selectors.
//!
//! Supported: type and universal selectors, `#id`, `.class`, attribute
//! selectors (`=`, `~=`, `|=`, `^=`, `$=`, `*=`, optional ` i` flag),
//! `:nth-of-type(n)`, `:first-of-type`, `:last-of-type`, `:first-child`,
//! `:not(<compound>)`, descendant and child combinators, and comma lists.
//! Everything the automation layers generate stays inside this subset.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectorError(pub String);

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported selector: {}", self.0)
    }
}

impl std::error::Error for SelectorError {}

#[derive(Clone, Debug, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct AttrTest {
    name: String,
    op: AttrOp,
    value: String,
    case_insensitive: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Pseudo {
    NthOfType(usize),
    LastOfType,
    FirstChild,
    Not(Box<Compound>),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
    pseudos: Vec<Pseudo>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// `parts[0]` is the left-most compound; `combinators[i]` joins `parts[i]` and `parts[i + 1]`.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Complex {
    parts: Vec<Compound>,
    combinators: Vec<Combinator>,
}

/// A parsed selector list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectorList {
    alternatives: Vec<Complex>,
}

/// Tree access needed to evaluate a selector.
pub trait ElementTree {
    type Node: Copy + Eq;

    fn tag(&self, node: Self::Node) -> &str;
    fn attr(&self, node: Self::Node, name: &str) -> Option<&str>;
    /// Parent element inside the same tree; `None` at a document or shadow root.
    fn parent_element(&self, node: Self::Node) -> Option<Self::Node>;
    /// Element siblings including `node`, in document order.
    fn siblings(&self, node: Self::Node) -> Vec<Self::Node>;
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let mut parser = Parser {
            chars: input.chars().collect(),
            pos: 0,
            source: input,
        };
        let list = parser.selector_list()?;
        Ok(list)
    }

    pub fn matches<T: ElementTree>(&self, tree: &T, node: T::Node) -> bool {
        self.alternatives
            .iter()
            .any(|complex| match_complex(tree, complex, complex.parts.len() - 1, node))
    }
}

fn match_complex<T: ElementTree>(tree: &T, complex: &Complex, idx: usize, node: T::Node) -> bool {
    if !match_compound(tree, &complex.parts[idx], node) {
        return false;
    }
    if idx == 0 {
        return true;
    }
    match complex.combinators[idx - 1] {
        Combinator::Child => tree
            .parent_element(node)
            .map(|parent| match_complex(tree, complex, idx - 1, parent))
            .unwrap_or(false),
        Combinator::Descendant => {
            let mut cursor = tree.parent_element(node);
            while let Some(ancestor) = cursor {
                if match_complex(tree, complex, idx - 1, ancestor) {
                    return true;
                }
                cursor = tree.parent_element(ancestor);
            }
            false
        }
    }
}

fn match_compound<T: ElementTree>(tree: &T, compound: &Compound, node: T::Node) -> bool {
    if let Some(tag) = &compound.tag {
        if !tree.tag(node).eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if !compound
        .ids
        .iter()
        .all(|id| tree.attr(node, "id") == Some(id.as_str()))
    {
        return false;
    }
    if !compound.classes.iter().all(|class| {
        tree.attr(node, "class")
            .map(|c| c.split_whitespace().any(|token| token == class))
            .unwrap_or(false)
    }) {
        return false;
    }
    if !compound.attrs.iter().all(|test| match_attr(tree, test, node)) {
        return false;
    }
    compound.pseudos.iter().all(|pseudo| match pseudo {
        Pseudo::NthOfType(n) => of_type_position(tree, node).0 == *n,
        Pseudo::LastOfType => {
            let (pos, total) = of_type_position(tree, node);
            pos == total
        }
        Pseudo::FirstChild => tree.siblings(node).first() == Some(&node),
        Pseudo::Not(inner) => !match_compound(tree, inner, node),
    })
}

fn of_type_position<T: ElementTree>(tree: &T, node: T::Node) -> (usize, usize) {
    let tag = tree.tag(node).to_ascii_lowercase();
    let same: Vec<T::Node> = tree
        .siblings(node)
        .into_iter()
        .filter(|s| tree.tag(*s).eq_ignore_ascii_case(&tag))
        .collect();
    let pos = same.iter().position(|s| *s == node).map(|p| p + 1).unwrap_or(0);
    (pos, same.len())
}

fn match_attr<T: ElementTree>(tree: &T, test: &AttrTest, node: T::Node) -> bool {
    let Some(actual) = tree.attr(node, &test.name) else {
        return false;
    };
    let (actual, expected) = if test.case_insensitive {
        (actual.to_lowercase(), test.value.to_lowercase())
    } else {
        (actual.to_string(), test.value.clone())
    };
    match test.op {
        AttrOp::Exists => true,
        AttrOp::Equals => actual == expected,
        AttrOp::Includes => actual.split_whitespace().any(|t| t == expected),
        AttrOp::DashMatch => actual == expected || actual.starts_with(&format!("{expected}-")),
        AttrOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
        AttrOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
        AttrOp::Substring => !expected.is_empty() && actual.contains(&expected),
    }
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn fail<T>(&self, what: &str) -> Result<T, SelectorError> {
        Err(SelectorError(format!("{what} at {} in `{}`", self.pos, self.source)))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().map(char::is_whitespace).unwrap_or(false) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn selector_list(&mut self) -> Result<SelectorList, SelectorError> {
        let mut alternatives = Vec::new();
        loop {
            self.skip_ws();
            alternatives.push(self.complex()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                None => break,
                Some(_) => return self.fail("unexpected character"),
            }
        }
        Ok(SelectorList { alternatives })
    }

    fn complex(&mut self) -> Result<Complex, SelectorError> {
        let mut parts = vec![self.compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_ws = self.skip_ws();
            match self.peek() {
                Some('>') => {
                    self.pos += 1;
                    self.skip_ws();
                    combinators.push(Combinator::Child);
                    parts.push(self.compound()?);
                }
                Some('+') | Some('~') => return self.fail("sibling combinators"),
                Some(',') | None => break,
                Some(_) if had_ws => {
                    combinators.push(Combinator::Descendant);
                    parts.push(self.compound()?);
                }
                Some(_) => return self.fail("unexpected character"),
            }
        }
        Ok(Complex { parts, combinators })
    }

    fn compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        let mut empty = true;
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                empty = false;
            }
            Some(c) if is_ident_start(c) => {
                compound.tag = Some(self.ident()?.to_ascii_lowercase());
                empty = false;
            }
            _ => {}
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.ids.push(self.ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.attribute()?);
                }
                Some(':') => {
                    self.pos += 1;
                    compound.pseudos.push(self.pseudo()?);
                }
                _ => break,
            }
            empty = false;
        }
        if empty {
            return self.fail("expected selector");
        }
        Ok(compound)
    }

    fn ident(&mut self) -> Result<String, SelectorError> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                match self.peek() {
                    Some(escaped) => {
                        out.push(escaped);
                        self.pos += 1;
                    }
                    None => return self.fail("dangling escape"),
                }
            } else if is_ident_char(c) {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if out.is_empty() {
            return self.fail("expected identifier");
        }
        Ok(out)
    }

    fn attribute(&mut self) -> Result<AttrTest, SelectorError> {
        self.skip_ws();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_ws();
        let op = match (self.peek(), self.chars.get(self.pos + 1).copied()) {
            (Some(']'), _) => {
                self.pos += 1;
                return Ok(AttrTest {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                    case_insensitive: false,
                });
            }
            (Some('='), _) => {
                self.pos += 1;
                AttrOp::Equals
            }
            (Some(c), Some('=')) => {
                self.pos += 2;
                match c {
                    '~' => AttrOp::Includes,
                    '|' => AttrOp::DashMatch,
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    '*' => AttrOp::Substring,
                    _ => return self.fail("unknown attribute operator"),
                }
            }
            _ => return self.fail("expected attribute operator"),
        };
        self.skip_ws();
        let value = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                let mut out = String::new();
                loop {
                    match self.peek() {
                        Some('\\') => {
                            self.pos += 1;
                            if let Some(c) = self.peek() {
                                out.push(c);
                                self.pos += 1;
                            }
                        }
                        Some(c) if c == q => {
                            self.pos += 1;
                            break;
                        }
                        Some(c) => {
                            out.push(c);
                            self.pos += 1;
                        }
                        None => return self.fail("unterminated string"),
                    }
                }
                out
            }
            _ => self.ident()?,
        };
        self.skip_ws();
        let mut case_insensitive = false;
        if matches!(self.peek(), Some('i' | 'I')) {
            case_insensitive = true;
            self.pos += 1;
            self.skip_ws();
        }
        if self.peek() != Some(']') {
            return self.fail("expected `]`");
        }
        self.pos += 1;
        Ok(AttrTest {
            name,
            op,
            value,
            case_insensitive,
        })
    }

    fn pseudo(&mut self) -> Result<Pseudo, SelectorError> {
        let name = self.ident()?.to_ascii_lowercase();
        match name.as_str() {
            "first-of-type" => Ok(Pseudo::NthOfType(1)),
            "last-of-type" => Ok(Pseudo::LastOfType),
            "first-child" => Ok(Pseudo::FirstChild),
            "nth-of-type" => {
                let arg = self.parenthesized()?;
                match arg.trim().parse::<usize>() {
                    Ok(n) if n > 0 => Ok(Pseudo::NthOfType(n)),
                    _ => self.fail("nth-of-type only takes a positive integer"),
                }
            }
            "not" => {
                let arg = self.parenthesized()?;
                let mut inner = Parser {
                    chars: arg.chars().collect(),
                    pos: 0,
                    source: self.source,
                };
                inner.skip_ws();
                let compound = inner.compound()?;
                inner.skip_ws();
                if inner.peek().is_some() {
                    return self.fail(":not() only takes a compound selector");
                }
                Ok(Pseudo::Not(Box::new(compound)))
            }
            _ => self.fail("pseudo-class"),
        }
    }

    fn parenthesized(&mut self) -> Result<String, SelectorError> {
        if self.peek() != Some('(') {
            return self.fail("expected `(`");
        }
        self.pos += 1;
        let mut depth = 1;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                }
                _ => {}
            }
            out.push(c);
        }
        self.fail("unterminated `(`")
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}

/// Quote a string for use inside a CSS attribute selector.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' | '\r' => out.push(' '),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// `#id` when the id is a plain identifier, otherwise an attribute selector.
pub fn id_selector(id: &str) -> String {
    let plain = id.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false)
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if plain {
        format!("#{id}")
    } else {
        format!("[id={}]", quote(id))
    }
}

/// `tag[name="value"]`.
pub fn attr_selector(tag: &str, name: &str, value: &str) -> String {
    format!("{tag}[{name}={}]", quote(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tiny fixed tree: html > body > (div.menu#nav > a[href] x2, form > input[name=q])
    struct Fixture {
        nodes: Vec<(&'static str, Vec<(&'static str, &'static str)>, Option<usize>)>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                nodes: vec![
                    ("html", vec![], None),
                    ("body", vec![], Some(0)),
                    ("div", vec![("id", "nav"), ("class", "menu main")], Some(1)),
                    ("a", vec![("href", "/a")], Some(2)),
                    ("a", vec![("href", "/b"), ("data-testid", "second-link")], Some(2)),
                    ("form", vec![], Some(1)),
                    ("input", vec![("name", "q"), ("placeholder", "Search here")], Some(5)),
                ],
            }
        }
    }

    impl ElementTree for Fixture {
        type Node = usize;

        fn tag(&self, node: usize) -> &str {
            self.nodes[node].0
        }

        fn attr(&self, node: usize, name: &str) -> Option<&str> {
            self.nodes[node]
                .1
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| *v)
        }

        fn parent_element(&self, node: usize) -> Option<usize> {
            self.nodes[node].2
        }

        fn siblings(&self, node: usize) -> Vec<usize> {
            let parent = self.nodes[node].2;
            (0..self.nodes.len())
                .filter(|i| self.nodes[*i].2 == parent)
                .collect()
        }
    }

    fn select(css: &str) -> Vec<usize> {
        let tree = Fixture::new();
        let list = SelectorList::parse(css).expect("parse");
        (0..tree.nodes.len())
            .filter(|n| list.matches(&tree, *n))
            .collect()
    }

    #[test]
    fn matches_simple_selectors() {
        assert_eq!(select("a"), vec![3, 4]);
        assert_eq!(select("#nav"), vec![2]);
        assert_eq!(select(".menu.main"), vec![2]);
        assert_eq!(select("[data-testid]"), vec![4]);
    }

    #[test]
    fn matches_attribute_operators() {
        assert_eq!(select("input[name=\"q\"]"), vec![6]);
        assert_eq!(select("[placeholder*=search i]"), vec![6]);
        assert_eq!(select("[href^='/']"), vec![3, 4]);
        assert_eq!(select("[href$=b]"), vec![4]);
        assert_eq!(select("[class~=main]"), vec![2]);
    }

    #[test]
    fn matches_combinators_and_structure() {
        assert_eq!(select("body > div > a:nth-of-type(2)"), vec![4]);
        assert_eq!(select("html a"), vec![3, 4]);
        assert_eq!(select("body > a"), Vec::<usize>::new());
        assert_eq!(select("a:last-of-type, form input"), vec![4, 6]);
        assert_eq!(select("a:not([data-testid])"), vec![3]);
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(SelectorList::parse("a + b").is_err());
        assert!(SelectorList::parse("a:hover").is_err());
        assert!(SelectorList::parse("").is_err());
        assert!(SelectorList::parse("[href=\"x").is_err());
    }

    #[test]
    fn generated_selectors_round_trip() {
        assert_eq!(id_selector("nav"), "#nav");
        assert_eq!(id_selector("1st:item"), "[id=\"1st:item\"]");
        assert_eq!(select(&attr_selector("a", "data-testid", "second-link")), vec![4]);
        assert_eq!(quote("say \"hi\""), "\"say \\\"hi\\\"\"");
    }
}
