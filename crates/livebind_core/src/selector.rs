//! A small selector language for element discovery.
//!
//! Supports compound simple selectors and comma-separated groups:
//! `*`, `tag`, `#id`, `.class`, `[name]`, `[name=value]`, `[name="value"]`.
//! Combinators (descendant, child, ...) are not supported since the element
//! tree is flat.

use crate::element::Element;
use crate::error::{SyncError, SyncResult};

/// Default discovery selector.
pub const DEFAULT_SELECTOR: &str = r#"[sync="true"]"#;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Tag(String),
    Id(String),
    Class(String),
    HasAttr(String),
    AttrEquals(String, String),
}

impl Part {
    fn matches(&self, element: &Element) -> bool {
        match self {
            Part::Tag(tag) => element.tag() == tag,
            Part::Id(id) => element.attribute("id").as_deref() == Some(id.as_str()),
            Part::Class(class) => element.classes().iter().any(|c| c == class),
            Part::HasAttr(name) => element.has_attribute(name),
            Part::AttrEquals(name, value) => {
                element.attribute(name).as_deref() == Some(value.as_str())
            }
        }
    }
}

/// A parsed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    groups: Vec<Vec<Part>>,
}

impl Selector {
    /// Parses a selector string.
    pub fn parse(input: &str) -> SyncResult<Self> {
        let mut groups = Vec::new();
        for group in input.split(',') {
            let group = group.trim();
            if group.is_empty() {
                return Err(invalid(input, "empty selector group"));
            }
            groups.push(parse_compound(input, group)?);
        }
        Ok(Self { groups })
    }

    /// Returns true if the element matches any group.
    pub fn matches(&self, element: &Element) -> bool {
        self.groups
            .iter()
            .any(|parts| parts.iter().all(|p| p.matches(element)))
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self {
            groups: vec![vec![Part::AttrEquals("sync".into(), "true".into())]],
        }
    }
}

fn invalid(input: &str, reason: &str) -> SyncError {
    SyncError::Config(format!("invalid selector {input:?}: {reason}"))
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':'
}

fn take_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

fn parse_compound(input: &str, group: &str) -> SyncResult<Vec<Part>> {
    let chars: Vec<char> = group.chars().collect();
    let mut pos = 0;
    let mut parts = Vec::new();

    while pos < chars.len() {
        match chars[pos] {
            '*' if pos == 0 => pos += 1,
            '#' | '.' => {
                let marker = chars[pos];
                pos += 1;
                let ident = take_ident(&chars, &mut pos);
                if ident.is_empty() {
                    return Err(invalid(input, "expected identifier"));
                }
                parts.push(if marker == '#' {
                    Part::Id(ident)
                } else {
                    Part::Class(ident)
                });
            }
            '[' => {
                pos += 1;
                let name = take_ident(&chars, &mut pos).to_ascii_lowercase();
                if name.is_empty() {
                    return Err(invalid(input, "expected attribute name"));
                }
                match chars.get(pos) {
                    Some(']') => {
                        pos += 1;
                        parts.push(Part::HasAttr(name));
                    }
                    Some('=') => {
                        pos += 1;
                        let value = parse_value(input, &chars, &mut pos)?;
                        if chars.get(pos) != Some(&']') {
                            return Err(invalid(input, "expected ']'"));
                        }
                        pos += 1;
                        parts.push(Part::AttrEquals(name, value));
                    }
                    _ => return Err(invalid(input, "expected ']' or '='")),
                }
            }
            c if is_ident_char(c) && pos == 0 => {
                let tag = take_ident(&chars, &mut pos).to_ascii_lowercase();
                parts.push(Part::Tag(tag));
            }
            c if c.is_whitespace() => return Err(invalid(input, "combinators are not supported")),
            c => return Err(invalid(input, &format!("unexpected character {c:?}"))),
        }
    }

    Ok(parts)
}

fn parse_value(input: &str, chars: &[char], pos: &mut usize) -> SyncResult<String> {
    match chars.get(*pos) {
        Some(&quote) if quote == '"' || quote == '\'' => {
            *pos += 1;
            let start = *pos;
            while *pos < chars.len() && chars[*pos] != quote {
                *pos += 1;
            }
            if *pos >= chars.len() {
                return Err(invalid(input, "unterminated string"));
            }
            let value = chars[start..*pos].iter().collect();
            *pos += 1;
            Ok(value)
        }
        _ => Ok(take_ident(chars, pos)),
    }
}
