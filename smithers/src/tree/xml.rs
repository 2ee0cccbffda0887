//! Canonical deterministic XML serializer (spec §3, §4.3).
//!
//! Grounded on the teacher's `graph::generate_dot`/`generate_text` rendering
//! helpers (`graph/mod.rs`) for the shape of a pure, side-effect-free tree
//! renderer, and on `tool_source/context.rs` for the warning-collection style
//! (collect into a side list, never alter the primary output).

use serde_json::Value;

use crate::error::SmithersError;

use super::node::{Node, NodeKey, ROOT, TEXT};

const INDENT: &str = "  ";

/// Serializes a node (and its subtree) to canonical XML.
///
/// `ROOT` renders as a newline-joined list of its children with no enclosing
/// tag; `TEXT` renders as its escaped `value` prop with no tag.
pub fn to_canonical_xml(node: &Node) -> String {
    let mut out = String::new();
    render(node, 0, &mut out);
    out
}

fn render(node: &Node, depth: usize, out: &mut String) {
    let lower = node.node_type.to_lowercase();

    if lower == ROOT {
        let mut first = true;
        for child in &node.children {
            if !first {
                out.push('\n');
            }
            first = false;
            render(child, depth, out);
        }
        return;
    }

    if lower == TEXT {
        let value = node
            .prop("value")
            .and_then(Value::as_str)
            .unwrap_or_default();
        indent(out, depth);
        out.push_str(&escape(value));
        return;
    }

    indent(out, depth);
    out.push('<');
    out.push_str(&lower);

    if let Some(ref key) = node.key {
        out.push_str(" key=\"");
        out.push_str(&escape(&key_to_string(key)));
        out.push('"');
    }
    for (name, value) in node.visible_props() {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape(&value_to_attr_string(value)));
        out.push('"');
    }

    if node.children.is_empty() {
        out.push_str(" />");
        return;
    }

    out.push('>');
    for child in &node.children {
        out.push('\n');
        render(child, depth + 1, out);
    }
    out.push('\n');
    indent(out, depth);
    out.push_str("</");
    out.push_str(&lower);
    out.push('>');
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn key_to_string(key: &NodeKey) -> String {
    key.to_string()
}

/// Primitives render as-is (stringified); objects/arrays render as JSON.
fn value_to_attr_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string(value).unwrap_or_default()
        }
    }
}

/// Escapes `& < > " '` per spec §4.3. `&` first, so later substitutions don't
/// double-escape the ampersands they introduce.
fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Parses a plan file written in the canonical XML dialect [`to_canonical_xml`]
/// emits, back into a [`Node`] tree (the inverse transform; spec §6's `run`/`plan`
/// commands need a concrete agent-file format since the host — here, the CLI —
/// owns parsing its own source per spec §6).
///
/// Supports the grammar `to_canonical_xml` produces: lower/mixed-case tags,
/// a leading `key` attribute, further `name="value"` attributes (quoted
/// strings, or JSON text for numbers/bools/objects/arrays), self-closing and
/// open/close elements, and escaped text content. Multiple top-level
/// elements are wrapped under a synthetic [`ROOT`]. Whitespace-only text
/// between sibling elements is formatting and is dropped.
pub fn parse_plan_xml(source: &str) -> Result<Node, SmithersError> {
    let mut parser = Parser { src: source, pos: 0 };
    let root = parser.parse_document()?;
    parser.skip_ws();
    if parser.pos < parser.src.len() {
        return Err(parser.error("unexpected trailing content after document root"));
    }
    Ok(root)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> SmithersError {
        let (line, column) = line_col(self.src, self.pos);
        SmithersError::load_at(message, line, column)
    }

    fn starts_with_boundary(&self, prefix: &str) -> bool {
        let Some(rest) = self.src.get(self.pos..) else {
            return false;
        };
        let Some(after) = rest.strip_prefix(prefix) else {
            return false;
        };
        after.chars().next().map(|c| c == '>' || c.is_whitespace()).unwrap_or(false)
    }

    fn parse_document(&mut self) -> Result<Node, SmithersError> {
        let mut children = Vec::new();
        loop {
            self.skip_ws();
            if self.pos >= self.src.len() {
                break;
            }
            children.push(self.parse_node()?);
        }
        Ok(Node::new(ROOT).with_children(children))
    }

    fn parse_node(&mut self) -> Result<Node, SmithersError> {
        if self.peek_char() == Some('<') {
            self.parse_element()
        } else {
            self.parse_text()
        }
    }

    fn parse_text(&mut self) -> Result<Node, SmithersError> {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c == '<' {
                break;
            }
            self.advance();
        }
        Ok(Node::text(unescape(&self.src[start..self.pos])))
    }

    fn parse_ident(&mut self) -> &'a str {
        let start = self.pos;
        while matches!(self.peek_char(), Some(c) if c.is_alphanumeric() || c == '-' || c == '_') {
            self.advance();
        }
        &self.src[start..self.pos]
    }

    fn parse_element(&mut self) -> Result<Node, SmithersError> {
        self.advance(); // '<'
        let tag = self.parse_ident().to_string();
        if tag.is_empty() {
            return Err(self.error("expected element name after '<'"));
        }
        let mut node = Node::new(tag.clone());

        loop {
            self.skip_ws();
            match self.peek_char() {
                Some('/') => {
                    self.advance();
                    if self.peek_char() != Some('>') {
                        return Err(self.error(format!("expected '>' after '/' in <{tag}>")));
                    }
                    self.advance();
                    return Ok(node);
                }
                Some('>') => {
                    self.advance();
                    break;
                }
                Some(_) => {
                    let (name, value) = self.parse_attr()?;
                    if name == "key" {
                        node.key = Some(parse_key(&value));
                    } else {
                        node.set_prop(name, parse_value(&value));
                    }
                }
                None => return Err(self.error(format!("unterminated tag <{tag}"))),
            }
        }

        let mut children = Vec::new();
        loop {
            if self.starts_with_boundary(&format!("</{tag}")) {
                self.pos += 2 + tag.len();
                self.skip_ws();
                if self.peek_char() != Some('>') {
                    return Err(self.error(format!("expected '>' to close </{tag}>")));
                }
                self.advance();
                break;
            }
            if self.pos >= self.src.len() {
                return Err(self.error(format!("unterminated element <{tag}>, missing </{tag}>")));
            }
            let child = self.parse_node()?;
            if child.node_type == TEXT {
                let blank = child
                    .prop("value")
                    .and_then(Value::as_str)
                    .map(|v| v.trim().is_empty())
                    .unwrap_or(true);
                if blank {
                    continue;
                }
            }
            children.push(child);
        }
        Ok(node.with_children(children))
    }

    fn parse_attr(&mut self) -> Result<(String, String), SmithersError> {
        let name = self.parse_ident().to_string();
        if name.is_empty() {
            return Err(self.error("expected attribute name"));
        }
        self.skip_ws();
        if self.peek_char() != Some('=') {
            return Err(self.error(format!("expected '=' after attribute '{name}'")));
        }
        self.advance();
        self.skip_ws();
        if self.peek_char() != Some('"') {
            return Err(self.error(format!("expected opening '\"' for attribute '{name}'")));
        }
        self.advance();
        let start = self.pos;
        while matches!(self.peek_char(), Some(c) if c != '"') {
            self.advance();
        }
        if self.peek_char() != Some('"') {
            return Err(self.error(format!("unterminated attribute value for '{name}'")));
        }
        let raw = self.src[start..self.pos].to_string();
        self.advance(); // closing '"'
        Ok((name, unescape(&raw)))
    }
}

fn line_col(src: &str, byte_pos: usize) -> (u32, u32) {
    let mut line = 1u32;
    let mut col = 1u32;
    for c in src[..byte_pos.min(src.len())].chars() {
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Inverse of [`escape`]. Order matters: specific entities first, `&amp;` last,
/// so an unescaped literal `&amp;` in source doesn't get double-unescaped.
fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn parse_key(s: &str) -> NodeKey {
    match s.parse::<i64>() {
        Ok(n) => NodeKey::Number(n),
        Err(_) => NodeKey::String(s.to_string()),
    }
}

/// Recovers the typed value [`value_to_attr_string`] flattened into an
/// attribute string: numbers/bools/JSON containers round-trip; anything else
/// is kept as a plain string.
fn parse_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }
    if raw == "true" {
        return Value::Bool(true);
    }
    if raw == "false" {
        return Value::Bool(false);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::from(f);
    }
    let looks_like_container = (raw.starts_with('{') && raw.ends_with('}'))
        || (raw.starts_with('[') && raw.ends_with(']'));
    if looks_like_container {
        if let Ok(v) = serde_json::from_str(raw) {
            return v;
        }
    }
    Value::String(raw.to_string())
}
