//! Reply body parsing.
//!
//! Reply text is parsed once, at load time, into a small tree of [`Node`]s so
//! that rendering is a plain left-to-right walk. Tags may nest
//! (`<set name=<formal>>`, `{random}<star>|you{/random}`), so the parser is
//! recursive: every tag body is itself a [`Template`].
//!
//! ```text
//! "Nice to meet you, <set name=<star>><get name>!{weight=3}"
//!
//! Template (weight 3)
//!  ├─ Text("Nice to meet you, ")
//!  ├─ Set { name: "name", value: [Star 1] }
//!  ├─ Get("name")
//!  └─ Text("!")
//! ```
//!
//! Unknown `<...>` and `{...}` sequences are kept as literal text (reply
//! bodies routinely carry HTML such as `<a href="...">`), but tags found
//! *inside* them are still parsed, so `<a href="?q=<star>">` substitutes the
//! capture. Only block tags with a missing terminator (`{random}`, `<call>`,
//! `{sentence}` and friends) and a bad `{weight=N}` are compile errors.
//!
//! Conditions (`* <get age> >= 18 => Vote.`) are parsed here as well: both
//! operands and the body are templates.

use crate::error::CompileError;

/// Numeric variable update performed by `<add>`, `<sub>`, `<mult>`, `<div>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Sub,
    Mult,
    Div,
}

/// Case transformation performed by `{sentence}`, `{formal}`, `{uppercase}`,
/// `{lowercase}` and their `<...>` shorthands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Sentence,
    Formal,
    Upper,
    Lower,
}

impl Case {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "sentence" => Some(Case::Sentence),
            "formal" => Some(Case::Formal),
            "uppercase" => Some(Case::Upper),
            "lowercase" => Some(Case::Lower),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Case::Sentence => "sentence",
            Case::Formal => "formal",
            Case::Upper => "uppercase",
            Case::Lower => "lowercase",
        }
    }

    /// Apply this transformation to `text`.
    pub fn apply(self, text: &str) -> String {
        match self {
            Case::Upper => text.to_uppercase(),
            Case::Lower => text.to_lowercase(),
            Case::Sentence => capitalize(&text.to_lowercase()),
            Case::Formal => text.split(' ').map(|w| capitalize(&w.to_lowercase())).collect::<Vec<_>>().join(" "),
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    /// `<star N>` (or `<botstar N>` when `bot`), 1-based.
    Star { index: usize, bot: bool },
    Input(usize),
    Reply(usize),
    Get(String),
    Set { name: String, value: Template },
    Math { op: MathOp, name: String, value: Template },
    Bot(String),
    Env(String),
    Id,
    /// `<call>name args...</call>`; the body renders to the call line.
    Call(Template),
    Random(Vec<Template>),
    /// `{@text}` / `<@>`: reply to `text` and splice the result in.
    Redirect(Template),
    /// `{topic=name}`
    Topic(String),
    Format { case: Case, body: Template },
}

/// A parsed reply body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
    weight: u32,
}

impl Template {
    /// Parse reply text.
    pub fn parse(source: &str) -> Result<Self, CompileError> {
        let (nodes, weight) = parse_nodes(source, source)?;
        Ok(Template { source: source.to_string(), nodes, weight })
    }

    /// A template that renders `<star>`.
    fn first_star() -> Self {
        Template { source: "<star>".to_string(), nodes: vec![Node::Star { index: 1, bot: false }], weight: 0 }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// `{weight=N}` value, 0 when absent.
    pub fn weight(&self) -> u32 {
        self.weight
    }
}

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "==" | "eq" => Some(CompareOp::Eq),
            "!=" | "ne" | "<>" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }

    /// Compare two rendered operands.
    ///
    /// Equality is textual; ordering operators compare numerically and are
    /// false when either side is not a number.
    pub fn holds(self, left: &str, right: &str) -> bool {
        let (left, right) = (left.trim(), right.trim());
        let numbers = || Some((left.parse::<f64>().ok()?, right.parse::<f64>().ok()?));
        match self {
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            CompareOp::Lt => numbers().is_some_and(|(l, r)| l < r),
            CompareOp::Le => numbers().is_some_and(|(l, r)| l <= r),
            CompareOp::Gt => numbers().is_some_and(|(l, r)| l > r),
            CompareOp::Ge => numbers().is_some_and(|(l, r)| l >= r),
        }
    }
}

/// A guarded alternative: `left OP right => body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    source: String,
    pub left: Template,
    pub op: CompareOp,
    pub right: Template,
    pub body: Template,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, CompileError> {
        let malformed = || CompileError::MalformedCondition { text: source.to_string() };

        let (guard, body) = source.split_once("=>").ok_or_else(malformed)?;
        let re = crate::regex!(r"^(.+?)\s+(==|eq|!=|ne|<>|<=|>=|<|>)(?:\s+(.*))?$");
        let caps = re.captures(guard.trim()).ok_or_else(malformed)?;

        let left = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let op = caps.get(2).and_then(|m| CompareOp::parse(m.as_str())).ok_or_else(malformed)?;
        let right = caps.get(3).map(|m| m.as_str()).unwrap_or("");

        Ok(Condition {
            source: source.to_string(),
            left: Template::parse(left.trim())?,
            op,
            right: Template::parse(right.trim())?,
            body: Template::parse(body.trim())?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

// --- Parser ------------------------------------------------------------------

fn parse_nodes(src: &str, full: &str) -> Result<(Vec<Node>, u32), CompileError> {
    let mut nodes = Vec::new();
    let mut text = String::new();
    let mut weight = 0;
    let mut rest = src;

    while let Some(c) = rest.chars().next() {
        match c {
            '\\' => {
                let escaped = match rest[1..].chars().next() {
                    Some('s') => Some(' '),
                    Some('n') => Some('\n'),
                    Some('#') => Some('#'),
                    Some('\\') => Some('\\'),
                    _ => None,
                };
                if let Some(e) = escaped {
                    text.push(e);
                    rest = &rest[2..];
                    continue;
                }
            }
            '{' => {
                if let Some((item, consumed)) = parse_brace(rest, full)? {
                    match item {
                        BraceItem::Weight(w) => weight = w,
                        BraceItem::Node(node) => {
                            flush_text(&mut text, &mut nodes);
                            nodes.push(node);
                        }
                    }
                    rest = &rest[consumed..];
                    continue;
                }
            }
            '<' => {
                if let Some((node, consumed)) = parse_angle(rest, full)? {
                    flush_text(&mut text, &mut nodes);
                    nodes.push(node);
                    rest = &rest[consumed..];
                    continue;
                }
            }
            _ => {}
        }
        text.push(c);
        rest = &rest[c.len_utf8()..];
    }
    flush_text(&mut text, &mut nodes);

    Ok((nodes, weight))
}

fn flush_text(text: &mut String, nodes: &mut Vec<Node>) {
    if !text.is_empty() {
        nodes.push(Node::Text(std::mem::take(text)));
    }
}

fn sub_template(source: &str, full: &str) -> Result<Template, CompileError> {
    let (nodes, weight) = parse_nodes(source, full)?;
    Ok(Template { source: source.to_string(), nodes, weight })
}

enum BraceItem {
    Weight(u32),
    Node(Node),
}

/// Parse a `{...}` tag at the start of `rest`. Returns the item and the number
/// of bytes consumed, or `None` when the braces are literal text.
fn parse_brace(rest: &str, full: &str) -> Result<Option<(BraceItem, usize)>, CompileError> {
    if let Some(after) = rest.strip_prefix("{weight=") {
        let Some(end) = after.find('}') else {
            return Ok(None);
        };
        let value = after[..end].trim();
        let w = value
            .parse::<u32>()
            .map_err(|_| CompileError::InvalidWeight { value: value.to_string(), text: full.to_string() })?;
        return Ok(Some((BraceItem::Weight(w), "{weight=".len() + end + 1)));
    }

    if rest.starts_with("{random}") {
        let open = "{random}";
        let (body, consumed) = block_body(rest, open, "{/random}")
            .ok_or(CompileError::Unterminated { tag: "{random}", text: full.to_string() })?;
        let alternatives = split_random(body);
        let mut alts = Vec::with_capacity(alternatives.len());
        for alt in alternatives {
            alts.push(sub_template(alt, full)?);
        }
        return Ok(Some((BraceItem::Node(Node::Random(alts)), consumed)));
    }

    if let Some(after) = rest.strip_prefix("{@") {
        let Some(end) = after.find('}') else {
            return Err(CompileError::Unterminated { tag: "{@...}", text: full.to_string() });
        };
        let target = sub_template(after[..end].trim(), full)?;
        return Ok(Some((BraceItem::Node(Node::Redirect(target)), "{@".len() + end + 1)));
    }

    if let Some(after) = rest.strip_prefix("{topic=") {
        let Some(end) = after.find('}') else {
            return Ok(None);
        };
        let topic = after[..end].trim().to_lowercase();
        return Ok(Some((BraceItem::Node(Node::Topic(topic)), "{topic=".len() + end + 1)));
    }

    for case in [Case::Sentence, Case::Formal, Case::Upper, Case::Lower] {
        let open = format!("{{{}}}", case.name());
        if rest.starts_with(&open) {
            let close = format!("{{/{}}}", case.name());
            let (body, consumed) = block_body(rest, &open, &close)
                .ok_or(CompileError::Unterminated { tag: "{sentence}/{formal}/{uppercase}/{lowercase}", text: full.to_string() })?;
            let body = sub_template(body, full)?;
            return Ok(Some((BraceItem::Node(Node::Format { case, body }), consumed)));
        }
    }

    Ok(None)
}

/// Find the body of a block tag that starts at `rest`, honouring nesting of
/// the same tag. Returns `(body, bytes consumed including both tags)`.
fn block_body<'s>(rest: &'s str, open: &str, close: &str) -> Option<(&'s str, usize)> {
    let mut depth = 0usize;
    let mut i = 0;
    while i < rest.len() {
        let tail = &rest[i..];
        if tail.starts_with(open) {
            depth += 1;
            i += open.len();
        } else if tail.starts_with(close) {
            depth -= 1;
            if depth == 0 {
                return Some((&rest[open.len()..i], i + close.len()));
            }
            i += close.len();
        } else {
            i += tail.chars().next().map(char::len_utf8).unwrap_or(1);
        }
    }
    None
}

/// Split a `{random}` body into alternatives: on top-level `|` when present,
/// otherwise on whitespace.
fn split_random(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < body.len() {
        let tail = &body[i..];
        if tail.starts_with("{random}") {
            depth += 1;
            i += "{random}".len();
            continue;
        }
        if tail.starts_with("{/random}") {
            depth = depth.saturating_sub(1);
            i += "{/random}".len();
            continue;
        }
        if tail.starts_with('|') && depth == 0 {
            parts.push(&body[start..i]);
            start = i + 1;
        }
        i += tail.chars().next().map(char::len_utf8).unwrap_or(1);
    }

    if parts.is_empty() {
        return body.split_whitespace().collect();
    }
    parts.push(&body[start..]);
    parts
}

/// Parse a `<...>` tag at the start of `rest`. Unknown tags return `None`.
fn parse_angle(rest: &str, full: &str) -> Result<Option<(Node, usize)>, CompileError> {
    if let Some(after) = rest.strip_prefix("<call>") {
        let end = after.find("</call>").ok_or(CompileError::Unterminated { tag: "<call>", text: full.to_string() })?;
        let body = sub_template(after[..end].trim(), full)?;
        return Ok(Some((Node::Call(body), "<call>".len() + end + "</call>".len())));
    }

    let Some(end) = matching_angle(rest) else {
        return Ok(None);
    };
    let inner = &rest[1..end];
    let consumed = end + 1;

    let (name, args) = match inner.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (inner, ""),
    };

    let node = match name {
        "@" if args.is_empty() => Some(Node::Redirect(Template::first_star())),
        "id" if args.is_empty() => Some(Node::Id),
        "get" | "bot" | "env" if is_identifier(args) => Some(match name {
            "get" => Node::Get(args.to_string()),
            "bot" => Node::Bot(args.to_string()),
            _ => Node::Env(args.to_string()),
        }),
        "set" | "add" | "sub" | "mult" | "div" => match args.split_once('=') {
            Some((var, value)) if is_identifier(var.trim()) => {
                let var = var.trim().to_string();
                let value = sub_template(value.trim(), full)?;
                Some(match name {
                    "set" => Node::Set { name: var, value },
                    "add" => Node::Math { op: MathOp::Add, name: var, value },
                    "sub" => Node::Math { op: MathOp::Sub, name: var, value },
                    "mult" => Node::Math { op: MathOp::Mult, name: var, value },
                    _ => Node::Math { op: MathOp::Div, name: var, value },
                })
            }
            _ => None,
        },
        _ => {
            if let Some(case) = Case::from_name(name).filter(|_| args.is_empty()) {
                Some(Node::Format { case, body: Template::first_star() })
            } else {
                indexed_tag(name, args)
            }
        }
    };

    Ok(node.map(|n| (n, consumed)))
}

/// `<star>`, `<star2>`, `<star 2>`, `<botstar...>`, `<input...>`, `<reply...>`.
fn indexed_tag(name: &str, args: &str) -> Option<Node> {
    for prefix in ["botstar", "star", "input", "reply"] {
        let Some(suffix) = name.strip_prefix(prefix) else {
            continue;
        };
        let digits = match (suffix.is_empty(), args.is_empty()) {
            (true, true) => "1",
            (true, false) => args,
            (false, true) => suffix,
            (false, false) => return None,
        };
        let index = digits.parse::<usize>().ok()?;
        return Some(match prefix {
            "botstar" => Node::Star { index, bot: true },
            "star" => Node::Star { index, bot: false },
            "input" => Node::Input(index),
            _ => Node::Reply(index),
        });
    }
    None
}

/// Byte index of the `>` closing the `<` at the start of `text`, honouring
/// nested `<...>` pairs.
fn matching_angle(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
}
