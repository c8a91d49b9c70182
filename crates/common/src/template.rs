//! Jinja-style template engine
//!
//! Supports the subset of Jinja used by BIRD configuration templates:
//!
//! - `{{ expr }}` output, where `expr` is a dotted variable path, a string or
//!   integer literal, optionally piped through filters
//!   (`upper`, `lower`, `trim`, `length`, `default(x)`, `replace(a, b)`, `join(sep)`)
//! - `{% for x in expr %} ... {% else %} ... {% endfor %}` with a `loop` object
//! - `{% if expr %} ... {% elif expr %} ... {% else %} ... {% endif %}`
//! - `{# comments #}`
//! - `-` whitespace control on any delimiter (`{%-`, `-%}`, `{{-`, `-}}`)
//!
//! Undefined variables are errors unless guarded by `default`.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A parsed template
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Parse template source
    pub fn parse(source: &str) -> Result<Self> {
        let segments = lex(source)?;
        let mut parser = Parser { segments, pos: 0 };
        let (nodes, terminator) = parser.parse_nodes(&[])?;
        if let Some(tag) = terminator {
            return Err(Error::template(tag.line, format!("unexpected '{}'", tag.keyword)));
        }
        Ok(Self { nodes })
    }

    /// Render against a context object. Top-level keys become variables.
    pub fn render(&self, context: &Value) -> Result<String> {
        let mut scope = Scope {
            frames: vec![context.as_object().cloned().unwrap_or_default()],
        };
        let mut out = String::new();
        render_nodes(&self.nodes, &mut scope, &mut out)?;
        Ok(out)
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Expr,
    Block,
    Comment,
}

impl TagKind {
    fn close(self) -> &'static str {
        match self {
            TagKind::Expr => "}}",
            TagKind::Block => "%}",
            TagKind::Comment => "#}",
        }
    }
}

#[derive(Debug)]
enum Segment {
    Text(String),
    Tag {
        kind: TagKind,
        body: String,
        line: usize,
        trim_left: bool,
        trim_right: bool,
    },
}

fn find_tag_start(s: &str) -> Option<(usize, TagKind)> {
    let bytes = s.as_bytes();
    let mut from = 0;
    while let Some(offset) = s[from..].find('{') {
        let at = from + offset;
        match bytes.get(at + 1) {
            Some(b'{') => return Some((at, TagKind::Expr)),
            Some(b'%') => return Some((at, TagKind::Block)),
            Some(b'#') => return Some((at, TagKind::Comment)),
            _ => from = at + 1,
        }
    }
    None
}

/// Offset of the closing delimiter in `body`, skipping quoted strings
/// inside expression and block tags.
fn find_tag_end(body: &str, kind: TagKind) -> Option<usize> {
    let close = kind.close();
    if kind == TagKind::Comment {
        return body.find(close);
    }

    let mut quote = None;
    let mut escaped = false;
    for (at, c) in body.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if body[at..].starts_with(close) => return Some(at),
            None => {}
        }
    }
    None
}

fn lex(source: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = source;
    let mut line = 1;

    while let Some((start, kind)) = find_tag_start(rest) {
        let (text, tail) = rest.split_at(start);
        if !text.is_empty() {
            segments.push(Segment::Text(text.to_string()));
        }
        line += text.matches('\n').count();

        let Some(end) = find_tag_end(&tail[2..], kind) else {
            return Err(Error::template(line, format!("unclosed '{}'", &tail[..2])));
        };
        let raw = &tail[2..2 + end];
        let mut inner = raw;
        let trim_left = inner.starts_with('-');
        if trim_left {
            inner = &inner[1..];
        }
        let trim_right = inner.ends_with('-');
        if trim_right {
            inner = &inner[..inner.len() - 1];
        }

        segments.push(Segment::Tag {
            kind,
            body: inner.trim().to_string(),
            line,
            trim_left,
            trim_right,
        });

        line += raw.matches('\n').count();
        rest = &tail[2 + end + 2..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }

    for i in 0..segments.len() {
        let (trim_left, trim_right) = match &segments[i] {
            Segment::Tag {
                trim_left,
                trim_right,
                ..
            } => (*trim_left, *trim_right),
            Segment::Text(_) => continue,
        };
        if trim_left && i > 0 {
            if let Segment::Text(text) = &mut segments[i - 1] {
                let len = text.trim_end().len();
                text.truncate(len);
            }
        }
        if trim_right {
            if let Some(Segment::Text(text)) = segments.get_mut(i + 1) {
                *text = text.trim_start().to_string();
            }
        }
    }

    Ok(segments)
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Dot,
    Pipe,
    LParen,
    RParen,
    Comma,
}

fn tokenize(src: &str, line: usize) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(other) => s.push(other),
                            None => break,
                        },
                        Some(ch) if ch == quote => {
                            tokens.push(Token::Str(s));
                            break;
                        }
                        Some(ch) => s.push(ch),
                        None => return Err(Error::template(line, "unterminated string literal")),
                    }
                }
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut digits = String::new();
                digits.push(c);
                chars.next();
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                let n = digits
                    .parse()
                    .map_err(|_| Error::template(line, format!("invalid number '{}'", digits)))?;
                tokens.push(Token::Int(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if !(d.is_alphanumeric() || d == '_') {
                        break;
                    }
                    ident.push(d);
                    chars.next();
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(Error::template(line, format!("unexpected character '{}'", other)));
            }
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterKind {
    Upper,
    Lower,
    Trim,
    Length,
    Default,
    Replace,
    Join,
}

impl FilterKind {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "upper" => Self::Upper,
            "lower" => Self::Lower,
            "trim" => Self::Trim,
            "length" | "count" => Self::Length,
            "default" | "d" => Self::Default,
            "replace" => Self::Replace,
            "join" => Self::Join,
            _ => return None,
        })
    }

    /// Accepted argument counts (min, max)
    fn arity(self) -> (usize, usize) {
        match self {
            Self::Default => (1, 1),
            Self::Replace => (2, 2),
            Self::Join => (0, 1),
            _ => (0, 0),
        }
    }
}

#[derive(Debug, Clone)]
struct Filter {
    kind: FilterKind,
    args: Vec<Value>,
}

#[derive(Debug, Clone)]
enum Operand {
    Path(Vec<String>),
    Literal(Value),
}

#[derive(Debug, Clone)]
struct Expr {
    negate: bool,
    operand: Operand,
    filters: Vec<Filter>,
    line: usize,
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
    line: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::template(self.line, message)
    }

    fn literal(&mut self) -> Result<Value> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Int(n)) => Ok(Value::from(n)),
            Some(Token::Ident(word)) => match word.as_str() {
                "true" | "True" => Ok(Value::Bool(true)),
                "false" | "False" => Ok(Value::Bool(false)),
                "none" | "None" => Ok(Value::Null),
                _ => Err(self.error(format!("expected a literal, found '{}'", word))),
            },
            Some(other) => Err(self.error(format!("expected a literal, found {:?}", other))),
            None => Err(self.error("expected a literal")),
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut negate = false;
        if matches!(self.peek(), Some(Token::Ident(w)) if w == "not") {
            self.pos += 1;
            negate = true;
        }

        let operand = match self.peek() {
            Some(Token::Ident(w))
                if !matches!(w.as_str(), "true" | "True" | "false" | "False" | "none" | "None") =>
            {
                let mut path = Vec::new();
                if let Some(Token::Ident(first)) = self.next() {
                    path.push(first);
                }
                while self.peek() == Some(&Token::Dot) {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(seg)) => path.push(seg),
                        Some(Token::Int(idx)) if idx >= 0 => path.push(idx.to_string()),
                        _ => return Err(self.error("expected attribute name after '.'")),
                    }
                }
                Operand::Path(path)
            }
            Some(_) => Operand::Literal(self.literal()?),
            None => return Err(self.error("empty expression")),
        };

        let mut filters = Vec::new();
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            let name = match self.next() {
                Some(Token::Ident(name)) => name,
                _ => return Err(self.error("expected filter name after '|'")),
            };
            let kind = FilterKind::lookup(&name)
                .ok_or_else(|| self.error(format!("unknown filter '{}'", name)))?;

            let mut args = Vec::new();
            if self.peek() == Some(&Token::LParen) {
                self.pos += 1;
                if self.peek() != Some(&Token::RParen) {
                    loop {
                        args.push(self.literal()?);
                        match self.next() {
                            Some(Token::Comma) => continue,
                            Some(Token::RParen) => break,
                            _ => return Err(self.error(format!("unclosed arguments to '{}'", name))),
                        }
                    }
                } else {
                    self.pos += 1;
                }
            }

            let (min, max) = kind.arity();
            if args.len() < min || args.len() > max {
                return Err(self.error(format!(
                    "filter '{}' takes {} argument(s), got {}",
                    name,
                    if min == max { min.to_string() } else { format!("{}-{}", min, max) },
                    args.len()
                )));
            }
            filters.push(Filter { kind, args });
        }

        if let Some(token) = self.peek() {
            return Err(self.error(format!("unexpected {:?} in expression", token)));
        }

        Ok(Expr {
            negate,
            operand,
            filters,
            line: self.line,
        })
    }
}

fn parse_expr(src: &str, line: usize) -> Result<Expr> {
    let tokens = tokenize(src, line)?;
    ExprParser {
        tokens,
        pos: 0,
        line,
    }
    .expr()
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Output(Expr),
    For {
        var: String,
        iterable: Expr,
        body: Vec<Node>,
        otherwise: Vec<Node>,
        line: usize,
    },
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
}

/// A block tag that ended a nested body
struct BlockTag {
    keyword: String,
    rest: String,
    line: usize,
}

struct Parser {
    segments: Vec<Segment>,
    pos: usize,
}

fn split_keyword(body: &str) -> (&str, &str) {
    match body.find(char::is_whitespace) {
        Some(idx) => (&body[..idx], body[idx..].trim()),
        None => (body, ""),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

impl Parser {
    /// Parse until one of `terminators` (returned) or end of input (`None`).
    fn parse_nodes(&mut self, terminators: &[&str]) -> Result<(Vec<Node>, Option<BlockTag>)> {
        let mut nodes = Vec::new();

        while self.pos < self.segments.len() {
            let segment = std::mem::replace(&mut self.segments[self.pos], Segment::Text(String::new()));
            self.pos += 1;

            let (kind, body, line) = match segment {
                Segment::Text(text) => {
                    if !text.is_empty() {
                        nodes.push(Node::Text(text));
                    }
                    continue;
                }
                Segment::Tag { kind, body, line, .. } => (kind, body, line),
            };

            match kind {
                TagKind::Comment => {}
                TagKind::Expr => nodes.push(Node::Output(parse_expr(&body, line)?)),
                TagKind::Block => {
                    let (keyword, rest) = split_keyword(&body);
                    if terminators.contains(&keyword) {
                        return Ok((
                            nodes,
                            Some(BlockTag {
                                keyword: keyword.to_string(),
                                rest: rest.to_string(),
                                line,
                            }),
                        ));
                    }
                    match keyword {
                        "for" => nodes.push(self.parse_for(rest, line)?),
                        "if" => nodes.push(self.parse_if(rest, line)?),
                        "endfor" | "endif" | "else" | "elif" => {
                            return Err(Error::template(line, format!("unexpected '{}'", keyword)));
                        }
                        "" => return Err(Error::template(line, "empty block tag")),
                        other => {
                            return Err(Error::template(line, format!("unknown tag '{}'", other)));
                        }
                    }
                }
            }
        }

        Ok((nodes, None))
    }

    fn parse_for(&mut self, header: &str, line: usize) -> Result<Node> {
        let (var, rest) = split_keyword(header);
        let (in_kw, iterable) = split_keyword(rest);
        if !is_identifier(var) || in_kw != "in" || iterable.is_empty() {
            return Err(Error::template(line, format!("malformed for loop '{}'", header)));
        }
        let iterable = parse_expr(iterable, line)?;

        let (body, end) = self.parse_nodes(&["else", "endfor"])?;
        let otherwise = match end {
            Some(tag) if tag.keyword == "else" => match self.parse_nodes(&["endfor"])? {
                (nodes, Some(_)) => nodes,
                (_, None) => return Err(Error::template(line, "unclosed 'for' block")),
            },
            Some(_) => Vec::new(),
            None => return Err(Error::template(line, "unclosed 'for' block")),
        };

        Ok(Node::For {
            var: var.to_string(),
            iterable,
            body,
            otherwise,
            line,
        })
    }

    fn parse_if(&mut self, condition: &str, line: usize) -> Result<Node> {
        let mut branches = Vec::new();
        let mut condition = parse_expr(condition, line)?;

        loop {
            let (body, end) = self.parse_nodes(&["elif", "else", "endif"])?;
            branches.push((condition, body));
            match end {
                Some(tag) if tag.keyword == "elif" => {
                    condition = parse_expr(&tag.rest, tag.line)?;
                }
                Some(tag) if tag.keyword == "else" => {
                    return match self.parse_nodes(&["endif"])? {
                        (otherwise, Some(_)) => Ok(Node::If { branches, otherwise }),
                        (_, None) => Err(Error::template(line, "unclosed 'if' block")),
                    };
                }
                Some(_) => {
                    return Ok(Node::If {
                        branches,
                        otherwise: Vec::new(),
                    })
                }
                None => return Err(Error::template(line, "unclosed 'if' block")),
            }
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

struct Scope {
    frames: Vec<Map<String, Value>>,
}

impl Scope {
    fn lookup(&self, path: &[String]) -> Option<Value> {
        let (first, rest) = path.split_first()?;
        let mut value = self.frames.iter().rev().find_map(|frame| frame.get(first))?;
        for segment in rest {
            value = match value {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(value.clone())
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

impl Expr {
    fn describe(&self) -> String {
        match &self.operand {
            Operand::Path(path) => path.join("."),
            Operand::Literal(value) => value.to_string(),
        }
    }

    fn eval(&self, scope: &Scope) -> Result<Value> {
        let mut value = match &self.operand {
            Operand::Path(path) => scope.lookup(path),
            Operand::Literal(value) => Some(value.clone()),
        };

        for filter in &self.filters {
            value = self.apply(filter, value)?;
        }

        let value = value.ok_or_else(|| {
            Error::template(self.line, format!("undefined variable '{}'", self.describe()))
        })?;

        if self.negate {
            Ok(Value::Bool(!truthy(&value)))
        } else {
            Ok(value)
        }
    }

    fn apply(&self, filter: &Filter, value: Option<Value>) -> Result<Option<Value>> {
        if filter.kind == FilterKind::Default {
            return Ok(match value {
                None | Some(Value::Null) => Some(filter.args[0].clone()),
                some => some,
            });
        }

        let value = value.ok_or_else(|| {
            Error::template(self.line, format!("undefined variable '{}'", self.describe()))
        })?;

        let result = match filter.kind {
            FilterKind::Upper => Value::String(display(&value).to_uppercase()),
            FilterKind::Lower => Value::String(display(&value).to_lowercase()),
            FilterKind::Trim => Value::String(display(&value).trim().to_string()),
            FilterKind::Length => match &value {
                Value::String(s) => Value::from(s.chars().count()),
                Value::Array(items) => Value::from(items.len()),
                Value::Object(map) => Value::from(map.len()),
                other => {
                    return Err(Error::template(
                        self.line,
                        format!("'{}' has no length", display(other)),
                    ))
                }
            },
            FilterKind::Replace => Value::String(
                display(&value).replace(&display(&filter.args[0]), &display(&filter.args[1])),
            ),
            FilterKind::Join => {
                let sep = filter.args.first().map(display).unwrap_or_default();
                match &value {
                    Value::Array(items) => Value::String(
                        items.iter().map(display).collect::<Vec<_>>().join(&sep),
                    ),
                    other => Value::String(display(other)),
                }
            }
            FilterKind::Default => unreachable!("handled above"),
        };

        Ok(Some(result))
    }
}

fn render_nodes(nodes: &[Node], scope: &mut Scope, out: &mut String) -> Result<()> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output(expr) => out.push_str(&display(&expr.eval(scope)?)),
            Node::For {
                var,
                iterable,
                body,
                otherwise,
                line,
            } => {
                let items = match iterable.eval(scope)? {
                    Value::Array(items) => items,
                    Value::Null => {
                        return Err(Error::template(*line, "cannot iterate over none"))
                    }
                    other => {
                        return Err(Error::template(
                            *line,
                            format!("cannot iterate over '{}'", display(&other)),
                        ))
                    }
                };

                if items.is_empty() {
                    render_nodes(otherwise, scope, out)?;
                    continue;
                }

                let length = items.len();
                for (index0, item) in items.into_iter().enumerate() {
                    let mut frame = Map::new();
                    frame.insert(var.clone(), item);
                    frame.insert(
                        "loop".to_string(),
                        serde_json::json!({
                            "index": index0 + 1,
                            "index0": index0,
                            "first": index0 == 0,
                            "last": index0 + 1 == length,
                            "length": length,
                        }),
                    );
                    scope.frames.push(frame);
                    let result = render_nodes(body, scope, out);
                    scope.frames.pop();
                    result?;
                }
            }
            Node::If { branches, otherwise } => {
                let mut taken = false;
                for (condition, body) in branches {
                    if truthy(&condition.eval(scope)?) {
                        render_nodes(body, scope, out)?;
                        taken = true;
                        break;
                    }
                }
                if !taken {
                    render_nodes(otherwise, scope, out)?;
                }
            }
        }
    }
    Ok(())
}
