//! Tolerant reader for the JavaScript object-literal subset found in
//! server-rendered state scripts.
//!
//! Accepts plain literals plus the minified IIFE wrapper that hoists repeated
//! values into parameters:
//!
//! ```text
//! (function(a,b){a.x=1;return {state:{title:b,deleted:a}}}({},"Rust dev"))
//! ```
//!
//! Calls to anything other than a function literal evaluate to their first
//! argument, so wrappers such as `new Date("...")` keep their payload.

use std::collections::HashMap;
use std::ops::Range;

use serde_json::{Map, Number, Value};

use crate::error::{Result, UpworkError};

const MAX_DEPTH: usize = 128;

/// Largest forward jump an index assignment may make past an array's end.
const MAX_ARRAY_GROWTH: usize = 1024;

/// Parse one JS expression into a JSON value.
pub fn parse(src: &str) -> Result<Value> {
    let mut parser = Parser::new(src);
    let term = parser.expression()?;
    parser.skip_trivia();
    while parser.eat(b';') {
        parser.skip_trivia();
    }
    if parser.pos < src.len() {
        return Err(parser.error("trailing input"));
    }
    Ok(into_value(term))
}

#[derive(Debug, Clone)]
struct Function {
    params: Vec<String>,
    body: Range<usize>,
}

#[derive(Debug)]
enum Term {
    Value(Value),
    Function(Function),
}

enum Accessor {
    Key(String),
    Index(usize),
}

struct Parser<'s> {
    src: &'s str,
    pos: usize,
    depth: usize,
    scopes: Vec<HashMap<String, Value>>,
}

impl<'s> Parser<'s> {
    fn new(src: &'s str) -> Self {
        Self {
            src,
            pos: 0,
            depth: 0,
            scopes: Vec::new(),
        }
    }

    fn error(&self, what: &str) -> UpworkError {
        UpworkError::malformed(format!("{what} at byte {}", self.pos))
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.as_bytes().get(self.pos + offset).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        self.skip_trivia();
        if self.eat(byte) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(b' ' | b'\t' | b'\n' | b'\r'), _) => self.pos += 1,
                (Some(b'/'), Some(b'/')) => {
                    let rest = &self.src[self.pos..];
                    self.pos += rest.find('\n').unwrap_or(rest.len());
                }
                (Some(b'/'), Some(b'*')) => {
                    let rest = &self.src[self.pos + 2..];
                    self.pos += rest.find("*/").map_or(rest.len() + 2, |end| end + 4);
                }
                _ => {
                    // non-breaking space, BOM and other unicode whitespace
                    match self.src[self.pos..].chars().next() {
                        Some(c) if c.is_whitespace() || c == '\u{feff}' => {
                            self.pos += c.len_utf8();
                        }
                        _ => return,
                    }
                }
            }
        }
    }

    fn identifier(&mut self) -> Option<&'s str> {
        let src = self.src;
        let rest = &src[self.pos..];
        let mut end = 0;
        for (i, c) in rest.char_indices() {
            let ok = if i == 0 {
                c == '_' || c == '$' || c.is_alphabetic()
            } else {
                c == '_' || c == '$' || c.is_alphanumeric()
            };
            if !ok {
                break;
            }
            end = i + c.len_utf8();
        }
        if end == 0 {
            return None;
        }
        self.pos += end;
        Some(&rest[..end])
    }

    fn lookahead_keyword(&self, word: &str) -> bool {
        let rest = &self.src[self.pos..];
        rest.starts_with(word)
            && !rest[word.len()..]
                .chars()
                .next()
                .is_some_and(|c| c == '_' || c == '$' || c.is_alphanumeric())
    }

    fn expression(&mut self) -> Result<Term> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        let term = self.unary();
        self.depth -= 1;
        term
    }

    fn value(&mut self) -> Result<Value> {
        self.expression().map(into_value)
    }

    fn unary(&mut self) -> Result<Term> {
        self.skip_trivia();
        match self.peek() {
            Some(b'!') => {
                self.pos += 1;
                let v = self.value()?;
                Ok(Term::Value(Value::Bool(!truthy(&v))))
            }
            Some(b'-') => {
                self.pos += 1;
                let v = self.value()?;
                Ok(Term::Value(negate(&v)))
            }
            Some(b'+') => {
                self.pos += 1;
                self.expression()
            }
            _ if self.lookahead_keyword("void") => {
                self.pos += "void".len();
                self.value()?;
                Ok(Term::Value(Value::Null))
            }
            _ if self.lookahead_keyword("new") => {
                self.pos += "new".len();
                self.expression()
            }
            _ => {
                let primary = self.primary()?;
                self.postfix(primary)
            }
        }
    }

    fn primary(&mut self) -> Result<Term> {
        self.skip_trivia();
        let Some(byte) = self.peek() else {
            return Err(self.error("unexpected end of input"));
        };
        match byte {
            b'{' => self.object().map(Term::Value),
            b'[' => self.array().map(Term::Value),
            b'"' | b'\'' => self.string(byte).map(|s| Term::Value(Value::String(s))),
            b'`' => self.template().map(|s| Term::Value(Value::String(s))),
            b'0'..=b'9' | b'.' => self.number().map(Term::Value),
            b'(' => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect(b')')?;
                Ok(inner)
            }
            _ if self.lookahead_keyword("function") => self.function().map(Term::Function),
            _ => {
                let Some(name) = self.identifier() else {
                    return Err(self.error("unexpected character"));
                };
                Ok(Term::Value(self.lookup(name)))
            }
        }
    }

    fn lookup(&self, name: &str) -> Value {
        match name {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => self
                .scopes
                .iter()
                .rev()
                .find_map(|scope| scope.get(name))
                .cloned()
                .unwrap_or(Value::Null),
        }
    }

    fn postfix(&mut self, mut term: Term) -> Result<Term> {
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(b'(') => {
                    self.pos += 1;
                    let args = self.arguments()?;
                    term = match term {
                        Term::Function(function) => Term::Value(self.invoke(&function, args)?),
                        Term::Value(_) => {
                            Term::Value(args.into_iter().next().unwrap_or(Value::Null))
                        }
                    };
                }
                Some(b'.') if !self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => {
                    self.pos += 1;
                    self.skip_trivia();
                    let Some(name) = self.identifier() else {
                        return Err(self.error("expected property name"));
                    };
                    term = Term::Value(member(&term, name));
                }
                Some(b'[') => {
                    self.pos += 1;
                    let key = self.value()?;
                    self.expect(b']')?;
                    term = Term::Value(member(&term, &key_text(&key)));
                }
                _ => return Ok(term),
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Value>> {
        let mut args = Vec::new();
        loop {
            self.skip_trivia();
            if self.eat(b')') {
                return Ok(args);
            }
            args.push(self.value()?);
            self.skip_trivia();
            if !self.eat(b',') {
                self.expect(b')')?;
                return Ok(args);
            }
        }
    }

    fn object(&mut self) -> Result<Value> {
        self.pos += 1;
        let mut map = Map::new();
        loop {
            self.skip_trivia();
            if self.eat(b'}') {
                return Ok(Value::Object(map));
            }
            let key = match self.peek() {
                Some(q @ (b'"' | b'\'')) => self.string(q)?,
                Some(b'0'..=b'9' | b'.') => key_text(&self.number()?),
                _ => match self.identifier() {
                    Some(name) => name.to_string(),
                    None => return Err(self.error("expected object key")),
                },
            };
            self.skip_trivia();
            let value = if self.eat(b':') {
                self.value()?
            } else {
                // shorthand `{a}`
                self.lookup(&key)
            };
            map.insert(key, value);
            self.skip_trivia();
            if !self.eat(b',') {
                self.expect(b'}')?;
                return Ok(Value::Object(map));
            }
        }
    }

    fn array(&mut self) -> Result<Value> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            if self.eat(b']') {
                return Ok(Value::Array(items));
            }
            if self.eat(b',') {
                items.push(Value::Null);
                continue;
            }
            items.push(self.value()?);
            self.skip_trivia();
            if !self.eat(b',') {
                self.expect(b']')?;
                return Ok(Value::Array(items));
            }
        }
    }

    fn string(&mut self, quote: u8) -> Result<String> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            let rest = &self.src[self.pos..];
            let Some(stop) = rest.find(|c| c == quote as char || c == '\\') else {
                return Err(self.error("unterminated string"));
            };
            out.push_str(&rest[..stop]);
            self.pos += stop;
            if self.eat(quote) {
                return Ok(out);
            }
            self.pos += 1;
            self.escape(&mut out)?;
        }
    }

    fn template(&mut self) -> Result<String> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            let rest = &self.src[self.pos..];
            let Some(stop) = rest.find(['`', '\\', '$']) else {
                return Err(self.error("unterminated template"));
            };
            out.push_str(&rest[..stop]);
            self.pos += stop;
            match self.peek() {
                Some(b'`') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'$') if self.peek_at(1) == Some(b'{') => {
                    return Err(self.error("template substitution"));
                }
                Some(b'$') => {
                    out.push('$');
                    self.pos += 1;
                }
                _ => {
                    self.pos += 1;
                    self.escape(&mut out)?;
                }
            }
        }
    }

    /// Decode one escape sequence; `pos` sits just past the backslash.
    fn escape(&mut self, out: &mut String) -> Result<()> {
        let Some(c) = self.src[self.pos..].chars().next() else {
            return Err(self.error("unterminated escape"));
        };
        self.pos += c.len_utf8();
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !self.peek().is_some_and(|b| b.is_ascii_digit()) => out.push('\0'),
            'x' => {
                let code = self.hex(2)?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            'u' => {
                let code = self.unicode_escape()?;
                out.push(code);
            }
            '\r' => {
                self.eat(b'\n');
            }
            '\n' | '\u{2028}' | '\u{2029}' => {}
            other => out.push(other),
        }
        Ok(())
    }

    fn unicode_escape(&mut self) -> Result<char> {
        if self.eat(b'{') {
            let end = self.src[self.pos..]
                .find('}')
                .ok_or_else(|| self.error("unterminated code point"))?;
            let code = u32::from_str_radix(&self.src[self.pos..self.pos + end], 16)
                .map_err(|_| self.error("invalid code point"))?;
            self.pos += end + 1;
            return Ok(char::from_u32(code).unwrap_or('\u{fffd}'));
        }
        let high = self.hex(4)?;
        if (0xD800..0xDC00).contains(&high) && self.src[self.pos..].starts_with("\\u") {
            let save = self.pos;
            self.pos += 2;
            if let Ok(low) = self.hex(4)
                && (0xDC00..0xE000).contains(&low)
            {
                let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                return Ok(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            self.pos = save;
        }
        Ok(char::from_u32(high).unwrap_or('\u{fffd}'))
    }

    fn hex(&mut self, digits: usize) -> Result<u32> {
        let text = self
            .src
            .get(self.pos..self.pos + digits)
            .ok_or_else(|| self.error("truncated escape"))?;
        let code = u32::from_str_radix(text, 16).map_err(|_| self.error("invalid escape"))?;
        self.pos += digits;
        Ok(code)
    }

    fn number(&mut self) -> Result<Value> {
        let src = self.src;
        let rest = &src[self.pos..];
        if rest.starts_with("0x") || rest.starts_with("0X") {
            let digits = rest[2..]
                .find(|c: char| !c.is_ascii_hexdigit())
                .unwrap_or(rest.len() - 2);
            let n = i64::from_str_radix(&rest[2..2 + digits], 16)
                .map_err(|_| self.error("invalid hex literal"))?;
            self.pos += 2 + digits;
            return Ok(Value::from(n));
        }
        let len = rest
            .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')))
            .unwrap_or(rest.len());
        // `+`/`-` only belong to the literal directly after an exponent marker
        let mut end = 0;
        let bytes = rest.as_bytes();
        while end < len {
            let b = bytes[end];
            if matches!(b, b'+' | b'-') && !(end > 0 && matches!(bytes[end - 1], b'e' | b'E')) {
                break;
            }
            end += 1;
        }
        let text = &rest[..end];
        self.pos += end;
        if !text.contains(['.', 'e', 'E'])
            && let Ok(n) = text.parse::<i64>()
        {
            return Ok(Value::from(n));
        }
        let n: f64 = text
            .parse()
            .map_err(|_| self.error("invalid number literal"))?;
        Ok(Number::from_f64(n).map_or(Value::Null, Value::Number))
    }

    /// Parse `function name?(params){body}`, leaving the body for later.
    fn function(&mut self) -> Result<Function> {
        self.pos += "function".len();
        self.skip_trivia();
        self.identifier();
        self.expect(b'(')?;
        let mut params = Vec::new();
        loop {
            self.skip_trivia();
            if self.eat(b')') {
                break;
            }
            let Some(name) = self.identifier() else {
                return Err(self.error("expected parameter name"));
            };
            params.push(name.to_string());
            self.skip_trivia();
            if !self.eat(b',') {
                self.expect(b')')?;
                break;
            }
        }
        self.expect(b'{')?;
        let start = self.pos;
        self.skip_block()?;
        Ok(Function {
            params,
            body: start..self.pos - 1,
        })
    }

    /// Advance past the `}` matching an already consumed `{`.
    fn skip_block(&mut self) -> Result<()> {
        let mut open = 1usize;
        while open > 0 {
            self.skip_trivia();
            let Some(byte) = self.peek() else {
                return Err(self.error("unterminated function body"));
            };
            match byte {
                b'"' | b'\'' => {
                    self.string(byte)?;
                }
                b'`' => {
                    self.template()?;
                }
                b'{' => {
                    open += 1;
                    self.pos += 1;
                }
                b'}' => {
                    open -= 1;
                    self.pos += 1;
                }
                _ => {
                    let c = self.src[self.pos..].chars().next().map_or(1, char::len_utf8);
                    self.pos += c;
                }
            }
        }
        Ok(())
    }

    fn invoke(&mut self, function: &Function, args: Vec<Value>) -> Result<Value> {
        let scope: HashMap<String, Value> = function
            .params
            .iter()
            .cloned()
            .zip(args.into_iter().chain(std::iter::repeat(Value::Null)))
            .collect();
        let resume = self.pos;
        self.scopes.push(scope);
        self.pos = function.body.start;
        let result = self.body(function.body.end);
        self.scopes.pop();
        self.pos = resume;
        result
    }

    /// Run declarations and member assignments up to the `return`.
    fn body(&mut self, end: usize) -> Result<Value> {
        loop {
            self.skip_trivia();
            while self.eat(b';') {
                self.skip_trivia();
            }
            if self.pos >= end {
                return Ok(Value::Null);
            }
            if self.lookahead_keyword("return") {
                self.pos += "return".len();
                return self.value();
            }
            let declaration = ["var", "let", "const"]
                .into_iter()
                .find(|kw| self.lookahead_keyword(kw));
            if let Some(kw) = declaration {
                self.pos += kw.len();
                self.declarations()?;
            } else {
                self.assignment()?;
            }
        }
    }

    fn declarations(&mut self) -> Result<()> {
        loop {
            self.skip_trivia();
            let Some(name) = self.identifier() else {
                return Err(self.error("expected variable name"));
            };
            self.skip_trivia();
            let value = if self.eat(b'=') {
                self.value()?
            } else {
                Value::Null
            };
            self.bind(name, value);
            self.skip_trivia();
            if !self.eat(b',') {
                return Ok(());
            }
        }
    }

    fn bind(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    /// `name(.key|[expr])* = expr`
    fn assignment(&mut self) -> Result<()> {
        let Some(name) = self.identifier() else {
            return Err(self.error("unsupported statement"));
        };
        let mut path = Vec::new();
        loop {
            self.skip_trivia();
            if self.eat(b'.') {
                self.skip_trivia();
                let Some(key) = self.identifier() else {
                    return Err(self.error("expected property name"));
                };
                path.push(Accessor::Key(key.to_string()));
            } else if self.eat(b'[') {
                let key = self.value()?;
                self.expect(b']')?;
                path.push(match key.as_u64().and_then(|i| usize::try_from(i).ok()) {
                    Some(i) => Accessor::Index(i),
                    None => Accessor::Key(key_text(&key)),
                });
            } else {
                break;
            }
        }
        if !self.eat(b'=') || self.peek() == Some(b'=') {
            return Err(self.error("unsupported statement"));
        }
        let value = self.value()?;
        if path.is_empty() {
            self.assign_variable(name, value);
        } else if let Some(slot) = self.scopes.iter_mut().rev().find_map(|s| s.get_mut(name)) {
            assign_path(slot, &path, value);
        }
        Ok(())
    }

    fn assign_variable(&mut self, name: &str, value: Value) {
        match self.scopes.iter_mut().rev().find_map(|s| s.get_mut(name)) {
            Some(slot) => *slot = value,
            None => self.bind(name, value),
        }
    }
}

fn into_value(term: Term) -> Value {
    match term {
        Term::Value(v) => v,
        Term::Function(_) => Value::Null,
    }
}

fn assign_path(target: &mut Value, path: &[Accessor], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        *target = value;
        return;
    };
    let mut cursor = target;
    for accessor in parents {
        let next = match (cursor, accessor) {
            (Value::Object(map), Accessor::Key(k)) => map.get_mut(k),
            (Value::Object(map), Accessor::Index(i)) => map.get_mut(&i.to_string()),
            (Value::Array(items), Accessor::Index(i)) => items.get_mut(*i),
            _ => None,
        };
        let Some(next) = next else { return };
        cursor = next;
    }
    match (cursor, last) {
        (Value::Object(map), Accessor::Key(k)) => {
            map.insert(k.clone(), value);
        }
        (Value::Object(map), Accessor::Index(i)) => {
            map.insert(i.to_string(), value);
        }
        (Value::Array(items), Accessor::Index(i)) => {
            if *i >= items.len() {
                if *i - items.len() > MAX_ARRAY_GROWTH {
                    return;
                }
                items.resize(*i + 1, Value::Null);
            }
            items[*i] = value;
        }
        _ => {}
    }
}

fn member(term: &Term, key: &str) -> Value {
    match term {
        Term::Value(Value::Object(map)) => map.get(key).cloned().unwrap_or(Value::Null),
        Term::Value(Value::Array(items)) => key
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn key_text(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn negate(value: &Value) -> Value {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(i64::checked_neg)
            .map(Value::from)
            .or_else(|| n.as_f64().and_then(|f| Number::from_f64(-f)).map(Value::Number))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}
