//! Rison encoding
//!
//! Rison is the compact, URL-friendly object notation the API expects in
//! its `q` query parameter: `(page:0,page_size:25,filters:!((col:name,opr:ct,value:x)))`.
//! Values go through `serde_json::Value`, so anything `Serialize` can be
//! encoded and any rison text decodes to a `Value`.

use crate::error::{rison_error, ApiResult};
use serde::Serialize;
use serde_json::{Map, Number, Value};

/// Characters that may never appear in a bare identifier
const NOT_IDCHAR: &str = " '!:(),*@$";

/// Characters that may not start a bare identifier
const NOT_IDSTART: &str = "-0123456789";

/// Encode any serializable value as rison text
pub fn to_string<T: Serialize + ?Sized>(value: &T) -> ApiResult<String> {
    let value = serde_json::to_value(value).map_err(|e| rison_error(e.to_string()))?;
    let mut out = String::new();
    encode_value(&value, &mut out);
    Ok(out)
}

/// Decode rison text into a JSON value
pub fn from_str(input: &str) -> ApiResult<Value> {
    let mut parser = Parser::new(input);
    let value = parser.parse_value()?;
    if let Some(c) = parser.peek() {
        return Err(rison_error(format!(
            "unexpected '{}' at position {}",
            c, parser.pos
        )));
    }
    Ok(value)
}

/// Decode rison text straight into a typed value
pub fn from_str_as<T: serde::de::DeserializeOwned>(input: &str) -> ApiResult<T> {
    Ok(serde_json::from_value(from_str(input)?)?)
}

fn is_id(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        None => false,
        Some(first) => {
            !NOT_IDCHAR.contains(first)
                && !NOT_IDSTART.contains(first)
                && chars.all(|c| !NOT_IDCHAR.contains(c))
        }
    }
}

fn encode_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("!n"),
        Value::Bool(true) => out.push_str("!t"),
        Value::Bool(false) => out.push_str("!f"),
        Value::Number(n) => encode_number(n, out),
        Value::String(s) => encode_str(s, out),
        Value::Array(items) => {
            out.push_str("!(");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode_value(item, out);
            }
            out.push(')');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('(');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode_str(key, out);
                out.push(':');
                encode_value(&map[key], out);
            }
            out.push(')');
        }
    }
}

fn encode_number(n: &Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
    } else if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
    } else if let Some(f) = n.as_f64() {
        if f.fract() == 0.0 && f.abs() < 1e15 {
            out.push_str(&(f as i64).to_string());
        } else {
            out.push_str(&n.to_string().replace('+', ""));
        }
    }
}

fn encode_str(s: &str, out: &mut String) {
    if is_id(s) {
        out.push_str(s);
        return;
    }
    out.push('\'');
    for c in s.chars() {
        if c == '!' || c == '\'' {
            out.push('!');
        }
        out.push(c);
    }
    out.push('\'');
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> ApiResult<char> {
        let c = self
            .peek()
            .ok_or_else(|| rison_error("unexpected end of input"))?;
        self.pos += 1;
        Ok(c)
    }

    fn expect(&mut self, expected: char) -> ApiResult<()> {
        let c = self.next()?;
        if c != expected {
            return Err(rison_error(format!(
                "expected '{}' but found '{}' at position {}",
                expected,
                c,
                self.pos - 1
            )));
        }
        Ok(())
    }

    fn parse_value(&mut self) -> ApiResult<Value> {
        match self.peek() {
            None => Err(rison_error("empty expression")),
            Some('!') => {
                self.pos += 1;
                match self.next()? {
                    't' => Ok(Value::Bool(true)),
                    'f' => Ok(Value::Bool(false)),
                    'n' => Ok(Value::Null),
                    '(' => self.parse_array(),
                    c => Err(rison_error(format!("unknown literal: \"!{}\"", c))),
                }
            }
            Some('(') => {
                self.pos += 1;
                self.parse_object()
            }
            Some('\'') => {
                self.pos += 1;
                self.parse_quoted().map(Value::String)
            }
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(_) => self.parse_id().map(Value::String),
        }
    }

    fn parse_array(&mut self) -> ApiResult<Value> {
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(')') {
                self.pos += 1;
                return Ok(Value::Array(items));
            }
            if !items.is_empty() {
                self.expect(',')?;
            }
            items.push(self.parse_value()?);
        }
    }

    fn parse_object(&mut self) -> ApiResult<Value> {
        let mut map = Map::new();
        loop {
            if self.peek() == Some(')') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }
            if !map.is_empty() {
                self.expect(',')?;
            }
            let key = match self.parse_value()? {
                Value::String(s) => s,
                other => return Err(rison_error(format!("object key must be a string, got {}", other))),
            };
            self.expect(':')?;
            let value = self.parse_value()?;
            map.insert(key, value);
        }
    }

    fn parse_quoted(&mut self) -> ApiResult<String> {
        let mut s = String::new();
        loop {
            match self.next()? {
                '\'' => return Ok(s),
                '!' => match self.next()? {
                    c @ ('!' | '\'') => s.push(c),
                    c => return Err(rison_error(format!("invalid string escape: \"!{}\"", c))),
                },
                c => s.push(c),
            }
        }
    }

    fn parse_number(&mut self) -> ApiResult<Value> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '.' | 'e') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::from(i));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| rison_error(format!("invalid number: {}", text)))
    }

    fn parse_id(&mut self) -> ApiResult<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if NOT_IDCHAR.contains(c) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(rison_error(format!(
                "invalid character '{}' at position {}",
                self.chars[start], start
            )));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }
}
