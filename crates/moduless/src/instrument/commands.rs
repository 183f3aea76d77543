//! The `void "command(args)"` mini-language.
//!
//! A cover function can script the driven browser with inert expressions like
//! `void "click(120, 48)"`. The payload must be a single call whose callee is a
//! plain identifier and whose arguments are literals.

use super::arena::{NodeId, SyntaxArena};
use crate::protocol::Value;
use crate::result::{ModulessError, ModulessResult};

/// A parsed command payload
#[derive(Debug, Clone, PartialEq)]
pub struct VoidCommand {
    /// Command name
    pub name: String,
    /// Literal arguments
    pub args: Vec<Value>,
}

impl VoidCommand {
    /// Parse a payload such as `hotkey("Ctrl+A")`
    pub fn parse(payload: &str) -> ModulessResult<Self> {
        let malformed = |message: &str| ModulessError::MalformedCommand {
            payload: payload.to_string(),
            message: message.to_string(),
        };

        let arena = SyntaxArena::parse(payload)?;
        if arena.has_error() {
            return Err(malformed("not a valid expression"));
        }

        let statements: Vec<NodeId> = arena.named_children(arena.root()).collect();
        let [statement] = statements.as_slice() else {
            return Err(malformed("expected exactly one call"));
        };
        let call = arena
            .named_children(*statement)
            .next()
            .filter(|id| arena.node(*id).kind == "call_expression")
            .ok_or_else(|| malformed("expected a call"))?;

        let callee = arena
            .child_by_field(call, "function")
            .filter(|id| arena.node(*id).kind == "identifier")
            .ok_or_else(|| malformed("callee must be a plain name"))?;
        let arguments = arena
            .child_by_field(call, "arguments")
            .filter(|id| arena.node(*id).kind == "arguments")
            .ok_or_else(|| malformed("expected an argument list"))?;

        let args = arena
            .named_children(arguments)
            .map(|arg| literal(&arena, arg, payload).ok_or_else(|| malformed("arguments must be literals")))
            .collect::<ModulessResult<Vec<_>>>()?;

        Ok(Self {
            name: arena.text(callee, payload).to_string(),
            args,
        })
    }

    /// Expression that dispatches this command through the page runner
    #[must_use]
    pub fn remote_call(&self) -> String {
        let args: Vec<String> = self.args.iter().map(js_literal).collect();
        format!(
            "Moduless.remote({}, [{}])",
            js_literal(&Value::String(self.name.clone())),
            args.join(", ")
        )
    }
}

fn literal(arena: &SyntaxArena, id: NodeId, source: &str) -> Option<Value> {
    let text = arena.text(id, source);
    match arena.node(id).kind {
        "number" => parse_number(text).map(Value::Number),
        "string" => unquote(text).map(Value::String),
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        "null" => Some(Value::Null),
        "undefined" => Some(Value::Undefined),
        "identifier" if text == "undefined" => Some(Value::Undefined),
        "identifier" if text == "NaN" => Some(Value::Number(f64::NAN)),
        "unary_expression" => {
            let operator = arena.child_by_field(id, "operator")?;
            let argument = arena.child_by_field(id, "argument")?;
            let sign = match arena.text(operator, source) {
                "-" => -1.0,
                "+" => 1.0,
                _ => return None,
            };
            match literal(arena, argument, source)? {
                Value::Number(n) => Some(Value::Number(sign * n)),
                _ => None,
            }
        }
        "array" => arena
            .named_children(id)
            .map(|item| literal(arena, item, source))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        _ => None,
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let clean: String = text.chars().filter(|c| *c != '_').collect();
    let lower = clean.to_ascii_lowercase();
    let radix = |prefix: &str, radix: u32| {
        lower
            .strip_prefix(prefix)
            .and_then(|digits| u64::from_str_radix(digits, radix).ok())
            .map(|n| n as f64)
    };
    radix("0x", 16)
        .or_else(|| radix("0o", 8))
        .or_else(|| radix("0b", 2))
        .or_else(|| clean.parse::<f64>().ok())
}

/// Decode a quoted string literal
#[must_use]
pub fn unquote(text: &str) -> Option<String> {
    let quote = text.chars().next()?;
    if !matches!(quote, '"' | '\'') || text.len() < 2 || !text.ends_with(quote) {
        return None;
    }
    let body = &text[1..text.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
            }
            '\n' => {}
            other => out.push(other),
        }
    }
    Some(out)
}

/// Render a value as a JavaScript literal
#[must_use]
pub fn js_literal(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Number(n) if n.is_nan() => "NaN".to_string(),
        Value::Number(n) if n.is_infinite() => {
            if *n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
        }
        Value::Number(n) => format!("{n}"),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(js_literal).collect();
            format!("[{}]", items.join(", "))
        }
        other => other.to_plain_json().to_string(),
    }
}
