//! Extraction of tool invocations from free-form model output.
//!
//! Models request tools with a line like
//! `USE_TOOL: get_random_number(min=1, max=10)`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Marker that introduces an invocation directive.
pub const DIRECTIVE: &str = "USE_TOOL:";

static DIRECTIVE_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"USE_TOOL:\s*(\w+)\(").expect("directive pattern is valid"));

/// A single argument value as written by the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    String(String),
    Integer(i64),
    Float(f64),
    List(Vec<String>),
}

impl ArgValue {
    /// Parse the right-hand side of `key=value`.
    ///
    /// Quoted text is a string, bracketed text a list of strings, then a
    /// number (float if it has a decimal point), and anything else the raw
    /// text.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();

        if let Some(inner) = strip_wrapping(raw, '"', '"') {
            return Self::String(inner.to_string());
        }

        if let Some(inner) = strip_wrapping(raw, '[', ']') {
            if inner.trim().is_empty() {
                return Self::List(Vec::new());
            }
            let items = split_top_level(inner)
                .into_iter()
                .map(|item| item.trim().trim_matches('"').to_string())
                .collect();
            return Self::List(items);
        }

        if raw.contains('.') {
            if let Ok(f) = raw.parse::<f64>() {
                return Self::Float(f);
            }
        } else if let Ok(i) = raw.parse::<i64>() {
            return Self::Integer(i);
        } else if is_integer_literal(raw) {
            debug!(value = raw, "integer out of i64 range, keeping it as text");
        }

        Self::String(raw.to_string())
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Integer(i) => write!(f, "{i}"),
            // Keep the decimal point so the value reads back as a float.
            Self::Float(x) if x.fract() == 0.0 => write!(f, "{x:.1}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{item}\"")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<ArgValue> for Value {
    fn from(value: ArgValue) -> Self {
        match value {
            ArgValue::String(s) => Value::String(s),
            ArgValue::Integer(i) => Value::from(i),
            ArgValue::Float(f) => Value::from(f),
            ArgValue::List(items) => Value::from(items),
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: BTreeMap<String, ArgValue>,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: ArgValue) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }

    /// Arguments as the JSON object sent in `tools/call`.
    pub fn arguments_json(&self) -> Map<String, Value> {
        self.arguments
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect()
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{DIRECTIVE} {}(", self.name)?;
        for (i, (key, value)) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        write!(f, ")")
    }
}

/// Find every invocation directive in `text`, in order of appearance.
///
/// A directive whose argument list never closes is skipped.
pub fn parse_invocations(text: &str) -> Vec<ToolInvocation> {
    let mut invocations = Vec::new();
    let mut pos = 0;

    while let Some(caps) = DIRECTIVE_START.captures_at(text, pos) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };

        let args_start = whole.end();
        let Some(args_len) = closing_paren(&text[args_start..]) else {
            pos = args_start;
            continue;
        };

        invocations.push(ToolInvocation {
            name: name.as_str().to_string(),
            arguments: parse_arguments(&text[args_start..args_start + args_len]),
        });
        pos = args_start + args_len + 1;
    }

    invocations
}

fn parse_arguments(args: &str) -> BTreeMap<String, ArgValue> {
    let mut arguments = BTreeMap::new();
    if args.trim().is_empty() {
        return arguments;
    }

    for pair in split_top_level(args) {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        arguments.insert(key.to_string(), ArgValue::parse(value));
    }

    arguments
}

/// Byte offset of the `)` that closes an argument list, ignoring any inside
/// quotes or brackets. An argument list ends at the end of its line.
fn closing_paren(s: &str) -> Option<usize> {
    let mut scan = Scanner::default();
    for (i, c) in s.char_indices() {
        if c == '\n' && !scan.in_quotes {
            return None;
        }
        if c == ')' && scan.at_top_level() {
            return Some(i);
        }
        scan.feed(c);
    }
    None
}

/// Split on commas that are outside quotes and brackets.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut scan = Scanner::default();
    let mut start = 0;

    for (i, c) in s.char_indices() {
        if c == ',' && scan.at_top_level() {
            parts.push(&s[start..i]);
            start = i + 1;
            continue;
        }
        scan.feed(c);
    }
    parts.push(&s[start..]);

    parts
}

/// Tracks quote and bracket nesting while walking an argument list.
#[derive(Default)]
struct Scanner {
    in_quotes: bool,
    escaped: bool,
    depth: usize,
}

impl Scanner {
    fn at_top_level(&self) -> bool {
        !self.in_quotes && !self.escaped && self.depth == 0
    }

    fn feed(&mut self, c: char) {
        if self.escaped {
            self.escaped = false;
            return;
        }
        match c {
            '\\' if self.in_quotes => self.escaped = true,
            '"' => self.in_quotes = !self.in_quotes,
            '[' if !self.in_quotes => self.depth += 1,
            ']' if !self.in_quotes => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
    }
}

fn is_integer_literal(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn strip_wrapping(s: &str, open: char, close: char) -> Option<&str> {
    if s.len() >= 2 {
        s.strip_prefix(open)?.strip_suffix(close)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> ArgValue {
        ArgValue::List(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn no_directive_yields_nothing() {
        assert!(parse_invocations("no tools mentioned here").is_empty());
        assert!(parse_invocations("").is_empty());
    }

    #[test]
    fn integer_arguments() {
        let calls = parse_invocations("USE_TOOL: get_random_number(min=1, max=10)");
        assert_eq!(
            calls,
            [ToolInvocation::new("get_random_number")
                .with_arg("min", ArgValue::Integer(1))
                .with_arg("max", ArgValue::Integer(10))]
        );
    }

    #[test]
    fn quoted_string_argument() {
        let calls = parse_invocations(r#"USE_TOOL: greet(name="Ada")"#);
        assert_eq!(
            calls,
            [ToolInvocation::new("greet").with_arg("name", ArgValue::String("Ada".into()))]
        );
    }

    #[test]
    fn list_argument() {
        let calls = parse_invocations(r#"USE_TOOL: pick(choices=["red", "blue", "green"])"#);
        assert_eq!(
            calls,
            [ToolInvocation::new("pick").with_arg("choices", strings(&["red", "blue", "green"]))]
        );
    }

    #[test]
    fn multiple_directives_in_order() {
        let calls = parse_invocations("USE_TOOL: a(x=1) and also USE_TOOL: b(y=2.5)");
        assert_eq!(
            calls,
            [
                ToolInvocation::new("a").with_arg("x", ArgValue::Integer(1)),
                ToolInvocation::new("b").with_arg("y", ArgValue::Float(2.5)),
            ]
        );
    }

    #[test]
    fn empty_argument_list() {
        let calls = parse_invocations("Let me check. USE_TOOL: get_time()");
        assert_eq!(calls, [ToolInvocation::new("get_time")]);
    }

    #[test]
    fn directive_embedded_in_prose() {
        let text = "Sure!\nUSE_TOOL: get_random_string(length=8, charset=alpha)\nOne moment.";
        let calls = parse_invocations(text);
        assert_eq!(
            calls,
            [ToolInvocation::new("get_random_string")
                .with_arg("length", ArgValue::Integer(8))
                .with_arg("charset", ArgValue::String("alpha".into()))]
        );
    }

    #[test]
    fn unparseable_number_stays_text() {
        assert_eq!(ArgValue::parse("1.2.3"), ArgValue::String("1.2.3".into()));
        assert_eq!(ArgValue::parse("12abc"), ArgValue::String("12abc".into()));
        assert_eq!(ArgValue::parse("-4"), ArgValue::Integer(-4));
        assert_eq!(ArgValue::parse("  0.5 "), ArgValue::Float(0.5));
    }

    #[test]
    fn quoted_number_is_string() {
        assert_eq!(ArgValue::parse(r#""42""#), ArgValue::String("42".into()));
    }

    #[test]
    fn empty_list() {
        assert_eq!(ArgValue::parse("[]"), ArgValue::List(Vec::new()));
    }

    #[test]
    fn separators_inside_quotes_are_kept() {
        let calls = parse_invocations(r#"USE_TOOL: echo(text="a, b (c)", n=2)"#);
        assert_eq!(
            calls,
            [ToolInvocation::new("echo")
                .with_arg("text", ArgValue::String("a, b (c)".into()))
                .with_arg("n", ArgValue::Integer(2))]
        );
    }

    #[test]
    fn pieces_without_equals_are_ignored() {
        let calls = parse_invocations("USE_TOOL: f(x=1, oops, y=2)");
        assert_eq!(
            calls,
            [ToolInvocation::new("f")
                .with_arg("x", ArgValue::Integer(1))
                .with_arg("y", ArgValue::Integer(2))]
        );
    }

    #[test]
    fn unclosed_directive_is_skipped() {
        let calls = parse_invocations("USE_TOOL: broken(x=1 and then USE_TOOL: ok(y=2)");
        // The first directive swallows the second's closing paren.
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "broken");

        assert!(parse_invocations("USE_TOOL: never_closed(x=1").is_empty());
    }

    #[test]
    fn directive_does_not_run_past_its_line() {
        let text = "USE_TOOL: get_random_number(min=1, max=10\nI will wait (briefly) for it.";
        assert!(parse_invocations(text).is_empty());

        let text = "USE_TOOL: a(x=1\nthen USE_TOOL: b(y=2)";
        assert_eq!(
            parse_invocations(text),
            [ToolInvocation::new("b").with_arg("y", ArgValue::Integer(2))]
        );
    }

    #[test]
    fn oversized_integer_stays_text() {
        assert_eq!(
            ArgValue::parse("99999999999999999999"),
            ArgValue::String("99999999999999999999".into())
        );
        assert!(is_integer_literal("-12"));
        assert!(!is_integer_literal("-"));
        assert!(!is_integer_literal("1e5"));
    }

    #[test]
    fn display_reparses_to_same_invocation() {
        let original = ToolInvocation::new("mixed")
            .with_arg("s", ArgValue::String("hello world".into()))
            .with_arg("i", ArgValue::Integer(-7))
            .with_arg("f", ArgValue::Float(3.0))
            .with_arg("g", ArgValue::Float(0.25))
            .with_arg("l", strings(&["red", "blue"]));

        let rendered = original.to_string();
        assert_eq!(parse_invocations(&rendered), [original.clone()]);

        let again = parse_invocations(&rendered)[0].to_string();
        assert_eq!(again, rendered);
    }

    #[test]
    fn arguments_as_json() {
        let call = ToolInvocation::new("pick")
            .with_arg("choices", strings(&["a", "b"]))
            .with_arg("count", ArgValue::Integer(1))
            .with_arg("weight", ArgValue::Float(0.5));

        let json = Value::Object(call.arguments_json());
        assert_eq!(
            json,
            serde_json::json!({"choices": ["a", "b"], "count": 1, "weight": 0.5})
        );
    }
}
