//! PHP side values and addressable expressions.

pub mod decoder;
pub mod evaluator;

pub use decoder::decode;
pub use evaluator::ExpressionEvaluator;

use itertools::Itertools;
use std::fmt::{Display, Formatter};

/// Names of PHP superglobal arrays.
const SUPERGLOBALS: [&str; 9] = [
    "$GLOBALS", "$_SERVER", "$_GET", "$_POST", "$_FILES", "$_COOKIE", "$_SESSION", "$_REQUEST",
    "$_ENV",
];

/// Expression that returns all variables visible in the current scope.
pub const VARIABLES_EXPRESSION: &str = "get_defined_vars()";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpressionKind {
    /// Root of the current scope variables.
    Variables,
    This,
    Superglobal,
    Local,
    ArrayMember,
    ObjectMember,
    /// Expression without a path (user code, call stack parameters).
    Detached,
}

/// Kind of container the member belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    Array,
    Object,
}

/// Addressable path into the debuggee variables graph, like `$obj->items[0]`.
///
/// `chain` is a root expression followed by member keys, it is what the engine expects
/// in variable value requests.
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    chain: Vec<String>,
    text: String,
    kind: ExpressionKind,
}

impl Expression {
    /// Root expression for variables of the current scope.
    pub fn variables() -> Self {
        Self {
            chain: vec![VARIABLES_EXPRESSION.to_string()],
            text: VARIABLES_EXPRESSION.to_string(),
            kind: ExpressionKind::Variables,
        }
    }

    /// Expression without a parent, evaluated as is.
    pub fn detached(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            chain: vec![text.clone()],
            text,
            kind: ExpressionKind::Detached,
        }
    }

    /// Create an expression for member `key` of a value which this expression points to.
    pub fn create_child(&self, key: &str, container: Container) -> Self {
        match (self.kind, container) {
            (ExpressionKind::Variables, _) => {
                let name = if key.starts_with('$') {
                    key.to_string()
                } else {
                    format!("${key}")
                };
                let kind = if name == "$this" {
                    ExpressionKind::This
                } else if SUPERGLOBALS.contains(&name.as_str()) {
                    ExpressionKind::Superglobal
                } else {
                    ExpressionKind::Local
                };
                Self {
                    chain: vec![name.clone()],
                    text: name,
                    kind,
                }
            }
            (_, Container::Array) => {
                let text = if key.parse::<i64>().is_ok() {
                    format!("{}[{key}]", self.text)
                } else {
                    format!("{}['{key}']", self.text)
                };
                self.child(key, text, ExpressionKind::ArrayMember)
            }
            (_, Container::Object) => {
                let text = format!("{}->{key}", self.text);
                self.child(key, text, ExpressionKind::ObjectMember)
            }
        }
    }

    fn child(&self, key: &str, text: String, kind: ExpressionKind) -> Self {
        let mut chain = self.chain.clone();
        chain.push(key.to_string());
        Self { chain, text, kind }
    }

    /// Root expression sent to the engine.
    pub fn root(&self) -> &str {
        &self.chain[0]
    }

    /// Member keys from the root to this expression.
    pub fn path(&self) -> &[String] {
        &self.chain[1..]
    }

    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> ExpressionKind {
        self.kind
    }

    /// Short name: variable name for a top level variable, member key otherwise.
    pub fn name(&self) -> &str {
        match self.kind {
            ExpressionKind::ArrayMember | ExpressionKind::ObjectMember => {
                self.chain.last().map(String::as_str).unwrap_or_default()
            }
            _ => &self.text,
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Named child of an array or an object.
#[derive(Clone, Debug, PartialEq)]
pub struct Member {
    pub expression: Expression,
    pub value: ExpressionValue,
}

/// Decoded PHP value.
#[derive(Clone, Debug, PartialEq)]
pub enum ExpressionValue {
    Null,
    Int(String),
    Float(String),
    String(String),
    Bool(String),
    Resource {
        id: String,
        value: String,
    },
    /// `declared_len` is the size reported by the engine, `children` may be shorter
    /// if the engine didn't send elements (depth limit).
    Array {
        declared_len: usize,
        children: Vec<Member>,
    },
    Object {
        class_name: String,
        declared_len: usize,
        children: Vec<Member>,
    },
}

impl ExpressionValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ExpressionValue::Null => "null",
            ExpressionValue::Int(_) => "int",
            ExpressionValue::Float(_) => "float",
            ExpressionValue::String(_) => "string",
            ExpressionValue::Bool(_) => "bool",
            ExpressionValue::Resource { .. } => "resource",
            ExpressionValue::Array { .. } => "array",
            ExpressionValue::Object { .. } => "object",
        }
    }

    pub fn children(&self) -> &[Member] {
        match self {
            ExpressionValue::Array { children, .. } | ExpressionValue::Object { children, .. } => {
                children
            }
            _ => &[],
        }
    }

    pub fn declared_len(&self) -> usize {
        match self {
            ExpressionValue::Array { declared_len, .. }
            | ExpressionValue::Object { declared_len, .. } => *declared_len,
            _ => 0,
        }
    }

    /// True if the value has members which were not transferred yet.
    pub fn is_incomplete(&self) -> bool {
        self.children().len() < self.declared_len()
    }
}

impl Display for ExpressionValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpressionValue::Null => f.write_str("null"),
            ExpressionValue::Int(v) | ExpressionValue::Float(v) => f.write_str(v),
            ExpressionValue::String(v) => write!(f, "\"{v}\""),
            ExpressionValue::Bool(v) => {
                f.write_str(if v == "0" || v.is_empty() { "false" } else { "true" })
            }
            ExpressionValue::Resource { id, value } => write!(f, "resource({id}) of type ({value})"),
            ExpressionValue::Array {
                declared_len,
                children,
            } => {
                if children.is_empty() {
                    return write!(f, "array [{declared_len}]");
                }
                let members = children
                    .iter()
                    .map(|m| format!("{} => {}", m.expression.name(), m.value))
                    .join(", ");
                write!(f, "array [{declared_len}] {{{members}}}")
            }
            ExpressionValue::Object { class_name, .. } => f.write_str(class_name),
        }
    }
}

/// Errors of the serialized value decoder. Positions are byte offsets in the value blob.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("unexpected end of value at {0}")]
    UnexpectedEnd(usize),
    #[error("unknown value type `{tag}` at {pos}")]
    UnknownType { tag: char, pos: usize },
    #[error("invalid member key type `{tag}` at {pos}")]
    InvalidKey { tag: char, pos: usize },
    #[error("expect `{expect}` at {pos}")]
    Expected { expect: char, pos: usize },
    #[error("invalid number `{token}` at {pos}")]
    InvalidNumber { token: String, pos: usize },
    #[error("invalid text at {0}")]
    InvalidText(usize),
    #[error("value nested too deep at {pos}")]
    TooDeep { pos: usize },
}
