//! Script value representation.

use super::function::Callable;
use super::object::{Array, Channel, Object};
use std::fmt;
use std::sync::Arc;

/// A script value.
///
/// `Nil`, `Bool`, `Number` and `String` are plain values. `Array` and
/// `Object` are shared references, so cloning a `Value` aliases the same
/// collection. Values are `Send + Sync` so compiled prototypes can move
/// between threads.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// nil
    #[default]
    Nil,
    /// Boolean value
    Bool(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// Closure or host function
    Function(Arc<Callable>),
    /// Shared array
    Array(Array),
    /// Shared object with an optional weak parent
    Object(Object),
    /// Channel endpoint pair
    Channel(Channel),
}

/// The kind of a value, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// nil
    Nil,
    /// bool
    Bool,
    /// number
    Number,
    /// string
    String,
    /// function
    Function,
    /// array
    Array,
    /// object
    Object,
    /// channel
    Channel,
}

impl ValueKind {
    /// The name reported by the `type` builtin and in error messages.
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Nil => "nil",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Function => "function",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
            ValueKind::Channel => "channel",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Channel(a), Value::Channel(b)) => a.same_channel(b),
            _ => false,
        }
    }
}

impl Value {
    /// Returns the kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Function(_) => ValueKind::Function,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
            Value::Channel(_) => ValueKind::Channel,
        }
    }

    /// Returns the type name of this value.
    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Returns true if this value is nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Truthiness: only `nil` and `false` are false.
    pub fn to_bool(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Returns the number if this value is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean if this value is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the string slice if this value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number as an integer when it has no fractional part.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    /// Numeric conversion used by `number(x)`.
    ///
    /// Strings are parsed after trimming; anything unparseable is `None`.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => parse_number(s.trim()),
            _ => None,
        }
    }

    /// Constant pool identity: same kind and same payload.
    ///
    /// Numbers compare by bit pattern so `0` and `-0` stay distinct
    /// entries. Only scalar kinds ever live in a constant pool.
    pub fn same_constant(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

/// Parses a numeric literal, including `0x` hex integers.
pub fn parse_number(text: &str) -> Option<f64> {
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16).ok().map(|n| n as f64);
    }
    text.parse::<f64>().ok()
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, &mut Vec::new())
    }
}

/// Writes `value`. `open` holds the collections being written further
/// up; meeting one again prints `[...]` or `{...}`.
fn write_value(f: &mut fmt::Formatter<'_>, value: &Value, open: &mut Vec<usize>) -> fmt::Result {
    match value {
        Value::Nil => write!(f, "nil"),
        Value::Bool(b) => write!(f, "{}", b),
        Value::Number(n) => write!(f, "{}", n),
        Value::String(s) => write!(f, "{}", s),
        Value::Function(callable) => match callable.name() {
            Some(name) => write!(f, "func {}", name),
            None => write!(f, "func"),
        },
        Value::Array(array) => {
            if open.contains(&array.addr()) {
                return write!(f, "[...]");
            }
            open.push(array.addr());
            write!(f, "[")?;
            for (i, item) in array.snapshot().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_element(f, item, open)?;
            }
            open.pop();
            write!(f, "]")
        }
        Value::Object(object) => {
            if open.contains(&object.addr()) {
                return write!(f, "{{...}}");
            }
            open.push(object.addr());
            write!(f, "{{")?;
            for (i, (key, item)) in object.entries().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: ", key)?;
                write_element(f, item, open)?;
            }
            open.pop();
            write!(f, "}}")
        }
        Value::Channel(_) => write!(f, "channel"),
    }
}

/// Collection elements quote their strings.
fn write_element(f: &mut fmt::Formatter<'_>, item: &Value, open: &mut Vec<usize>) -> fmt::Result {
    match item {
        Value::String(s) => write!(f, "{:?}", s),
        other => write_value(f, other, open),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.to_bool());
        assert!(!Value::Bool(false).to_bool());
        assert!(Value::Bool(true).to_bool());
        assert!(Value::Number(0.0).to_bool());
        assert!(Value::String(String::new()).to_bool());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Nil.type_name(), "nil");
        assert_eq!(Value::Number(1.0).type_name(), "number");
        assert_eq!(Value::Array(Array::new(Vec::new())).type_name(), "array");
        assert_eq!(Value::Object(Object::new()).type_name(), "object");
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Value::from(" 42 ").to_number(), Some(42.0));
        assert_eq!(Value::from("0x10").to_number(), Some(16.0));
        assert_eq!(Value::from("abc").to_number(), None);
        assert_eq!(Value::Bool(true).to_number(), Some(1.0));
        assert_eq!(Value::Nil.to_number(), None);
    }

    #[test]
    fn test_same_constant_distinguishes_kinds() {
        assert!(Value::Number(1.0).same_constant(&Value::Number(1.0)));
        assert!(!Value::Number(1.0).same_constant(&Value::from("1")));
        assert!(!Value::Number(0.0).same_constant(&Value::Number(-0.0)));
        assert!(!Value::Bool(true).same_constant(&Value::Number(1.0)));
    }

    #[test]
    fn test_reference_equality() {
        let a = Array::new(vec![Value::Number(1.0)]);
        let b = Array::new(vec![Value::Number(1.0)]);
        assert_eq!(Value::Array(a.clone()), Value::Array(a));
        assert_ne!(
            Value::Array(b),
            Value::Array(Array::new(vec![Value::Number(1.0)]))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(0.5).to_string(), "0.5");
        let array = Array::new(vec![Value::Number(1.0), Value::from("x")]);
        assert_eq!(Value::Array(array).to_string(), "[1, \"x\"]");
    }

    #[test]
    fn test_display_stops_at_cycles() {
        let array = Array::new(vec![Value::Number(1.0)]);
        array.extend([Value::Array(array.clone())]);
        assert_eq!(Value::Array(array.clone()).to_string(), "[1, [...]]");

        let object = Object::new();
        object.set("self", Value::Object(object.clone()));
        object.set("items", Value::Array(array.clone()));
        assert_eq!(
            Value::Object(object.clone()).to_string(),
            "{items: [1, [...]], self: {...}}"
        );
        assert!(format!("{:?}", array).starts_with("Array([1"));
    }

    #[test]
    fn test_display_repeats_shared_elements() {
        let shared = Array::new(vec![Value::Number(2.0)]);
        let outer = Array::new(vec![Value::Array(shared.clone()), Value::Array(shared)]);
        assert_eq!(Value::Array(outer).to_string(), "[[2], [2]]");
    }
}
